use std::collections::BTreeMap;

use chrono::Utc;

use crate::database::{LocationStore, TrackingAction, TrackingChange, UserRecord};
use crate::error::AppError;
use crate::middleware::AdminPrincipal;
use crate::utils::truncate_to_millis;

fn change(action: TrackingAction, admin: &AdminPrincipal) -> TrackingChange {
    TrackingChange {
        action,
        actor: admin.username.clone(),
        at: truncate_to_millis(Utc::now()),
    }
}

async fn set_one(
    store: &dyn LocationStore,
    name: &str,
    action: TrackingAction,
    admin: &AdminPrincipal,
) -> Result<UserRecord, AppError> {
    let user = store
        .set_tracking(name, &change(action, admin))
        .await?
        .ok_or_else(|| {
            tracing::warn!("Tracking {:?} requested for unknown user {}", action, name);
            AppError::NotFound("User not found".into())
        })?;

    tracing::info!("Admin {} {:?} tracking for {}", admin.username, action, name);
    Ok(user)
}

async fn set_all(
    store: &dyn LocationStore,
    action: TrackingAction,
    admin: &AdminPrincipal,
) -> Result<Vec<String>, AppError> {
    let names = store.set_tracking_all(&change(action, admin)).await?;
    tracing::info!(
        "Admin {} {:?} tracking for all users ({} affected)",
        admin.username,
        action,
        names.len()
    );
    Ok(names)
}

pub async fn start_tracking(
    store: &dyn LocationStore,
    name: &str,
    admin: &AdminPrincipal,
) -> Result<UserRecord, AppError> {
    set_one(store, name, TrackingAction::Start, admin).await
}

pub async fn stop_tracking(
    store: &dyn LocationStore,
    name: &str,
    admin: &AdminPrincipal,
) -> Result<UserRecord, AppError> {
    set_one(store, name, TrackingAction::Stop, admin).await
}

/// 只影响当前活跃用户，返回受影响的用户名
pub async fn start_all_tracking(
    store: &dyn LocationStore,
    admin: &AdminPrincipal,
) -> Result<Vec<String>, AppError> {
    set_all(store, TrackingAction::Start, admin).await
}

pub async fn stop_all_tracking(
    store: &dyn LocationStore,
    admin: &AdminPrincipal,
) -> Result<Vec<String>, AppError> {
    set_all(store, TrackingAction::Stop, admin).await
}

pub async fn tracking_status(
    store: &dyn LocationStore,
) -> Result<BTreeMap<String, bool>, AppError> {
    Ok(store
        .active_users()
        .await?
        .into_iter()
        .map(|u| (u.name, u.is_tracking))
        .collect())
}
