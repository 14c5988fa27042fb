use std::collections::BTreeMap;

use axum::extract::{Json, Path, State};
use chrono::Utc;

use crate::{AppState, error::AppError, middleware::AdminUser, services};

use super::model::{TrackingAllResponse, TrackingResponse};

#[axum::debug_handler]
pub async fn start(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(name): Path<String>,
) -> Result<Json<TrackingResponse>, AppError> {
    let user = services::start_tracking(state.store.as_ref(), &name, &admin).await?;
    Ok(Json(TrackingResponse {
        success: true,
        message: format!("Started tracking for user: {}", name),
        user,
    }))
}

#[axum::debug_handler]
pub async fn stop(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(name): Path<String>,
) -> Result<Json<TrackingResponse>, AppError> {
    let user = services::stop_tracking(state.store.as_ref(), &name, &admin).await?;
    Ok(Json(TrackingResponse {
        success: true,
        message: format!("Stopped tracking for user: {}", name),
        user,
    }))
}

#[axum::debug_handler]
pub async fn start_all(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> Result<Json<TrackingAllResponse>, AppError> {
    let users = services::start_all_tracking(state.store.as_ref(), &admin).await?;
    Ok(Json(TrackingAllResponse {
        success: true,
        message: "Started tracking for all users".to_string(),
        affected: users.len(),
        users,
        timestamp: Utc::now(),
    }))
}

#[axum::debug_handler]
pub async fn stop_all(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> Result<Json<TrackingAllResponse>, AppError> {
    let users = services::stop_all_tracking(state.store.as_ref(), &admin).await?;
    Ok(Json(TrackingAllResponse {
        success: true,
        message: "Stopped tracking for all users".to_string(),
        affected: users.len(),
        users,
        timestamp: Utc::now(),
    }))
}

#[axum::debug_handler]
pub async fn status(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> Result<Json<BTreeMap<String, bool>>, AppError> {
    let status = services::tracking_status(state.store.as_ref()).await?;
    Ok(Json(status))
}
