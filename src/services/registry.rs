use uuid::Uuid;

use crate::database::{LocationStore, NewUser, UserRecord};
use crate::error::AppError;
use crate::utils::normalize_timestamp;

/// 注册参数，来自 `POST /users`
#[derive(Debug, Clone, Default)]
pub struct RegisterUser {
    pub name: String,
    pub id: Option<String>,
    pub is_active: Option<bool>,
    pub last_updated: Option<String>,
}

pub async fn register_user(
    store: &dyn LocationStore,
    req: RegisterUser,
) -> Result<UserRecord, AppError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Name is required".into()));
    }

    // 新用户总是活跃的
    if req.is_active == Some(false) {
        tracing::warn!("Ignoring isActive=false on registration of {}", name);
    }

    let id = req
        .id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let user = NewUser {
        id,
        name: name.to_string(),
        last_updated: normalize_timestamp(req.last_updated.as_deref()),
    };

    match store.insert_user(user).await {
        Ok(user) => {
            tracing::info!("Registered user {} ({})", user.name, user.id);
            Ok(user)
        }
        Err(e) => {
            let err = AppError::from(e);
            if matches!(err, AppError::Conflict(_)) {
                tracing::warn!("Registration conflict for {}: {}", name, err);
            }
            Err(err)
        }
    }
}

/// 软删除单个用户；用户不存在时视为成功，返回 false
pub async fn deactivate_user(store: &dyn LocationStore, name: &str) -> Result<bool, AppError> {
    let deactivated = store.deactivate_user(name).await?;
    if deactivated {
        tracing::info!("Deactivated user {}", name);
    } else {
        tracing::info!("Deactivate requested for unknown or inactive user {}", name);
    }
    Ok(deactivated)
}

pub async fn deactivate_all(store: &dyn LocationStore) -> Result<u64, AppError> {
    let count = store.deactivate_all().await?;
    tracing::info!("Deactivated all users ({} affected)", count);
    Ok(count)
}
