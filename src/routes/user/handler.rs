use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
};

use crate::{
    AppState,
    error::AppError,
    middleware::AdminUser,
    services::{self, UserView},
};

use super::model::{ClearAllResponse, DeactivateResponse, RegisterUserRequest, RegisterUserResponse};

#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterUserRequest>,
) -> Result<(StatusCode, Json<RegisterUserResponse>), AppError> {
    let params = req
        .into_params()
        .ok_or_else(|| AppError::Validation("Name is required".into()))?;

    let user = services::register_user(state.store.as_ref(), params).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterUserResponse {
            success: true,
            user,
        }),
    ))
}

#[axum::debug_handler]
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<UserView>>, AppError> {
    let users = services::list_active_users(state.store.as_ref()).await?;
    Ok(Json(users))
}

#[axum::debug_handler]
pub async fn get_one(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<UserView>, AppError> {
    let user = services::get_user(state.store.as_ref(), &name).await?;
    Ok(Json(user))
}

#[axum::debug_handler]
pub async fn deactivate(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(name): Path<String>,
) -> Result<Json<DeactivateResponse>, AppError> {
    let deactivated = services::deactivate_user(state.store.as_ref(), &name).await?;
    tracing::info!("Admin {} deactivate request for {}", admin.username, name);

    let message = if deactivated {
        "User deactivated"
    } else {
        "User not found or already inactive"
    };

    Ok(Json(DeactivateResponse {
        success: true,
        deactivated,
        message: message.to_string(),
    }))
}

#[axum::debug_handler]
pub async fn clear_all(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> Result<Json<ClearAllResponse>, AppError> {
    let count = services::deactivate_all(state.store.as_ref()).await?;
    tracing::info!("Admin {} cleared all users", admin.username);

    Ok(Json(ClearAllResponse {
        success: true,
        deactivated_count: count,
        message: "All users deactivated".to_string(),
    }))
}
