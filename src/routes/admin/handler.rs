use axum::extract::{Json, State};

use crate::{
    AppState,
    error::AppError,
    middleware::{AdminPrincipal, AdminUser},
    utils::{ADMIN_ROLE, generate_token, verify_password},
};

use super::model::{LoginRequest, LoginResponse, LogoutResponse, VerifyResponse};

fn invalid_credentials() -> AppError {
    AppError::Unauthorized("Invalid credentials".into())
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let (username, password) = match (req.username, req.password) {
        (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => (u, p),
        _ => {
            return Err(AppError::Validation(
                "Username and password are required".into(),
            ));
        }
    };

    let Some(hash) = state.config.admin_password_hash.as_deref() else {
        tracing::warn!("Admin login attempted but ADMIN_PASSWORD_HASH is not set");
        return Err(invalid_credentials());
    };

    if username != state.config.admin_username {
        tracing::warn!("Admin login failed for unknown user {}", username);
        return Err(invalid_credentials());
    }

    match verify_password(&password, hash) {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!("Admin login failed for {}: wrong password", username);
            return Err(invalid_credentials());
        }
        Err(e) => {
            tracing::error!("Configured admin password hash is unusable: {}", e);
            return Err(invalid_credentials());
        }
    }

    let (token, expires_at) = generate_token(&username, &state.config)
        .map_err(|e| AppError::Storage(format!("failed to sign token: {}", e)))?;

    tracing::info!("Admin {} logged in", username);
    Ok(Json(LoginResponse {
        success: true,
        message: "Admin login successful".to_string(),
        token,
        expires_at,
        user: AdminPrincipal {
            username,
            role: ADMIN_ROLE.to_string(),
        },
    }))
}

#[axum::debug_handler(state = AppState)]
pub async fn verify(AdminUser(admin): AdminUser) -> Json<VerifyResponse> {
    Json(VerifyResponse {
        success: true,
        user: admin,
    })
}

/// 无状态 token，登出只需客户端丢弃 token
#[axum::debug_handler]
pub async fn logout() -> Json<LogoutResponse> {
    Json(LogoutResponse {
        success: true,
        message: "Logout successful".to_string(),
    })
}
