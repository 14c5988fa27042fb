use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use serde::Serialize;

use crate::{
    AppState,
    error::AppError,
    utils::{ADMIN_ROLE, verify_token},
};

/// 已认证的管理员
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdminPrincipal {
    pub username: String,
    pub role: String,
}

/// token -> 管理员身份。无效或过期返回 401，角色不对返回 403。
pub trait AdminVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<AdminPrincipal, AppError>;
}

/// 基于 HS256 JWT 的默认实现
pub struct JwtAdminVerifier {
    secret: String,
}

impl JwtAdminVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl AdminVerifier for JwtAdminVerifier {
    fn verify(&self, token: &str) -> Result<AdminPrincipal, AppError> {
        let claims = verify_token(token, &self.secret).map_err(|e| {
            tracing::warn!("Rejected admin token: {}", e);
            AppError::Unauthorized("Invalid or expired token".into())
        })?;

        if claims.role != ADMIN_ROLE {
            tracing::warn!("Token for {} has role {}, admin required", claims.sub, claims.role);
            return Err(AppError::Forbidden("Admin access required".into()));
        }

        Ok(AdminPrincipal {
            username: claims.sub,
            role: claims.role,
        })
    }
}

/// 需要管理员身份的处理函数使用这个提取器
pub struct AdminUser(pub AdminPrincipal);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::Unauthorized("No token provided".into()))?;

        let principal = state.admin.verify(bearer.token())?;
        Ok(AdminUser(principal))
    }
}
