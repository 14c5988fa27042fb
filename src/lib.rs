use std::sync::Arc;

use axum::Router;
use redis::Client as RedisClient;

use config::Config;
use database::LocationStore;
use geocode::ReverseGeocoder;
use middleware::{AdminVerifier, log_errors};

pub mod client;
pub mod config;
pub mod database;
pub mod error;
pub mod geocode;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod utils;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LocationStore>,
    pub config: Config,
    pub redis: Arc<RedisClient>,
    pub geocoder: Arc<dyn ReverseGeocoder>,
    pub admin: Arc<dyn AdminVerifier>,
}

/// 组装完整的 HTTP 应用（不含限流，限流层由启动代码按需添加）
pub fn build_app(state: AppState) -> Router {
    let base = state.config.api_base_uri.trim_end_matches('/');

    // axum 不允许在根路径 nest
    let router = if base.is_empty() {
        Router::new().merge(routes::api_router())
    } else {
        Router::new().nest(base, routes::api_router())
    };

    let router = router.layer(axum::middleware::from_fn(log_errors));

    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(tower_http::cors::CorsLayer::permissive())
    };

    router.with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::config::Config;
    use crate::database::operations::MemoryStore;
    use crate::error::AppError;
    use crate::geocode::ReverseGeocoder;
    use crate::middleware::JwtAdminVerifier;
    use crate::AppState;

    pub const ADMIN_PASSWORD: &str = "1122";

    pub struct StubGeocoder;

    #[async_trait]
    impl ReverseGeocoder for StubGeocoder {
        async fn reverse(&self, latitude: f64, longitude: f64) -> Result<String, AppError> {
            Ok(format!("Near {:.2}, {:.2}", latitude, longitude))
        }
    }

    pub fn state() -> (AppState, Arc<MemoryStore>) {
        let mut config = Config::for_tests();
        config.admin_password_hash = Some(bcrypt::hash(ADMIN_PASSWORD, 4).unwrap());

        let store = Arc::new(MemoryStore::new());
        let state = AppState {
            store: store.clone(),
            redis: Arc::new(redis::Client::open(config.redis_url.clone()).unwrap()),
            geocoder: Arc::new(StubGeocoder),
            admin: Arc::new(JwtAdminVerifier::new(config.jwt_secret.clone())),
            config,
        };
        (state, store)
    }
}
