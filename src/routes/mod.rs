pub mod admin;
pub mod location;
pub mod system;
pub mod tracking;
pub mod user;

use axum::{
    Router,
    routing::{get, post},
};
use serde_json::Value;

use crate::AppState;

/// 所有 API 路由，挂载在 `config.api_base_uri` 之下
pub fn api_router() -> Router<AppState> {
    Router::new()
        // 用户与位置
        .route("/location-samples", post(location::raw_sample))
        .route(
            "/users",
            get(user::list).post(user::register).delete(user::clear_all),
        )
        .route("/users/{name}", get(user::get_one).delete(user::deactivate))
        .route("/users/{name}/location", post(location::submit))
        // 管理员追踪控制
        .route("/users/{name}/tracking/start", post(tracking::start))
        .route("/users/{name}/tracking/stop", post(tracking::stop))
        .route("/tracking/start-all", post(tracking::start_all))
        .route("/tracking/stop-all", post(tracking::stop_all))
        .route("/tracking-status", get(tracking::status))
        // 管理员认证
        .route("/admin/login", post(admin::login))
        .route("/admin/verify", get(admin::verify))
        .route("/admin/logout", post(admin::logout))
        // 其它
        .route("/geocode", get(system::geocode))
        .route("/stats", get(system::stats))
        .route("/health", get(system::health))
}

/// 字符串或数字都转成文本，其它类型视为缺失
pub(crate) fn loose_text(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
