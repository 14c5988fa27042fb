use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::serialize_instant;

/// 坐标先按字符串接收，方便给出统一的 400 错误
#[derive(Debug, Deserialize)]
pub struct GeocodeQuery {
    pub lat: Option<String>,
    pub lng: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeocodeResponse {
    pub display_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub active_users: i64,
    #[serde(serialize_with = "serialize_instant")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub message: String,
    #[serde(serialize_with = "serialize_instant")]
    pub timestamp: DateTime<Utc>,
    /// 存储不可用时省略
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_users: Option<i64>,
}
