use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::database::{LocationRecord, UserRecord};
use crate::routes::loose_text;
use crate::services::LocationSubmission;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LocationPayload {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub accuracy: Option<f64>,
    pub location_name: Option<String>,
    /// 采集时间，字符串或毫秒时间戳，解析失败时使用当前时间
    pub timestamp: Option<Value>,
}

/// `POST /users/{name}/location` 请求体
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SubmitLocationRequest {
    pub location: Option<LocationPayload>,
    pub last_updated: Option<Value>,
    /// 客户端生成的幂等键
    pub sample_id: Option<Uuid>,
}

impl SubmitLocationRequest {
    /// 缺少 location 或坐标时返回 `None`
    pub fn into_submission(self) -> Option<LocationSubmission> {
        let location = self.location?;
        Some(LocationSubmission {
            latitude: location.latitude?,
            longitude: location.longitude?,
            accuracy: location.accuracy,
            location_name: location.location_name,
            recorded_at: loose_text(location.timestamp),
            sample_id: self.sample_id,
            last_updated: loose_text(self.last_updated),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct SubmitLocationResponse {
    pub success: bool,
    pub user: UserRecord,
    pub location: LocationRecord,
}

/// 后台上报的原始样本，只记录日志
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawSampleRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub readings_count: Option<u32>,
    pub method: Option<String>,
    pub location_name: Option<String>,
    pub timestamp: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct RawSampleResponse {
    pub success: bool,
    pub message: String,
}
