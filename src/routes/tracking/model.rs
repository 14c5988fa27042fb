use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::database::UserRecord;
use crate::utils::serialize_instant;

#[derive(Debug, Serialize)]
pub struct TrackingResponse {
    pub success: bool,
    pub message: String,
    pub user: UserRecord,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingAllResponse {
    pub success: bool,
    pub message: String,
    pub affected: usize,
    pub users: Vec<String>,
    #[serde(serialize_with = "serialize_instant")]
    pub timestamp: DateTime<Utc>,
}
