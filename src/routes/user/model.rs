use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::database::UserRecord;
use crate::routes::loose_text;
use crate::services::RegisterUser;

/// `POST /users` 请求体
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RegisterUserRequest {
    pub name: Option<String>,
    /// 字符串或数字（客户端常用毫秒时间戳作为ID）
    pub id: Option<Value>,
    pub is_active: Option<bool>,
    pub last_updated: Option<Value>,
}

impl RegisterUserRequest {
    pub fn into_params(self) -> Option<RegisterUser> {
        let name = self.name.filter(|n| !n.trim().is_empty())?;
        Some(RegisterUser {
            name,
            id: loose_text(self.id),
            is_active: self.is_active,
            last_updated: loose_text(self.last_updated),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct RegisterUserResponse {
    pub success: bool,
    pub user: UserRecord,
}

#[derive(Debug, Serialize)]
pub struct DeactivateResponse {
    pub success: bool,
    /// 是否真的有用户被停用
    pub deactivated: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearAllResponse {
    pub success: bool,
    pub deactivated_count: u64,
    pub message: String,
}
