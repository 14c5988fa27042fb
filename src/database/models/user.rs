use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use crate::database::models::location::LocationRecord;
use crate::utils::{serialize_instant, serialize_opt_instant};

/// 用户实体，对应数据库中的 users 表
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// 创建时分配的不透明ID，不可修改
    pub id: String,
    /// 显示名称，在活跃用户中唯一（区分大小写）
    pub name: String,
    /// false 表示已软删除
    pub is_active: bool,
    /// 管理员设置的追踪标记（仅作记录，不约束客户端）
    pub is_tracking: bool,
    #[serde(serialize_with = "serialize_instant")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_instant")]
    pub last_updated: DateTime<Utc>,
    #[serde(serialize_with = "serialize_opt_instant")]
    pub admin_tracking_started: Option<DateTime<Utc>>,
    pub admin_tracking_started_by: Option<String>,
    #[serde(serialize_with = "serialize_opt_instant")]
    pub admin_tracking_stopped: Option<DateTime<Utc>>,
    pub admin_tracking_stopped_by: Option<String>,
}

/// 新建用户参数
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: String,
    pub name: String,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingAction {
    Start,
    Stop,
}

/// 一次管理员追踪操作：动作、执行人、时间
#[derive(Debug, Clone)]
pub struct TrackingChange {
    pub action: TrackingAction,
    pub actor: String,
    pub at: DateTime<Utc>,
}

impl TrackingChange {
    /// 把操作写入用户记录。开始和停止的审计字段互不覆盖。
    pub fn apply_to(&self, user: &mut UserRecord) {
        match self.action {
            TrackingAction::Start => {
                user.is_tracking = true;
                user.admin_tracking_started = Some(self.at);
                user.admin_tracking_started_by = Some(self.actor.clone());
            }
            TrackingAction::Stop => {
                user.is_tracking = false;
                user.admin_tracking_stopped = Some(self.at);
                user.admin_tracking_stopped_by = Some(self.actor.clone());
            }
        }
        user.last_updated = self.at;
    }
}

/// 活跃用户及其最新位置（按 recorded_at 最大值选取）
#[derive(Debug, Clone)]
pub struct UserWithLocation {
    pub user: UserRecord,
    pub latest: Option<LocationRecord>,
}
