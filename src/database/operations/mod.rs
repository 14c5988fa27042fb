mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::database::models::location::{LocationRecord, NewLocation};
use crate::database::models::user::{NewUser, TrackingChange, UserRecord, UserWithLocation};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// 持久化存储接口。每个写操作都是独立的单行原子操作。
#[async_trait]
pub trait LocationStore: Send + Sync {
    /// 创建用户；已存在同名活跃用户（或ID冲突）时返回 `StoreError::Conflict`
    async fn insert_user(&self, user: NewUser) -> Result<UserRecord, StoreError>;

    async fn find_active_user(&self, name: &str) -> Result<Option<UserRecord>, StoreError>;

    /// 更新活跃用户的 last_updated，用户不存在或未激活时返回 `None`
    async fn touch_user(
        &self,
        name: &str,
        last_updated: DateTime<Utc>,
    ) -> Result<Option<UserRecord>, StoreError>;

    /// 追加位置记录；带 sample_id 的重放返回已有记录
    async fn insert_location(&self, location: NewLocation) -> Result<LocationRecord, StoreError>;

    async fn count_locations(&self, user_name: &str) -> Result<i64, StoreError>;

    /// 软删除，返回是否真的有记录被停用
    async fn deactivate_user(&self, name: &str) -> Result<bool, StoreError>;

    async fn deactivate_all(&self) -> Result<u64, StoreError>;

    async fn set_tracking(
        &self,
        name: &str,
        change: &TrackingChange,
    ) -> Result<Option<UserRecord>, StoreError>;

    /// 对所有活跃用户应用追踪操作，返回受影响的用户名
    async fn set_tracking_all(&self, change: &TrackingChange) -> Result<Vec<String>, StoreError>;

    async fn active_users(&self) -> Result<Vec<UserRecord>, StoreError>;

    async fn count_active_users(&self) -> Result<i64, StoreError>;

    /// 活跃用户及最新位置，按 last_updated 倒序
    async fn active_users_with_latest(&self) -> Result<Vec<UserWithLocation>, StoreError>;

    async fn active_user_with_latest(
        &self,
        name: &str,
    ) -> Result<Option<UserWithLocation>, StoreError>;
}
