use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{LocationStore, StoreError};
use crate::database::models::location::{LocationRecord, NewLocation};
use crate::database::models::user::{NewUser, TrackingChange, UserRecord, UserWithLocation};

#[derive(Default)]
struct Tables {
    users: Vec<UserRecord>,
    locations: Vec<LocationRecord>,
    next_location_id: i64,
}

impl Tables {
    fn active_mut(&mut self, name: &str) -> Option<&mut UserRecord> {
        self.users.iter_mut().find(|u| u.is_active && u.name == name)
    }

    fn with_latest(&self, user: &UserRecord) -> UserWithLocation {
        let latest = LocationRecord::latest(
            self.locations.iter().filter(|l| l.user_name == user.name),
        )
        .cloned();

        UserWithLocation {
            user: user.clone(),
            latest,
        }
    }

    fn sorted_active(&self) -> Vec<&UserRecord> {
        let mut users: Vec<&UserRecord> = self.users.iter().filter(|u| u.is_active).collect();
        users.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        users
    }
}

/// 内存存储，用于测试和本地开发。所有写操作都在同一把写锁内完成。
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LocationStore for MemoryStore {
    async fn insert_user(&self, user: NewUser) -> Result<UserRecord, StoreError> {
        let mut tables = self.tables.write().await;

        if tables.users.iter().any(|u| u.is_active && u.name == user.name) {
            return Err(StoreError::Conflict("User with this name already exists".into()));
        }
        if tables.users.iter().any(|u| u.id == user.id) {
            return Err(StoreError::Conflict("User with this id already exists".into()));
        }

        let record = UserRecord {
            id: user.id,
            name: user.name,
            is_active: true,
            is_tracking: false,
            created_at: Utc::now(),
            last_updated: user.last_updated,
            admin_tracking_started: None,
            admin_tracking_started_by: None,
            admin_tracking_stopped: None,
            admin_tracking_stopped_by: None,
        };
        tables.users.push(record.clone());

        Ok(record)
    }

    async fn find_active_user(&self, name: &str) -> Result<Option<UserRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .iter()
            .find(|u| u.is_active && u.name == name)
            .cloned())
    }

    async fn touch_user(
        &self,
        name: &str,
        last_updated: DateTime<Utc>,
    ) -> Result<Option<UserRecord>, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(tables.active_mut(name).map(|user| {
            user.last_updated = last_updated;
            user.clone()
        }))
    }

    async fn insert_location(&self, location: NewLocation) -> Result<LocationRecord, StoreError> {
        let mut tables = self.tables.write().await;

        if let Some(sample_id) = location.sample_id {
            if let Some(existing) = tables
                .locations
                .iter()
                .find(|l| l.user_name == location.user_name && l.sample_id == Some(sample_id))
            {
                return Ok(existing.clone());
            }
        }

        tables.next_location_id += 1;
        let record = LocationRecord {
            id: tables.next_location_id,
            user_name: location.user_name,
            sample_id: location.sample_id,
            latitude: location.latitude,
            longitude: location.longitude,
            accuracy: location.accuracy,
            location_name: location.location_name,
            recorded_at: location.recorded_at,
            created_at: Utc::now(),
        };
        tables.locations.push(record.clone());

        Ok(record)
    }

    async fn count_locations(&self, user_name: &str) -> Result<i64, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .locations
            .iter()
            .filter(|l| l.user_name == user_name)
            .count() as i64)
    }

    async fn deactivate_user(&self, name: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(match tables.active_mut(name) {
            Some(user) => {
                user.is_active = false;
                user.is_tracking = false;
                true
            }
            None => false,
        })
    }

    async fn deactivate_all(&self) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        let mut affected = 0;
        for user in tables.users.iter_mut().filter(|u| u.is_active) {
            user.is_active = false;
            user.is_tracking = false;
            affected += 1;
        }
        Ok(affected)
    }

    async fn set_tracking(
        &self,
        name: &str,
        change: &TrackingChange,
    ) -> Result<Option<UserRecord>, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(tables.active_mut(name).map(|user| {
            change.apply_to(user);
            user.clone()
        }))
    }

    async fn set_tracking_all(&self, change: &TrackingChange) -> Result<Vec<String>, StoreError> {
        let mut tables = self.tables.write().await;
        let mut names = Vec::new();
        for user in tables.users.iter_mut().filter(|u| u.is_active) {
            change.apply_to(user);
            names.push(user.name.clone());
        }
        Ok(names)
    }

    async fn active_users(&self) -> Result<Vec<UserRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.sorted_active().into_iter().cloned().collect())
    }

    async fn count_active_users(&self) -> Result<i64, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().filter(|u| u.is_active).count() as i64)
    }

    async fn active_users_with_latest(&self) -> Result<Vec<UserWithLocation>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .sorted_active()
            .into_iter()
            .map(|user| tables.with_latest(user))
            .collect())
    }

    async fn active_user_with_latest(
        &self,
        name: &str,
    ) -> Result<Option<UserWithLocation>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .iter()
            .find(|u| u.is_active && u.name == name)
            .map(|user| tables.with_latest(user)))
    }
}
