use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::database::{LocationRecord, LocationStore, UserWithLocation};
use crate::error::AppError;
use crate::utils::{serialize_instant, serialize_opt_instant};

/// 管理台看到的位置信息
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationView {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub location_name: Option<String>,
    /// 即 recorded_at
    #[serde(serialize_with = "serialize_instant")]
    pub timestamp: DateTime<Utc>,
}

/// 管理台看到的用户投影
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub name: String,
    pub is_active: bool,
    #[serde(serialize_with = "serialize_instant")]
    pub last_updated: DateTime<Utc>,
    pub is_tracking: bool,
    #[serde(serialize_with = "serialize_opt_instant")]
    pub admin_tracking_started: Option<DateTime<Utc>>,
    pub admin_tracking_started_by: Option<String>,
    #[serde(serialize_with = "serialize_opt_instant")]
    pub admin_tracking_stopped: Option<DateTime<Utc>>,
    pub admin_tracking_stopped_by: Option<String>,
    pub location: Option<LocationView>,
}

impl From<&LocationRecord> for LocationView {
    fn from(record: &LocationRecord) -> Self {
        LocationView {
            latitude: record.latitude,
            longitude: record.longitude,
            accuracy: record.accuracy,
            location_name: record.location_name.clone(),
            timestamp: record.recorded_at,
        }
    }
}

impl From<UserWithLocation> for UserView {
    fn from(row: UserWithLocation) -> Self {
        let UserWithLocation { user, latest } = row;
        UserView {
            id: user.id,
            name: user.name,
            is_active: user.is_active,
            last_updated: user.last_updated,
            is_tracking: user.is_tracking,
            admin_tracking_started: user.admin_tracking_started,
            admin_tracking_started_by: user.admin_tracking_started_by,
            admin_tracking_stopped: user.admin_tracking_stopped,
            admin_tracking_stopped_by: user.admin_tracking_stopped_by,
            location: latest.as_ref().map(LocationView::from),
        }
    }
}

/// 所有活跃用户及其最新位置，最近更新的排在前面。纯读操作，不做缓存。
pub async fn list_active_users(store: &dyn LocationStore) -> Result<Vec<UserView>, AppError> {
    let mut users: Vec<UserView> = store
        .active_users_with_latest()
        .await?
        .into_iter()
        .map(UserView::from)
        .collect();

    // 存储层已经排序，这里再做一次稳定排序保证顺序与实现无关
    users.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
    Ok(users)
}

pub async fn get_user(store: &dyn LocationStore, name: &str) -> Result<UserView, AppError> {
    store
        .active_user_with_latest(name)
        .await?
        .map(UserView::from)
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::operations::MemoryStore;
    use crate::services::ingestion::{LocationSubmission, submit_location};
    use crate::services::registry::{RegisterUser, register_user, deactivate_user};
    use crate::utils::canonical;

    async fn register(store: &MemoryStore, name: &str) {
        register_user(
            store,
            RegisterUser {
                name: name.into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    }

    fn sample(lat: f64, recorded_at: &str) -> LocationSubmission {
        LocationSubmission {
            latitude: lat,
            longitude: 0.0,
            accuracy: None,
            location_name: Some("Somewhere".into()),
            recorded_at: Some(recorded_at.into()),
            sample_id: None,
            last_updated: None,
        }
    }

    #[tokio::test]
    async fn current_location_is_max_recorded_at() {
        let store = MemoryStore::new();
        register(&store, "Bob").await;

        // T1 先到，T2 < T1 后到
        submit_location(&store, "Bob", sample(1.0, "2024-05-01T10:00:00Z"))
            .await
            .unwrap();
        submit_location(&store, "Bob", sample(2.0, "2024-05-01T09:00:00Z"))
            .await
            .unwrap();

        let bob = get_user(&store, "Bob").await.unwrap();
        let location = bob.location.unwrap();
        assert_eq!(location.latitude, 1.0);
        assert_eq!(canonical(&location.timestamp), "2024-05-01T10:00:00.000Z");
        assert_eq!(location.location_name.as_deref(), Some("Somewhere"));
    }

    #[tokio::test]
    async fn user_without_samples_has_null_location() {
        let store = MemoryStore::new();
        register(&store, "Quiet").await;

        let users = list_active_users(&store).await.unwrap();
        assert_eq!(users.len(), 1);
        assert!(users[0].location.is_none());

        let json = serde_json::to_value(&users[0]).unwrap();
        assert!(json["location"].is_null());
        assert_eq!(json["isActive"], true);
        assert_eq!(json["isTracking"], false);
        assert!(json["adminTrackingStarted"].is_null());
    }

    #[tokio::test]
    async fn deactivated_users_are_hidden() {
        let store = MemoryStore::new();
        register(&store, "Gone").await;
        register(&store, "Here").await;
        deactivate_user(&store, "Gone").await.unwrap();

        let names: Vec<String> = list_active_users(&store)
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.name)
            .collect();
        assert_eq!(names, vec!["Here".to_string()]);
        assert!(matches!(
            get_user(&store, "Gone").await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }
}
