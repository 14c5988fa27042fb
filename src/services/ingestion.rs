use uuid::Uuid;

use crate::database::{LocationRecord, LocationStore, NewLocation, UserRecord};
use crate::error::AppError;
use crate::utils::{is_valid_coordinate, normalize_timestamp};

/// 一次位置提交（已从请求体中拆出）
#[derive(Debug, Clone)]
pub struct LocationSubmission {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub location_name: Option<String>,
    /// 客户端采集时间，原样传入，在这里规范化
    pub recorded_at: Option<String>,
    pub sample_id: Option<Uuid>,
    pub last_updated: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Ingested {
    pub user: UserRecord,
    pub location: LocationRecord,
}

/// 校验、规范化并持久化一个位置样本。
///
/// 先追加位置记录，再更新用户的 `last_updated`。两个写操作各自原子，
/// 当前位置在读取时按 `recorded_at` 最大值计算，所以乱序或重放都不会破坏它。
pub async fn submit_location(
    store: &dyn LocationStore,
    user_name: &str,
    sample: LocationSubmission,
) -> Result<Ingested, AppError> {
    let user_name = user_name.trim();
    if user_name.is_empty() {
        return Err(AppError::Validation("Name and location are required".into()));
    }

    if !is_valid_coordinate(sample.latitude, sample.longitude) {
        tracing::warn!(
            "Rejected out-of-range coordinates for {}: {}, {}",
            user_name,
            sample.latitude,
            sample.longitude
        );
        return Err(AppError::Validation(
            "Latitude must be within [-90, 90] and longitude within [-180, 180]".into(),
        ));
    }

    if let Some(accuracy) = sample.accuracy {
        if !accuracy.is_finite() || accuracy < 0.0 {
            return Err(AppError::Validation(
                "Accuracy must be a non-negative number".into(),
            ));
        }
    }

    if store.find_active_user(user_name).await?.is_none() {
        tracing::warn!("Location submitted for unknown user {}", user_name);
        return Err(AppError::NotFound(format!("User {} not found", user_name)));
    }

    let location_name = sample
        .location_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());

    let location = store
        .insert_location(NewLocation {
            user_name: user_name.to_string(),
            sample_id: sample.sample_id,
            latitude: sample.latitude,
            longitude: sample.longitude,
            accuracy: sample.accuracy,
            location_name,
            recorded_at: normalize_timestamp(sample.recorded_at.as_deref()),
        })
        .await?;

    // 用户可能在两次写之间被停用
    let user = store
        .touch_user(user_name, normalize_timestamp(sample.last_updated.as_deref()))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_name)))?;

    tracing::info!(
        "User location updated: {} -> {},{}",
        user_name,
        location.latitude,
        location.longitude
    );

    Ok(Ingested { user, location })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::operations::MemoryStore;
    use crate::services::registry::{RegisterUser, register_user};
    use crate::utils::canonical;
    use chrono::Utc;

    fn at(lat: f64, lng: f64, recorded_at: &str) -> LocationSubmission {
        LocationSubmission {
            latitude: lat,
            longitude: lng,
            accuracy: Some(15.0),
            location_name: None,
            recorded_at: Some(recorded_at.into()),
            sample_id: None,
            last_updated: None,
        }
    }

    async fn store_with(name: &str) -> MemoryStore {
        let store = MemoryStore::new();
        register_user(
            &store,
            RegisterUser {
                name: name.into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        store
    }

    #[tokio::test]
    async fn bad_date_falls_back_to_now() {
        let store = store_with("Carol").await;
        let before = Utc::now() - chrono::Duration::seconds(1);

        let ingested = submit_location(&store, "Carol", at(40.7128, -74.0060, "bad-date"))
            .await
            .unwrap();

        assert!(ingested.location.recorded_at >= before);
        assert!(ingested.user.last_updated >= before);
        assert_eq!(ingested.location.accuracy, Some(15.0));
    }

    #[tokio::test]
    async fn recorded_at_is_stored_canonical() {
        let store = store_with("Bob").await;
        let ingested = submit_location(&store, "Bob", at(1.0, 2.0, "2024-05-01T12:00:00+02:00"))
            .await
            .unwrap();
        assert_eq!(
            canonical(&ingested.location.recorded_at),
            "2024-05-01T10:00:00.000Z"
        );
    }

    #[tokio::test]
    async fn out_of_range_is_rejected_not_clamped() {
        let store = store_with("Bob").await;
        for (lat, lng) in [(91.0, 0.0), (0.0, 181.0), (f64::NAN, 0.0)] {
            let err = submit_location(&store, "Bob", at(lat, lng, "2024-05-01T10:00:00Z"))
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }
        assert_eq!(store.count_locations("Bob").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn negative_accuracy_is_rejected() {
        let store = store_with("Bob").await;
        let mut sample = at(1.0, 2.0, "2024-05-01T10:00:00Z");
        sample.accuracy = Some(-1.0);
        let err = submit_location(&store, "Bob", sample).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let store = MemoryStore::new();
        let err = submit_location(&store, "nobody", at(1.0, 2.0, "2024-05-01T10:00:00Z"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(store.count_locations("nobody").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn blank_name_is_rejected() {
        let store = MemoryStore::new();
        let err = submit_location(&store, " ", at(1.0, 2.0, "2024-05-01T10:00:00Z"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn sample_id_replay_is_deduplicated() {
        let store = store_with("Bob").await;
        let mut sample = at(1.0, 2.0, "2024-05-01T10:00:00Z");
        sample.sample_id = Some(Uuid::new_v4());

        let first = submit_location(&store, "Bob", sample.clone()).await.unwrap();
        let second = submit_location(&store, "Bob", sample).await.unwrap();

        assert_eq!(first.location.id, second.location.id);
        assert_eq!(store.count_locations("Bob").await.unwrap(), 1);
    }
}
