// 客户端离线缓存 + 服务端按 sampleId 去重，端到端验证每个样本只落库一次

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use geotrack::client::{
    ClientConfig, ClientError, ConnectivityMonitor, GeolocationError, GeolocationProvider,
    MemoryQueueStore, OfflineQueue, Position, Sample, SampleSender, StatusBoard, TickOutcome,
    Tracker, TrackerDeps, TrackingMode,
};
use geotrack::database::LocationStore;
use geotrack::database::operations::MemoryStore;
use geotrack::error::AppError;
use geotrack::geocode::ReverseGeocoder;
use geotrack::services::{self, LocationSubmission, RegisterUser};
use geotrack::utils::canonical;

/// 直接调用服务层的发送端。`lose_next_response` 为真时，
/// 样本照常落库但向客户端报告网络错误，模拟响应在路上丢失。
struct InProcessSender {
    store: Arc<MemoryStore>,
    lose_next_response: AtomicBool,
    calls: AtomicUsize,
}

#[async_trait]
impl SampleSender for InProcessSender {
    async fn send(&self, sample: &Sample) -> Result<(), ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let submission = LocationSubmission {
            latitude: sample.latitude,
            longitude: sample.longitude,
            accuracy: sample.accuracy,
            location_name: sample.location_name.clone(),
            recorded_at: Some(canonical(&sample.recorded_at)),
            sample_id: Some(sample.sample_id),
            last_updated: None,
        };

        services::submit_location(self.store.as_ref(), &sample.user_name, submission)
            .await
            .map_err(|e: AppError| ClientError::Rejected {
                status: e.status().as_u16(),
                message: e.to_string(),
            })?;

        if self.lose_next_response.swap(false, Ordering::SeqCst) {
            return Err(ClientError::Network("connection reset after upload".into()));
        }
        Ok(())
    }
}

struct StepGps {
    step: AtomicUsize,
}

#[async_trait]
impl GeolocationProvider for StepGps {
    async fn current_position(&self) -> Result<Position, GeolocationError> {
        let n = self.step.fetch_add(1, Ordering::SeqCst) as f64;
        Ok(Position {
            latitude: 40.0 + n / 100.0,
            longitude: -74.0,
            accuracy: Some(5.0),
            timestamp: Utc::now(),
        })
    }
}

struct NamedPlace;

#[async_trait]
impl ReverseGeocoder for NamedPlace {
    async fn reverse(&self, _: f64, _: f64) -> Result<String, AppError> {
        Ok("Lower Manhattan".into())
    }
}

struct World {
    store: Arc<MemoryStore>,
    sender: Arc<InProcessSender>,
    queue: Arc<OfflineQueue>,
    monitor: ConnectivityMonitor,
    tracker: Tracker,
}

async fn world(initially_online: bool) -> World {
    let store = Arc::new(MemoryStore::new());
    services::register_user(
        store.as_ref(),
        RegisterUser {
            name: "Bob".into(),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let sender = Arc::new(InProcessSender {
        store: store.clone(),
        lose_next_response: AtomicBool::new(false),
        calls: AtomicUsize::new(0),
    });
    let queue = Arc::new(OfflineQueue::open(Arc::new(MemoryQueueStore::new())).await);
    let status = StatusBoard::new();
    let monitor = ConnectivityMonitor::spawn(
        initially_online,
        Duration::from_secs(2),
        queue.clone(),
        sender.clone(),
        status.clone(),
    );

    let config = ClientConfig {
        snapshot_path: None,
        ..ClientConfig::default()
    };
    let deps = TrackerDeps {
        geolocation: Arc::new(StepGps {
            step: AtomicUsize::new(0),
        }),
        geocoder: Arc::new(NamedPlace),
        sender: sender.clone(),
        queue: queue.clone(),
        online: monitor.subscribe(),
        status,
    };

    World {
        store,
        sender,
        queue,
        monitor,
        tracker: Tracker::new("Bob", config, deps),
    }
}

#[tokio::test(start_paused = true)]
async fn lost_response_is_retried_without_duplicating() {
    let w = world(true).await;
    w.sender.lose_next_response.store(true, Ordering::SeqCst);

    let outcome = w.tracker.sample_once().await;
    assert!(matches!(outcome, TickOutcome::Queued(_)));
    assert_eq!(w.queue.len().await, 1);
    assert_eq!(w.store.count_locations("Bob").await.unwrap(), 1);

    let report = w.monitor.sync_now().await;
    assert_eq!(report.succeeded, 1);
    assert_eq!(w.sender.calls.load(Ordering::SeqCst), 2);
    assert!(w.queue.is_empty().await);
    assert_eq!(w.store.count_locations("Bob").await.unwrap(), 1);

    let bob = services::get_user(w.store.as_ref(), "Bob").await.unwrap();
    let location = bob.location.unwrap();
    assert_eq!(location.latitude, 40.0);
    assert_eq!(location.location_name.as_deref(), Some("Lower Manhattan"));
}

#[tokio::test(start_paused = true)]
async fn offline_samples_sync_after_reconnect() {
    let w = world(false).await;

    w.tracker.start(TrackingMode::Foreground).await;
    tokio::time::sleep(Duration::from_millis(6500)).await;
    w.tracker.stop().await;

    assert_eq!(w.queue.len().await, 3);
    assert_eq!(w.store.count_locations("Bob").await.unwrap(), 0);

    w.monitor.set_online(true);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(w.queue.len().await, 3);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(w.queue.is_empty().await);
    assert_eq!(w.store.count_locations("Bob").await.unwrap(), 3);
    assert_eq!(w.sender.calls.load(Ordering::SeqCst), 3);

    let users = services::list_active_users(w.store.as_ref()).await.unwrap();
    assert_eq!(users.len(), 1);
    assert!(users[0].location.is_some());
}

#[tokio::test]
async fn rejected_samples_are_not_queued() {
    let w = world(true).await;
    services::deactivate_user(w.store.as_ref(), "Bob").await.unwrap();

    let outcome = w.tracker.sample_once().await;
    assert!(matches!(outcome, TickOutcome::Rejected(_)));
    assert!(w.queue.is_empty().await);
}
