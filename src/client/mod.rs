// 追踪客户端：定时采样、离线队列、联网后自动同步

pub mod api;
pub mod connectivity;
pub mod queue;
pub mod tracker;

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

pub use api::ApiClient;
pub use connectivity::ConnectivityMonitor;
pub use queue::{DrainReport, FileQueueStore, MemoryQueueStore, OfflineQueue, QueueStore};
pub use tracker::{
    GeolocationError, GeolocationProvider, PeriodicTask, Position, SessionSnapshot, TickOutcome,
    Tracker, TrackerDeps, TrackingMode, TrackingState,
};

/// 客户端配置
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// 包含 API 前缀，例如 `http://localhost:5000/api`
    pub server_url: String,
    pub queue_path: PathBuf,
    /// 为 `None` 时不保存会话快照
    pub snapshot_path: Option<PathBuf>,
    pub foreground_period: Duration,
    pub background_period: Duration,
    pub fix_timeout: Duration,
    /// 恢复联网后等待多久再同步
    pub sync_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:5000/api".into(),
            queue_path: PathBuf::from("pending_locations.json"),
            snapshot_path: Some(PathBuf::from("tracking_session.json")),
            foreground_period: Duration::from_secs(3),
            background_period: Duration::from_secs(30),
            fix_timeout: Duration::from_secs(10),
            sync_delay: Duration::from_secs(2),
            request_timeout: Duration::from_secs(10),
        }
    }
}

fn env_secs(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

impl ClientConfig {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let defaults = Self::default();

        Self {
            server_url: env::var("GEOTRACK_SERVER_URL").unwrap_or(defaults.server_url),
            queue_path: env::var("GEOTRACK_QUEUE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.queue_path),
            snapshot_path: env::var("GEOTRACK_SNAPSHOT_PATH")
                .map(PathBuf::from)
                .ok()
                .or(defaults.snapshot_path),
            foreground_period: env_secs("GEOTRACK_FOREGROUND_SECS", defaults.foreground_period),
            background_period: env_secs("GEOTRACK_BACKGROUND_SECS", defaults.background_period),
            fix_timeout: env_secs("GEOTRACK_FIX_TIMEOUT_SECS", defaults.fix_timeout),
            sync_delay: env_secs("GEOTRACK_SYNC_DELAY_SECS", defaults.sync_delay),
            request_timeout: env_secs("GEOTRACK_REQUEST_TIMEOUT_SECS", defaults.request_timeout),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(String),
    #[error("server rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("invalid server url: {0}")]
    InvalidUrl(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl ClientError {
    /// 网络错误和 5xx 可以重试；4xx 是终态
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Network(_) => true,
            ClientError::Rejected { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => ClientError::Rejected {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => ClientError::Network(err.to_string()),
        }
    }
}

/// 一个待上报的位置样本。`sample_id` 在采集时生成，重试时保持不变。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub sample_id: Uuid,
    pub user_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub location_name: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// 离线队列中的样本
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSample {
    #[serde(flatten)]
    pub sample: Sample,
    pub cached_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Info,
    Success,
    Warning,
    Error,
}

/// 给用户看的简短状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub kind: StatusKind,
    pub message: String,
}

/// 最新状态消息的广播板，同时写日志
#[derive(Clone)]
pub struct StatusBoard {
    tx: Arc<watch::Sender<Option<StatusMessage>>>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBoard {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn post(&self, kind: StatusKind, message: impl Into<String>) {
        let message = message.into();
        match kind {
            StatusKind::Info | StatusKind::Success => tracing::info!("{}", message),
            StatusKind::Warning => tracing::warn!("{}", message),
            StatusKind::Error => tracing::error!("{}", message),
        }
        self.tx.send_replace(Some(StatusMessage { kind, message }));
    }

    pub fn current(&self) -> Option<StatusMessage> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<StatusMessage>> {
        self.tx.subscribe()
    }
}

/// 把样本送到服务端
#[async_trait]
pub trait SampleSender: Send + Sync {
    async fn send(&self, sample: &Sample) -> Result<(), ClientError>;
}
