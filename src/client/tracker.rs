use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use super::{ClientConfig, ClientError, OfflineQueue, Sample, SampleSender, StatusBoard, StatusKind};
use crate::geocode::{ReverseGeocoder, resolve_or_placeholder};
use crate::utils::{is_valid_coordinate, truncate_to_millis};

/// 一次定位结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeolocationError {
    #[error("Location access denied. Please allow location access and try again.")]
    PermissionDenied,
    #[error("Location information is unavailable. Please try again.")]
    Unavailable,
    #[error("Location request timed out. Please try again.")]
    Timeout,
    #[error("{0}")]
    Other(String),
}

/// 设备定位能力
#[async_trait]
pub trait GeolocationProvider: Send + Sync {
    async fn current_position(&self) -> Result<Position, GeolocationError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingMode {
    /// 页面可见，每3秒采样
    Foreground,
    /// 页面不可见时的降级模式，每30秒采样
    Background,
}

impl TrackingMode {
    pub fn period(self, config: &ClientConfig) -> Duration {
        match self {
            TrackingMode::Foreground => config.foreground_period,
            TrackingMode::Background => config.background_period,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingState {
    Idle,
    Tracking {
        mode: TrackingMode,
        started_at: DateTime<Utc>,
    },
}

/// 重启后恢复追踪用的会话快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub user_name: String,
    pub mode: TrackingMode,
    pub started_at: DateTime<Utc>,
}

/// 可取消的定时任务。第一次立即触发，之后每个周期触发一次。
///
/// 每次触发都在独立的任务里执行，所以取消只会停止后续触发，
/// 已经开始的那次会继续跑完。
pub struct PeriodicTask {
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    pub fn spawn<F, Fut>(period: Duration, tick: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                tokio::spawn(tick());
            }
        });

        Self { handle }
    }

    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// 单次采样的结果
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Sent(Sample),
    /// 离线或可重试的失败，已放入离线队列
    Queued(Sample),
    /// 服务端拒绝（4xx），不会重试
    Rejected(Sample),
    NoFix(GeolocationError),
}

/// 追踪器依赖的外部组件
#[derive(Clone)]
pub struct TrackerDeps {
    pub geolocation: Arc<dyn GeolocationProvider>,
    pub geocoder: Arc<dyn ReverseGeocoder>,
    pub sender: Arc<dyn SampleSender>,
    pub queue: Arc<OfflineQueue>,
    /// 来自 `ConnectivityMonitor::subscribe`
    pub online: watch::Receiver<bool>,
    pub status: StatusBoard,
}

struct Sampler {
    user_name: String,
    fix_timeout: Duration,
    deps: TrackerDeps,
}

impl Sampler {
    async fn sample_once(&self) -> TickOutcome {
        let status = &self.deps.status;
        status.post(StatusKind::Info, "Getting your location...");

        let position = match tokio::time::timeout(
            self.fix_timeout,
            self.deps.geolocation.current_position(),
        )
        .await
        {
            Ok(Ok(position)) => position,
            Ok(Err(e)) => {
                status.post(StatusKind::Error, e.to_string());
                return TickOutcome::NoFix(e);
            }
            Err(_) => {
                let e = GeolocationError::Timeout;
                status.post(StatusKind::Error, e.to_string());
                return TickOutcome::NoFix(e);
            }
        };

        if !is_valid_coordinate(position.latitude, position.longitude) {
            let e = GeolocationError::Other(format!(
                "Received invalid coordinates ({}, {})",
                position.latitude, position.longitude
            ));
            status.post(StatusKind::Error, e.to_string());
            return TickOutcome::NoFix(e);
        }

        let location_name = resolve_or_placeholder(
            self.deps.geocoder.as_ref(),
            position.latitude,
            position.longitude,
        )
        .await;

        let sample = Sample {
            sample_id: Uuid::new_v4(),
            user_name: self.user_name.clone(),
            latitude: position.latitude,
            longitude: position.longitude,
            accuracy: position.accuracy,
            location_name: Some(location_name),
            recorded_at: truncate_to_millis(position.timestamp),
        };

        let online = *self.deps.online.borrow();
        if !online {
            self.deps.queue.enqueue(sample.clone()).await;
            status.post(
                StatusKind::Warning,
                "Location cached offline. Will sync when connection is restored.",
            );
            return TickOutcome::Queued(sample);
        }

        match self.deps.sender.send(&sample).await {
            Ok(()) => {
                status.post(StatusKind::Success, "Location updated successfully!");
                TickOutcome::Sent(sample)
            }
            Err(e) if e.is_retryable() => {
                self.deps.queue.enqueue(sample.clone()).await;
                status.post(
                    StatusKind::Warning,
                    format!("Could not reach server, location cached for retry ({})", e),
                );
                TickOutcome::Queued(sample)
            }
            Err(e) => {
                status.post(
                    StatusKind::Error,
                    format!("Location rejected by server: {}", e),
                );
                TickOutcome::Rejected(sample)
            }
        }
    }
}

struct Session {
    state: TrackingState,
    timer: Option<PeriodicTask>,
}

/// 客户端追踪会话：Idle -> Tracking -> Idle。
///
/// 每个周期采样一次；采样之间互不等待，慢的定位或网络请求不会推迟下一次触发。
pub struct Tracker {
    sampler: Arc<Sampler>,
    config: ClientConfig,
    session: Mutex<Session>,
}

impl Tracker {
    pub fn new(user_name: impl Into<String>, config: ClientConfig, deps: TrackerDeps) -> Self {
        let sampler = Arc::new(Sampler {
            user_name: user_name.into(),
            fix_timeout: config.fix_timeout,
            deps,
        });

        Self {
            sampler,
            config,
            session: Mutex::new(Session {
                state: TrackingState::Idle,
                timer: None,
            }),
        }
    }

    pub fn user_name(&self) -> &str {
        &self.sampler.user_name
    }

    pub fn state(&self) -> TrackingState {
        self.lock_session().state
    }

    pub fn status(&self) -> &StatusBoard {
        &self.sampler.deps.status
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, Session> {
        // 会话锁内没有会 panic 的代码，中毒时直接取回数据
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn spawn_timer(&self, mode: TrackingMode) -> PeriodicTask {
        let sampler = self.sampler.clone();
        PeriodicTask::spawn(mode.period(&self.config), move || {
            let sampler = sampler.clone();
            async move {
                let outcome = sampler.sample_once().await;
                tracing::debug!("Tracking tick for {}: {:?}", sampler.user_name, outcome);
            }
        })
    }

    fn begin(&self, mode: TrackingMode, started_at: DateTime<Utc>) -> bool {
        let mut session = self.lock_session();
        if let TrackingState::Tracking { mode: current, .. } = session.state {
            if current == mode {
                return false;
            }
        }

        // 先停掉旧的定时器再启动新的
        session.timer.take();
        session.timer = Some(self.spawn_timer(mode));
        session.state = TrackingState::Tracking { mode, started_at };
        true
    }

    /// 开始追踪。已经在同一模式下追踪时不做任何事。
    pub async fn start(&self, mode: TrackingMode) {
        if !self.begin(mode, truncate_to_millis(Utc::now())) {
            return;
        }

        let message = match mode {
            TrackingMode::Foreground => format!(
                "Live tracking started! Updating every {} seconds...",
                self.config.foreground_period.as_secs()
            ),
            TrackingMode::Background => format!(
                "Background tracking active. Updating every {} seconds...",
                self.config.background_period.as_secs()
            ),
        };
        self.status().post(StatusKind::Info, message);
        self.save_snapshot().await;
    }

    /// 切换前台/后台模式，保留原来的开始时间。空闲时不做任何事。
    pub async fn set_mode(&self, mode: TrackingMode) {
        let started_at = match self.state() {
            TrackingState::Tracking { started_at, .. } => started_at,
            TrackingState::Idle => return,
        };
        if self.begin(mode, started_at) {
            tracing::info!("Tracking mode for {} switched to {:?}", self.user_name(), mode);
            self.save_snapshot().await;
        }
    }

    /// 停止追踪。正在进行的采样会继续完成。
    pub async fn stop(&self) {
        let timer = {
            let mut session = self.lock_session();
            if session.state == TrackingState::Idle {
                return;
            }
            session.state = TrackingState::Idle;
            session.timer.take()
        };
        if let Some(timer) = timer {
            timer.cancel();
        }

        self.status().post(StatusKind::Info, "Live tracking stopped.");
        self.clear_snapshot().await;
    }

    /// 立即采样一次（不影响定时器）
    pub async fn sample_once(&self) -> TickOutcome {
        self.sampler.sample_once().await
    }

    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        match self.state() {
            TrackingState::Tracking { mode, started_at } => Some(SessionSnapshot {
                user_name: self.user_name().to_string(),
                mode,
                started_at,
            }),
            TrackingState::Idle => None,
        }
    }

    async fn save_snapshot(&self) {
        let (Some(path), Some(snapshot)) = (self.config.snapshot_path.as_ref(), self.snapshot())
        else {
            return;
        };
        if let Err(e) = write_snapshot(path, &snapshot).await {
            tracing::warn!("Failed to save tracking session: {}", e);
        }
    }

    async fn clear_snapshot(&self) {
        let Some(path) = self.config.snapshot_path.as_ref() else {
            return;
        };
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to clear tracking session: {}", e),
        }
    }

    /// 如果有属于当前用户的快照，按快照恢复追踪。返回是否恢复。
    pub async fn resume(&self) -> Result<bool, ClientError> {
        let Some(path) = self.config.snapshot_path.as_ref() else {
            return Ok(false);
        };
        let Some(snapshot) = read_snapshot(path).await? else {
            return Ok(false);
        };
        if snapshot.user_name != self.user_name() {
            tracing::info!(
                "Ignoring tracking session for {} (current user {})",
                snapshot.user_name,
                self.user_name()
            );
            return Ok(false);
        }

        if self.begin(snapshot.mode, snapshot.started_at) {
            self.status().post(
                StatusKind::Info,
                format!("Resumed tracking started at {}", snapshot.started_at),
            );
        }
        Ok(true)
    }
}

async fn write_snapshot(path: &Path, snapshot: &SessionSnapshot) -> Result<(), ClientError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, serde_json::to_vec(snapshot)?).await?;
    Ok(())
}

async fn read_snapshot(path: &Path) -> Result<Option<SessionSnapshot>, ClientError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
