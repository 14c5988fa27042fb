use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use super::{DrainReport, OfflineQueue, SampleSender, StatusBoard, StatusKind};

/// 同步一次离线队列并发布状态
pub(crate) async fn sync_queue(
    queue: &OfflineQueue,
    sender: &dyn SampleSender,
    status: &StatusBoard,
) -> DrainReport {
    let pending = queue.len().await;
    if pending == 0 {
        return DrainReport::default();
    }

    status.post(
        StatusKind::Info,
        format!("Syncing {} cached locations...", pending),
    );
    let report = queue.drain(sender).await;

    if report.succeeded > 0 {
        status.post(
            StatusKind::Success,
            format!("Synced {} locations successfully!", report.succeeded),
        );
    }
    if report.failed > 0 {
        status.post(
            StatusKind::Warning,
            format!(
                "{} locations failed to sync and will be retried later.",
                report.failed
            ),
        );
    }

    report
}

/// 网络状态监视器。离线 -> 在线后等待一段稳定时间再同步队列，
/// 等待期间网络再次抖动会重新计时。
pub struct ConnectivityMonitor {
    online: watch::Sender<bool>,
    queue: Arc<OfflineQueue>,
    sender: Arc<dyn SampleSender>,
    status: StatusBoard,
    last_report: Arc<Mutex<Option<DrainReport>>>,
    task: JoinHandle<()>,
}

impl ConnectivityMonitor {
    pub fn spawn(
        initially_online: bool,
        stabilization: Duration,
        queue: Arc<OfflineQueue>,
        sender: Arc<dyn SampleSender>,
        status: StatusBoard,
    ) -> Self {
        let (online, rx) = watch::channel(initially_online);
        let last_report = Arc::new(Mutex::new(None));

        let task = tokio::spawn(watch_connectivity(
            rx,
            stabilization,
            queue.clone(),
            sender.clone(),
            status.clone(),
            last_report.clone(),
        ));

        Self {
            online,
            queue,
            sender,
            status,
            last_report,
            task,
        }
    }

    /// 上报当前网络状态，状态没变时不触发任何动作
    pub fn set_online(&self, online: bool) {
        self.online.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
    }

    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.online.subscribe()
    }

    /// 手动同步，不等待稳定时间
    pub async fn sync_now(&self) -> DrainReport {
        let report = sync_queue(&self.queue, self.sender.as_ref(), &self.status).await;
        *self.last_report.lock().await = Some(report);
        report
    }

    pub async fn last_report(&self) -> Option<DrainReport> {
        *self.last_report.lock().await
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn watch_connectivity(
    mut rx: watch::Receiver<bool>,
    stabilization: Duration,
    queue: Arc<OfflineQueue>,
    sender: Arc<dyn SampleSender>,
    status: StatusBoard,
    last_report: Arc<Mutex<Option<DrainReport>>>,
) {
    'transitions: loop {
        if rx.changed().await.is_err() {
            return;
        }
        if !*rx.borrow_and_update() {
            status.post(
                StatusKind::Warning,
                "Connection lost. Locations will be cached offline.",
            );
            continue;
        }

        status.post(
            StatusKind::Success,
            "Connection restored! Syncing cached locations...",
        );

        // 稳定期：期间再次断网则放弃本次同步，再次上线则重新计时
        loop {
            tokio::select! {
                _ = tokio::time::sleep(stabilization) => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    if !*rx.borrow_and_update() {
                        status.post(
                            StatusKind::Warning,
                            "Connection lost. Locations will be cached offline.",
                        );
                        continue 'transitions;
                    }
                }
            }
        }

        let report = sync_queue(&queue, sender.as_ref(), &status).await;
        tracing::debug!(
            "Connectivity sync finished: {} ok, {} failed",
            report.succeeded,
            report.failed
        );
        *last_report.lock().await = Some(report);
    }
}
