use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{ClientError, PendingSample, Sample, SampleSender};

/// 离线队列的持久化存储
#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn load(&self) -> Result<Vec<PendingSample>, ClientError>;
    async fn save(&self, items: &[PendingSample]) -> Result<(), ClientError>;
}

/// JSON 文件存储。先写临时文件再 rename，进程中途退出不会留下半个文件。
pub struct FileQueueStore {
    path: PathBuf,
}

impl FileQueueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl QueueStore for FileQueueStore {
    async fn load(&self) -> Result<Vec<PendingSample>, ClientError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Vec::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, items: &[PendingSample]) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes = serde_json::to_vec_pretty(items)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// 内存存储，可以模拟写失败
#[derive(Default)]
pub struct MemoryQueueStore {
    items: Mutex<Vec<PendingSample>>,
    fail_writes: AtomicBool,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn stored(&self) -> Vec<PendingSample> {
        self.items.lock().await.clone()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn load(&self) -> Result<Vec<PendingSample>, ClientError> {
        Ok(self.items.lock().await.clone())
    }

    async fn save(&self, items: &[PendingSample]) -> Result<(), ClientError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ClientError::Io(std::io::Error::other("simulated write failure")));
        }
        *self.items.lock().await = items.to_vec();
        Ok(())
    }
}

/// 一次同步的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub succeeded: usize,
    pub failed: usize,
}

/// 离线样本队列：内存列表 + 持久化存储，先进先出
pub struct OfflineQueue {
    items: Mutex<Vec<PendingSample>>,
    store: Arc<dyn QueueStore>,
    // 同一时间只允许一次同步
    drain_lock: Mutex<()>,
}

impl OfflineQueue {
    /// 从持久化存储恢复队列。读取失败时从空队列开始。
    pub async fn open(store: Arc<dyn QueueStore>) -> Self {
        let items = match store.load().await {
            Ok(items) => {
                if !items.is_empty() {
                    tracing::info!(
                        "{} cached locations found. Will sync when connection is restored.",
                        items.len()
                    );
                }
                items
            }
            Err(e) => {
                tracing::warn!("Failed to load offline queue, starting empty: {}", e);
                Vec::new()
            }
        };

        Self {
            items: Mutex::new(items),
            store,
            drain_lock: Mutex::new(()),
        }
    }

    async fn persist(&self, items: &[PendingSample]) {
        if let Err(e) = self.store.save(items).await {
            tracing::warn!("Failed to persist offline queue ({} items kept in memory): {}", items.len(), e);
        }
    }

    /// 加入队列。从不失败；同一个 sample_id 只保留一份。
    pub async fn enqueue(&self, sample: Sample) {
        let mut items = self.items.lock().await;
        if items.iter().any(|p| p.sample.sample_id == sample.sample_id) {
            tracing::debug!("Sample {} already queued", sample.sample_id);
            return;
        }

        tracing::debug!("Location cached offline: {}", sample.sample_id);
        items.push(PendingSample {
            sample,
            cached_at: Utc::now(),
        });
        self.persist(&items).await;
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }

    pub async fn snapshot(&self) -> Vec<PendingSample> {
        self.items.lock().await.clone()
    }

    /// 按先进先出顺序逐个发送当前队列。每个样本独立：
    /// 前一个失败不影响后面的尝试，成功的才移出队列。
    /// 同步期间新加入的样本留给下一次同步。
    pub async fn drain(&self, sender: &dyn SampleSender) -> DrainReport {
        let _guard = self.drain_lock.lock().await;
        let batch = self.items.lock().await.clone();
        let mut report = DrainReport::default();
        let mut delivered: HashSet<Uuid> = HashSet::new();

        for pending in &batch {
            match sender.send(&pending.sample).await {
                Ok(()) => {
                    delivered.insert(pending.sample.sample_id);
                    report.succeeded += 1;
                }
                Err(e) if e.is_retryable() => {
                    tracing::debug!("Sample {} not synced, will retry: {}", pending.sample.sample_id, e);
                    report.failed += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        "Sample {} rejected by server, keeping it queued: {}",
                        pending.sample.sample_id,
                        e
                    );
                    report.failed += 1;
                }
            }
        }

        if !delivered.is_empty() {
            let mut items = self.items.lock().await;
            items.retain(|p| !delivered.contains(&p.sample.sample_id));
            self.persist(&items).await;
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn sample(n: u8) -> Sample {
        Sample {
            sample_id: Uuid::new_v4(),
            user_name: "Bob".into(),
            latitude: n as f64,
            longitude: 0.0,
            accuracy: None,
            location_name: None,
            recorded_at: Utc::now(),
        }
    }

    /// 记录发送顺序，指定的纬度返回失败
    #[derive(Default)]
    struct ScriptedSender {
        fail_latitudes: StdMutex<Vec<f64>>,
        attempts: StdMutex<Vec<f64>>,
    }

    impl ScriptedSender {
        fn failing(latitudes: &[f64]) -> Self {
            Self {
                fail_latitudes: StdMutex::new(latitudes.to_vec()),
                attempts: StdMutex::new(Vec::new()),
            }
        }

        fn heal(&self) {
            self.fail_latitudes.lock().unwrap().clear();
        }

        fn attempts(&self) -> Vec<f64> {
            self.attempts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SampleSender for ScriptedSender {
        async fn send(&self, sample: &Sample) -> Result<(), ClientError> {
            self.attempts.lock().unwrap().push(sample.latitude);
            if self.fail_latitudes.lock().unwrap().contains(&sample.latitude) {
                return Err(ClientError::Network("connection reset".into()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn drain_is_fifo_and_independent_per_item() {
        let store = Arc::new(MemoryQueueStore::new());
        let queue = OfflineQueue::open(store.clone()).await;
        for n in 1..=3 {
            queue.enqueue(sample(n)).await;
        }

        let sender = ScriptedSender::failing(&[2.0]);
        let report = queue.drain(&sender).await;
        assert_eq!(report, DrainReport { succeeded: 2, failed: 1 });
        assert_eq!(sender.attempts(), vec![1.0, 2.0, 3.0]);

        let left = queue.snapshot().await;
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].sample.latitude, 2.0);
        assert_eq!(store.stored().await.len(), 1);

        sender.heal();
        let report = queue.drain(&sender).await;
        assert_eq!(report, DrainReport { succeeded: 1, failed: 0 });
        assert!(queue.is_empty().await);
        assert!(store.stored().await.is_empty());
    }

    #[tokio::test]
    async fn non_retryable_failures_stay_queued() {
        struct Rejecting;

        #[async_trait]
        impl SampleSender for Rejecting {
            async fn send(&self, _: &Sample) -> Result<(), ClientError> {
                Err(ClientError::Rejected {
                    status: 404,
                    message: "User not found".into(),
                })
            }
        }

        let queue = OfflineQueue::open(Arc::new(MemoryQueueStore::new())).await;
        queue.enqueue(sample(1)).await;
        let report = queue.drain(&Rejecting).await;
        assert_eq!(report, DrainReport { succeeded: 0, failed: 1 });
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn enqueue_deduplicates_and_survives_store_failures() {
        let store = Arc::new(MemoryQueueStore::new());
        let queue = OfflineQueue::open(store.clone()).await;

        let s = sample(1);
        queue.enqueue(s.clone()).await;
        queue.enqueue(s).await;
        assert_eq!(queue.len().await, 1);

        store.set_fail_writes(true);
        queue.enqueue(sample(2)).await;
        assert_eq!(queue.len().await, 2);
        assert_eq!(store.stored().await.len(), 1);
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let path = std::env::temp_dir()
            .join(format!("geotrack-queue-{}", Uuid::new_v4()))
            .join("pending.json");
        let store = Arc::new(FileQueueStore::new(path.clone()));

        assert!(store.load().await.unwrap().is_empty());

        let queue = OfflineQueue::open(store.clone()).await;
        let first = sample(1);
        queue.enqueue(first.clone()).await;
        queue.enqueue(sample(2)).await;
        drop(queue);

        let reopened = OfflineQueue::open(Arc::new(FileQueueStore::new(path.clone()))).await;
        let items = reopened.snapshot().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].sample, first);

        if let Some(dir) = path.parent() {
            let _ = tokio::fs::remove_dir_all(dir).await;
        }
    }

    #[tokio::test]
    async fn corrupt_file_starts_empty() {
        let dir = std::env::temp_dir().join(format!("geotrack-queue-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("pending.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let queue = OfflineQueue::open(Arc::new(FileQueueStore::new(path))).await;
        assert!(queue.is_empty().await);

        let _ = tokio::fs::remove_dir_all(dir).await;
    }
}
