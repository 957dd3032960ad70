//! # 实时预览模块
//!
//! ## 设计思路
//!
//! 预览涉及两类需要显式释放的资源：
//! - **预览句柄**：每次重算都会生成新的预览对象，旧句柄必须在被替换时释放。
//!   `ObjectUrl` 采用 RAII：`Drop` 时自动从 `ObjectUrlRegistry` 撤销。
//! - **防抖定时器**：`LatestTaskSlot` 是单槽“最新待执行任务”，
//!   新事件到来时原子替换并中止旧任务；槽被销毁时中止仍在等待的任务。
//!
//! ## 状态机
//!
//! ```text
//! Idle ──事件──▶ Pending(timer) ──静默期结束──▶ Recomputing ──▶ Idle
//!                   ▲    │
//!                   └────┘ 新事件：中止旧 timer，重新计时
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;

use super::source::EncodedImage;
use super::ImageError;

const OBJECT_URL_PREFIX: &str = "blob:motorent/";

#[derive(Default)]
struct UrlTable {
    next_id: u64,
    live: HashMap<String, Arc<EncodedImage>>,
}

/// 预览对象地址表，对应浏览器的 `URL.createObjectURL` / `revokeObjectURL`。
#[derive(Clone, Default)]
pub struct ObjectUrlRegistry {
    table: Arc<Mutex<UrlTable>>,
}

impl ObjectUrlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, UrlTable> {
        match self.table.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("预览地址表锁中毒，继续使用恢复数据");
                poisoned.into_inner()
            }
        }
    }

    /// 登记一张图片并返回持有其生命周期的句柄。
    pub fn create(&self, image: EncodedImage) -> ObjectUrl {
        let mut table = self.lock();
        table.next_id += 1;
        let url = format!("{}{}", OBJECT_URL_PREFIX, table.next_id);
        table.live.insert(url.clone(), Arc::new(image));

        ObjectUrl {
            url,
            registry: self.clone(),
        }
    }

    /// 按地址取回图片；已撤销的地址返回 `None`。
    pub fn resolve(&self, url: &str) -> Option<Arc<EncodedImage>> {
        self.lock().live.get(url).cloned()
    }

    /// 当前仍存活的句柄数量。
    pub fn live_count(&self) -> usize {
        self.lock().live.len()
    }

    fn revoke(&self, url: &str) {
        if self.lock().live.remove(url).is_some() {
            log::debug!("🧹 已释放预览地址：{}", url);
        }
    }
}

/// 预览句柄，离开作用域即撤销。
pub struct ObjectUrl {
    url: String,
    registry: ObjectUrlRegistry,
}

impl ObjectUrl {
    pub fn as_str(&self) -> &str {
        &self.url
    }

    pub fn image(&self) -> Option<Arc<EncodedImage>> {
        self.registry.resolve(&self.url)
    }
}

impl std::fmt::Debug for ObjectUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ObjectUrl").field(&self.url).finish()
    }
}

impl Drop for ObjectUrl {
    fn drop(&mut self) {
        self.registry.revoke(&self.url);
    }
}

/// 单槽防抖任务。
///
/// 任意时刻最多持有一个已调度的任务；`schedule` 会中止上一个任务
/// （无论它还在等待还是已经开始重算），只有静默期后的最后一次调度真正执行。
pub struct LatestTaskSlot {
    delay: Duration,
    slot: Mutex<Option<JoinHandle<()>>>,
}

impl LatestTaskSlot {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            slot: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("防抖任务槽锁中毒，继续使用恢复数据");
                poisoned.into_inner()
            }
        }
    }

    /// 延迟 `delay` 后执行 `task`，替换掉槽中尚未完成的旧任务。
    ///
    /// 必须在 tokio 运行时内调用。
    pub fn schedule<F>(&self, task: F) -> Result<(), ImageError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ImageError::ResourceLimit(format!("缺少 tokio 运行时：{}", e)))?;

        let delay = self.delay;
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });

        if let Some(previous) = self.lock().replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    /// 中止槽中的任务（若有）。
    pub fn cancel(&self) {
        if let Some(handle) = self.lock().take() {
            handle.abort();
        }
    }

    /// 是否仍有未完成的任务。
    pub fn is_pending(&self) -> bool {
        self.lock().as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for LatestTaskSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn encoded(tag: &str) -> EncodedImage {
        EncodedImage {
            bytes: Bytes::from(tag.as_bytes().to_vec()),
            file_name: format!("{tag}.jpg"),
            mime: "image/jpeg",
            width: 1,
            height: 1,
        }
    }

    #[test]
    fn object_url_is_revoked_on_drop() {
        let registry = ObjectUrlRegistry::new();
        let first = registry.create(encoded("a"));
        let second = registry.create(encoded("b"));
        assert_ne!(first.as_str(), second.as_str());
        assert_eq!(registry.live_count(), 2);

        let url = first.as_str().to_string();
        drop(first);
        assert_eq!(registry.live_count(), 1);
        assert!(registry.resolve(&url).is_none());
        assert_eq!(second.image().map(|img| img.file_name.clone()), Some("b.jpg".to_string()));
    }

    #[test]
    fn schedule_outside_runtime_fails() {
        let slot = LatestTaskSlot::new(Duration::from_millis(10));
        assert!(matches!(slot.schedule(async {}), Err(ImageError::ResourceLimit(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn burst_runs_only_last_task() {
        let slot = LatestTaskSlot::new(Duration::from_millis(300));
        let runs = Arc::new(AtomicUsize::new(0));
        let last = Arc::new(AtomicUsize::new(0));

        for i in 1..=5 {
            let runs = Arc::clone(&runs);
            let last = Arc::clone(&last);
            slot.schedule(async move {
                runs.fetch_add(1, Ordering::SeqCst);
                last.store(i, Ordering::SeqCst);
            })
            .expect("schedule should succeed");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(last.load(Ordering::SeqCst), 5);
        assert!(!slot.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn separate_quiet_windows_each_run_once() {
        let slot = LatestTaskSlot::new(Duration::from_millis(300));
        let runs = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            for _ in 0..4 {
                let runs = Arc::clone(&runs);
                slot.schedule(async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                })
                .expect("schedule should succeed");
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_slot_cancels_pending_task() {
        let runs = Arc::new(AtomicUsize::new(0));
        {
            let slot = LatestTaskSlot::new(Duration::from_millis(300));
            let runs = Arc::clone(&runs);
            slot.schedule(async move {
                runs.fetch_add(1, Ordering::SeqCst);
            })
            .expect("schedule should succeed");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
