//! # 孤儿图片追踪模块
//!
//! ## 设计思路
//!
//! 每次上传成功都把存储路径登记到持久化列表 `temp_uploaded_images`。
//! 表单保存后调用 `cleanup(existing)`：列表中不再被任何记录引用的路径
//! 视为孤儿，逐个发起删除。删除是尽力而为的，失败只记日志、不重试。
//!
//! ## 列表处理策略
//!
//! - `ClearAll`（默认）：清理结束后整表清空，删除失败的路径随之遗失。
//! - `RetainFailed`：只移除已删除和仍被引用的路径，删除失败的留待下次。
//!
//! 同一进程内的读改写由互斥锁串行化；跨进程仍是后写覆盖。

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;

use super::ImageError;
use super::upload::ImageEndpoint;
use crate::store::KeyValueStore;

/// 持久化存储中的键名。
pub const PENDING_UPLOADS_KEY: &str = "temp_uploaded_images";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupPolicy {
    #[default]
    ClearAll,
    RetainFailed,
}

/// 一次清理的结果。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// 删除成功的孤儿路径。
    pub deleted: Vec<String>,
    /// 删除失败的孤儿路径。
    pub failed: Vec<String>,
    /// 仍被引用、无需删除的路径。
    pub kept: Vec<String>,
}

/// 待确认上传列表。
pub struct PendingUploads<S> {
    store: S,
    lock: Mutex<()>,
    policy: CleanupPolicy,
}

impl<S: KeyValueStore> PendingUploads<S> {
    pub fn new(store: S, policy: CleanupPolicy) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
            policy,
        }
    }

    pub fn policy(&self) -> CleanupPolicy {
        self.policy
    }

    fn guard(&self) -> Result<MutexGuard<'_, ()>, ImageError> {
        self.lock
            .lock()
            .map_err(|e| ImageError::Storage(format!("获取待确认列表锁失败: {}", e)))
    }

    fn read(&self) -> Result<Vec<String>, ImageError> {
        let Some(raw) = self.store.get(PENDING_UPLOADS_KEY)? else {
            return Ok(Vec::new());
        };

        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(paths) => Ok(paths),
            Err(err) => {
                log::warn!("⚠️ 待确认列表内容损坏，按空列表处理: {}", err);
                Ok(Vec::new())
            }
        }
    }

    fn write(&self, paths: &[String]) -> Result<(), ImageError> {
        if paths.is_empty() {
            return self.store.remove(PENDING_UPLOADS_KEY);
        }
        let raw = serde_json::to_string(paths)
            .map_err(|e| ImageError::Storage(format!("序列化待确认列表失败: {}", e)))?;
        self.store.set(PENDING_UPLOADS_KEY, &raw)
    }

    /// 登记一个上传路径。空路径忽略，重复登记只保留一份。
    pub fn track(&self, path: &str) -> Result<(), ImageError> {
        if path.is_empty() {
            return Ok(());
        }

        let _guard = self.guard()?;
        let mut paths = self.read()?;
        if paths.iter().any(|p| p == path) {
            return Ok(());
        }
        paths.push(path.to_string());
        self.write(&paths)?;
        log::debug!("📝 登记待确认上传: {} (共 {} 条)", path, paths.len());
        Ok(())
    }

    /// 移除一个已确认的路径。
    pub fn untrack(&self, path: &str) -> Result<(), ImageError> {
        if path.is_empty() {
            return Ok(());
        }

        let _guard = self.guard()?;
        let mut paths = self.read()?;
        let before = paths.len();
        paths.retain(|p| p != path);
        if paths.len() != before {
            self.write(&paths)?;
        }
        Ok(())
    }

    pub fn list_pending(&self) -> Result<Vec<String>, ImageError> {
        let _guard = self.guard()?;
        self.read()
    }

    /// 删除所有不在 `existing` 中的待确认路径，并按策略更新列表。
    ///
    /// 删除请求并发发出；单个失败不影响其它请求，也不会作为错误返回。
    pub async fn cleanup<E>(&self, existing: &[String], endpoint: Arc<E>) -> Result<CleanupReport, ImageError>
    where
        E: ImageEndpoint + 'static,
    {
        let started = Instant::now();
        let pending = self.list_pending()?;
        let existing: HashSet<&str> = existing.iter().map(String::as_str).collect();

        let (kept, orphans): (Vec<String>, Vec<String>) =
            pending.into_iter().partition(|path| existing.contains(path.as_str()));

        let mut tasks = JoinSet::new();
        for path in orphans.iter().cloned() {
            let endpoint = Arc::clone(&endpoint);
            tasks.spawn(async move {
                let result = endpoint.delete(&path).await;
                (path, result)
            });
        }

        let mut deleted = HashSet::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((path, Ok(()))) => {
                    deleted.insert(path);
                }
                Ok((_, Err(err))) => log::warn!("⚠️ 孤儿图片删除失败（不重试）: {}", err),
                Err(err) => log::warn!("⚠️ 删除任务异常终止: {}", err),
            }
        }

        let (deleted, failed): (Vec<String>, Vec<String>) =
            orphans.into_iter().partition(|path| deleted.contains(path));

        {
            let _guard = self.guard()?;
            match self.policy {
                CleanupPolicy::ClearAll => self.store.remove(PENDING_UPLOADS_KEY)?,
                CleanupPolicy::RetainFailed => {
                    // 清理期间新登记的路径也要保留
                    let mut current = self.read()?;
                    current.retain(|p| !deleted.contains(p) && !kept.contains(p));
                    self.write(&current)?;
                }
            }
        }

        log::info!(
            "🧹 孤儿清理完成: 删除 {} / 失败 {} / 保留 {}，耗时 {}ms",
            deleted.len(),
            failed.len(),
            kept.len(),
            started.elapsed().as_millis()
        );

        Ok(CleanupReport { deleted, failed, kept })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::testing::FakeEndpoint;
    use crate::store::MemoryStore;

    fn pending(policy: CleanupPolicy) -> PendingUploads<MemoryStore> {
        PendingUploads::new(MemoryStore::new(), policy)
    }

    #[test]
    fn track_is_idempotent_and_ignores_empty() {
        let list = pending(CleanupPolicy::ClearAll);
        list.track("bike/a.jpg").expect("track");
        list.track("bike/a.jpg").expect("track again");
        list.track("").expect("empty path");

        assert_eq!(list.list_pending().expect("list"), vec!["bike/a.jpg".to_string()]);

        list.untrack("bike/a.jpg").expect("untrack");
        list.untrack("").expect("empty path");
        assert!(list.list_pending().expect("list").is_empty());
    }

    #[test]
    fn corrupted_value_reads_as_empty() {
        let store = MemoryStore::new();
        store.set(PENDING_UPLOADS_KEY, "{oops").expect("seed");
        let list = PendingUploads::new(store, CleanupPolicy::ClearAll);

        assert!(list.list_pending().expect("list").is_empty());
        list.track("bike/a.jpg").expect("track overwrites garbage");
        assert_eq!(list.list_pending().expect("list"), vec!["bike/a.jpg".to_string()]);
    }

    #[tokio::test]
    async fn cleanup_deletes_only_unreferenced_and_clears_list() {
        let list = pending(CleanupPolicy::ClearAll);
        list.track("A").expect("track A");
        list.track("B").expect("track B");

        let endpoint = Arc::new(FakeEndpoint::new());
        endpoint.fail_delete_of("B");

        let report = list
            .cleanup(&["A".to_string()], Arc::clone(&endpoint))
            .await
            .expect("cleanup never surfaces deletion errors");

        assert_eq!(endpoint.delete_attempts(), vec!["B".to_string()]);
        assert_eq!(report.failed, vec!["B".to_string()]);
        assert_eq!(report.kept, vec!["A".to_string()]);
        assert!(list.list_pending().expect("list").is_empty());
    }

    #[tokio::test]
    async fn retain_failed_keeps_paths_for_next_round() {
        let list = pending(CleanupPolicy::RetainFailed);
        for path in ["A", "B", "C"] {
            list.track(path).expect("track");
        }

        let endpoint = Arc::new(FakeEndpoint::new());
        endpoint.fail_delete_of("C");

        let report = list
            .cleanup(&["A".to_string()], Arc::clone(&endpoint))
            .await
            .expect("cleanup");

        assert_eq!(report.deleted, vec!["B".to_string()]);
        assert_eq!(report.failed, vec!["C".to_string()]);
        assert_eq!(list.list_pending().expect("list"), vec!["C".to_string()]);
    }

    #[tokio::test]
    async fn empty_list_issues_no_requests() {
        let list = pending(CleanupPolicy::ClearAll);
        let endpoint = Arc::new(FakeEndpoint::new());

        let report = list.cleanup(&[], Arc::clone(&endpoint)).await.expect("cleanup");

        assert_eq!(report, CleanupReport::default());
        assert!(endpoint.delete_attempts().is_empty());
    }
}
