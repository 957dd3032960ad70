//! 单元测试共用的内存端点与样例数据。

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;

use super::ImageError;
use super::cancel::CancelFlag;
use super::config::UploadTarget;
use super::source::{EncodedImage, UploadRecord};
use super::upload::ImageEndpoint;

type PendingSnapshot = Box<dyn Fn() -> Vec<String> + Send + Sync>;

#[derive(Default)]
pub(crate) struct FakeEndpoint {
    uploads: AtomicU64,
    fail_all_uploads: AtomicBool,
    failing_names: Mutex<HashSet<String>>,
    failing_deletes: Mutex<HashSet<String>>,
    deleted: Mutex<Vec<String>>,
    delete_attempts: Mutex<Vec<String>>,
    snapshot: Mutex<Option<PendingSnapshot>>,
    cancel_in_flight: Mutex<Option<CancelFlag>>,
    seen_at_delete: Mutex<Vec<Vec<String>>>,
}

impl FakeEndpoint {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_uploads(&self, fail: bool) {
        self.fail_all_uploads.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_uploads_named(&self, file_name: &str) {
        self.failing_names.lock().unwrap().insert(file_name.to_string());
    }

    pub(crate) fn fail_delete_of(&self, path: &str) {
        self.failing_deletes.lock().unwrap().insert(path.to_string());
    }

    /// 每次删除前调用 `snapshot`，记录当时的待确认列表。
    pub(crate) fn observe_pending_with(&self, snapshot: impl Fn() -> Vec<String> + Send + Sync + 'static) {
        *self.snapshot.lock().unwrap() = Some(Box::new(snapshot));
    }

    /// 请求已发出、响应尚未返回时置位 `flag`。
    pub(crate) fn cancel_during_upload(&self, flag: CancelFlag) {
        *self.cancel_in_flight.lock().unwrap() = Some(flag);
    }

    pub(crate) fn upload_count(&self) -> u64 {
        self.uploads.load(Ordering::SeqCst)
    }

    pub(crate) fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub(crate) fn delete_attempts(&self) -> Vec<String> {
        self.delete_attempts.lock().unwrap().clone()
    }

    pub(crate) fn pending_seen_at_delete(&self) -> Vec<Vec<String>> {
        self.seen_at_delete.lock().unwrap().clone()
    }
}

impl ImageEndpoint for FakeEndpoint {
    async fn upload(&self, target: UploadTarget, file: &EncodedImage) -> Result<UploadRecord, ImageError> {
        let seq = self.uploads.fetch_add(1, Ordering::SeqCst);
        if let Some(flag) = self.cancel_in_flight.lock().unwrap().as_ref() {
            flag.cancel();
        }
        if self.fail_all_uploads.load(Ordering::SeqCst)
            || self.failing_names.lock().unwrap().contains(&file.file_name)
        {
            return Err(ImageError::Upload("Failed to upload image".to_string()));
        }

        let path = format!("{}/{}-{}", target.as_str(), seq, file.file_name);
        Ok(UploadRecord {
            url: format!("https://cdn.test/{path}"),
            path,
        })
    }

    async fn delete(&self, path: &str) -> Result<(), ImageError> {
        if let Some(snapshot) = self.snapshot.lock().unwrap().as_ref() {
            self.seen_at_delete.lock().unwrap().push(snapshot());
        }
        self.delete_attempts.lock().unwrap().push(path.to_string());

        if self.failing_deletes.lock().unwrap().contains(path) {
            return Err(ImageError::Cleanup(format!("{path}: Failed to delete image")));
        }
        self.deleted.lock().unwrap().push(path.to_string());
        Ok(())
    }
}

pub(crate) fn encoded(file_name: &str) -> EncodedImage {
    EncodedImage {
        bytes: Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xD9]),
        file_name: file_name.to_string(),
        mime: "image/jpeg",
        width: 1,
        height: 1,
    }
}
