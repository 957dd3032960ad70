//! # 上传协调模块
//!
//! ## 设计思路
//!
//! 上传链路只有一次尝试，不做重试。成功后先登记到待确认列表，再删除被替换的旧图，
//! 这样任何时刻服务端上的新文件都至少被一份本地记录引用，
//! 即使删除旧图的请求失败或进程中途退出，也能在下次清理时回收。
//!
//! ## 调用链
//!
//! ```text
//! UploadCoordinator::replace
//!   -> ImageEndpoint::upload (multipart, field = "file")
//!   -> PendingUploads::track(new_path)
//!   -> ImageEndpoint::delete(old_path)   // 尽力而为
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tokio::task::JoinSet;

use super::cancel::CancelFlag;
use super::config::{DELETE_IMAGE_PATH, PipelineConfig, UploadTarget};
use super::orphan::PendingUploads;
use super::source::{EncodedImage, UploadRecord};
use super::ImageError;
use crate::store::KeyValueStore;

/// 图片存储端点。
///
/// HTTP 实现见 [`HttpImageEndpoint`]；测试中替换为内存实现。
pub trait ImageEndpoint: Send + Sync {
    /// 上传一张已编码图片，返回公开 URL 与存储路径。
    fn upload(
        &self,
        target: UploadTarget,
        file: &EncodedImage,
    ) -> impl Future<Output = Result<UploadRecord, ImageError>> + Send;

    /// 按存储路径删除图片。
    fn delete(&self, path: &str) -> impl Future<Output = Result<(), ImageError>> + Send;
}

#[derive(Debug, Default, Deserialize)]
struct EndpointResponse {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl EndpointResponse {
    fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }
}

/// 基于 reqwest 的 HTTP 端点。
#[derive(Debug, Clone)]
pub struct HttpImageEndpoint {
    client: reqwest::Client,
    base: String,
}

impl HttpImageEndpoint {
    pub fn new(config: &PipelineConfig) -> Result<Self, ImageError> {
        let base = config.endpoint_base.trim_end_matches('/').to_string();
        reqwest::Url::parse(&base)
            .map_err(|e| ImageError::InvalidFormat(format!("端点地址 '{}' 无效: {}", config.endpoint_base, e)))?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .timeout(Duration::from_secs(config.request_timeout))
            .build()
            .map_err(|e| ImageError::Upload(format!("创建 HTTP 客户端失败: {}", e)))?;

        Ok(Self { client, base })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

impl ImageEndpoint for HttpImageEndpoint {
    async fn upload(&self, target: UploadTarget, file: &EncodedImage) -> Result<UploadRecord, ImageError> {
        let started = Instant::now();
        let part = Part::bytes(file.bytes.to_vec())
            .file_name(file.file_name.clone())
            .mime_str(file.mime)
            .map_err(|e| ImageError::Upload(format!("构造上传表单失败: {}", e)))?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(self.url(target.upload_path()))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ImageError::Upload(format!("上传请求失败: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ImageError::Upload(format!("读取上传响应失败: {}", e)))?;
        let parsed = EndpointResponse::parse(&body);

        if !status.is_success() {
            let message = parsed
                .error
                .unwrap_or_else(|| format!("上传失败（HTTP {}）", status.as_u16()));
            return Err(ImageError::Upload(message));
        }

        match (parsed.url, parsed.path) {
            (Some(url), Some(path)) if !url.is_empty() && !path.is_empty() => {
                log::info!(
                    "📤 上传完成: target={}, path={}, size={}B, 耗时 {}ms",
                    target.as_str(),
                    path,
                    file.len(),
                    started.elapsed().as_millis()
                );
                Ok(UploadRecord { url, path })
            }
            _ => Err(ImageError::Upload("上传响应缺少 url 或 path".to_string())),
        }
    }

    async fn delete(&self, path: &str) -> Result<(), ImageError> {
        let response = self
            .client
            .post(self.url(DELETE_IMAGE_PATH))
            .json(&serde_json::json!({ "path": path }))
            .send()
            .await
            .map_err(|e| ImageError::Cleanup(format!("删除请求失败 '{}': {}", path, e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let message = EndpointResponse::parse(&body)
            .error
            .unwrap_or_else(|| format!("删除失败（HTTP {}）", status.as_u16()));
        Err(ImageError::Cleanup(format!("{}: {}", path, message)))
    }
}

/// 上传协调器：上传、登记、替换旧图。
pub struct UploadCoordinator<E, S> {
    endpoint: Arc<E>,
    pending: Arc<PendingUploads<S>>,
}

impl<E, S> Clone for UploadCoordinator<E, S> {
    fn clone(&self) -> Self {
        Self {
            endpoint: Arc::clone(&self.endpoint),
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<E, S> UploadCoordinator<E, S>
where
    E: ImageEndpoint + 'static,
    S: KeyValueStore + 'static,
{
    pub fn new(endpoint: Arc<E>, pending: Arc<PendingUploads<S>>) -> Self {
        Self { endpoint, pending }
    }

    pub fn pending(&self) -> &PendingUploads<S> {
        &self.pending
    }

    /// 上传并登记。
    ///
    /// 会话在请求发出前已取消时不发请求；请求途中取消时，新路径仍会登记，
    /// 但结果以 `Cancelled` 返回。
    pub async fn upload(
        &self,
        target: UploadTarget,
        file: &EncodedImage,
        cancel: &CancelFlag,
    ) -> Result<UploadRecord, ImageError> {
        upload_and_track(&*self.endpoint, &self.pending, target, file, cancel).await
    }

    /// 上传新图并替换旧图。
    ///
    /// 上传或登记失败时旧图保持不变；旧图删除失败只记录日志。
    /// 旧路径不会从待确认列表中移除。
    pub async fn replace(
        &self,
        target: UploadTarget,
        file: &EncodedImage,
        old_path: Option<&str>,
        cancel: &CancelFlag,
    ) -> Result<UploadRecord, ImageError> {
        let record = self.upload(target, file, cancel).await?;

        if let Some(old) = old_path.filter(|old| !old.is_empty() && *old != record.path) {
            self.delete_image(old).await;
        }

        Ok(record)
    }

    /// 尽力删除单张图片，返回是否成功。
    pub async fn delete_image(&self, path: &str) -> bool {
        match self.endpoint.delete(path).await {
            Ok(()) => {
                log::info!("🗑️ 已删除旧图: {}", path);
                true
            }
            Err(err) => {
                log::warn!("⚠️ 删除旧图失败（忽略）: {}", err);
                false
            }
        }
    }

    /// 并发上传多行，无顺序、无并发上限。结果按输入顺序返回。
    pub async fn upload_many(
        &self,
        rows: Vec<(UploadTarget, EncodedImage)>,
        cancel: &CancelFlag,
    ) -> Vec<Result<UploadRecord, ImageError>> {
        let total = rows.len();
        let mut tasks = JoinSet::new();

        for (index, (target, file)) in rows.into_iter().enumerate() {
            let endpoint = Arc::clone(&self.endpoint);
            let pending = Arc::clone(&self.pending);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let result = upload_and_track(&*endpoint, &pending, target, &file, &cancel).await;
                (index, result)
            });
        }

        let mut results: Vec<Option<Result<UploadRecord, ImageError>>> = (0..total).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(err) => log::error!("❌ 上传任务异常终止: {}", err),
            }
        }

        let succeeded = results.iter().filter(|r| matches!(r, Some(Ok(_)))).count();
        log::info!("📦 批量上传完成: {}/{} 成功", succeeded, total);

        results
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| Err(ImageError::Upload("上传任务异常终止".to_string()))))
            .collect()
    }
}

async fn upload_and_track<E, S>(
    endpoint: &E,
    pending: &PendingUploads<S>,
    target: UploadTarget,
    file: &EncodedImage,
    cancel: &CancelFlag,
) -> Result<UploadRecord, ImageError>
where
    E: ImageEndpoint,
    S: KeyValueStore,
{
    cancel.ensure_active("上传")?;

    let record = match endpoint.upload(target, file).await {
        Ok(record) => record,
        Err(err) => {
            log::error!("❌ 上传失败: target={}, {}", target.as_str(), err);
            return Err(err);
        }
    };

    pending.track(&record.path)?;
    cancel.ensure_active("上传")?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::testing::{FakeEndpoint, encoded};
    use crate::media::orphan::CleanupPolicy;
    use crate::store::MemoryStore;

    fn coordinator(endpoint: Arc<FakeEndpoint>) -> UploadCoordinator<FakeEndpoint, MemoryStore> {
        let pending = Arc::new(PendingUploads::new(MemoryStore::new(), CleanupPolicy::ClearAll));
        UploadCoordinator::new(endpoint, pending)
    }

    #[tokio::test]
    async fn replace_tracks_new_then_deletes_old() {
        let endpoint = Arc::new(FakeEndpoint::new());
        let pending = Arc::new(PendingUploads::new(MemoryStore::new(), CleanupPolicy::ClearAll));
        let observed = Arc::clone(&pending);
        endpoint.observe_pending_with(move || observed.list_pending().unwrap_or_default());
        let coordinator = UploadCoordinator::new(Arc::clone(&endpoint), pending);

        let record = coordinator
            .replace(UploadTarget::Bike, &encoded("a.jpg"), Some("bikes/old.jpg"), &CancelFlag::new())
            .await
            .expect("replace should succeed");

        assert_eq!(coordinator.pending().list_pending().expect("list"), vec![record.path.clone()]);
        assert_eq!(endpoint.deleted(), vec!["bikes/old.jpg".to_string()]);
        // 删除旧图时新路径必须已登记
        assert_eq!(endpoint.pending_seen_at_delete(), vec![vec![record.path]]);
    }

    #[tokio::test]
    async fn failed_upload_leaves_old_image_alone() {
        let endpoint = Arc::new(FakeEndpoint::new());
        endpoint.fail_uploads(true);
        let coordinator = coordinator(Arc::clone(&endpoint));

        let err = coordinator
            .replace(UploadTarget::Hero, &encoded("a.jpg"), Some("heroes/old.jpg"), &CancelFlag::new())
            .await
            .expect_err("upload should fail");

        assert!(matches!(err, ImageError::Upload(_)));
        assert!(coordinator.pending().list_pending().expect("list").is_empty());
        assert!(endpoint.deleted().is_empty());
    }

    #[tokio::test]
    async fn delete_old_failure_is_swallowed() {
        let endpoint = Arc::new(FakeEndpoint::new());
        endpoint.fail_delete_of("bikes/old.jpg");
        let coordinator = coordinator(Arc::clone(&endpoint));

        let record = coordinator
            .replace(UploadTarget::Bike, &encoded("a.jpg"), Some("bikes/old.jpg"), &CancelFlag::new())
            .await
            .expect("replace should still succeed");
        assert!(!record.path.is_empty());
    }

    #[tokio::test]
    async fn cancelled_session_sends_nothing() {
        let endpoint = Arc::new(FakeEndpoint::new());
        let coordinator = coordinator(Arc::clone(&endpoint));
        let cancel = CancelFlag::new();
        cancel.cancel();

        let err = coordinator
            .upload(UploadTarget::Bike, &encoded("a.jpg"), &cancel)
            .await
            .expect_err("cancelled");
        assert!(matches!(err, ImageError::Cancelled(_)));
        assert_eq!(endpoint.upload_count(), 0);
    }

    #[tokio::test]
    async fn cancel_during_request_tracks_new_and_keeps_old() {
        let endpoint = Arc::new(FakeEndpoint::new());
        let cancel = CancelFlag::new();
        endpoint.cancel_during_upload(cancel.clone());
        let coordinator = coordinator(Arc::clone(&endpoint));

        let err = coordinator
            .replace(UploadTarget::Bike, &encoded("new.jpg"), Some("bike/old.jpg"), &cancel)
            .await
            .expect_err("cancelled mid-request");

        assert_eq!(err.code(), "E_CANCELLED");
        assert_eq!(endpoint.upload_count(), 1);
        // 文件已落到服务端，只能交给孤儿清理
        assert_eq!(coordinator.pending().list_pending().expect("list"), vec!["bike/0-new.jpg".to_string()]);
        assert!(endpoint.delete_attempts().is_empty());
    }

    #[tokio::test]
    async fn upload_many_preserves_input_order_and_tracks_successes() {
        let endpoint = Arc::new(FakeEndpoint::new());
        endpoint.fail_uploads_named("row-1.jpg");
        let coordinator = coordinator(Arc::clone(&endpoint));

        let rows = (0..4)
            .map(|i| (UploadTarget::Bike, encoded(&format!("row-{i}.jpg"))))
            .collect();
        let results = coordinator.upload_many(rows, &CancelFlag::new()).await;

        assert_eq!(results.len(), 4);
        assert!(results[1].is_err());
        let mut paths: Vec<String> = results.iter().filter_map(|r| r.as_ref().ok()).map(|r| r.path.clone()).collect();
        for (i, result) in results.iter().enumerate() {
            if let Ok(record) = result {
                assert!(record.path.ends_with(&format!("row-{i}.jpg")));
            }
        }

        let mut pending = coordinator.pending().list_pending().expect("list");
        paths.sort();
        pending.sort();
        assert_eq!(pending, paths);
    }
}
