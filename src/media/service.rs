//! # 服务层（可注入状态）
//!
//! ## 设计思路
//!
//! `MediaService` 持有配置、端点、待确认列表与预览地址表，
//! 由 `main.rs`（或上层应用）创建一次并在各次请求间共享。
//! 配置放在 `RwLock` 中，运行时切换压缩档位；每个会话打开时拿一份快照，
//! 之后的切换不影响进行中的会话。
//!
//! ## 对外 API
//!
//! - `open_session` / `open_file`：补边并创建调整会话
//! - `submit`：Done → 上传 → 登记 → 删除旧图
//! - `submit_many`：多行表单并发上传
//! - `cleanup`：保存表单后回收孤儿图片
//! - `set_compression_profile` / `get_compression_profile`：压缩档位

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::Serialize;

use super::adjuster::AdjustSession;
use super::cancel::CancelFlag;
use super::config::{CompressionProfile, PipelineConfig, UploadTarget};
use super::loader;
use super::orphan::{CleanupReport, PendingUploads};
use super::padding;
use super::preview::ObjectUrlRegistry;
use super::source::{EncodedImage, FinalAsset, UploadRecord};
use super::upload::{HttpImageEndpoint, ImageEndpoint, UploadCoordinator};
use super::ImageError;
use crate::store::KeyValueStore;

/// 一次成功提交的结果。
pub struct SubmittedImage {
    pub record: UploadRecord,
    pub asset: FinalAsset,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmittedSummary {
    pub url: String,
    pub path: String,
    pub width: u32,
    pub height: u32,
    pub bytes: usize,
}

impl SubmittedImage {
    pub fn summary(&self) -> SubmittedSummary {
        SubmittedSummary {
            url: self.record.url.clone(),
            path: self.record.path.clone(),
            width: self.asset.file.width,
            height: self.asset.file.height,
            bytes: self.asset.file.len(),
        }
    }
}

/// 图片服务状态。
pub struct MediaService<E, S> {
    config: RwLock<PipelineConfig>,
    endpoint: Arc<E>,
    coordinator: UploadCoordinator<E, S>,
    urls: ObjectUrlRegistry,
}

impl<S> MediaService<HttpImageEndpoint, S>
where
    S: KeyValueStore + 'static,
{
    /// 使用 HTTP 端点创建服务。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use motorent_media::media::{MediaService, PipelineConfig};
    /// use motorent_media::store::MemoryStore;
    ///
    /// let service = MediaService::connect(PipelineConfig::default(), MemoryStore::new())?;
    /// # Ok::<(), motorent_media::media::ImageError>(())
    /// ```
    pub fn connect(config: PipelineConfig, store: S) -> Result<Self, ImageError> {
        let endpoint = HttpImageEndpoint::new(&config)?;
        log::info!("🌐 图片端点: {}", endpoint.base());
        Self::new(config, Arc::new(endpoint), store)
    }
}

impl<E, S> MediaService<E, S>
where
    E: ImageEndpoint + 'static,
    S: KeyValueStore + 'static,
{
    pub fn new(config: PipelineConfig, endpoint: Arc<E>, store: S) -> Result<Self, ImageError> {
        config.validate()?;
        let pending = Arc::new(PendingUploads::new(store, config.cleanup_policy));
        let coordinator = UploadCoordinator::new(Arc::clone(&endpoint), pending);

        Ok(Self {
            config: RwLock::new(config),
            endpoint,
            coordinator,
            urls: ObjectUrlRegistry::new(),
        })
    }

    pub fn urls(&self) -> &ObjectUrlRegistry {
        &self.urls
    }

    pub fn config_snapshot(&self) -> Result<PipelineConfig, ImageError> {
        self.config
            .read()
            .map(|config| config.clone())
            .map_err(|_| ImageError::ResourceLimit("图片配置锁已中毒".to_string()))
    }

    /// 设置压缩档位（`quality` / `balanced` / `speed`）。
    pub fn set_compression_profile(&self, profile: &str) -> Result<(), ImageError> {
        let profile = CompressionProfile::from_str(profile)?;
        let mut config = self
            .config
            .write()
            .map_err(|_| ImageError::ResourceLimit("图片配置锁已中毒".to_string()))?;
        config.apply_compression_profile(profile);
        log::info!("⚙️ 压缩档位已切换为 {}", profile.as_str());
        Ok(())
    }

    pub fn get_compression_profile(&self) -> Result<String, ImageError> {
        let config = self.config_snapshot()?;
        Ok(config.infer_compression_profile().as_str().to_string())
    }

    /// 从 Data URL 打开调整会话，补边在阻塞线程池中完成。
    pub async fn open_session(&self, data_url: String, target: UploadTarget) -> Result<AdjustSession, ImageError> {
        let config = self.config_snapshot()?;
        let urls = self.urls.clone();

        tokio::task::spawn_blocking(move || {
            let padded = padding::pad(&data_url, config.padding, &config)?;
            Ok(AdjustSession::from_padded(padded, target, config, urls))
        })
        .await
        .map_err(|e| ImageError::Decode(format!("补边任务异常：{}", e)))?
    }

    /// 读取本地文件并打开调整会话。
    pub async fn open_file(&self, path: &Path, target: UploadTarget) -> Result<AdjustSession, ImageError> {
        let config = self.config_snapshot()?;
        let path: PathBuf = path.to_path_buf();
        let data_url = tokio::task::spawn_blocking(move || loader::load_file_as_data_url(&path, &config))
            .await
            .map_err(|e| ImageError::FileSystem(format!("读取任务异常：{}", e)))??;
        self.open_session(data_url, target).await
    }

    /// 提交一个会话：生成最终图片并上传，成功后替换 `replace_path` 指向的旧图。
    ///
    /// 任一步失败都原样返回，会话与旧图保持不变。
    pub async fn submit(
        &self,
        session: &AdjustSession,
        replace_path: Option<&str>,
    ) -> Result<SubmittedImage, ImageError> {
        let asset = session.done().await?;
        let record = self
            .coordinator
            .replace(session.target(), &asset.file, replace_path, &session.cancel_flag())
            .await?;
        Ok(SubmittedImage { record, asset })
    }

    /// 多行表单提交：逐个生成最终图片，再并发上传。结果按输入顺序返回。
    pub async fn submit_many(&self, sessions: &[AdjustSession]) -> Vec<Result<SubmittedImage, ImageError>> {
        let mut results: Vec<Option<Result<SubmittedImage, ImageError>>> = Vec::with_capacity(sessions.len());
        let mut assets = Vec::new();
        let mut rows = Vec::new();

        for (index, session) in sessions.iter().enumerate() {
            match session.done().await {
                Ok(asset) => {
                    rows.push((session.target(), asset.file.clone()));
                    assets.push((index, asset));
                    results.push(None);
                }
                Err(err) => results.push(Some(Err(err))),
            }
        }

        let uploaded = self.coordinator.upload_many(rows, &CancelFlag::new()).await;
        for ((index, asset), outcome) in assets.into_iter().zip(uploaded) {
            results[index] = Some(outcome.map(|record| SubmittedImage { record, asset }));
        }

        results
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| Err(ImageError::Upload("提交结果缺失".to_string()))))
            .collect()
    }

    /// 直接上传已编码的图片（不经过调整会话）。
    pub async fn upload_many(&self, rows: Vec<(UploadTarget, EncodedImage)>) -> Vec<Result<UploadRecord, ImageError>> {
        self.coordinator.upload_many(rows, &CancelFlag::new()).await
    }

    pub async fn cleanup(&self, existing: &[String]) -> Result<CleanupReport, ImageError> {
        self.coordinator
            .pending()
            .cleanup(existing, Arc::clone(&self.endpoint))
            .await
    }

    pub fn untrack(&self, path: &str) -> Result<(), ImageError> {
        self.coordinator.pending().untrack(path)
    }

    pub fn list_pending(&self) -> Result<Vec<String>, ImageError> {
        self.coordinator.pending().list_pending()
    }
}
