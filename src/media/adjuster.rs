//! # 图片调整会话
//!
//! ## 设计思路
//!
//! `AdjustSession` 对应一次“选图 → 拖动/缩放 → Done”的完整交互，
//! 每个表单行各持有一个，互不共享防抖定时器。
//!
//! - 缩放变化时平移量复位到 `{0, 0}`（缩放即重新居中）。
//! - 每次裁剪变化只记录最新像素框并重新调度预览，真正的重算在静默期之后。
//! - 预览与 Done 都从补边画布取像素，不在旧预览上叠加压缩损失。
//! - 预览链路的错误只记日志；Done 的错误原样返回，会话保持原状可重试。
//!
//! ## 生命周期
//!
//! 会话销毁（`Drop`）时置位取消标志并中止防抖任务：
//! 等待中的重算不会再执行，已在执行中的重算也不会安装结果。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use image::DynamicImage;

use super::cancel::CancelFlag;
use super::compress::{self, CompressOptions};
use super::cropper;
use super::padding;
use super::preview::{LatestTaskSlot, ObjectUrl, ObjectUrlRegistry};
use super::source::{CropRegion, EncodedImage, FinalAsset, PaddedImage, PixelArea};
use super::{ImageError, PipelineConfig, UploadTarget};

/// 预览重算统计，可在会话销毁后继续观察。
#[derive(Debug, Default)]
pub struct PreviewStats {
    recomputations: AtomicU64,
    failures: AtomicU64,
}

impl PreviewStats {
    pub fn recomputations(&self) -> u64 {
        self.recomputations.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }
}

type LivePreview = Arc<Mutex<Option<ObjectUrl>>>;

fn lock_preview(preview: &LivePreview) -> MutexGuard<'_, Option<ObjectUrl>> {
    match preview.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("实时预览锁中毒，继续使用恢复数据");
            poisoned.into_inner()
        }
    }
}

pub struct AdjustSession {
    padded: Arc<PaddedImage>,
    target: UploadTarget,
    config: PipelineConfig,
    region: CropRegion,
    cropped: Option<PixelArea>,
    preview: LivePreview,
    stats: Arc<PreviewStats>,
    urls: ObjectUrlRegistry,
    debouncer: LatestTaskSlot,
    cancel: CancelFlag,
}

impl AdjustSession {
    /// 从用户选择的 Data URL 打开会话（内部完成补边）。
    pub fn open(
        data_url: &str,
        target: UploadTarget,
        config: PipelineConfig,
        urls: ObjectUrlRegistry,
    ) -> Result<Self, ImageError> {
        let padded = padding::pad(data_url, config.padding, &config)?;
        Ok(Self::from_padded(padded, target, config, urls))
    }

    pub fn from_padded(
        padded: PaddedImage,
        target: UploadTarget,
        config: PipelineConfig,
        urls: ObjectUrlRegistry,
    ) -> Self {
        let debouncer = LatestTaskSlot::new(Duration::from_millis(config.preview_debounce_ms));
        Self {
            padded: Arc::new(padded),
            target,
            config,
            region: CropRegion::default(),
            cropped: None,
            preview: Arc::new(Mutex::new(None)),
            stats: Arc::new(PreviewStats::default()),
            urls,
            debouncer,
            cancel: CancelFlag::new(),
        }
    }

    pub fn target(&self) -> UploadTarget {
        self.target
    }

    pub fn padded(&self) -> &PaddedImage {
        &self.padded
    }

    pub fn region(&self) -> CropRegion {
        self.region
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn stats(&self) -> Arc<PreviewStats> {
        Arc::clone(&self.stats)
    }

    /// 当前实时预览地址；尚未算出任何预览时为 `None`（界面显示补边原图）。
    pub fn live_preview_url(&self) -> Option<String> {
        lock_preview(&self.preview).as_ref().map(|url| url.as_str().to_string())
    }

    /// 拖动平移。
    pub fn set_pan(&mut self, x: f64, y: f64) -> Result<PixelArea, ImageError> {
        if x.is_nan() || y.is_nan() {
            return Err(ImageError::InvalidFormat("平移量不能为 NaN".to_string()));
        }
        self.region.x = x.clamp(-1.0, 1.0);
        self.region.y = y.clamp(-1.0, 1.0);
        self.on_crop_complete()
    }

    /// 调整缩放；缩放值变化时平移复位。
    pub fn set_zoom(&mut self, zoom: f64) -> Result<PixelArea, ImageError> {
        let zoom = cropper::clamp_zoom(zoom, self.config.min_zoom, self.config.max_zoom)?;
        if zoom != self.region.zoom {
            self.region = CropRegion { x: 0.0, y: 0.0, zoom };
        }
        self.on_crop_complete()
    }

    /// 一次性设置完整裁剪框（先缩放后平移）。
    pub fn set_region(&mut self, region: CropRegion) -> Result<PixelArea, ImageError> {
        let zoom = cropper::clamp_zoom(region.zoom, self.config.min_zoom, self.config.max_zoom)?;
        if region.x.is_nan() || region.y.is_nan() {
            return Err(ImageError::InvalidFormat("平移量不能为 NaN".to_string()));
        }
        self.region = CropRegion {
            x: region.x.clamp(-1.0, 1.0),
            y: region.y.clamp(-1.0, 1.0),
            zoom,
        };
        self.on_crop_complete()
    }

    fn compute_area(&self) -> Result<PixelArea, ImageError> {
        cropper::compute_pixel_area(
            self.padded.width(),
            self.padded.height(),
            &self.region,
            self.target.aspect(),
        )
    }

    /// 记录最新像素框并重新调度预览重算。
    fn on_crop_complete(&mut self) -> Result<PixelArea, ImageError> {
        let area = self.compute_area()?;
        self.cropped = Some(area);
        self.schedule_preview(area);
        Ok(area)
    }

    fn schedule_preview(&self, area: PixelArea) {
        let image = self.padded.shared_image();
        let options = CompressOptions::from_config(&self.config);
        let preview = Arc::clone(&self.preview);
        let stats = Arc::clone(&self.stats);
        let urls = self.urls.clone();
        let cancel = self.cancel.clone();

        let task = async move {
            if cancel.is_cancelled() {
                return;
            }
            stats.recomputations.fetch_add(1, Ordering::SeqCst);
            let started = Instant::now();

            let result = tokio::task::spawn_blocking(move || render(&image, area, &options)).await;

            let encoded = match result {
                Ok(Ok(encoded)) => encoded,
                Ok(Err(err)) => {
                    stats.failures.fetch_add(1, Ordering::SeqCst);
                    log::warn!("⚠️ 实时预览失败，保留上一张预览：{}", err);
                    return;
                }
                Err(err) => {
                    stats.failures.fetch_add(1, Ordering::SeqCst);
                    log::warn!("⚠️ 实时预览任务异常，保留上一张预览：{}", err);
                    return;
                }
            };

            if install_preview(&cancel, &preview, &urls, encoded) {
                log::debug!("🔁 实时预览已更新 - {}ms", started.elapsed().as_millis());
            }
        };

        if let Err(err) = self.debouncer.schedule(task) {
            log::warn!("⚠️ 无法调度实时预览：{}", err);
        }
    }

    /// Done：按当前裁剪框提取、压缩并生成最终产物。
    ///
    /// 失败时会话状态不变，用户可以继续调整后重试。
    pub async fn done(&self) -> Result<FinalAsset, ImageError> {
        self.cancel.ensure_active("生成最终图片")?;

        let area = match self.cropped {
            Some(area) => area,
            None => self.compute_area()?,
        };
        let image = self.padded.shared_image();
        let options = CompressOptions::from_config(&self.config);
        let started = Instant::now();

        let file = tokio::task::spawn_blocking(move || render(&image, area, &options))
            .await
            .map_err(|e| ImageError::Compression(format!("压缩任务异常：{}", e)))??;

        self.cancel.ensure_active("生成最终图片")?;

        log::info!(
            "✅ 最终裁剪完成 - area={}x{}@({},{}) output={}x{} size={}KB total={}ms",
            area.width,
            area.height,
            area.x,
            area.y,
            file.width,
            file.height,
            file.len() / 1024,
            started.elapsed().as_millis()
        );

        let preview = self.urls.create(file.clone());
        Ok(FinalAsset { file, preview })
    }

    /// 显式结束会话，等价于离开作用域。
    pub fn close(self) {}
}

/// 把重算结果挂到会话上；会话已结束时丢弃，不生成 URL。
fn install_preview(cancel: &CancelFlag, preview: &LivePreview, urls: &ObjectUrlRegistry, encoded: EncodedImage) -> bool {
    if cancel.is_cancelled() {
        log::debug!("⏭️ 会话已结束，丢弃迟到的预览结果");
        return false;
    }

    let url = urls.create(encoded);
    let superseded = lock_preview(preview).replace(url);
    drop(superseded);
    true
}

fn render(image: &DynamicImage, area: PixelArea, options: &CompressOptions) -> Result<EncodedImage, ImageError> {
    let cropped = cropper::extract(image, area)?;
    compress::compress(&cropped, options)
}

impl Drop for AdjustSession {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.debouncer.cancel();
        lock_preview(&self.preview).take();
    }
}
