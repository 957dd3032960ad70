//! # 压缩模块
//!
//! ## 设计思路
//!
//! 任何图片在进入网络阶段前都必须经过这里：最长边受 `max_dimension` 约束，
//! 按 `quality` 有损编码为 JPEG。压缩失败对本次提交是致命的，
//! 绝不能把未限制体积的图片送去上传。
//!
//! ## 实现思路
//!
//! 1. 计算等比目标尺寸（只缩不放）
//! 2. 优先使用 `fast_image_resize` 降采样，失败时回退 `image::resize_exact`
//! 3. 转 RGB8 后按质量编码 JPEG
//! 4. 文件名取毫秒时间戳，同一毫秒内单调递增，保证进程内唯一

use std::io::Cursor;
use std::sync::atomic::{AtomicI64, Ordering};

use bytes::Bytes;
use fast_image_resize as fr;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, GenericImageView, ImageBuffer, Rgb};

use super::loader::decode_bytes;
use super::source::EncodedImage;
use super::{ImageError, PipelineConfig};

static LAST_FILE_STAMP: AtomicI64 = AtomicI64::new(0);

/// 单次压缩参数（取自配置快照）。
#[derive(Debug, Clone, Copy)]
pub struct CompressOptions {
    pub max_dimension: u32,
    pub quality: f32,
    pub filter: FilterType,
}

impl CompressOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_dimension: config.max_dimension,
            quality: config.quality,
            filter: config.resize_filter,
        }
    }
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

/// 压缩已解码的图片。
pub fn compress(image: &DynamicImage, options: &CompressOptions) -> Result<EncodedImage, ImageError> {
    if options.max_dimension == 0 {
        return Err(ImageError::Compression("max_dimension 不能为 0".to_string()));
    }
    if !(options.quality > 0.0 && options.quality <= 1.0) {
        return Err(ImageError::Compression(format!(
            "quality 必须在 (0, 1] 之间：{}",
            options.quality
        )));
    }

    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(ImageError::Compression("输入图片尺寸为 0".to_string()));
    }

    let (target_width, target_height) = target_dimensions(width, height, options.max_dimension);
    let rgb = if (target_width, target_height) == (width, height) {
        image.to_rgb8()
    } else {
        match resize_with_fast_image_resize(image, target_width, target_height, options.filter) {
            Ok(resized) => resized,
            Err(err) => {
                log::warn!("⚠️ fast_image_resize 降采样失败，回退 image::resize_exact：{}", err);
                image
                    .resize_exact(target_width, target_height, options.filter)
                    .to_rgb8()
            }
        }
    };

    let quality = ((options.quality * 100.0).round() as u8).clamp(1, 100);
    let mut buffer = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
        .map_err(|e| ImageError::Compression(format!("JPEG 编码失败：{}", e)))?;

    let bytes = Bytes::from(buffer.into_inner());
    log::debug!(
        "🗜️ 压缩完成：{}x{} -> {}x{}（quality={} size={}KB）",
        width,
        height,
        rgb.width(),
        rgb.height(),
        quality,
        bytes.len() / 1024
    );

    Ok(EncodedImage {
        bytes,
        file_name: next_file_name(),
        mime: "image/jpeg",
        width: rgb.width(),
        height: rgb.height(),
    })
}

/// 压缩已编码的文件字节；解码失败同样视为压缩失败。
pub fn compress_bytes(bytes: &[u8], options: &CompressOptions) -> Result<EncodedImage, ImageError> {
    let image = decode_bytes(bytes).map_err(|e| ImageError::Compression(e.to_string()))?;
    compress(&image, options)
}

/// 等比缩放到最长边不超过 `max_dimension`，不放大。
pub(crate) fn target_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_dimension {
        return (width, height);
    }

    let scale = max_dimension as f64 / longest as f64;
    let target_width = ((width as f64 * scale).round() as u32).clamp(1, max_dimension);
    let target_height = ((height as f64 * scale).round() as u32).clamp(1, max_dimension);
    (target_width, target_height)
}

fn resize_with_fast_image_resize(
    image: &DynamicImage,
    target_width: u32,
    target_height: u32,
    filter: FilterType,
) -> Result<ImageBuffer<Rgb<u8>, Vec<u8>>, ImageError> {
    let src = image.to_rgb8();
    let (src_width, src_height) = src.dimensions();

    let src_image = fr::images::Image::from_vec_u8(src_width, src_height, src.into_raw(), fr::PixelType::U8x3)
        .map_err(|e| ImageError::Compression(format!("构建源图像缓冲失败：{}", e)))?;

    let mut dst_image = fr::images::Image::new(target_width, target_height, fr::PixelType::U8x3);

    let mut resizer = fr::Resizer::new();
    let options = fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(to_fast_filter(filter)));

    resizer
        .resize(&src_image, &mut dst_image, Some(&options))
        .map_err(|e| ImageError::Compression(format!("fast_image_resize 执行失败：{}", e)))?;

    ImageBuffer::<Rgb<u8>, Vec<u8>>::from_raw(target_width, target_height, dst_image.into_vec())
        .ok_or_else(|| ImageError::Compression("fast_image_resize 输出缓冲长度异常".to_string()))
}

fn to_fast_filter(filter: FilterType) -> fr::FilterType {
    match filter {
        FilterType::Nearest => fr::FilterType::Box,
        FilterType::Triangle => fr::FilterType::Bilinear,
        FilterType::CatmullRom => fr::FilterType::CatmullRom,
        FilterType::Gaussian => fr::FilterType::Mitchell,
        FilterType::Lanczos3 => fr::FilterType::Lanczos3,
    }
}

/// `<毫秒时间戳>.jpg`，同一毫秒内的并发调用依次 +1。
fn next_file_name() -> String {
    let now = chrono::Utc::now().timestamp_millis();
    let previous = LAST_FILE_STAMP
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1)))
        .unwrap_or(now);
    format!("{}.jpg", now.max(previous + 1))
}
