//! # 补边模块
//!
//! 交互式裁剪的平移/缩放范围受图片边界约束。先给原图四周补一圈白边，
//! 用户才能把裁剪框贴着原图边缘取景而不被画布裁掉。
//!
//! 输出尺寸恒为 `(w + 2p, h + 2p)`，并以 JPEG Data URL 形式重新编码；
//! 同一输入多次调用结果一致，可安全重试。

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, Rgba, RgbaImage, imageops};

use super::loader::{decode_source, encode_data_url, validate_pixel_limits};
use super::source::PaddedImage;
use super::{ImageError, PipelineConfig};

/// 画布转 JPEG 时的默认质量（与浏览器 `toDataURL("image/jpeg")` 一致）。
const PADDED_JPEG_QUALITY: u8 = 92;

/// Data URL → 补边后的画布。
pub fn pad(data_url: &str, padding: u32, config: &PipelineConfig) -> Result<PaddedImage, ImageError> {
    let source = decode_source(data_url, config)?;
    let canvas = pad_image(source.image(), padding, config)?;

    let mut buffer = Cursor::new(Vec::new());
    let rgb = DynamicImage::ImageRgba8(canvas).to_rgb8();
    JpegEncoder::new_with_quality(&mut buffer, PADDED_JPEG_QUALITY)
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
        .map_err(|e| ImageError::Decode(format!("补边画布编码失败：{}", e)))?;

    log::info!(
        "🧱 补边完成：{}x{} -> {}x{}（padding={}）",
        source.width(),
        source.height(),
        rgb.width(),
        rgb.height(),
        padding
    );

    let data_url = encode_data_url("image/jpeg", buffer.get_ref());
    Ok(PaddedImage::new(data_url, DynamicImage::ImageRgb8(rgb), padding))
}

/// 在白色画布上以 `(p, p)` 偏移绘制原图。
///
/// 透明像素与白底混合，和浏览器 canvas 的绘制结果一致。
pub(crate) fn pad_image(
    source: &DynamicImage,
    padding: u32,
    config: &PipelineConfig,
) -> Result<RgbaImage, ImageError> {
    let border = padding
        .checked_mul(2)
        .ok_or_else(|| ImageError::ResourceLimit("补边宽度溢出".to_string()))?;
    let width = source
        .width()
        .checked_add(border)
        .ok_or_else(|| ImageError::ResourceLimit("补边后宽度溢出".to_string()))?;
    let height = source
        .height()
        .checked_add(border)
        .ok_or_else(|| ImageError::ResourceLimit("补边后高度溢出".to_string()))?;
    validate_pixel_limits(config, width, height)?;

    let mut canvas = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
    imageops::overlay(&mut canvas, &source.to_rgba8(), padding as i64, padding as i64);
    Ok(canvas)
}
