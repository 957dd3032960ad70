//! # 加载与校验模块
//!
//! ## 设计思路
//!
//! 统一处理两种输入（Data URL / 本地文件）的原始字节加载，并在“尽可能早”的阶段执行输入校验。
//! 目标是尽快失败，减少不必要内存与 CPU 消耗。
//!
//! ## 实现思路
//!
//! - Data URL：正则解析头部 + 解码前按长度估算体积上限 + 解码。
//! - 文件：存在性 + metadata 体积限制 + 读取。
//! - 统一使用 `infer` 校验字节签名，非图片直接判为解码错误。
//! - 完整解码前先读 header 尺寸，按像素上限快速拒绝。

use std::io::Cursor;
use std::path::Path;

use base64::{Engine as _, engine::general_purpose};
use image::{DynamicImage, GenericImageView};
use once_cell::sync::Lazy;
use regex::Regex;

use super::source::SourceImage;
use super::{ImageError, PipelineConfig};

static DATA_URL_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^data:(?P<mime>image/[A-Za-z0-9.+-]+)(?:;[^,;]+)*;base64,").unwrap());

/// 解析 Data URL（或纯 Base64）为原始字节。
pub(crate) fn parse_data_url(data: &str, max_file_size: u64) -> Result<Vec<u8>, ImageError> {
    let normalized = data.trim();

    let payload = if normalized.starts_with("data:") {
        let captures = DATA_URL_HEADER
            .captures(normalized)
            .ok_or_else(|| ImageError::InvalidFormat("Data URL 缺少 image/* 与 base64 标记".to_string()))?;
        let header_len = captures.get(0).map(|m| m.end()).unwrap_or_default();
        &normalized[header_len..]
    } else {
        normalized
    };

    let estimated_len = estimate_base64_decoded_upper_bound_len(payload)?;
    if estimated_len > max_file_size {
        return Err(ImageError::ResourceLimit(format!(
            "Base64 预计解码体积过大：{:.2} MB（限制：{:.2} MB）",
            estimated_len as f64 / 1024.0 / 1024.0,
            max_file_size as f64 / 1024.0 / 1024.0
        )));
    }

    general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| ImageError::Decode(format!("Base64 解码失败：{}", e)))
}

fn estimate_base64_decoded_upper_bound_len(base64_data: &str) -> Result<u64, ImageError> {
    let len = base64_data.trim().len() as u64;
    let groups = len
        .checked_add(3)
        .ok_or_else(|| ImageError::ResourceLimit("Base64 输入长度溢出".to_string()))?
        / 4;

    groups
        .checked_mul(3)
        .ok_or_else(|| ImageError::ResourceLimit("Base64 解码体积估算溢出".to_string()))
}

/// 将字节编码为 Data URL。
pub(crate) fn encode_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, general_purpose::STANDARD.encode(bytes))
}

/// 读取本地图片文件，返回可直接送入补边阶段的 Data URL。
pub fn load_file_as_data_url(path: &Path, config: &PipelineConfig) -> Result<String, ImageError> {
    log::info!("📁 开始读取本地图片 - 路径: {}", path.display());

    if !path.exists() {
        return Err(ImageError::FileSystem(format!("文件不存在：{}", path.display())));
    }

    let metadata = std::fs::metadata(path)
        .map_err(|e| ImageError::FileSystem(format!("无法读取文件信息：{}", e)))?;

    if metadata.len() > config.max_file_size {
        return Err(ImageError::ResourceLimit(format!(
            "文件过大：{:.2} MB（限制：{:.2} MB）",
            metadata.len() as f64 / 1024.0 / 1024.0,
            config.max_file_size as f64 / 1024.0 / 1024.0
        )));
    }

    let bytes = std::fs::read(path)
        .map_err(|e| ImageError::FileSystem(format!("无法读取图片文件：{}", e)))?;
    let mime = validate_image_signature(&bytes)?;

    Ok(encode_data_url(mime, &bytes))
}

/// 校验字节签名是否为图片，返回识别出的 MIME。
pub(crate) fn validate_image_signature(bytes: &[u8]) -> Result<&'static str, ImageError> {
    if bytes.is_empty() {
        return Err(ImageError::Decode("图片内容为空".to_string()));
    }

    let kind = infer::get(bytes)
        .ok_or_else(|| ImageError::Decode("无法识别图片类型".to_string()))?;

    if kind.matcher_type() != infer::MatcherType::Image {
        return Err(ImageError::Decode(format!(
            "文件签名不是图片类型：{}",
            kind.mime_type()
        )));
    }

    Ok(kind.mime_type())
}

/// Data URL → 已解码原图。
pub(crate) fn decode_source(data: &str, config: &PipelineConfig) -> Result<SourceImage, ImageError> {
    let bytes = parse_data_url(data, config.max_file_size)?;
    validate_image_signature(&bytes)?;

    let (header_width, header_height) = inspect_dimensions_from_memory(&bytes)?;
    validate_pixel_limits(config, header_width, header_height)?;

    let decoded = image::load_from_memory(&bytes)
        .map_err(|e| ImageError::Decode(format!("图片解码失败：{}", e)))?;
    let (width, height) = decoded.dimensions();
    validate_pixel_limits(config, width, height)?;

    log::debug!("🖼️ 原图解码完成 - {}x{}", width, height);
    Ok(SourceImage::new(decoded))
}

/// 仅通过内存中的图片头信息读取宽高。
fn inspect_dimensions_from_memory(bytes: &[u8]) -> Result<(u32, u32), ImageError> {
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ImageError::Decode(format!("无法识别图片格式：{}", e)))?;

    reader
        .into_dimensions()
        .map_err(|e| ImageError::Decode(format!("无法读取图片尺寸：{}", e)))
}

/// 校验像素数量是否超过配置上限。
pub(crate) fn validate_pixel_limits(
    config: &PipelineConfig,
    width: u32,
    height: u32,
) -> Result<(), ImageError> {
    let pixels = (width as u64)
        .checked_mul(height as u64)
        .ok_or_else(|| ImageError::ResourceLimit("图片像素数溢出".to_string()))?;

    if pixels > config.max_decoded_pixels {
        return Err(ImageError::ResourceLimit(format!(
            "图片像素过大：{} 像素（限制：{} 像素）",
            pixels, config.max_decoded_pixels
        )));
    }

    Ok(())
}

/// 解码已知是图片的字节（压缩阶段入口使用）。
pub(crate) fn decode_bytes(bytes: &[u8]) -> Result<DynamicImage, ImageError> {
    image::load_from_memory(bytes).map_err(|e| ImageError::Decode(format!("图片解码失败：{}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Rgba};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| Rgba([(x % 255) as u8, (y % 255) as u8, 90, 255]));
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut cursor, ImageFormat::Png)
            .expect("failed to encode test image");
        cursor.into_inner()
    }

    #[test]
    fn parse_data_url_accepts_header_and_bare_base64() {
        let bytes = png_bytes(4, 3);
        let url = encode_data_url("image/png", &bytes);

        let from_url = parse_data_url(&url, 1024 * 1024).expect("data url should parse");
        assert_eq!(from_url, bytes);

        let bare = general_purpose::STANDARD.encode(&bytes);
        let from_bare = parse_data_url(&bare, 1024 * 1024).expect("bare base64 should parse");
        assert_eq!(from_bare, bytes);
    }

    #[test]
    fn parse_data_url_rejects_non_image_header() {
        let result = parse_data_url("data:text/plain;base64,SGVsbG8=", 1024);
        assert!(matches!(result, Err(ImageError::InvalidFormat(_))));
    }

    #[test]
    fn parse_data_url_rejects_large_payload_before_decode() {
        let huge = "A".repeat(1024 * 1024);
        let result = parse_data_url(&huge, 32);
        assert!(matches!(result, Err(ImageError::ResourceLimit(_))));
    }

    #[test]
    fn decode_source_rejects_non_image_payload() {
        let config = PipelineConfig::default();
        let result = decode_source("SGVsbG8gd29ybGQ=", &config);
        assert!(matches!(result, Err(ImageError::Decode(_))));
    }

    #[test]
    fn decode_source_enforces_pixel_limit() {
        let mut config = PipelineConfig::default();
        config.max_decoded_pixels = 10;
        let url = encode_data_url("image/png", &png_bytes(8, 8));

        assert!(matches!(decode_source(&url, &config), Err(ImageError::ResourceLimit(_))));
    }

    #[test]
    fn load_file_as_data_url_reads_png() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("bike.png");
        std::fs::write(&path, png_bytes(6, 5)).expect("write test image");

        let url = load_file_as_data_url(&path, &PipelineConfig::default()).expect("load should succeed");
        assert!(url.starts_with("data:image/png;base64,"));

        let missing = load_file_as_data_url(&dir.path().join("missing.png"), &PipelineConfig::default());
        assert!(matches!(missing, Err(ImageError::FileSystem(_))));
    }
}
