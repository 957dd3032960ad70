//! # 裁剪模块
//!
//! ## 设计思路
//!
//! 交互层只维护归一化的 `CropRegion`（平移 + 缩放），
//! 本模块负责把它换算成补边画布上的绝对像素框，并提取对应像素。
//!
//! ## 实现思路
//!
//! 1. 以目标宽高比求出可容纳于画布内的最大裁剪框（zoom = 1）
//! 2. 按 zoom 缩小裁剪框
//! 3. 将 `[-1, 1]` 平移量映射到剩余可平移余量上，居中为 0
//! 4. 取整后夹紧到画布范围内，保证宽高至少 1 像素

use image::DynamicImage;

use super::source::{CropRegion, PixelArea};
use super::ImageError;

/// 将缩放值夹紧到 `[min, max]`，NaN 视为无效输入。
pub fn clamp_zoom(zoom: f64, min: f64, max: f64) -> Result<f64, ImageError> {
    if zoom.is_nan() {
        return Err(ImageError::InvalidFormat("缩放值不能为 NaN".to_string()));
    }
    Ok(zoom.clamp(min, max))
}

/// 归一化裁剪框 → 画布绝对像素框。
pub fn compute_pixel_area(
    image_width: u32,
    image_height: u32,
    region: &CropRegion,
    aspect: f64,
) -> Result<PixelArea, ImageError> {
    if image_width == 0 || image_height == 0 {
        return Err(ImageError::InvalidFormat("画布尺寸为 0".to_string()));
    }
    if !(aspect.is_finite() && aspect > 0.0) {
        return Err(ImageError::InvalidFormat(format!("裁剪比例无效：{}", aspect)));
    }
    if !(region.zoom.is_finite() && region.zoom >= 1.0) {
        return Err(ImageError::InvalidFormat(format!("缩放值无效：{}", region.zoom)));
    }
    if region.x.is_nan() || region.y.is_nan() {
        return Err(ImageError::InvalidFormat("平移量不能为 NaN".to_string()));
    }

    let (w, h) = (image_width as f64, image_height as f64);
    let (base_w, base_h) = if w / h > aspect {
        (h * aspect, h)
    } else {
        (w, w / aspect)
    };

    let window_w = base_w / region.zoom;
    let window_h = base_h / region.zoom;

    let width = (window_w.round() as u32).clamp(1, image_width);
    let height = (window_h.round() as u32).clamp(1, image_height);

    let slack_x = (image_width - width) as f64;
    let slack_y = (image_height - height) as f64;
    let pan_x = region.x.clamp(-1.0, 1.0);
    let pan_y = region.y.clamp(-1.0, 1.0);

    let x = ((slack_x / 2.0) * (1.0 + pan_x)).round() as u32;
    let y = ((slack_y / 2.0) * (1.0 + pan_y)).round() as u32;

    Ok(PixelArea {
        x: x.min(image_width - width),
        y: y.min(image_height - height),
        width,
        height,
    })
}

/// 从画布中提取像素框。
pub fn extract(image: &DynamicImage, area: PixelArea) -> Result<DynamicImage, ImageError> {
    let right = area.x.checked_add(area.width);
    let bottom = area.y.checked_add(area.height);
    let inside = matches!((right, bottom), (Some(r), Some(b)) if r <= image.width() && b <= image.height());

    if area.width == 0 || area.height == 0 || !inside {
        return Err(ImageError::InvalidFormat(format!(
            "裁剪框越界：{:?}（画布 {}x{}）",
            area,
            image.width(),
            image.height()
        )));
    }

    Ok(image.crop_imm(area.x, area.y, area.width, area.height))
}
