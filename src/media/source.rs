//! # 数据源与中间模型
//!
//! ## 设计思路
//!
//! 将“外部输入”和“流水线中间结果”解耦：
//! - `SourceImage` 表示用户选中文件解码后的原图
//! - `PaddedImage` 表示补边后的画布（裁剪器与预览都从它取像素）
//! - `CropRegion` / `PixelArea` 表示归一化裁剪框与换算后的绝对像素框
//! - `EncodedImage` 表示压缩后可直接上传的字节
//! - `UploadRecord` 表示上传端点返回的公开地址与存储键

use std::sync::Arc;

use bytes::Bytes;
use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};

use super::preview::ObjectUrl;

/// 解码后的原图，创建后不可变。
pub struct SourceImage {
    image: DynamicImage,
}

impl SourceImage {
    pub(crate) fn new(image: DynamicImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }
}

/// 补边后的画布。
///
/// 同时保留 JPEG Data URL（展示用）与已解码像素（裁剪用），
/// 预览重算始终从这里取像素，不会在上一次预览的基础上叠加损失。
pub struct PaddedImage {
    data_url: String,
    image: Arc<DynamicImage>,
    padding: u32,
}

impl PaddedImage {
    pub(crate) fn new(data_url: String, image: DynamicImage, padding: u32) -> Self {
        Self {
            data_url,
            image: Arc::new(image),
            padding,
        }
    }

    pub fn data_url(&self) -> &str {
        &self.data_url
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub(crate) fn shared_image(&self) -> Arc<DynamicImage> {
        Arc::clone(&self.image)
    }

    pub fn padding(&self) -> u32 {
        self.padding
    }

    pub fn width(&self) -> u32 {
        self.image.dimensions().0
    }

    pub fn height(&self) -> u32 {
        self.image.dimensions().1
    }
}

/// 归一化裁剪框。
///
/// `x`/`y` 为平移偏移，取值 `[-1, 1]`，表示占可平移余量的比例（0 为居中）；
/// `zoom` 为缩放倍率。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRegion {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

impl Default for CropRegion {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
        }
    }
}

/// 补边画布上的绝对像素矩形。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PixelArea {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// 压缩阶段输出：可直接上传的文件。
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Bytes,
    pub file_name: String,
    pub mime: &'static str,
    pub width: u32,
    pub height: u32,
}

impl EncodedImage {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// “Done” 的提交结果，交给调用方表单。
pub struct FinalAsset {
    pub file: EncodedImage,
    pub preview: ObjectUrl,
}

/// 上传端点返回的记录。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRecord {
    /// 公开访问地址。
    pub url: String,
    /// 对象存储中的键，删除时使用。
    pub path: String,
}
