//! # 配置模块
//!
//! ## 设计思路
//!
//! 将所有“可调策略”集中到 `PipelineConfig`，保证运行时行为可观测、可调整、可测试。
//! 其中压缩档位（quality / balanced / speed）作为高层语义，映射到底层参数组合。
//!
//! ## 实现思路
//!
//! - `Default` 提供生产可用的平衡配置（800px / 0.8 / 300px 边框 / 300ms 防抖）。
//! - `CompressionProfile` 负责档位字符串解析与反向输出。
//! - `apply_compression_profile` 将档位转换为具体阈值。
//! - `infer_compression_profile` 用于从当前配置反推档位。
//! - `UploadTarget` 描述上传目标（车辆图 / 横幅图）对应的端点与裁剪比例。

use image::imageops::FilterType;

use super::ImageError;
use super::orphan::CleanupPolicy;

/// 图片流水线配置。
///
/// 字段覆盖了加载、补边、裁剪、预览、压缩与上传六个阶段。
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// 读取原始字节时允许的最大文件体积（字节）。
    pub max_file_size: u64,
    /// 解码后的像素上限（`width * height`），补边后的画布同样受此限制。
    pub max_decoded_pixels: u64,
    /// 补边宽度（像素），四边相同。
    pub padding: u32,
    /// 最小缩放倍率。
    pub min_zoom: f64,
    /// 最大缩放倍率。
    pub max_zoom: f64,
    /// 实时预览防抖间隔（毫秒）。
    pub preview_debounce_ms: u64,
    /// 压缩输出最长边上限。
    pub max_dimension: u32,
    /// 压缩质量（0, 1]。
    pub quality: f32,
    /// 降采样滤镜策略。
    pub resize_filter: FilterType,
    /// 上传/删除端点的基础地址。
    pub endpoint_base: String,
    /// 建立连接超时（秒）。
    pub connect_timeout: u64,
    /// 单次请求总超时（秒）。
    pub request_timeout: u64,
    /// 孤儿清理后本地待确认列表的处理策略。
    pub cleanup_policy: CleanupPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_file_size: 20 * 1024 * 1024,
            max_decoded_pixels: 40_000_000,
            padding: 300,
            min_zoom: 1.0,
            max_zoom: 2.5,
            preview_debounce_ms: 300,
            max_dimension: 800,
            quality: 0.8,
            resize_filter: FilterType::Triangle,
            endpoint_base: "http://localhost:3000".to_string(),
            connect_timeout: 8,
            request_timeout: 30,
            cleanup_policy: CleanupPolicy::ClearAll,
        }
    }
}

/// 压缩档位（面向产品/用户语义）。
///
/// - `Quality`：尽量保真
/// - `Balanced`：质量与体积平衡
/// - `Speed`：优先上传速度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionProfile {
    Quality,
    Balanced,
    Speed,
}

impl CompressionProfile {
    /// 从外部字符串解析档位。
    ///
    /// # 示例
    /// ```rust
    /// use motorent_media::media::CompressionProfile;
    ///
    /// let p = CompressionProfile::from_str("balanced")?;
    /// assert_eq!(p.as_str(), "balanced");
    /// # Ok::<(), motorent_media::media::ImageError>(())
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(profile: &str) -> Result<Self, ImageError> {
        match profile.trim().to_lowercase().as_str() {
            "quality" => Ok(Self::Quality),
            "balanced" => Ok(Self::Balanced),
            "speed" => Ok(Self::Speed),
            other => Err(ImageError::InvalidFormat(format!(
                "未知压缩档位：{}（可选：quality / balanced / speed）",
                other
            ))),
        }
    }

    /// 将档位输出为稳定字符串，供展示与持久化。
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quality => "quality",
            Self::Balanced => "balanced",
            Self::Speed => "speed",
        }
    }
}

/// 上传目标。
///
/// 车辆图与横幅图走不同端点，服务端的二次缩放策略也不同
/// （车辆图限宽 1024，横幅图裁成 1920x1080）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadTarget {
    Bike,
    Hero,
}

impl UploadTarget {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(target: &str) -> Result<Self, ImageError> {
        match target.trim().to_lowercase().as_str() {
            "bike" => Ok(Self::Bike),
            "hero" => Ok(Self::Hero),
            other => Err(ImageError::InvalidFormat(format!(
                "未知上传目标：{}（可选：bike / hero）",
                other
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bike => "bike",
            Self::Hero => "hero",
        }
    }

    /// 上传端点路径（相对 `endpoint_base`）。
    pub fn upload_path(self) -> &'static str {
        match self {
            Self::Bike => "/api/upload-image-bike",
            Self::Hero => "/api/upload-image-hero",
        }
    }

    /// 裁剪框宽高比。
    pub fn aspect(self) -> f64 {
        match self {
            Self::Bike => 4.0 / 3.0,
            Self::Hero => 16.0 / 9.0,
        }
    }
}

/// 删除端点路径（相对 `endpoint_base`）。
pub const DELETE_IMAGE_PATH: &str = "/api/delete-image";

impl PipelineConfig {
    /// 基于当前参数反推压缩档位。
    pub fn infer_compression_profile(&self) -> CompressionProfile {
        if self.max_dimension >= 1600 && self.quality >= 0.9 {
            return CompressionProfile::Quality;
        }

        if self.max_dimension <= 640 || self.quality <= 0.7 {
            return CompressionProfile::Speed;
        }

        CompressionProfile::Balanced
    }

    /// 应用指定压缩档位到实际参数。
    pub fn apply_compression_profile(&mut self, profile: CompressionProfile) {
        match profile {
            CompressionProfile::Quality => {
                self.max_dimension = 1600;
                self.quality = 0.92;
                self.resize_filter = FilterType::CatmullRom;
            }
            CompressionProfile::Balanced => {
                self.max_dimension = 800;
                self.quality = 0.8;
                self.resize_filter = FilterType::Triangle;
            }
            CompressionProfile::Speed => {
                self.max_dimension = 640;
                self.quality = 0.7;
                self.resize_filter = FilterType::Nearest;
            }
        }
    }

    /// 校验参数组合是否可用。
    pub fn validate(&self) -> Result<(), ImageError> {
        if !(self.quality > 0.0 && self.quality <= 1.0) {
            return Err(ImageError::InvalidFormat(format!(
                "quality 必须在 (0, 1] 之间：{}",
                self.quality
            )));
        }
        if self.max_dimension == 0 {
            return Err(ImageError::InvalidFormat("max_dimension 不能为 0".to_string()));
        }
        if !(self.min_zoom >= 1.0 && self.min_zoom <= self.max_zoom) {
            return Err(ImageError::InvalidFormat(format!(
                "缩放范围无效：{}~{}",
                self.min_zoom, self.max_zoom
            )));
        }
        if !(1..=120).contains(&self.connect_timeout) {
            return Err(ImageError::InvalidFormat("connect_timeout 必须在 1~120 秒之间".to_string()));
        }
        if !(1..=600).contains(&self.request_timeout) {
            return Err(ImageError::InvalidFormat("request_timeout 必须在 1~600 秒之间".to_string()));
        }
        if self.endpoint_base.trim().is_empty() {
            return Err(ImageError::InvalidFormat("endpoint_base 不能为空".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_balanced_and_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.infer_compression_profile(), CompressionProfile::Balanced);
        assert_eq!(config.padding, 300);
        assert_eq!(config.preview_debounce_ms, 300);
    }

    #[test]
    fn profile_apply_and_infer_agree() {
        let mut config = PipelineConfig::default();
        for profile in [
            CompressionProfile::Quality,
            CompressionProfile::Speed,
            CompressionProfile::Balanced,
        ] {
            config.apply_compression_profile(profile);
            assert_eq!(config.infer_compression_profile(), profile);
        }
    }

    #[test]
    fn profile_parser_rejects_unknown() {
        assert!(matches!(
            CompressionProfile::from_str("ultra"),
            Err(ImageError::InvalidFormat(_))
        ));
        assert_eq!(CompressionProfile::from_str(" SPEED ").ok(), Some(CompressionProfile::Speed));
    }

    #[test]
    fn upload_target_maps_endpoint_and_aspect() {
        let hero = UploadTarget::from_str("hero").expect("hero should parse");
        assert_eq!(hero.upload_path(), "/api/upload-image-hero");
        assert!((hero.aspect() - 16.0 / 9.0).abs() < f64::EPSILON);
        assert_eq!(UploadTarget::Bike.upload_path(), "/api/upload-image-bike");
    }

    #[test]
    fn validate_rejects_bad_quality() {
        let mut config = PipelineConfig::default();
        config.quality = 0.0;
        assert!(matches!(config.validate(), Err(ImageError::InvalidFormat(_))));
        config.quality = 1.5;
        assert!(matches!(config.validate(), Err(ImageError::InvalidFormat(_))));
    }
}
