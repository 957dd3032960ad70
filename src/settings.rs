//! 设置文件
//!
//! `settings.json` 中的每个字段都是可选的，缺省字段沿用 `PipelineConfig::default()`。
//! 文件不存在或内容损坏时整体回退到默认配置，只记录告警。

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::media::{CleanupPolicy, CompressionProfile, PipelineConfig};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineSettings {
    pub endpoint_base: Option<String>,
    pub compression_profile: Option<String>,
    pub max_dimension: Option<u32>,
    pub quality: Option<f32>,
    pub padding: Option<u32>,
    pub preview_debounce_ms: Option<u64>,
    pub max_file_size: Option<u64>,
    pub connect_timeout: Option<u64>,
    pub request_timeout: Option<u64>,
    pub cleanup_policy: Option<CleanupPolicy>,
}

impl PipelineSettings {
    /// 把设置叠加到配置上：先套档位，再用显式数值覆盖。
    pub fn apply_to(&self, config: &mut PipelineConfig) -> Result<(), AppError> {
        if let Some(profile) = &self.compression_profile {
            config.apply_compression_profile(CompressionProfile::from_str(profile)?);
        }
        if let Some(base) = &self.endpoint_base {
            config.endpoint_base = base.clone();
        }
        if let Some(value) = self.max_dimension {
            config.max_dimension = value;
        }
        if let Some(value) = self.quality {
            config.quality = value;
        }
        if let Some(value) = self.padding {
            config.padding = value;
        }
        if let Some(value) = self.preview_debounce_ms {
            config.preview_debounce_ms = value;
        }
        if let Some(value) = self.max_file_size {
            config.max_file_size = value;
        }
        if let Some(value) = self.connect_timeout {
            config.connect_timeout = value;
        }
        if let Some(value) = self.request_timeout {
            config.request_timeout = value;
        }
        if let Some(policy) = self.cleanup_policy {
            config.cleanup_policy = policy;
        }

        config
            .validate()
            .map_err(|e| AppError::Config(format!("设置值无效: {}", e)))
    }
}

/// 读取设置文件；缺失或损坏时返回默认设置。
pub fn load_settings_from_path(path: &Path) -> PipelineSettings {
    if !path.exists() {
        return PipelineSettings::default();
    }

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            log::warn!("⚠️ 读取设置文件失败，使用默认设置: {}", err);
            return PipelineSettings::default();
        }
    };

    match serde_json::from_str::<PipelineSettings>(&content) {
        Ok(settings) => settings,
        Err(err) => {
            log::warn!("⚠️ 解析设置文件失败，使用默认设置: {}", err);
            PipelineSettings::default()
        }
    }
}

pub fn save_settings_to_path(path: &Path, settings: &PipelineSettings) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(settings)
        .map_err(|e| AppError::Storage(format!("序列化设置失败: {}", e)))?;
    fs::write(path, content)?;
    Ok(())
}
