//! # 命令层
//!
//! 命令函数只做入参适配与错误转换，业务逻辑全部在 `MediaService` 中。
//! 失败统一转成 `{code, stage, message}`，由 CLI 直接序列化输出。

use std::path::PathBuf;

use serde::Serialize;

use super::orphan::CleanupReport;
use super::service::{MediaService, SubmittedSummary};
use super::source::CropRegion;
use super::upload::ImageEndpoint;
use super::{ImageError, UploadTarget};
use crate::error::AppError;
use crate::store::KeyValueStore;

#[derive(Debug, Clone, Serialize)]
pub struct CommandError {
    pub code: &'static str,
    pub stage: &'static str,
    pub message: String,
}

impl From<ImageError> for CommandError {
    fn from(error: ImageError) -> Self {
        Self {
            code: error.code(),
            stage: error.stage(),
            message: error.to_string(),
        }
    }
}

impl From<AppError> for CommandError {
    fn from(error: AppError) -> Self {
        match error {
            AppError::Image(inner) => inner.into(),
            AppError::Io(_) => Self {
                code: "E_FILE_SYSTEM",
                stage: "load",
                message: error.to_string(),
            },
            AppError::Storage(_) => Self {
                code: "E_STORAGE",
                stage: "registry",
                message: error.to_string(),
            },
            AppError::Config(_) => Self {
                code: "E_CONFIG",
                stage: "config",
                message: error.to_string(),
            },
        }
    }
}

/// 单张图片的上传请求。
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub path: PathBuf,
    pub target: UploadTarget,
    /// 未指定时使用居中、1 倍缩放的默认裁剪框。
    pub region: Option<CropRegion>,
    /// 被替换的旧图存储路径。
    pub replace: Option<String>,
}

/// 读取本地图片 → 补边 → 裁剪 → 压缩 → 上传。
pub async fn upload_file<E, S>(
    service: &MediaService<E, S>,
    request: UploadRequest,
) -> Result<SubmittedSummary, CommandError>
where
    E: ImageEndpoint + 'static,
    S: KeyValueStore + 'static,
{
    let mut session = service.open_file(&request.path, request.target).await?;
    if let Some(region) = request.region {
        session.set_region(region)?;
    }

    let submitted = service.submit(&session, request.replace.as_deref()).await?;
    session.close();
    Ok(submitted.summary())
}

/// 回收不再被引用的已上传图片。
pub async fn cleanup_orphans<E, S>(
    service: &MediaService<E, S>,
    existing: Vec<String>,
) -> Result<CleanupReport, CommandError>
where
    E: ImageEndpoint + 'static,
    S: KeyValueStore + 'static,
{
    Ok(service.cleanup(&existing).await?)
}

pub fn list_pending<E, S>(service: &MediaService<E, S>) -> Result<Vec<String>, CommandError>
where
    E: ImageEndpoint + 'static,
    S: KeyValueStore + 'static,
{
    Ok(service.list_pending()?)
}

pub fn set_compression_profile<E, S>(service: &MediaService<E, S>, profile: &str) -> Result<String, CommandError>
where
    E: ImageEndpoint + 'static,
    S: KeyValueStore + 'static,
{
    service.set_compression_profile(profile)?;
    Ok(service.get_compression_profile()?)
}

pub fn get_compression_profile<E, S>(service: &MediaService<E, S>) -> Result<String, CommandError>
where
    E: ImageEndpoint + 'static,
    S: KeyValueStore + 'static,
{
    Ok(service.get_compression_profile()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_errors_map_to_stable_codes() {
        let err: CommandError = AppError::Image(ImageError::Upload("boom".into())).into();
        assert_eq!((err.code, err.stage), ("E_UPLOAD", "upload"));

        let err: CommandError = AppError::Config("bad".into()).into();
        assert_eq!((err.code, err.stage), ("E_CONFIG", "config"));
    }

    #[test]
    fn command_error_serializes_flat() {
        let err = CommandError::from(ImageError::Cancelled("x".into()));
        let json = serde_json::to_value(&err).expect("serialize");
        assert_eq!(json["code"], "E_CANCELLED");
        assert_eq!(json["stage"], "session");
    }
}
