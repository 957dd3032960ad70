//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 使用单一错误枚举承载图片链路中的所有错误来源，避免字符串拼接式错误处理。
//! 通过 `thiserror` 保持人类可读错误，同时让调用侧可按分支匹配。
//!
//! 实时预览链路上的错误只记录日志；提交链路（Done / 表单提交）上的错误
//! 原样返回给调用方，由调用方决定提示方式。

/// 图片处理统一错误类型。
///
/// 该类型会在应用层被上转为 `AppError`，最终以 `{code, stage, message}` 输出。
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    /// 输入不是可加载的图片。
    #[error("解码错误：{0}")]
    Decode(String),

    /// 编码器失败，本次提交必须中止。
    #[error("压缩错误：{0}")]
    Compression(String),

    /// 上传端点返回非 2xx 或网络失败。
    #[error("上传错误：{0}")]
    Upload(String),

    /// 孤儿图片清理失败（尽力而为，只记录日志）。
    #[error("清理错误：{0}")]
    Cleanup(String),

    #[error("格式错误：{0}")]
    InvalidFormat(String),

    #[error("资源限制：{0}")]
    ResourceLimit(String),

    #[error("文件错误：{0}")]
    FileSystem(String),

    /// 持久化键值存储读写失败。
    #[error("存储错误：{0}")]
    Storage(String),

    /// 会话已销毁或请求已被取消。
    #[error("已取消：{0}")]
    Cancelled(String),
}

impl ImageError {
    /// 稳定错误码，供 CLI / 前端做分支判断。
    pub fn code(&self) -> &'static str {
        match self {
            Self::Decode(_) => "E_DECODE",
            Self::Compression(_) => "E_COMPRESSION",
            Self::Upload(_) => "E_UPLOAD",
            Self::Cleanup(_) => "E_CLEANUP",
            Self::InvalidFormat(_) => "E_INVALID_FORMAT",
            Self::ResourceLimit(_) => "E_RESOURCE_LIMIT",
            Self::FileSystem(_) => "E_FILE_SYSTEM",
            Self::Storage(_) => "E_STORAGE",
            Self::Cancelled(_) => "E_CANCELLED",
        }
    }

    /// 出错所在的流水线阶段。
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Decode(_) | Self::InvalidFormat(_) | Self::ResourceLimit(_) => "decode",
            Self::FileSystem(_) => "load",
            Self::Compression(_) => "compress",
            Self::Upload(_) => "upload",
            Self::Cleanup(_) => "cleanup",
            Self::Storage(_) => "registry",
            Self::Cancelled(_) => "session",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_stages_are_stable() {
        let err = ImageError::Upload("HTTP 500".to_string());
        assert_eq!(err.code(), "E_UPLOAD");
        assert_eq!(err.stage(), "upload");

        let err = ImageError::Compression("encoder".to_string());
        assert_eq!(err.code(), "E_COMPRESSION");
        assert_eq!(err.stage(), "compress");
    }

    #[test]
    fn message_keeps_endpoint_text() {
        let err = ImageError::Upload("Only image uploads are allowed.".to_string());
        assert!(err.to_string().contains("Only image uploads are allowed."));
    }
}
