//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 流水线内部使用 `ImageError`，应用边界（CLI、设置文件、数据目录）
//! 再包一层 `AppError`，避免各处 `.map_err(|e| e.to_string())`。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为 `ImageError` / `std::io::Error` 提供 `From` 转换，无需手动 map。
//! - 实现 `Serialize` 将错误序列化为字符串，供 JSON 输出。

use serde::Serialize;

use crate::media::ImageError;

/// 应用级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 图片流水线错误（解码 / 压缩 / 上传 / 清理）
    #[error("{0}")]
    Image(#[from] ImageError),

    /// 文件系统 I/O 错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),

    /// 数据目录或持久化存储不可用
    #[error("存储不可用: {0}")]
    Storage(String),

    /// 设置文件或命令行参数无效
    #[error("配置错误: {0}")]
    Config(String),
}

/// 将错误序列化为人类可读的字符串。
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_plain_string() {
        let err = AppError::from(ImageError::Upload("Failed to upload image".into()));
        let json = serde_json::to_string(&err).expect("serialize");
        assert_eq!(json, "\"上传错误：Failed to upload image\"");
    }
}
