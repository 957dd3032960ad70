//! 持久化键值存储模块
//!
//! # 设计思路
//!
//! 待确认上传列表需要跨进程、跨会话保留，但它只是尽力而为的清理辅助账本，
//! 不需要事务语义。这里抽象出最小的 `KeyValueStore` 接口，
//! 由调用方注入具体实现，测试中可直接换成内存实现。
//!
//! # 实现
//!
//! | 实现 | 用途 |
//! |------|------|
//! | [`MemoryStore`] | 单元测试 / 一次性进程 |
//! | [`JsonFileStore`] | 单个 JSON 文件，整体重写（临时文件 + rename） |
//! | [`SqliteStore`] | `kv` 表，适合与其它本地数据共存 |

use std::sync::Arc;

use crate::media::ImageError;

mod json_file;
mod memory;
mod sqlite;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// 字符串键值存储。
///
/// 所有方法都是同步的：值很小，且调用方只做整体读改写。
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, ImageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), ImageError>;
    fn remove(&self, key: &str) -> Result<(), ImageError>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<String>, ImageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ImageError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), ImageError> {
        (**self).remove(key)
    }
}
