//! 数据目录管理模块
//!
//! # 设计思路
//!
//! 设置文件与待确认列表都放在同一个数据目录下，
//! 目录不存在时自动创建，避免上层判断。
//!
//! # 实现思路
//!
//! - 优先使用调用方指定的目录（命令行 `--data-dir`）。
//! - 未指定时回退到系统数据目录下的 `motorent-media` 子目录。
//! - 所有可能失败的操作均返回 `Result`，不使用 `expect()` / `unwrap()`。

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::AppError;
use crate::store::{JsonFileStore, KeyValueStore, SqliteStore};

const APP_DIR_NAME: &str = "motorent-media";
const SETTINGS_FILE: &str = "settings.json";
const JSON_STORE_FILE: &str = "pending_uploads.json";
const SQLITE_STORE_FILE: &str = "pending_uploads.db";

/// 待确认列表的存储后端。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Json,
    Sqlite,
}

impl StoreKind {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(kind: &str) -> Result<Self, AppError> {
        match kind.trim().to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(AppError::Config(format!("未知存储类型：{}（可选：json / sqlite）", other))),
        }
    }
}

/// 获取数据目录
///
/// # 返回
/// - `Ok(PathBuf)`：可用的数据目录
/// - `Err(AppError::Storage)`：无法获取或创建目录
pub fn resolve_data_dir(custom_dir: Option<&Path>) -> Result<PathBuf, AppError> {
    let dir = match custom_dir {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => dirs::data_dir()
            .ok_or_else(|| AppError::Storage("获取系统数据目录失败".to_string()))?
            .join(APP_DIR_NAME),
    };

    if !dir.exists() {
        fs::create_dir_all(&dir)
            .map_err(|e| AppError::Storage(format!("创建数据目录 '{}' 失败: {}", dir.display(), e)))?;
    }
    Ok(dir)
}

pub fn settings_path(data_dir: &Path) -> PathBuf {
    data_dir.join(SETTINGS_FILE)
}

/// 在数据目录下打开待确认列表的存储。
pub fn open_store(kind: StoreKind, data_dir: &Path) -> Result<Arc<dyn KeyValueStore>, AppError> {
    let store: Arc<dyn KeyValueStore> = match kind {
        StoreKind::Json => Arc::new(JsonFileStore::new(data_dir.join(JSON_STORE_FILE))),
        StoreKind::Sqlite => Arc::new(SqliteStore::open(&data_dir.join(SQLITE_STORE_FILE))?),
    };
    Ok(store)
}
