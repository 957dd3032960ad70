use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, params};

use super::KeyValueStore;
use crate::media::ImageError;

/// SQLite 存储，单表 `kv(key TEXT PRIMARY KEY, value TEXT NOT NULL)`。
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, ImageError> {
        let conn = Connection::open(path)
            .map_err(|e| ImageError::Storage(format!("打开数据库失败: {}", e)))?;
        log::info!("数据库路径: {}", path.display());
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, ImageError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ImageError::Storage(format!("打开内存数据库失败: {}", e)))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, ImageError> {
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             CREATE TABLE IF NOT EXISTS kv (
                 key TEXT PRIMARY KEY,
                 value TEXT NOT NULL
             );",
        )
        .map_err(|e| ImageError::Storage(format!("初始化 kv 表失败: {}", e)))?;

        Ok(Self { conn: Mutex::new(conn) })
    }

    fn with_conn<T>(&self, op: impl FnOnce(&Connection) -> Result<T, ImageError>) -> Result<T, ImageError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ImageError::Storage(format!("获取数据库锁失败: {}", e)))?;
        op(&conn)
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, ImageError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
                .optional()
                .map_err(|e| ImageError::Storage(format!("查询键 '{}' 失败: {}", key, e)))
        })
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ImageError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .map_err(|e| ImageError::Storage(format!("写入键 '{}' 失败: {}", key, e)))?;
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> Result<(), ImageError> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM kv WHERE key = ?1", params![key])
                .map_err(|e| ImageError::Storage(format!("删除键 '{}' 失败: {}", key, e)))?;
            Ok(())
        })
    }
}
