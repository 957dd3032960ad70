use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::{Map, Value};

use super::KeyValueStore;
use crate::media::ImageError;

/// 单文件 JSON 存储：`{ "key": "value", ... }`。
///
/// 每次写入都整体重写文件，先写临时文件再 rename，避免写到一半留下半截 JSON。
/// 文件缺失视为空；内容损坏时记录告警并视为空。
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Map<String, Value>, ImageError> {
        if !self.path.exists() {
            return Ok(Map::new());
        }

        let content = fs::read_to_string(&self.path)
            .map_err(|e| ImageError::Storage(format!("读取存储文件 '{}' 失败: {}", self.path.display(), e)))?;

        match serde_json::from_str::<Map<String, Value>>(&content) {
            Ok(map) => Ok(map),
            Err(err) => {
                log::warn!("⚠️ 存储文件 '{}' 内容损坏，按空处理: {}", self.path.display(), err);
                Ok(Map::new())
            }
        }
    }

    fn save(&self, map: &Map<String, Value>) -> Result<(), ImageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .map_err(|e| ImageError::Storage(format!("创建存储目录失败: {}", e)))?;
            }
        }

        let content = serde_json::to_string_pretty(map)
            .map_err(|e| ImageError::Storage(format!("序列化存储内容失败: {}", e)))?;

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, content)
            .map_err(|e| ImageError::Storage(format!("写入临时文件失败: {}", e)))?;
        fs::rename(&tmp_path, &self.path)
            .map_err(|e| ImageError::Storage(format!("替换存储文件失败: {}", e)))?;
        Ok(())
    }

    fn update(&self, op: impl FnOnce(&mut Map<String, Value>)) -> Result<(), ImageError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| ImageError::Storage(format!("获取存储写锁失败: {}", e)))?;
        let mut map = self.load()?;
        op(&mut map);
        self.save(&map)
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, ImageError> {
        let map = self.load()?;
        Ok(map.get(key).and_then(|value| value.as_str()).map(str::to_string))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ImageError> {
        self.update(|map| {
            map.insert(key.to_string(), Value::String(value.to_string()));
        })
    }

    fn remove(&self, key: &str) -> Result<(), ImageError> {
        self.update(|map| {
            map.remove(key);
        })
    }
}
