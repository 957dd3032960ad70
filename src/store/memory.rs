use std::collections::HashMap;
use std::sync::Mutex;

use super::KeyValueStore;
use crate::media::ImageError;

/// 进程内存储，进程退出即丢失。
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<T>(&self, op: impl FnOnce(&mut HashMap<String, String>) -> T) -> Result<T, ImageError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| ImageError::Storage(format!("获取内存存储锁失败: {}", e)))?;
        Ok(op(&mut entries))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, ImageError> {
        self.with_entries(|entries| entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ImageError> {
        self.with_entries(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), ImageError> {
        self.with_entries(|entries| {
            entries.remove(key);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").expect("get"), None);

        store.set("k", "v1").expect("set");
        store.set("k", "v2").expect("overwrite");
        assert_eq!(store.get("k").expect("get").as_deref(), Some("v2"));

        store.remove("k").expect("remove");
        store.remove("k").expect("remove missing key is fine");
        assert_eq!(store.get("k").expect("get"), None);
    }
}
