//! In-process cache backend with per-key expiry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{CacheBackend, Result};
use crate::clock::Clock;

struct Entry {
    value: String,
    expire_at: DateTime<Utc>,
}

/// Key/value map shared between clones. Keys vanish once the clock reaches
/// their expiry, like they would on Redis.
#[derive(Clone)]
pub struct MemoryBackend {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    clock: Arc<dyn Clock>,
}

impl MemoryBackend {
    /// Create a new [`MemoryBackend`].
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| entry.expire_at > now);
        entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn set(
        &self,
        entries: &[(String, String)],
        expire_at: DateTime<Utc>,
    ) -> Result<()> {
        let now = self.clock.now();
        let mut map = self.entries.lock().await;
        // Keys never read again would otherwise stay forever.
        map.retain(|_, entry| entry.expire_at > now);
        for (key, value) in entries {
            map.insert(
                key.clone(),
                Entry {
                    value: value.clone(),
                    expire_at,
                },
            );
        }

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = self.clock.now();
        let mut map = self.entries.lock().await;

        match map.get(key) {
            Some(entry) if entry.expire_at > now => Ok(Some(entry.value.clone())),
            Some(_) => {
                map.remove(key);
                Ok(None)
            },
            None => Ok(None),
        }
    }

    async fn exists(&self, keys: &[String]) -> Result<bool> {
        let now = self.clock.now();
        let map = self.entries.lock().await;

        Ok(keys.iter().all(|key| {
            map.get(key).is_some_and(|entry| entry.expire_at > now)
        }))
    }

    async fn delete(&self, keys: &[String]) -> Result<()> {
        let mut map = self.entries.lock().await;
        for key in keys {
            map.remove(key);
        }

        Ok(())
    }
}
