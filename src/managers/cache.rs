//! Key-value cache manager.

use std::sync::Arc;

use serde_json::Value;

use crate::adapter::CacheAdapter;
use crate::error::{ClientError, Result};
use crate::metadata::CacheDescriptor;

#[derive(Clone)]
pub struct CacheManager {
    cache: CacheDescriptor,
    adapter: Arc<dyn CacheAdapter>,
    env_id: String,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("cache", &self.cache)
            .field("env_id", &self.env_id)
            .finish_non_exhaustive()
    }
}

impl CacheManager {
    pub(crate) fn new(
        cache: CacheDescriptor,
        adapter: Arc<dyn CacheAdapter>,
        env_id: String,
    ) -> Self {
        CacheManager {
            cache,
            adapter,
            env_id,
        }
    }

    pub fn name(&self) -> &str {
        &self.cache.name
    }

    /// Environment-scoped key when the cache requests unique naming.
    fn scoped_key(&self, key: &str) -> String {
        if self.cache.assign_unique_name {
            format!("{}.{}.{key}", self.env_id, self.cache.iid)
        } else {
            key.to_string()
        }
    }

    fn check_key(key: &str) -> Result<()> {
        if key.trim().is_empty() {
            return Err(ClientError::MissingInputParameter(
                "The cache key needs to be provided".to_string(),
            ));
        }
        Ok(())
    }

    fn check_ttl(ttl_ms: Option<u64>) -> Result<()> {
        if ttl_ms == Some(0) {
            return Err(ClientError::InvalidValue(
                "The time-to-live needs to be a positive millisecond count".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Value> {
        Self::check_key(key)?;
        self.adapter
            .get_key_value(&self.cache, &self.scoped_key(key))
            .await
    }

    pub async fn set(&self, key: &str, value: Value, ttl_ms: Option<u64>) -> Result<()> {
        Self::check_key(key)?;
        Self::check_ttl(ttl_ms)?;
        self.adapter
            .set_key_value(&self.cache, &self.scoped_key(key), value, ttl_ms)
            .await
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        Self::check_key(key)?;
        self.adapter
            .delete_key(&self.cache, &self.scoped_key(key))
            .await
    }

    pub async fn increment(&self, key: &str, increment: i64, ttl_ms: Option<u64>) -> Result<Value> {
        Self::check_key(key)?;
        Self::check_ttl(ttl_ms)?;
        self.adapter
            .increment_key_value(&self.cache, &self.scoped_key(key), increment, ttl_ms)
            .await
    }

    pub async fn decrement(&self, key: &str, decrement: i64, ttl_ms: Option<u64>) -> Result<Value> {
        Self::check_key(key)?;
        Self::check_ttl(ttl_ms)?;
        self.adapter
            .decrement_key_value(&self.cache, &self.scoped_key(key), decrement, ttl_ms)
            .await
    }

    pub async fn expire(&self, key: &str, ttl_ms: u64) -> Result<()> {
        Self::check_key(key)?;
        Self::check_ttl(Some(ttl_ms))?;
        self.adapter
            .expire_key(&self.cache, &self.scoped_key(key), ttl_ms)
            .await
    }

    /// List keys matching a glob-style pattern, up to `count` entries.
    pub async fn list_keys(&self, pattern: &str, count: u64) -> Result<Value> {
        if pattern.trim().is_empty() {
            return Err(ClientError::MissingInputParameter(
                "The key pattern needs to be provided".to_string(),
            ));
        }
        if count == 0 {
            return Err(ClientError::InvalidValue(
                "The key count needs to be a positive integer".to_string(),
            ));
        }
        self.adapter.list_keys(&self.cache, pattern, count).await
    }
}
