//! Object storage manager.

use std::sync::Arc;

use serde_json::Value;

use crate::adapter::StorageAdapter;
use crate::error::{ClientError, Result};
use crate::managers::bucket::BucketManager;
use crate::metadata::StorageDescriptor;

#[derive(Clone)]
pub struct StorageManager {
    storage: StorageDescriptor,
    adapter: Arc<dyn StorageAdapter>,
}

impl std::fmt::Debug for StorageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageManager")
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}

impl StorageManager {
    pub(crate) fn new(storage: StorageDescriptor, adapter: Arc<dyn StorageAdapter>) -> Self {
        StorageManager { storage, adapter }
    }

    pub fn name(&self) -> &str {
        &self.storage.name
    }

    pub(crate) fn check_bucket_name(name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(ClientError::MissingInputParameter(
                "The bucket name needs to be provided".to_string(),
            ));
        }
        Ok(())
    }

    /// Bucket-scoped manager; the bucket does not have to exist yet.
    pub fn bucket(&self, name: &str) -> Result<BucketManager> {
        Self::check_bucket_name(name)?;
        Ok(BucketManager::new(
            self.storage.clone(),
            name.to_string(),
            Arc::clone(&self.adapter),
        ))
    }

    pub async fn create_bucket(
        &self,
        name: &str,
        is_public: bool,
        tags: Value,
        user_id: Option<String>,
    ) -> Result<Value> {
        Self::check_bucket_name(name)?;
        self.adapter
            .create_bucket(&self.storage, name, is_public, tags, user_id)
            .await
    }

    pub async fn list_buckets(&self, options: Value) -> Result<Value> {
        self.adapter.list_buckets(&self.storage, options).await
    }

    /// List files across buckets.
    pub async fn list_files(&self, options: Value) -> Result<Value> {
        self.adapter.list_files(&self.storage, options).await
    }

    /// Occupancy statistics of the whole storage.
    pub async fn get_stats(&self) -> Result<Value> {
        self.adapter.get_stats(&self.storage).await
    }
}
