//! Bucket manager.

use std::sync::Arc;

use serde_json::Value;

use crate::adapter::StorageAdapter;
use crate::error::{ClientError, Result};
use crate::managers::file::FileManager;
use crate::metadata::StorageDescriptor;

#[derive(Clone)]
pub struct BucketManager {
    storage: StorageDescriptor,
    bucket: String,
    adapter: Arc<dyn StorageAdapter>,
}

impl BucketManager {
    pub(crate) fn new(
        storage: StorageDescriptor,
        bucket: String,
        adapter: Arc<dyn StorageAdapter>,
    ) -> Self {
        BucketManager {
            storage,
            bucket,
            adapter,
        }
    }

    pub fn name(&self) -> &str {
        &self.bucket
    }

    fn check_file_path(path: &str) -> Result<()> {
        if path.trim().is_empty() {
            return Err(ClientError::MissingInputParameter(
                "The file path needs to be provided".to_string(),
            ));
        }
        Ok(())
    }

    /// File-scoped manager; the file does not have to exist yet.
    pub fn file(&self, path: &str) -> Result<FileManager> {
        Self::check_file_path(path)?;
        Ok(FileManager::new(
            self.storage.clone(),
            self.bucket.clone(),
            path.to_string(),
            Arc::clone(&self.adapter),
        ))
    }

    pub async fn exists(&self) -> Result<bool> {
        self.adapter.bucket_exists(&self.storage, &self.bucket).await
    }

    pub async fn get_info(&self, detailed: bool) -> Result<Value> {
        self.adapter
            .get_bucket_info(&self.storage, &self.bucket, detailed)
            .await
    }

    pub async fn rename(&self, new_name: &str) -> Result<Value> {
        if new_name.trim().is_empty() {
            return Err(ClientError::MissingInputParameter(
                "The new bucket name needs to be provided".to_string(),
            ));
        }
        self.adapter
            .rename_bucket(&self.storage, &self.bucket, new_name)
            .await
    }

    /// Delete every file but keep the bucket.
    pub async fn empty(&self) -> Result<()> {
        self.adapter.empty_bucket(&self.storage, &self.bucket).await
    }

    pub async fn delete(&self) -> Result<()> {
        self.adapter.delete_bucket(&self.storage, &self.bucket).await
    }

    pub async fn make_public(&self) -> Result<Value> {
        self.adapter
            .make_bucket_public(&self.storage, &self.bucket)
            .await
    }

    pub async fn make_private(&self) -> Result<Value> {
        self.adapter
            .make_bucket_private(&self.storage, &self.bucket)
            .await
    }

    pub async fn set_tag(&self, key: &str, value: Value) -> Result<Value> {
        if key.trim().is_empty() {
            return Err(ClientError::MissingInputParameter(
                "The tag key needs to be provided".to_string(),
            ));
        }
        self.adapter
            .set_bucket_tag(&self.storage, &self.bucket, key, value)
            .await
    }

    pub async fn remove_tag(&self, key: &str) -> Result<Value> {
        if key.trim().is_empty() {
            return Err(ClientError::MissingInputParameter(
                "The tag key needs to be provided".to_string(),
            ));
        }
        self.adapter
            .remove_bucket_tag(&self.storage, &self.bucket, key)
            .await
    }

    pub async fn remove_all_tags(&self) -> Result<Value> {
        self.adapter
            .remove_all_bucket_tags(&self.storage, &self.bucket)
            .await
    }

    pub async fn update_info(
        &self,
        new_name: &str,
        is_public: bool,
        tags: Value,
    ) -> Result<Value> {
        if new_name.trim().is_empty() {
            return Err(ClientError::MissingInputParameter(
                "The new bucket name needs to be provided".to_string(),
            ));
        }
        self.adapter
            .update_bucket_info(&self.storage, &self.bucket, new_name, is_public, tags)
            .await
    }

    pub async fn delete_files(&self, file_paths: Vec<String>) -> Result<()> {
        if file_paths.is_empty() {
            return Err(ClientError::MissingInputParameter(
                "At least one file path needs to be provided".to_string(),
            ));
        }
        self.adapter
            .delete_bucket_files(&self.storage, &self.bucket, file_paths)
            .await
    }

    pub async fn list_files(&self, options: Value) -> Result<Value> {
        self.adapter
            .list_bucket_files(&self.storage, &self.bucket, options)
            .await
    }

    pub async fn upload_file(
        &self,
        path: &str,
        contents: Vec<u8>,
        options: Value,
    ) -> Result<Value> {
        Self::check_file_path(path)?;
        self.adapter
            .upload_file(&self.storage, &self.bucket, path, contents, options)
            .await
    }
}
