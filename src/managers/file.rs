//! File manager.

use std::sync::Arc;

use serde_json::Value;

use crate::adapter::StorageAdapter;
use crate::error::{ClientError, Result};
use crate::metadata::StorageDescriptor;

#[derive(Clone)]
pub struct FileManager {
    storage: StorageDescriptor,
    bucket: String,
    path: String,
    adapter: Arc<dyn StorageAdapter>,
}

impl FileManager {
    pub(crate) fn new(
        storage: StorageDescriptor,
        bucket: String,
        path: String,
        adapter: Arc<dyn StorageAdapter>,
    ) -> Self {
        FileManager {
            storage,
            bucket,
            path,
            adapter,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub async fn exists(&self) -> Result<bool> {
        self.adapter
            .file_exists(&self.storage, &self.bucket, &self.path)
            .await
    }

    pub async fn get_info(&self) -> Result<Value> {
        self.adapter
            .get_file_info(&self.storage, &self.bucket, &self.path)
            .await
    }

    pub async fn delete(&self) -> Result<()> {
        self.adapter
            .delete_file(&self.storage, &self.bucket, &self.path)
            .await
    }

    pub async fn make_public(&self) -> Result<Value> {
        self.adapter
            .make_file_public(&self.storage, &self.bucket, &self.path)
            .await
    }

    pub async fn make_private(&self) -> Result<Value> {
        self.adapter
            .make_file_private(&self.storage, &self.bucket, &self.path)
            .await
    }

    /// Read the whole file contents.
    pub async fn read(&self) -> Result<Vec<u8>> {
        self.adapter
            .create_file_read_stream(&self.storage, &self.bucket, &self.path)
            .await
    }

    pub async fn set_tag(&self, key: &str, value: Value) -> Result<Value> {
        if key.trim().is_empty() {
            return Err(ClientError::MissingInputParameter(
                "The tag key needs to be provided".to_string(),
            ));
        }
        self.adapter
            .set_file_tag(&self.storage, &self.bucket, &self.path, key, value)
            .await
    }

    pub async fn remove_tag(&self, key: &str) -> Result<Value> {
        if key.trim().is_empty() {
            return Err(ClientError::MissingInputParameter(
                "The tag key needs to be provided".to_string(),
            ));
        }
        self.adapter
            .remove_file_tag(&self.storage, &self.bucket, &self.path, key)
            .await
    }

    pub async fn remove_all_tags(&self) -> Result<Value> {
        self.adapter
            .remove_all_file_tags(&self.storage, &self.bucket, &self.path)
            .await
    }

    pub async fn copy_to(&self, to_path: &str) -> Result<Value> {
        if to_path.trim().is_empty() {
            return Err(ClientError::MissingInputParameter(
                "The destination path needs to be provided".to_string(),
            ));
        }
        self.adapter
            .copy_file_to(&self.storage, &self.bucket, &self.path, to_path)
            .await
    }

    pub async fn move_to(&self, to_path: &str) -> Result<Value> {
        if to_path.trim().is_empty() {
            return Err(ClientError::MissingInputParameter(
                "The destination path needs to be provided".to_string(),
            ));
        }
        self.adapter
            .move_file_to(&self.storage, &self.bucket, &self.path, to_path)
            .await
    }

    /// Replace the contents, keeping path and metadata.
    pub async fn replace(&self, contents: Vec<u8>, options: Value) -> Result<Value> {
        self.adapter
            .replace_file(&self.storage, &self.bucket, &self.path, contents, options)
            .await
    }

    pub async fn update_info(
        &self,
        new_path: &str,
        is_public: bool,
        tags: Value,
    ) -> Result<Value> {
        if new_path.trim().is_empty() {
            return Err(ClientError::MissingInputParameter(
                "The new file path needs to be provided".to_string(),
            ));
        }
        self.adapter
            .update_file_info(
                &self.storage,
                &self.bucket,
                &self.path,
                new_path,
                is_public,
                tags,
            )
            .await
    }
}
