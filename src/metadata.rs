//! Application metadata: resource descriptors and the store that resolves
//! them by name.
//!
//! The engine never hardcodes deployment layout; a [`MetadataStore`]
//! supplies database, queue, task, storage, cache, and function descriptors
//! on demand, plus the environment id used to scope unique resource names.
//! [`FileMetadataStore`] is the concrete store for standalone deployments:
//! it deserializes an application manifest from a JSON file.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ClientError, Result};
use crate::schema::DatabaseDescriptor;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueDescriptor {
    pub name: String,
    pub iid: String,
    /// Default delivery delay applied when the caller does not set one.
    #[serde(default)]
    pub delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDescriptor {
    pub name: String,
    pub iid: String,
    #[serde(default)]
    pub cron_expression: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageDescriptor {
    pub name: String,
    pub iid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheDescriptor {
    pub name: String,
    pub iid: String,
    /// When set, cache keys are prefixed with `{envId}.{iid}.`.
    #[serde(default)]
    pub assign_unique_name: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDescriptor {
    pub name: String,
    pub iid: String,
}

/// Resolves resource descriptors by declared name.
pub trait MetadataStore: Send + Sync {
    fn get_database_by_name(&self, name: &str) -> Option<DatabaseDescriptor>;
    fn get_queue_by_name(&self, name: &str) -> Option<QueueDescriptor>;
    fn get_task_by_name(&self, name: &str) -> Option<TaskDescriptor>;
    fn get_storage_by_name(&self, name: &str) -> Option<StorageDescriptor>;
    fn get_cache_by_name(&self, name: &str) -> Option<CacheDescriptor>;
    fn get_function_by_name(&self, name: &str) -> Option<FunctionDescriptor>;

    /// Environment id used to form unique database names and cache key
    /// prefixes.
    fn get_env_id(&self) -> String;
}

/// The application manifest a standalone deployment ships.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppManifest {
    #[serde(default)]
    pub env_id: String,
    #[serde(default)]
    pub databases: Vec<DatabaseDescriptor>,
    #[serde(default)]
    pub queues: Vec<QueueDescriptor>,
    #[serde(default)]
    pub tasks: Vec<TaskDescriptor>,
    #[serde(default)]
    pub storages: Vec<StorageDescriptor>,
    #[serde(default)]
    pub caches: Vec<CacheDescriptor>,
    #[serde(default)]
    pub functions: Vec<FunctionDescriptor>,
}

/// Metadata store backed by a JSON application manifest.
#[derive(Debug, Clone)]
pub struct FileMetadataStore {
    manifest: AppManifest,
}

impl FileMetadataStore {
    pub fn new(manifest: AppManifest) -> Self {
        FileMetadataStore { manifest }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ClientError::InvalidValue(format!(
                "Cannot read application manifest '{}': {e}",
                path.display()
            ))
        })?;
        let manifest: AppManifest = serde_json::from_str(&raw).map_err(|e| {
            ClientError::InvalidValue(format!(
                "Cannot parse application manifest '{}': {e}",
                path.display()
            ))
        })?;
        Ok(FileMetadataStore { manifest })
    }

    pub fn manifest(&self) -> &AppManifest {
        &self.manifest
    }
}

impl MetadataStore for FileMetadataStore {
    fn get_database_by_name(&self, name: &str) -> Option<DatabaseDescriptor> {
        self.manifest
            .databases
            .iter()
            .find(|d| d.name == name)
            .cloned()
    }

    fn get_queue_by_name(&self, name: &str) -> Option<QueueDescriptor> {
        self.manifest.queues.iter().find(|q| q.name == name).cloned()
    }

    fn get_task_by_name(&self, name: &str) -> Option<TaskDescriptor> {
        self.manifest.tasks.iter().find(|t| t.name == name).cloned()
    }

    fn get_storage_by_name(&self, name: &str) -> Option<StorageDescriptor> {
        self.manifest
            .storages
            .iter()
            .find(|s| s.name == name)
            .cloned()
    }

    fn get_cache_by_name(&self, name: &str) -> Option<CacheDescriptor> {
        self.manifest.caches.iter().find(|c| c.name == name).cloned()
    }

    fn get_function_by_name(&self, name: &str) -> Option<FunctionDescriptor> {
        self.manifest
            .functions
            .iter()
            .find(|f| f.name == name)
            .cloned()
    }

    fn get_env_id(&self) -> String {
        self.manifest.env_id.clone()
    }
}
