//! Adapter traits: the boundary between the query engine and the backends.
//!
//! The engine validates and compiles; adapters execute. One trait per
//! resource kind, all object-safe and `Send + Sync` so deployments can plug
//! driver-backed implementations behind `Arc`s. Adapter errors pass through
//! the engine unchanged.

use async_trait::async_trait;
use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::action::ActionDefinition;
use crate::dialect::Dialect;
use crate::error::Result;
use crate::metadata::{
    CacheDescriptor, FunctionDescriptor, QueueDescriptor, StorageDescriptor, TaskDescriptor,
};

/// Database identity handed to database adapters with every call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseMetadata {
    /// Effective (environment-scoped) database name.
    pub name: String,
    pub iid: String,
    pub dialect: Dialect,
}

/// Model identity handed to database adapters with every call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMetadata {
    pub name: String,
    pub iid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Dotted path from the root model (equals `name` for top-level models).
    pub hierarchy: String,
}

/// Executes compiled actions against one database deployment.
///
/// Results come back as plain JSON: an object, a list, a count wrapped as
/// `{"count": n}`, or `null`.
#[async_trait]
pub trait DatabaseAdapter: Send + Sync {
    /// Name of the underlying driver, for diagnostics.
    fn driver_name(&self) -> &str;

    async fn begin_transaction(&self, db: &DatabaseMetadata) -> Result<()>;
    async fn commit_transaction(&self, db: &DatabaseMetadata) -> Result<()>;
    async fn rollback_transaction(&self, db: &DatabaseMetadata) -> Result<()>;

    async fn create_one(
        &self,
        db: &DatabaseMetadata,
        model: &ModelMetadata,
        action: &ActionDefinition,
    ) -> Result<Value>;

    async fn create_many(
        &self,
        db: &DatabaseMetadata,
        model: &ModelMetadata,
        action: &ActionDefinition,
    ) -> Result<Value>;

    async fn find_by_id(
        &self,
        db: &DatabaseMetadata,
        model: &ModelMetadata,
        action: &ActionDefinition,
    ) -> Result<Value>;

    async fn find_one(
        &self,
        db: &DatabaseMetadata,
        model: &ModelMetadata,
        action: &ActionDefinition,
    ) -> Result<Value>;

    async fn find_many(
        &self,
        db: &DatabaseMetadata,
        model: &ModelMetadata,
        action: &ActionDefinition,
    ) -> Result<Value>;

    async fn delete_by_id(
        &self,
        db: &DatabaseMetadata,
        model: &ModelMetadata,
        action: &ActionDefinition,
    ) -> Result<Value>;

    async fn delete_one(
        &self,
        db: &DatabaseMetadata,
        model: &ModelMetadata,
        action: &ActionDefinition,
    ) -> Result<Value>;

    async fn delete_many(
        &self,
        db: &DatabaseMetadata,
        model: &ModelMetadata,
        action: &ActionDefinition,
    ) -> Result<Value>;

    async fn update_by_id(
        &self,
        db: &DatabaseMetadata,
        model: &ModelMetadata,
        action: &ActionDefinition,
    ) -> Result<Value>;

    async fn update_one(
        &self,
        db: &DatabaseMetadata,
        model: &ModelMetadata,
        action: &ActionDefinition,
    ) -> Result<Value>;

    async fn update_many(
        &self,
        db: &DatabaseMetadata,
        model: &ModelMetadata,
        action: &ActionDefinition,
    ) -> Result<Value>;

    async fn aggregate(
        &self,
        db: &DatabaseMetadata,
        model: &ModelMetadata,
        action: &ActionDefinition,
    ) -> Result<Value>;

    async fn search_text(
        &self,
        db: &DatabaseMetadata,
        model: &ModelMetadata,
        action: &ActionDefinition,
    ) -> Result<Value>;
}

/// Index picker used for read-replica selection; injectable so replay tests
/// are deterministic.
pub type ReplicaPicker = Box<dyn Fn(usize) -> usize + Send + Sync>;

/// A read-write primary adapter plus its read replicas.
pub struct ReplicaSet {
    primary: Arc<dyn DatabaseAdapter>,
    replicas: Vec<Arc<dyn DatabaseAdapter>>,
    picker: ReplicaPicker,
}

impl ReplicaSet {
    pub fn new(primary: Arc<dyn DatabaseAdapter>) -> Self {
        ReplicaSet {
            primary,
            replicas: Vec::new(),
            picker: Box::new(|len| rand::rng().random_range(0..len)),
        }
    }

    pub fn with_replicas(mut self, replicas: Vec<Arc<dyn DatabaseAdapter>>) -> Self {
        self.replicas = replicas;
        self
    }

    /// Replace the random index picker (deterministic tests).
    pub fn with_picker(mut self, picker: ReplicaPicker) -> Self {
        self.picker = picker;
        self
    }

    /// The read-write primary; all writes and transactions go here.
    pub fn read_write(&self) -> &Arc<dyn DatabaseAdapter> {
        &self.primary
    }

    /// A uniformly random replica, or the primary when none are configured.
    pub fn read(&self) -> &Arc<dyn DatabaseAdapter> {
        if self.replicas.is_empty() {
            &self.primary
        } else {
            let index = (self.picker)(self.replicas.len()).min(self.replicas.len() - 1);
            &self.replicas[index]
        }
    }

    pub fn has_replicas(&self) -> bool {
        !self.replicas.is_empty()
    }
}

impl std::fmt::Debug for ReplicaSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicaSet")
            .field("driver", &self.primary.driver_name())
            .field("replicas", &self.replicas.len())
            .finish()
    }
}

/// Message queue boundary.
#[async_trait]
pub trait QueueAdapter: Send + Sync {
    async fn send_message(
        &self,
        queue: &QueueDescriptor,
        payload: Value,
        delay_ms: u64,
    ) -> Result<Value>;

    async fn get_message_tracking_record(&self, queue_iid: &str, id: &str) -> Result<Value>;
}

/// Scheduled task boundary.
#[async_trait]
pub trait TaskAdapter: Send + Sync {
    async fn trigger_cron_job(&self, task: &TaskDescriptor) -> Result<Value>;

    async fn get_task_tracking_record(&self, task_iid: &str, id: &str) -> Result<Value>;
}

/// Key-value cache boundary.
#[async_trait]
pub trait CacheAdapter: Send + Sync {
    async fn get_key_value(&self, cache: &CacheDescriptor, key: &str) -> Result<Value>;

    async fn set_key_value(
        &self,
        cache: &CacheDescriptor,
        key: &str,
        value: Value,
        ttl_ms: Option<u64>,
    ) -> Result<()>;

    async fn delete_key(&self, cache: &CacheDescriptor, key: &str) -> Result<()>;

    async fn increment_key_value(
        &self,
        cache: &CacheDescriptor,
        key: &str,
        increment: i64,
        ttl_ms: Option<u64>,
    ) -> Result<Value>;

    async fn decrement_key_value(
        &self,
        cache: &CacheDescriptor,
        key: &str,
        decrement: i64,
        ttl_ms: Option<u64>,
    ) -> Result<Value>;

    async fn expire_key(&self, cache: &CacheDescriptor, key: &str, ttl_ms: u64) -> Result<()>;

    async fn list_keys(
        &self,
        cache: &CacheDescriptor,
        pattern: &str,
        count: u64,
    ) -> Result<Value>;
}

/// Object storage boundary: bucket-level and file-level operations.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    async fn create_bucket(
        &self,
        storage: &StorageDescriptor,
        name: &str,
        is_public: bool,
        tags: Value,
        user_id: Option<String>,
    ) -> Result<Value>;

    async fn list_buckets(&self, storage: &StorageDescriptor, options: Value) -> Result<Value>;

    async fn list_files(&self, storage: &StorageDescriptor, options: Value) -> Result<Value>;

    async fn get_stats(&self, storage: &StorageDescriptor) -> Result<Value>;

    async fn bucket_exists(&self, storage: &StorageDescriptor, bucket: &str) -> Result<bool>;

    async fn get_bucket_info(
        &self,
        storage: &StorageDescriptor,
        bucket: &str,
        detailed: bool,
    ) -> Result<Value>;

    async fn rename_bucket(
        &self,
        storage: &StorageDescriptor,
        bucket: &str,
        new_name: &str,
    ) -> Result<Value>;

    async fn empty_bucket(&self, storage: &StorageDescriptor, bucket: &str) -> Result<()>;

    async fn delete_bucket(&self, storage: &StorageDescriptor, bucket: &str) -> Result<()>;

    async fn make_bucket_public(&self, storage: &StorageDescriptor, bucket: &str)
    -> Result<Value>;

    async fn make_bucket_private(
        &self,
        storage: &StorageDescriptor,
        bucket: &str,
    ) -> Result<Value>;

    async fn set_bucket_tag(
        &self,
        storage: &StorageDescriptor,
        bucket: &str,
        key: &str,
        value: Value,
    ) -> Result<Value>;

    async fn remove_bucket_tag(
        &self,
        storage: &StorageDescriptor,
        bucket: &str,
        key: &str,
    ) -> Result<Value>;

    async fn remove_all_bucket_tags(
        &self,
        storage: &StorageDescriptor,
        bucket: &str,
    ) -> Result<Value>;

    async fn update_bucket_info(
        &self,
        storage: &StorageDescriptor,
        bucket: &str,
        new_name: &str,
        is_public: bool,
        tags: Value,
    ) -> Result<Value>;

    async fn delete_bucket_files(
        &self,
        storage: &StorageDescriptor,
        bucket: &str,
        file_paths: Vec<String>,
    ) -> Result<()>;

    async fn list_bucket_files(
        &self,
        storage: &StorageDescriptor,
        bucket: &str,
        options: Value,
    ) -> Result<Value>;

    async fn upload_file(
        &self,
        storage: &StorageDescriptor,
        bucket: &str,
        path: &str,
        contents: Vec<u8>,
        options: Value,
    ) -> Result<Value>;

    async fn file_exists(
        &self,
        storage: &StorageDescriptor,
        bucket: &str,
        path: &str,
    ) -> Result<bool>;

    async fn get_file_info(
        &self,
        storage: &StorageDescriptor,
        bucket: &str,
        path: &str,
    ) -> Result<Value>;

    async fn delete_file(
        &self,
        storage: &StorageDescriptor,
        bucket: &str,
        path: &str,
    ) -> Result<()>;

    async fn make_file_public(
        &self,
        storage: &StorageDescriptor,
        bucket: &str,
        path: &str,
    ) -> Result<Value>;

    async fn make_file_private(
        &self,
        storage: &StorageDescriptor,
        bucket: &str,
        path: &str,
    ) -> Result<Value>;

    async fn create_file_read_stream(
        &self,
        storage: &StorageDescriptor,
        bucket: &str,
        path: &str,
    ) -> Result<Vec<u8>>;

    async fn set_file_tag(
        &self,
        storage: &StorageDescriptor,
        bucket: &str,
        path: &str,
        key: &str,
        value: Value,
    ) -> Result<Value>;

    async fn remove_file_tag(
        &self,
        storage: &StorageDescriptor,
        bucket: &str,
        path: &str,
        key: &str,
    ) -> Result<Value>;

    async fn remove_all_file_tags(
        &self,
        storage: &StorageDescriptor,
        bucket: &str,
        path: &str,
    ) -> Result<Value>;

    async fn copy_file_to(
        &self,
        storage: &StorageDescriptor,
        bucket: &str,
        path: &str,
        to_path: &str,
    ) -> Result<Value>;

    async fn move_file_to(
        &self,
        storage: &StorageDescriptor,
        bucket: &str,
        path: &str,
        to_path: &str,
    ) -> Result<Value>;

    async fn replace_file(
        &self,
        storage: &StorageDescriptor,
        bucket: &str,
        path: &str,
        contents: Vec<u8>,
        options: Value,
    ) -> Result<Value>;

    async fn update_file_info(
        &self,
        storage: &StorageDescriptor,
        bucket: &str,
        path: &str,
        new_path: &str,
        is_public: bool,
        tags: Value,
    ) -> Result<Value>;
}

/// Realtime channel boundary.
#[async_trait]
pub trait RealtimeAdapter: Send + Sync {
    async fn broadcast(&self, event_name: &str, message: Value) -> Result<()>;

    async fn send(&self, channel: &str, event_name: &str, message: Value) -> Result<()>;

    async fn get_members(&self, channel: &str) -> Result<Value>;
}

/// Custom helper function boundary.
#[async_trait]
pub trait FunctionAdapter: Send + Sync {
    async fn run(&self, function: &FunctionDescriptor, args: Vec<Value>) -> Result<Value>;
}
