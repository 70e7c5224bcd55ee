//! Top-level client façade.
//!
//! A [`Client`] resolves resource managers by name: metadata supplies the
//! descriptor, the registry supplies the adapter, and the constructed
//! resource is cached under `"<kind>-<name>"` until the cache is cleared.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::adapter::ReplicaSet;
use crate::database::Database;
use crate::error::{ClientError, Result};
use crate::managers::{
    CacheManager, FunctionManager, ModelManager, QueueManager, RealtimeManager, StorageManager,
    TaskManager,
};
use crate::metadata::MetadataStore;
use crate::registry::AdapterRegistry;

/// Resources that are expensive to construct are cached per name.
#[derive(Clone)]
enum CachedResource {
    Database(Arc<Database>),
    Storage(StorageManager),
    Queue(QueueManager),
    Task(TaskManager),
    Cache(CacheManager),
    Function(FunctionManager),
}

pub struct Client {
    metadata: Arc<dyn MetadataStore>,
    registry: AdapterRegistry,
    cache: Mutex<HashMap<String, CachedResource>>,
}

impl Client {
    pub fn new(metadata: Arc<dyn MetadataStore>, registry: AdapterRegistry) -> Self {
        Client {
            metadata,
            registry,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn env_id(&self) -> String {
        self.metadata.get_env_id()
    }

    fn cached(&self, key: &str) -> Option<CachedResource> {
        self.cache
            .lock()
            .expect("client cache mutex poisoned")
            .get(key)
            .cloned()
    }

    fn store(&self, key: String, resource: CachedResource) {
        self.cache
            .lock()
            .expect("client cache mutex poisoned")
            .insert(key, resource);
    }

    /// Drop every cached resource; the next lookups reconstruct them.
    pub fn clear_client_cache(&self) {
        debug!("clearing client resource cache");
        self.cache
            .lock()
            .expect("client cache mutex poisoned")
            .clear();
    }

    /// An opened database (models instantiated, adapters bound).
    pub fn database(&self, name: &str) -> Result<Arc<Database>> {
        let key = format!("database-{name}");
        if let Some(CachedResource::Database(db)) = self.cached(&key) {
            return Ok(db);
        }
        let descriptor = self
            .metadata
            .get_database_by_name(name)
            .ok_or_else(|| ClientError::DatabaseNotFound(name.to_string()))?;
        let adapters = self
            .registry
            .database(name)
            .ok_or_else(|| ClientError::AdapterNotFound(name.to_string()))?;
        let replica_set =
            ReplicaSet::new(adapters.primary).with_replicas(adapters.replicas);
        let db = Database::new(&descriptor, &self.metadata.get_env_id(), replica_set)?;
        self.store(key, CachedResource::Database(Arc::clone(&db)));
        Ok(db)
    }

    /// Convenience shorthand for `database(db)?.model(model)`.
    pub fn model(&self, database: &str, model: &str) -> Result<ModelManager> {
        self.database(database)?.model(model)
    }

    pub fn storage(&self, name: &str) -> Result<StorageManager> {
        let key = format!("storage-{name}");
        if let Some(CachedResource::Storage(manager)) = self.cached(&key) {
            return Ok(manager);
        }
        let descriptor = self
            .metadata
            .get_storage_by_name(name)
            .ok_or_else(|| ClientError::StorageNotFound(name.to_string()))?;
        let adapter = self
            .registry
            .storage(name)
            .ok_or_else(|| ClientError::AdapterNotFound(name.to_string()))?;
        let manager = StorageManager::new(descriptor, adapter);
        self.store(key, CachedResource::Storage(manager.clone()));
        Ok(manager)
    }

    pub fn queue(&self, name: &str) -> Result<QueueManager> {
        let key = format!("queue-{name}");
        if let Some(CachedResource::Queue(manager)) = self.cached(&key) {
            return Ok(manager);
        }
        let descriptor = self
            .metadata
            .get_queue_by_name(name)
            .ok_or_else(|| ClientError::QueueNotFound(name.to_string()))?;
        let adapter = self
            .registry
            .queue(name)
            .ok_or_else(|| ClientError::AdapterNotFound(name.to_string()))?;
        let manager = QueueManager::new(descriptor, adapter);
        self.store(key, CachedResource::Queue(manager.clone()));
        Ok(manager)
    }

    pub fn task(&self, name: &str) -> Result<TaskManager> {
        let key = format!("task-{name}");
        if let Some(CachedResource::Task(manager)) = self.cached(&key) {
            return Ok(manager);
        }
        let descriptor = self
            .metadata
            .get_task_by_name(name)
            .ok_or_else(|| ClientError::TaskNotFound(name.to_string()))?;
        let adapter = self
            .registry
            .task(name)
            .ok_or_else(|| ClientError::AdapterNotFound(name.to_string()))?;
        let manager = TaskManager::new(descriptor, adapter);
        self.store(key, CachedResource::Task(manager.clone()));
        Ok(manager)
    }

    pub fn cache(&self, name: &str) -> Result<CacheManager> {
        let key = format!("cache-{name}");
        if let Some(CachedResource::Cache(manager)) = self.cached(&key) {
            return Ok(manager);
        }
        let descriptor = self
            .metadata
            .get_cache_by_name(name)
            .ok_or_else(|| ClientError::CacheNotFound(name.to_string()))?;
        let adapter = self
            .registry
            .cache(name)
            .ok_or_else(|| ClientError::AdapterNotFound(name.to_string()))?;
        let manager = CacheManager::new(descriptor, adapter, self.metadata.get_env_id());
        self.store(key, CachedResource::Cache(manager.clone()));
        Ok(manager)
    }

    pub fn function(&self, name: &str) -> Result<FunctionManager> {
        let key = format!("function-{name}");
        if let Some(CachedResource::Function(manager)) = self.cached(&key) {
            return Ok(manager);
        }
        let descriptor = self
            .metadata
            .get_function_by_name(name)
            .ok_or_else(|| ClientError::FunctionNotFound(name.to_string()))?;
        let adapter = self
            .registry
            .function_runner()
            .ok_or_else(|| ClientError::AdapterNotFound(name.to_string()))?;
        let manager = FunctionManager::new(descriptor, adapter);
        self.store(key, CachedResource::Function(manager.clone()));
        Ok(manager)
    }

    pub fn realtime(&self) -> Result<RealtimeManager> {
        let adapter = self
            .registry
            .realtime()
            .ok_or_else(|| ClientError::AdapterNotFound("realtime".to_string()))?;
        Ok(RealtimeManager::new(adapter))
    }
}
