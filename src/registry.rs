//! Process-local registry of adapter instances.
//!
//! Deployments register one adapter per declared resource at startup; the
//! client resolves them by name when a manager is first requested.

use std::collections::HashMap;
use std::sync::Arc;

use crate::adapter::{
    CacheAdapter, DatabaseAdapter, FunctionAdapter, QueueAdapter, RealtimeAdapter, StorageAdapter,
    TaskAdapter,
};

/// The primary database adapter plus its read replicas.
#[derive(Clone)]
pub struct DatabaseAdapters {
    pub primary: Arc<dyn DatabaseAdapter>,
    pub replicas: Vec<Arc<dyn DatabaseAdapter>>,
}

#[derive(Default)]
pub struct AdapterRegistry {
    databases: HashMap<String, DatabaseAdapters>,
    storages: HashMap<String, Arc<dyn StorageAdapter>>,
    queues: HashMap<String, Arc<dyn QueueAdapter>>,
    tasks: HashMap<String, Arc<dyn TaskAdapter>>,
    caches: HashMap<String, Arc<dyn CacheAdapter>>,
    realtime: Option<Arc<dyn RealtimeAdapter>>,
    function_runner: Option<Arc<dyn FunctionAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        AdapterRegistry::default()
    }

    pub fn register_database(
        &mut self,
        name: impl Into<String>,
        primary: Arc<dyn DatabaseAdapter>,
        replicas: Vec<Arc<dyn DatabaseAdapter>>,
    ) -> &mut Self {
        self.databases
            .insert(name.into(), DatabaseAdapters { primary, replicas });
        self
    }

    pub fn register_storage(
        &mut self,
        name: impl Into<String>,
        adapter: Arc<dyn StorageAdapter>,
    ) -> &mut Self {
        self.storages.insert(name.into(), adapter);
        self
    }

    pub fn register_queue(
        &mut self,
        name: impl Into<String>,
        adapter: Arc<dyn QueueAdapter>,
    ) -> &mut Self {
        self.queues.insert(name.into(), adapter);
        self
    }

    pub fn register_task(
        &mut self,
        name: impl Into<String>,
        adapter: Arc<dyn TaskAdapter>,
    ) -> &mut Self {
        self.tasks.insert(name.into(), adapter);
        self
    }

    pub fn register_cache(
        &mut self,
        name: impl Into<String>,
        adapter: Arc<dyn CacheAdapter>,
    ) -> &mut Self {
        self.caches.insert(name.into(), adapter);
        self
    }

    pub fn register_realtime(&mut self, adapter: Arc<dyn RealtimeAdapter>) -> &mut Self {
        self.realtime = Some(adapter);
        self
    }

    pub fn register_function_runner(&mut self, adapter: Arc<dyn FunctionAdapter>) -> &mut Self {
        self.function_runner = Some(adapter);
        self
    }

    pub fn database(&self, name: &str) -> Option<DatabaseAdapters> {
        self.databases.get(name).cloned()
    }

    pub fn storage(&self, name: &str) -> Option<Arc<dyn StorageAdapter>> {
        self.storages.get(name).cloned()
    }

    pub fn queue(&self, name: &str) -> Option<Arc<dyn QueueAdapter>> {
        self.queues.get(name).cloned()
    }

    pub fn task(&self, name: &str) -> Option<Arc<dyn TaskAdapter>> {
        self.tasks.get(name).cloned()
    }

    pub fn cache(&self, name: &str) -> Option<Arc<dyn CacheAdapter>> {
        self.caches.get(name).cloned()
    }

    pub fn realtime(&self) -> Option<Arc<dyn RealtimeAdapter>> {
        self.realtime.clone()
    }

    pub fn function_runner(&self) -> Option<Arc<dyn FunctionAdapter>> {
        self.function_runner.clone()
    }
}
