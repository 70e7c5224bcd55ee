//! A database deployment: model registry, dialect, adapters, transactions.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::adapter::{DatabaseMetadata, ReplicaSet};
use crate::dialect::{Dialect, DialectExt};
use crate::error::{ClientError, Result};
use crate::managers::model::ModelManager;
use crate::model::Model;
use crate::schema::{DatabaseDescriptor, ModelDescriptor, ModelType};

/// A database opened from its descriptor. Models (top-level and nested) are
/// instantiated eagerly and live for the database's lifetime.
#[derive(Debug)]
pub struct Database {
    name: String,
    effective_name: String,
    iid: String,
    dialect: Dialect,
    /// Models keyed by dotted path: top-level by name, sub-models by
    /// `parent.child` hierarchy.
    models: HashMap<String, Arc<Model>>,
    models_by_iid: HashMap<String, Arc<Model>>,
    adapters: ReplicaSet,
}

impl Database {
    pub fn new(
        descriptor: &DatabaseDescriptor,
        env_id: &str,
        adapters: ReplicaSet,
    ) -> Result<Arc<Database>> {
        let by_iid: HashMap<&str, &ModelDescriptor> = descriptor
            .models
            .iter()
            .map(|model| (model.iid.as_str(), model))
            .collect();

        let mut registry = Vec::new();
        for model_desc in &descriptor.models {
            if model_desc.model_type == ModelType::Model {
                Model::build(model_desc, descriptor.dialect, &by_iid, &mut registry)?;
            }
        }

        let mut models = HashMap::with_capacity(registry.len());
        let mut models_by_iid = HashMap::with_capacity(registry.len());
        for model in registry {
            models_by_iid.insert(model.iid().to_string(), Arc::clone(&model));
            models.insert(model.hierarchy().to_string(), model);
        }

        let effective_name = if descriptor.assign_unique_name {
            format!("{env_id}_{}", descriptor.iid)
        } else {
            descriptor.name.clone()
        };

        debug!(
            database = %descriptor.name,
            effective = %effective_name,
            dialect = %descriptor.dialect,
            models = models.len(),
            "opened database"
        );

        Ok(Arc::new(Database {
            name: descriptor.name.clone(),
            effective_name,
            iid: descriptor.iid.clone(),
            dialect: descriptor.dialect,
            models,
            models_by_iid,
            adapters,
        }))
    }

    /// Typed model façade for building and executing actions.
    pub fn model(self: &Arc<Self>, name: &str) -> Result<ModelManager> {
        let model = self.get_model(name)?;
        Ok(ModelManager::new(Arc::clone(self), model))
    }

    /// Look a model up by name (top-level) or dotted path (sub-model).
    pub fn get_model(&self, name: &str) -> Result<Arc<Model>> {
        self.models
            .get(name)
            .cloned()
            .ok_or_else(|| ClientError::ModelNotFound(name.to_string()))
    }

    pub fn get_model_by_iid(&self, iid: &str) -> Option<Arc<Model>> {
        self.models_by_iid.get(iid).cloned()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Environment-scoped name the adapter connects with.
    pub fn effective_name(&self) -> &str {
        &self.effective_name
    }

    pub fn iid(&self) -> &str {
        &self.iid
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn is_sql(&self) -> bool {
        self.dialect.is_sql()
    }

    pub fn adapters(&self) -> &ReplicaSet {
        &self.adapters
    }

    pub fn metadata(&self) -> DatabaseMetadata {
        DatabaseMetadata {
            name: self.effective_name.clone(),
            iid: self.iid.clone(),
            dialect: self.dialect,
        }
    }

    /// Transactions always run on the read-write adapter.
    pub async fn begin_transaction(&self) -> Result<()> {
        debug!(database = %self.name, "begin transaction");
        self.adapters
            .read_write()
            .begin_transaction(&self.metadata())
            .await
    }

    pub async fn commit_transaction(&self) -> Result<()> {
        debug!(database = %self.name, "commit transaction");
        self.adapters
            .read_write()
            .commit_transaction(&self.metadata())
            .await
    }

    pub async fn rollback_transaction(&self) -> Result<()> {
        debug!(database = %self.name, "rollback transaction");
        self.adapters
            .read_write()
            .rollback_transaction(&self.metadata())
            .await
    }
}
