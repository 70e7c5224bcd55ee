//! Shared fixtures for unit tests: a no-op database adapter and a sample
//! application schema.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::action::ActionDefinition;
use crate::adapter::{DatabaseAdapter, DatabaseMetadata, ModelMetadata, ReplicaSet};
use crate::database::Database;
use crate::dialect::Dialect;
use crate::error::Result;
use crate::schema::DatabaseDescriptor;

pub struct NoopAdapter {
    name: &'static str,
}

impl NoopAdapter {
    pub fn new() -> Arc<Self> {
        Arc::new(NoopAdapter { name: "noop" })
    }

    pub fn named(name: &'static str) -> Arc<Self> {
        Arc::new(NoopAdapter { name })
    }
}

#[async_trait]
impl DatabaseAdapter for NoopAdapter {
    fn driver_name(&self) -> &str {
        self.name
    }

    async fn begin_transaction(&self, _db: &DatabaseMetadata) -> Result<()> {
        Ok(())
    }

    async fn commit_transaction(&self, _db: &DatabaseMetadata) -> Result<()> {
        Ok(())
    }

    async fn rollback_transaction(&self, _db: &DatabaseMetadata) -> Result<()> {
        Ok(())
    }

    async fn create_one(
        &self,
        _db: &DatabaseMetadata,
        _model: &ModelMetadata,
        _action: &ActionDefinition,
    ) -> Result<Value> {
        Ok(Value::Null)
    }

    async fn create_many(
        &self,
        _db: &DatabaseMetadata,
        _model: &ModelMetadata,
        _action: &ActionDefinition,
    ) -> Result<Value> {
        Ok(Value::Null)
    }

    async fn find_by_id(
        &self,
        _db: &DatabaseMetadata,
        _model: &ModelMetadata,
        _action: &ActionDefinition,
    ) -> Result<Value> {
        Ok(Value::Null)
    }

    async fn find_one(
        &self,
        _db: &DatabaseMetadata,
        _model: &ModelMetadata,
        _action: &ActionDefinition,
    ) -> Result<Value> {
        Ok(Value::Null)
    }

    async fn find_many(
        &self,
        _db: &DatabaseMetadata,
        _model: &ModelMetadata,
        _action: &ActionDefinition,
    ) -> Result<Value> {
        Ok(Value::Null)
    }

    async fn delete_by_id(
        &self,
        _db: &DatabaseMetadata,
        _model: &ModelMetadata,
        _action: &ActionDefinition,
    ) -> Result<Value> {
        Ok(Value::Null)
    }

    async fn delete_one(
        &self,
        _db: &DatabaseMetadata,
        _model: &ModelMetadata,
        _action: &ActionDefinition,
    ) -> Result<Value> {
        Ok(Value::Null)
    }

    async fn delete_many(
        &self,
        _db: &DatabaseMetadata,
        _model: &ModelMetadata,
        _action: &ActionDefinition,
    ) -> Result<Value> {
        Ok(Value::Null)
    }

    async fn update_by_id(
        &self,
        _db: &DatabaseMetadata,
        _model: &ModelMetadata,
        _action: &ActionDefinition,
    ) -> Result<Value> {
        Ok(Value::Null)
    }

    async fn update_one(
        &self,
        _db: &DatabaseMetadata,
        _model: &ModelMetadata,
        _action: &ActionDefinition,
    ) -> Result<Value> {
        Ok(Value::Null)
    }

    async fn update_many(
        &self,
        _db: &DatabaseMetadata,
        _model: &ModelMetadata,
        _action: &ActionDefinition,
    ) -> Result<Value> {
        Ok(Value::Null)
    }

    async fn aggregate(
        &self,
        _db: &DatabaseMetadata,
        _model: &ModelMetadata,
        _action: &ActionDefinition,
    ) -> Result<Value> {
        Ok(Value::Null)
    }

    async fn search_text(
        &self,
        _db: &DatabaseMetadata,
        _model: &ModelMetadata,
        _action: &ActionDefinition,
    ) -> Result<Value> {
        Ok(Value::Null)
    }
}

/// Sample application schema used across the builder tests: a `users` model
/// with nested objects, lists, and a reference to `publishers`.
pub fn sample_descriptor(dialect: Dialect) -> DatabaseDescriptor {
    serde_json::from_value(json!({
        "name": "main",
        "iid": "db_main",
        "type": dialect,
        "models": [
            {
                "name": "users",
                "iid": "mdl_users",
                "type": "model",
                "fields": [
                    { "name": "_id", "type": "id", "creator": "system", "required": true },
                    { "name": "email", "type": "email", "required": true },
                    {
                        "name": "name",
                        "type": "text",
                        "text": { "maxLength": 40, "searchable": true }
                    },
                    { "name": "isPublic", "type": "boolean" },
                    { "name": "age", "type": "integer" },
                    { "name": "balance", "type": "decimal" },
                    {
                        "name": "createdAt",
                        "type": "createdAt",
                        "creator": "system",
                        "defaultValue": "$$NOW"
                    },
                    {
                        "name": "updatedAt",
                        "type": "updatedAt",
                        "creator": "system",
                        "defaultValue": "$$NOW"
                    },
                    { "name": "createdBy", "type": "createdBy", "creator": "system" },
                    { "name": "tags", "type": "basic-values-list" },
                    {
                        "name": "profile",
                        "type": "object",
                        "object": { "iid": "mdl_profile" }
                    },
                    {
                        "name": "addresses",
                        "type": "object-list",
                        "objectList": { "iid": "mdl_addresses" }
                    },
                    {
                        "name": "publisher",
                        "type": "reference",
                        "reference": { "iid": "mdl_publishers" }
                    },
                    { "name": "slug", "type": "text", "immutable": true }
                ]
            },
            {
                "name": "profile",
                "iid": "mdl_profile",
                "type": "object",
                "fields": [
                    { "name": "age", "type": "integer" },
                    { "name": "bio", "type": "text" }
                ]
            },
            {
                "name": "addresses",
                "iid": "mdl_addresses",
                "type": "object-list",
                "fields": [
                    { "name": "street", "type": "text", "required": true },
                    { "name": "city", "type": "text" }
                ]
            },
            {
                "name": "publishers",
                "iid": "mdl_publishers",
                "type": "model",
                "fields": [
                    { "name": "_id", "type": "id", "creator": "system", "required": true },
                    { "name": "name", "type": "text" },
                    { "name": "country", "type": "text" }
                ]
            }
        ]
    }))
    .unwrap()
}

pub fn sample_database(dialect: Dialect) -> Arc<Database> {
    let descriptor = sample_descriptor(dialect);
    Database::new(&descriptor, "env1", ReplicaSet::new(NoopAdapter::new())).unwrap()
}
