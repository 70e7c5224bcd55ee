//! End-to-end tests driving the public API against a recording adapter.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};

use polystore::adapter::{DatabaseAdapter, DatabaseMetadata, ModelMetadata, ReplicaSet};
use polystore::managers::model::{AggregateOptions, FindOptions, UpdateOptions};
use polystore::metadata::{AppManifest, FileMetadataStore};
use polystore::schema::DatabaseDescriptor;
use polystore::{ActionDefinition, AdapterRegistry, Client, ClientError, Database};

/// Adapter double that records every call with its lowered definition.
#[derive(Default)]
struct RecordingAdapter {
    calls: Mutex<Vec<(String, Value)>>,
    fail_with: Option<String>,
}

impl RecordingAdapter {
    fn new() -> Arc<Self> {
        Arc::new(RecordingAdapter::default())
    }

    fn failing(message: &str) -> Arc<Self> {
        Arc::new(RecordingAdapter {
            calls: Mutex::new(Vec::new()),
            fail_with: Some(message.to_string()),
        })
    }

    fn record(&self, method: &str, action: &ActionDefinition) -> polystore::Result<Value> {
        let lowered = serde_json::to_value(action).expect("definition serializes");
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), lowered));
        match &self.fail_with {
            Some(message) => Err(ClientError::Adapter(message.clone())),
            None => Ok(Value::Null),
        }
    }

    fn last_call(&self) -> (String, Value) {
        self.calls.lock().unwrap().last().cloned().expect("a call was recorded")
    }

    fn transaction_log(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[async_trait]
impl DatabaseAdapter for RecordingAdapter {
    fn driver_name(&self) -> &str {
        "recording"
    }

    async fn begin_transaction(&self, _db: &DatabaseMetadata) -> polystore::Result<()> {
        self.calls.lock().unwrap().push(("begin".to_string(), Value::Null));
        Ok(())
    }

    async fn commit_transaction(&self, _db: &DatabaseMetadata) -> polystore::Result<()> {
        self.calls.lock().unwrap().push(("commit".to_string(), Value::Null));
        Ok(())
    }

    async fn rollback_transaction(&self, _db: &DatabaseMetadata) -> polystore::Result<()> {
        self.calls.lock().unwrap().push(("rollback".to_string(), Value::Null));
        Ok(())
    }

    async fn create_one(
        &self,
        _db: &DatabaseMetadata,
        _model: &ModelMetadata,
        action: &ActionDefinition,
    ) -> polystore::Result<Value> {
        self.record("createOne", action)
    }

    async fn create_many(
        &self,
        _db: &DatabaseMetadata,
        _model: &ModelMetadata,
        action: &ActionDefinition,
    ) -> polystore::Result<Value> {
        self.record("createMany", action)
    }

    async fn find_by_id(
        &self,
        _db: &DatabaseMetadata,
        _model: &ModelMetadata,
        action: &ActionDefinition,
    ) -> polystore::Result<Value> {
        self.record("findById", action)
    }

    async fn find_one(
        &self,
        _db: &DatabaseMetadata,
        _model: &ModelMetadata,
        action: &ActionDefinition,
    ) -> polystore::Result<Value> {
        self.record("findOne", action)
    }

    async fn find_many(
        &self,
        _db: &DatabaseMetadata,
        _model: &ModelMetadata,
        action: &ActionDefinition,
    ) -> polystore::Result<Value> {
        self.record("findMany", action)
    }

    async fn delete_by_id(
        &self,
        _db: &DatabaseMetadata,
        _model: &ModelMetadata,
        action: &ActionDefinition,
    ) -> polystore::Result<Value> {
        self.record("deleteById", action)
    }

    async fn delete_one(
        &self,
        _db: &DatabaseMetadata,
        _model: &ModelMetadata,
        action: &ActionDefinition,
    ) -> polystore::Result<Value> {
        self.record("deleteOne", action)
    }

    async fn delete_many(
        &self,
        _db: &DatabaseMetadata,
        _model: &ModelMetadata,
        action: &ActionDefinition,
    ) -> polystore::Result<Value> {
        self.record("deleteMany", action)
    }

    async fn update_by_id(
        &self,
        _db: &DatabaseMetadata,
        _model: &ModelMetadata,
        action: &ActionDefinition,
    ) -> polystore::Result<Value> {
        self.record("updateById", action)
    }

    async fn update_one(
        &self,
        _db: &DatabaseMetadata,
        _model: &ModelMetadata,
        action: &ActionDefinition,
    ) -> polystore::Result<Value> {
        self.record("updateOne", action)
    }

    async fn update_many(
        &self,
        _db: &DatabaseMetadata,
        _model: &ModelMetadata,
        action: &ActionDefinition,
    ) -> polystore::Result<Value> {
        self.record("updateMany", action)
    }

    async fn aggregate(
        &self,
        _db: &DatabaseMetadata,
        _model: &ModelMetadata,
        action: &ActionDefinition,
    ) -> polystore::Result<Value> {
        self.record("aggregate", action)
    }

    async fn search_text(
        &self,
        _db: &DatabaseMetadata,
        _model: &ModelMetadata,
        action: &ActionDefinition,
    ) -> polystore::Result<Value> {
        self.record("searchText", action)
    }
}

fn descriptor() -> DatabaseDescriptor {
    serde_json::from_value(json!({
        "name": "main",
        "iid": "db_main",
        "type": "MongoDB",
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
                        "text": { "maxLength": 64, "searchable": true }
                    },
                    { "name": "isPublic", "type": "boolean" },
                    { "name": "age", "type": "integer" },
                    { "name": "tags", "type": "basic-values-list" },
                    { "name": "country", "type": "text" },
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
                    {
                        "name": "profile",
                        "type": "object",
                        "object": { "iid": "mdl_profile" }
                    }
                ]
            },
            {
                "name": "profile",
                "iid": "mdl_profile",
                "type": "object",
                "fields": [
                    { "name": "age", "type": "integer" },
                    { "name": "street", "type": "text" }
                ]
            }
        ]
    }))
    .unwrap()
}

fn client_with(adapter: Arc<RecordingAdapter>) -> Client {
    let manifest = AppManifest {
        env_id: "env1".to_string(),
        databases: vec![descriptor()],
        ..Default::default()
    };
    let mut registry = AdapterRegistry::new();
    registry.register_database("main", adapter, Vec::new());
    Client::new(Arc::new(FileMetadataStore::new(manifest)), registry)
}

#[tokio::test]
async fn find_one_lowers_field_equality() {
    let adapter = RecordingAdapter::new();
    let client = client_with(Arc::clone(&adapter));
    let users = client.model("main", "users").unwrap();

    users
        .find_one(&json!({ "email": "a@b.c" }), FindOptions::default())
        .await
        .unwrap();

    let (method, definition) = adapter.last_call();
    assert_eq!(method, "findOne");
    assert_eq!(definition["where"], json!({ "$eq": ["email", "a@b.c"] }));
    assert_eq!(definition["method"], json!("findOne"));
}

#[tokio::test]
async fn find_many_carries_sort_and_limit() {
    let adapter = RecordingAdapter::new();
    let client = client_with(Arc::clone(&adapter));
    let users = client.model("main", "users").unwrap();

    users
        .find_many(
            &json!({ "$and": [
                { "profile.age": { "$gte": 18 } },
                { "isPublic": true }
            ]}),
            Some(FindOptions {
                sort: Some(json!({ "createdAt": "desc" })),
                limit: Some(50),
                ..Default::default()
            }),
        )
        .await
        .unwrap();

    let (method, definition) = adapter.last_call();
    assert_eq!(method, "findMany");
    assert_eq!(
        definition["where"],
        json!({ "$and": [
            { "$gte": ["profile.age", 18] },
            { "$eq": ["isPublic", true] }
        ]})
    );
    assert_eq!(definition["sort"][0]["fieldName"], json!("createdAt"));
    assert_eq!(definition["sort"][0]["order"], json!("desc"));
    assert_eq!(definition["limit"], json!(50));
}

#[tokio::test]
async fn update_by_id_splits_set_and_operator_entries() {
    let adapter = RecordingAdapter::new();
    let client = client_with(Arc::clone(&adapter));
    let users = client.model("main", "users").unwrap();

    users
        .update_by_id(
            &json!("507f1f77bcf86cd799439011"),
            &json!({ "age": { "$inc": 1 }, "profile.street": "Main" }),
            UpdateOptions::default(),
        )
        .await
        .unwrap();

    let (method, definition) = adapter.last_call();
    assert_eq!(method, "updateById");
    assert_eq!(
        definition["updateData"]["set"]["profile.street"],
        json!("Main")
    );
    // The only system field auto-refreshed on update.
    assert!(definition["updateData"]["set"]["updatedAt"].is_string());
    let others = definition["updateData"]["others"].as_array().unwrap();
    assert_eq!(others.len(), 1);
    assert_eq!(others[0]["fieldName"], json!("age"));
    assert_eq!(others[0]["type"], json!("$inc"));
    assert_eq!(others[0]["value"], json!(1));
}

#[tokio::test]
async fn update_one_with_push_each_and_array_filters() {
    let adapter = RecordingAdapter::new();
    let client = client_with(Arc::clone(&adapter));
    let users = client.model("main", "users").unwrap();

    users
        .update_one(
            &json!({ "_id": "507f1f77bcf86cd799439011" }),
            &json!({ "tags": { "$push": { "$each": ["a", "b"] } } }),
            UpdateOptions {
                array_filters: Some(json!([{ "elem.active": true }])),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let (_, definition) = adapter.last_call();
    let others = definition["updateData"]["others"].as_array().unwrap();
    assert_eq!(others[0]["type"], json!("$push"));
    assert_eq!(others[0]["value"], json!({ "$each": ["a", "b"] }));
    assert_eq!(
        definition["arrayFilters"],
        json!([{ "$eq": ["elem.active", true] }])
    );
}

#[tokio::test]
async fn aggregate_lowers_grouping_and_having() {
    let adapter = RecordingAdapter::new();
    let client = client_with(Arc::clone(&adapter));
    let users = client.model("main", "users").unwrap();

    users
        .aggregate(AggregateOptions {
            group_by: Some(json!("country")),
            computations: Some(json!([
                { "as": "n", "compute": { "$count": null } },
                { "as": "avgAge", "compute": { "$avg": "age" } }
            ])),
            having: Some(json!({ "n": { "$gt": 10 } })),
            sort: Some(json!({ "avgAge": "desc" })),
            ..Default::default()
        })
        .await
        .unwrap();

    let (method, definition) = adapter.last_call();
    assert_eq!(method, "aggregate");
    assert_eq!(
        definition["groupBy"],
        json!([{ "as": "country", "expression": "country" }])
    );
    assert_eq!(
        definition["computations"],
        json!([
            { "as": "n", "operator": "$count" },
            { "as": "avgAge", "operator": "$avg", "compute": "age" }
        ])
    );
    assert_eq!(definition["having"], json!({ "$gt": ["n", 10] }));
    assert_eq!(definition["groupSort"][0]["fieldName"], json!("avgAge"));
}

#[tokio::test]
async fn search_text_flows_through_with_limit() {
    let adapter = RecordingAdapter::new();
    let client = client_with(Arc::clone(&adapter));
    let users = client.model("main", "users").unwrap();

    users
        .search_text(
            "habeas corpus",
            FindOptions {
                limit: Some(25),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let (method, definition) = adapter.last_call();
    assert_eq!(method, "searchText");
    assert_eq!(definition["searchText"], json!("habeas corpus"));
    assert_eq!(definition["limit"], json!(25));
}

#[tokio::test]
async fn validation_errors_never_reach_the_adapter() {
    let adapter = RecordingAdapter::new();
    let client = client_with(Arc::clone(&adapter));
    let users = client.model("main", "users").unwrap();

    let err = users
        .create_one(&json!({ "name": "No Email" }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "validation_errors");
    assert!(adapter.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn adapter_errors_pass_through_unchanged() {
    let adapter = RecordingAdapter::failing("duplicate key value violates unique constraint");
    let client = client_with(Arc::clone(&adapter));
    let users = client.model("main", "users").unwrap();

    let err = users
        .find_one(&json!({ "email": "a@b.c" }), FindOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "adapter_error");
    assert!(err.to_string().contains("duplicate key"));
}

#[tokio::test]
async fn transactions_forward_to_the_read_write_adapter() {
    let adapter = RecordingAdapter::new();
    let client = client_with(Arc::clone(&adapter));
    let db = client.database("main").unwrap();

    db.begin_transaction().await.unwrap();
    db.commit_transaction().await.unwrap();
    db.begin_transaction().await.unwrap();
    db.rollback_transaction().await.unwrap();

    assert_eq!(
        adapter.transaction_log(),
        vec!["begin", "commit", "begin", "rollback"]
    );
}

#[tokio::test]
async fn read_replicas_serve_reads_when_requested() {
    let primary = RecordingAdapter::new();
    let replica = RecordingAdapter::new();
    let adapters = ReplicaSet::new(Arc::clone(&primary) as Arc<dyn DatabaseAdapter>)
        .with_replicas(vec![Arc::clone(&replica) as Arc<dyn DatabaseAdapter>])
        .with_picker(Box::new(|_| 0));
    let db = Database::new(&descriptor(), "env1", adapters).unwrap();

    let users = db.model("users").unwrap();
    users
        .find_many(
            &json!({}),
            Some(FindOptions {
                use_read_replica: true,
                ..Default::default()
            }),
        )
        .await
        .unwrap();
    assert!(primary.calls.lock().unwrap().is_empty());
    assert_eq!(replica.last_call().0, "findMany");

    // Writes ignore the replica flag.
    users
        .update_many(
            &json!({}),
            &json!({ "age": { "$inc": 1 } }),
            UpdateOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(primary.last_call().0, "updateMany");
}
