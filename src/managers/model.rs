//! Typed model façade.
//!
//! Each CRUD / aggregate / search call builds a fresh single-use
//! [`DbAction`], applies the caller's options, and executes it.

use std::sync::Arc;

use serde_json::Value;

use crate::action::{ConditionType, DbAction, Method};
use crate::database::Database;
use crate::error::{ClientError, Result};
use crate::model::Model;

/// Options shared by the read methods.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub select: Option<Vec<String>>,
    pub omit: Option<Vec<String>>,
    pub join: Option<Value>,
    pub sort: Option<Value>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    pub use_read_replica: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    pub join: Option<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    pub select: Option<Vec<String>>,
    pub omit: Option<Vec<String>>,
    pub join: Option<Value>,
    pub array_filters: Option<Value>,
}

/// Arguments of an `aggregate` call.
#[derive(Debug, Clone, Default)]
pub struct AggregateOptions {
    pub where_condition: Option<Value>,
    pub join: Option<Value>,
    pub group_by: Option<Value>,
    pub computations: Option<Value>,
    pub having: Option<Value>,
    pub sort: Option<Value>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    pub use_read_replica: bool,
}

#[derive(Debug, Clone)]
pub struct ModelManager {
    db: Arc<Database>,
    model: Arc<Model>,
    acting_user: Option<Value>,
}

impl ModelManager {
    pub(crate) fn new(db: Arc<Database>, model: Arc<Model>) -> Self {
        ModelManager {
            db,
            model,
            acting_user: None,
        }
    }

    pub fn name(&self) -> &str {
        self.model.name()
    }

    /// Attribute subsequent create/update calls to this user; the model's
    /// createdBy/updatedBy fields record the id.
    pub fn as_user(mut self, user_id: Value) -> Self {
        self.acting_user = Some(user_id);
        self
    }

    fn action(&self) -> Result<DbAction> {
        let mut action = DbAction::new(Arc::clone(&self.db), Arc::clone(&self.model));
        if let Some(user) = &self.acting_user {
            action.set_acting_user(user)?;
        }
        Ok(action)
    }

    fn apply_find_options(action: &mut DbAction, options: &FindOptions) -> Result<()> {
        // The join list must be registered before any path resolution.
        if let Some(join) = &options.join {
            action.set_join(join)?;
        }
        if let Some(select) = &options.select {
            action.set_select(select)?;
        }
        if let Some(omit) = &options.omit {
            action.set_omit(omit)?;
        }
        if let Some(sort) = &options.sort {
            action.set_sort(sort)?;
        }
        if let Some(skip) = options.skip {
            action.set_skip(skip)?;
        }
        if let Some(limit) = options.limit {
            action.set_limit(limit)?;
        }
        action.set_read_replica(options.use_read_replica)?;
        Ok(())
    }

    pub async fn create_one(&self, data: &Value) -> Result<Value> {
        let mut action = self.action()?;
        action.set_method(Method::CreateOne)?;
        action.set_create_data(data)?;
        action.execute().await
    }

    pub async fn create_many(&self, data: &Value) -> Result<Value> {
        if !data.is_array() {
            return Err(ClientError::InvalidValue(
                "Multi-record creates need an array of objects".to_string(),
            ));
        }
        let mut action = self.action()?;
        action.set_method(Method::CreateMany)?;
        action.set_create_data(data)?;
        action.execute().await
    }

    pub async fn find_by_id(&self, id: &Value, options: FindOptions) -> Result<Value> {
        let mut action = self.action()?;
        action.set_method(Method::FindById)?;
        action.set_id(id)?;
        Self::apply_find_options(&mut action, &options)?;
        action.execute().await
    }

    pub async fn find_one(&self, condition: &Value, options: FindOptions) -> Result<Value> {
        let mut action = self.action()?;
        action.set_method(Method::FindOne)?;
        if let Some(join) = &options.join {
            action.set_join(join)?;
        }
        action.set_where(condition, ConditionType::Query)?;
        Self::apply_find_options(&mut action, &FindOptions { join: None, ..options })?;
        action.execute().await
    }

    /// All arguments besides the condition are optional.
    pub async fn find_many(
        &self,
        condition: &Value,
        options: Option<FindOptions>,
    ) -> Result<Value> {
        let options = options.unwrap_or_default();
        let mut action = self.action()?;
        action.set_method(Method::FindMany)?;
        if let Some(join) = &options.join {
            action.set_join(join)?;
        }
        action.set_where(condition, ConditionType::Query)?;
        Self::apply_find_options(&mut action, &FindOptions { join: None, ..options })?;
        action.execute().await
    }

    pub async fn delete_by_id(&self, id: &Value) -> Result<Value> {
        let mut action = self.action()?;
        action.set_method(Method::DeleteById)?;
        action.set_id(id)?;
        action.execute().await
    }

    pub async fn delete_one(&self, condition: &Value, options: DeleteOptions) -> Result<Value> {
        let mut action = self.action()?;
        action.set_method(Method::DeleteOne)?;
        if let Some(join) = &options.join {
            action.set_join(join)?;
        }
        action.set_where(condition, ConditionType::Query)?;
        action.execute().await
    }

    pub async fn delete_many(&self, condition: &Value, options: DeleteOptions) -> Result<Value> {
        let mut action = self.action()?;
        action.set_method(Method::DeleteMany)?;
        if let Some(join) = &options.join {
            action.set_join(join)?;
        }
        action.set_where(condition, ConditionType::Query)?;
        action.execute().await
    }

    pub async fn update_by_id(
        &self,
        id: &Value,
        updates: &Value,
        options: UpdateOptions,
    ) -> Result<Value> {
        let mut action = self.action()?;
        action.set_method(Method::UpdateById)?;
        action.set_id(id)?;
        self.apply_update_options(&mut action, updates, &options)?;
        action.execute().await
    }

    pub async fn update_one(
        &self,
        condition: &Value,
        updates: &Value,
        options: UpdateOptions,
    ) -> Result<Value> {
        let mut action = self.action()?;
        action.set_method(Method::UpdateOne)?;
        if let Some(join) = &options.join {
            action.set_join(join)?;
        }
        action.set_where(condition, ConditionType::Query)?;
        self.apply_update_options(&mut action, updates, &options)?;
        action.execute().await
    }

    pub async fn update_many(
        &self,
        condition: &Value,
        updates: &Value,
        options: UpdateOptions,
    ) -> Result<Value> {
        let mut action = self.action()?;
        action.set_method(Method::UpdateMany)?;
        if let Some(join) = &options.join {
            action.set_join(join)?;
        }
        action.set_where(condition, ConditionType::Query)?;
        self.apply_update_options(&mut action, updates, &options)?;
        action.execute().await
    }

    fn apply_update_options(
        &self,
        action: &mut DbAction,
        updates: &Value,
        options: &UpdateOptions,
    ) -> Result<()> {
        action.set_updates(updates)?;
        if let Some(select) = &options.select {
            action.set_select(select)?;
        }
        if let Some(omit) = &options.omit {
            action.set_omit(omit)?;
        }
        if let Some(filters) = &options.array_filters {
            action.set_array_filters(filters)?;
        }
        Ok(())
    }

    pub async fn aggregate(&self, options: AggregateOptions) -> Result<Value> {
        if options.group_by.is_none() && options.computations.is_none() {
            return Err(ClientError::MissingInputParameter(
                "Aggregations need a 'groupBy' or 'computations' definition".to_string(),
            ));
        }
        let mut action = self.action()?;
        action.set_method(Method::Aggregate)?;
        if let Some(join) = &options.join {
            action.set_join(join)?;
        }
        if let Some(condition) = &options.where_condition {
            action.set_where(condition, ConditionType::Query)?;
        }
        if let Some(group_by) = &options.group_by {
            action.set_group_by(group_by)?;
        }
        if let Some(computations) = &options.computations {
            action.set_computations(computations)?;
        }
        if let Some(having) = &options.having {
            action.set_having(having)?;
        }
        if let Some(sort) = &options.sort {
            action.set_group_sort(sort)?;
        }
        if let Some(skip) = options.skip {
            action.set_skip(skip)?;
        }
        if let Some(limit) = options.limit {
            action.set_limit(limit)?;
        }
        action.set_read_replica(options.use_read_replica)?;
        action.execute().await
    }

    pub async fn search_text(&self, text: &str, options: FindOptions) -> Result<Value> {
        let mut action = self.action()?;
        action.set_method(Method::SearchText)?;
        action.set_search_text(text)?;
        Self::apply_find_options(&mut action, &options)?;
        action.execute().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::test_support::sample_database;
    use serde_json::json;

    fn users() -> ModelManager {
        let db = sample_database(Dialect::MongoDB);
        db.model("users").unwrap()
    }

    #[tokio::test]
    async fn create_one_validates_before_dispatch() {
        let manager = users();
        let err = manager.create_one(&json!({ "name": "No Email" })).await.unwrap_err();
        assert_eq!(err.code(), "validation_errors");

        let result = manager.create_one(&json!({ "email": "a@b.c" })).await.unwrap();
        assert_eq!(result, Value::Null);
    }

    #[tokio::test]
    async fn create_many_needs_an_array() {
        let manager = users();
        let err = manager
            .create_many(&json!({ "email": "a@b.c" }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_value");
    }

    #[tokio::test]
    async fn find_many_args_are_optional() {
        let manager = users();
        assert!(manager.find_many(&json!({}), None).await.is_ok());
        assert!(
            manager
                .find_many(
                    &json!({ "isPublic": true }),
                    Some(FindOptions {
                        limit: Some(10),
                        ..Default::default()
                    })
                )
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn acting_user_flows_through_the_facade() {
        let manager = users().as_user(json!("507f1f77bcf86cd799439011"));
        assert!(
            manager
                .create_one(&json!({ "email": "a@b.c" }))
                .await
                .is_ok()
        );
        assert!(
            manager
                .update_many(
                    &json!({}),
                    &json!({ "age": { "$inc": 1 } }),
                    UpdateOptions::default()
                )
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn aggregate_needs_grouping_or_computations() {
        let manager = users();
        let err = manager.aggregate(AggregateOptions::default()).await.unwrap_err();
        assert_eq!(err.code(), "missing_input_parameter");
    }

    #[tokio::test]
    async fn search_text_checks_the_model_index() {
        let db = sample_database(Dialect::MongoDB);
        let publishers = db.model("publishers").unwrap();
        let err = publishers
            .search_text("anything", FindOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_searchable_model");
    }
}
