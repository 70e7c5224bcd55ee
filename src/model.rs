//! Runtime model graph.
//!
//! A [`Model`] is a named, ordered collection of fields living in a database
//! of one dialect. Nested `object`/`object-list` fields carry their own
//! sub-models, built recursively from the database descriptor and registered
//! by dotted path.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use crate::dialect::Dialect;
use crate::error::{ClientError, Result, ValidationSink};
use crate::field::Field;
use crate::schema::{ModelDescriptor, ModelType};

/// Per-operation preparation state: the timestamp bound at the start of a
/// top-level create/update (shared by `"$$NOW"` defaults down the sub-model
/// chain), the active dialect, and the optional acting-user id stamped into
/// createdBy/updatedBy fields.
#[derive(Debug, Clone)]
pub struct PrepareContext {
    pub timestamp: DateTime<Utc>,
    pub dialect: Dialect,
    pub acting_user: Option<Value>,
}

impl PrepareContext {
    /// Bind a fresh timestamp; called at each top-level create/update entry.
    pub fn new(dialect: Dialect) -> Self {
        PrepareContext {
            timestamp: Utc::now(),
            dialect,
            acting_user: None,
        }
    }

    pub fn with_acting_user(mut self, acting_user: Option<Value>) -> Self {
        self.acting_user = acting_user;
        self
    }
}

#[derive(Debug)]
pub struct Model {
    name: String,
    schema: Option<String>,
    iid: String,
    model_type: ModelType,
    dialect: Dialect,
    /// Dotted path from the root model, including the root's name
    /// (`users.profile`); equals `name` for top-level models.
    hierarchy: String,
    fields: Vec<Arc<Field>>,
    by_name: HashMap<String, usize>,
}

impl Model {
    /// Build a top-level model and all of its nested sub-models. Every
    /// constructed model (this one included) is appended to `registry` for
    /// dotted-path registration by the database.
    pub fn build(
        desc: &ModelDescriptor,
        dialect: Dialect,
        by_iid: &HashMap<&str, &ModelDescriptor>,
        registry: &mut Vec<Arc<Model>>,
    ) -> Result<Arc<Model>> {
        Self::build_at(desc, dialect, by_iid, registry, desc.name.clone())
    }

    fn build_at(
        desc: &ModelDescriptor,
        dialect: Dialect,
        by_iid: &HashMap<&str, &ModelDescriptor>,
        registry: &mut Vec<Arc<Model>>,
        hierarchy: String,
    ) -> Result<Arc<Model>> {
        // Field query paths are relative to the root model, so the root's
        // own name is not part of the prefix.
        let path_prefix = hierarchy
            .split_once('.')
            .map(|(_, rest)| rest.to_string())
            .unwrap_or_default();

        let mut fields = Vec::with_capacity(desc.fields.len());
        let mut by_name = HashMap::with_capacity(desc.fields.len());

        for field_desc in &desc.fields {
            let query_path = field_desc.query_path.clone().unwrap_or_else(|| {
                if path_prefix.is_empty() {
                    field_desc.name.clone()
                } else {
                    format!("{path_prefix}.{}", field_desc.name)
                }
            });

            let sub_model = match field_desc.field_type.as_str() {
                "object" | "object-list" => {
                    let config = if field_desc.field_type == "object" {
                        field_desc.object.as_ref()
                    } else {
                        field_desc.object_list.as_ref()
                    };
                    let config = config.ok_or_else(|| {
                        ClientError::InvalidValue(format!(
                            "Field '{}' does not declare its sub-model",
                            field_desc.name
                        ))
                    })?;
                    let sub_desc = by_iid.get(config.iid.as_str()).ok_or_else(|| {
                        ClientError::ModelNotFound(config.iid.clone())
                    })?;
                    // The descriptor's declared ancestor chain drives the
                    // registration path; the structural chain is the
                    // fallback when none is declared.
                    let sub_hierarchy = sub_desc
                        .parent_hierarchy
                        .clone()
                        .unwrap_or_else(|| format!("{hierarchy}.{}", field_desc.name));
                    Some(Self::build_at(
                        sub_desc,
                        dialect,
                        by_iid,
                        registry,
                        sub_hierarchy,
                    )?)
                }
                _ => None,
            };

            let field = Field::from_descriptor(field_desc, query_path, sub_model)?;
            by_name.insert(field_desc.name.clone(), fields.len());
            fields.push(field);
        }

        let model = Arc::new(Model {
            name: desc.name.clone(),
            schema: desc.schema.clone(),
            iid: desc.iid.clone(),
            model_type: desc.model_type,
            dialect,
            hierarchy,
            fields,
            by_name,
        });

        debug!(model = %model.name, path = %model.hierarchy, "registered model");
        registry.push(Arc::clone(&model));
        Ok(model)
    }

    /// Synthetic model hosting alias fields, used to re-parse group sorts
    /// and having conditions against group-by and computation aliases.
    pub fn synthetic(name: impl Into<String>, dialect: Dialect, fields: Vec<Arc<Field>>) -> Model {
        let by_name = fields
            .iter()
            .enumerate()
            .map(|(index, field)| (field.name().to_string(), index))
            .collect();
        let name = name.into();
        Model {
            hierarchy: name.clone(),
            name,
            schema: None,
            iid: String::new(),
            model_type: ModelType::Model,
            dialect,
            fields,
            by_name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn iid(&self) -> &str {
        &self.iid
    }

    pub fn model_type(&self) -> ModelType {
        self.model_type
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Dotted path from the root model, including the root's own name.
    pub fn hierarchy(&self) -> &str {
        &self.hierarchy
    }

    pub fn is_top_level(&self) -> bool {
        self.model_type == ModelType::Model
    }

    pub fn fields(&self) -> &[Arc<Field>] {
        &self.fields
    }

    pub fn get_field(&self, name: &str) -> Option<&Arc<Field>> {
        self.by_name.get(name).map(|index| &self.fields[*index])
    }

    /// True when any text or rich-text field is flagged searchable.
    pub fn has_search_index(&self) -> bool {
        self.fields.iter().any(|field| field.is_searchable())
    }

    /// Whether a missing object value still needs recursive preparation
    /// (some sub-field is required or carries a default).
    pub fn has_required_or_defaulted_fields(&self) -> bool {
        self.fields
            .iter()
            .any(|field| field.is_required() || field.default_value().is_some())
    }

    /// Validate and encode one record payload. Fields are visited in
    /// declaration order; failures accumulate in `sink` with `index`
    /// qualifying the record position in a multi-record create.
    pub fn prepare_field_values(
        &self,
        data: &Map<String, Value>,
        is_create: bool,
        sink: &mut ValidationSink,
        index: Option<usize>,
        ctx: &PrepareContext,
    ) -> Result<Map<String, Value>> {
        let mut processed = Map::new();
        for field in &self.fields {
            field.prepare(
                data.get(field.name()),
                &mut processed,
                sink,
                is_create,
                index,
                ctx,
            )?;
        }
        Ok(processed)
    }
}
