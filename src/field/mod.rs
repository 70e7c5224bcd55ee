//! Typed model fields.
//!
//! A [`Field`] couples the shared descriptor data (name, path, ownership,
//! mutability, default) with a [`FieldKind`] carrying the kind-specific
//! configuration. Value preparation and encoding live in [`prepare`].

mod prepare;

pub use prepare::ValueError;

use std::sync::Arc;

use serde_json::Value;

use crate::error::{ClientError, Result};
use crate::expression::ReturnType;
use crate::model::Model;
use crate::schema::{Creator, FieldDescriptor};

/// Kind-specific configuration of a field.
#[derive(Debug, Clone)]
pub enum FieldKind {
    Id,
    Text {
        max_length: Option<usize>,
        searchable: bool,
    },
    RichText {
        searchable: bool,
    },
    EncryptedText {
        max_length: Option<usize>,
    },
    Email,
    Link,
    Phone,
    Boolean,
    Integer,
    Decimal,
    Monetary,
    CreatedAt,
    UpdatedAt,
    /// System reference stamped with the acting user on create.
    CreatedBy,
    /// System reference refreshed with the acting user on update.
    UpdatedBy,
    DateTime,
    Date,
    Time,
    Enum {
        values: Vec<String>,
    },
    GeoPoint,
    Binary,
    Json,
    Reference {
        model_iid: String,
    },
    BasicValuesList,
    Object {
        model: Arc<Model>,
    },
    ObjectList {
        model: Arc<Model>,
    },
    /// Synthetic field standing in for a join alias; no storage.
    Join {
        model: Arc<Model>,
    },
    /// Synthetic field for a free array-filter identifier; no storage.
    ArrayFilter,
}

#[derive(Debug)]
pub struct Field {
    name: String,
    query_path: String,
    creator: Creator,
    required: bool,
    immutable: bool,
    default: Option<Value>,
    kind: FieldKind,
}

impl Field {
    /// Build a field from its descriptor. `sub_model` must be supplied for
    /// `object` and `object-list` kinds and `None` otherwise.
    pub fn from_descriptor(
        desc: &FieldDescriptor,
        query_path: String,
        sub_model: Option<Arc<Model>>,
    ) -> Result<Arc<Field>> {
        let kind = match desc.field_type.as_str() {
            "id" => FieldKind::Id,
            "text" => {
                let config = desc.text.clone().unwrap_or_default();
                FieldKind::Text {
                    max_length: config.max_length,
                    searchable: config.searchable,
                }
            }
            "rich-text" => FieldKind::RichText {
                searchable: desc.rich_text.clone().unwrap_or_default().searchable,
            },
            "encrypted-text" => FieldKind::EncryptedText {
                max_length: desc.encrypted_text.clone().unwrap_or_default().max_length,
            },
            "email" => FieldKind::Email,
            "link" => FieldKind::Link,
            "phone" => FieldKind::Phone,
            "boolean" => FieldKind::Boolean,
            "integer" => FieldKind::Integer,
            "decimal" => FieldKind::Decimal,
            "monetary" => FieldKind::Monetary,
            "createdAt" => FieldKind::CreatedAt,
            "updatedAt" => FieldKind::UpdatedAt,
            "createdBy" => FieldKind::CreatedBy,
            "updatedBy" => FieldKind::UpdatedBy,
            "datetime" => FieldKind::DateTime,
            "date" => FieldKind::Date,
            "time" => FieldKind::Time,
            "enum" => FieldKind::Enum {
                values: desc.enum_config.clone().unwrap_or_default().values,
            },
            "geo-point" => FieldKind::GeoPoint,
            "binary" => FieldKind::Binary,
            "json" => FieldKind::Json,
            "reference" => {
                let config = desc.reference.as_ref().ok_or_else(|| {
                    ClientError::InvalidValue(format!(
                        "Reference field '{}' does not declare a referenced model",
                        desc.name
                    ))
                })?;
                FieldKind::Reference {
                    model_iid: config.iid.clone(),
                }
            }
            "basic-values-list" => FieldKind::BasicValuesList,
            "object" => FieldKind::Object {
                model: sub_model.clone().ok_or_else(|| {
                    ClientError::ModelNotFound(format!("sub-model of field '{}'", desc.name))
                })?,
            },
            "object-list" => FieldKind::ObjectList {
                model: sub_model.clone().ok_or_else(|| {
                    ClientError::ModelNotFound(format!("sub-model of field '{}'", desc.name))
                })?,
            },
            other => {
                return Err(ClientError::InvalidValue(format!(
                    "Field '{}' has unknown type '{other}'",
                    desc.name
                )));
            }
        };

        Ok(Arc::new(Field {
            name: desc.name.clone(),
            query_path,
            creator: desc.creator,
            required: desc.required,
            immutable: desc.immutable,
            default: desc.default_value.clone(),
            kind,
        }))
    }

    /// Synthetic field standing in for a join alias.
    pub fn join(alias: impl Into<String>, model: Arc<Model>) -> Arc<Field> {
        let alias = alias.into();
        Arc::new(Field {
            name: alias.clone(),
            query_path: alias,
            creator: Creator::System,
            required: false,
            immutable: false,
            default: None,
            kind: FieldKind::Join { model },
        })
    }

    /// Synthetic field for a free array-filter identifier.
    pub fn array_filter(name: impl Into<String>) -> Arc<Field> {
        let name = name.into();
        Arc::new(Field {
            name: name.clone(),
            query_path: name,
            creator: Creator::System,
            required: false,
            immutable: false,
            default: None,
            kind: FieldKind::ArrayFilter,
        })
    }

    /// Synthetic alias field used by the grouping model (group-by aliases
    /// resolve as text, computation aliases as integers).
    pub fn alias(name: impl Into<String>, kind: FieldKind) -> Arc<Field> {
        let name = name.into();
        Arc::new(Field {
            name: name.clone(),
            query_path: name,
            creator: Creator::User,
            required: false,
            immutable: false,
            default: None,
            kind,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn query_path(&self) -> &str {
        &self.query_path
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn creator(&self) -> Creator {
        self.creator
    }

    pub fn is_user_created(&self) -> bool {
        self.creator == Creator::User
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Read-only after create.
    pub fn is_read_only(&self) -> bool {
        self.immutable
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// The type tag used in action definitions and error messages.
    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            FieldKind::Id => "id",
            FieldKind::Text { .. } => "text",
            FieldKind::RichText { .. } => "rich-text",
            FieldKind::EncryptedText { .. } => "encrypted-text",
            FieldKind::Email => "email",
            FieldKind::Link => "link",
            FieldKind::Phone => "phone",
            FieldKind::Boolean => "boolean",
            FieldKind::Integer => "integer",
            FieldKind::Decimal => "decimal",
            FieldKind::Monetary => "monetary",
            FieldKind::CreatedAt => "createdAt",
            FieldKind::UpdatedAt => "updatedAt",
            FieldKind::CreatedBy => "createdBy",
            FieldKind::UpdatedBy => "updatedBy",
            FieldKind::DateTime => "datetime",
            FieldKind::Date => "date",
            FieldKind::Time => "time",
            FieldKind::Enum { .. } => "enum",
            FieldKind::GeoPoint => "geo-point",
            FieldKind::Binary => "binary",
            FieldKind::Json => "json",
            FieldKind::Reference { .. } => "reference",
            FieldKind::BasicValuesList => "basic-values-list",
            FieldKind::Object { .. } => "object",
            FieldKind::ObjectList { .. } => "object-list",
            FieldKind::Join { .. } => "join",
            FieldKind::ArrayFilter => "array-filter",
        }
    }

    /// Abstract type this field yields inside expressions.
    pub fn return_type(&self) -> ReturnType {
        match &self.kind {
            FieldKind::Id
            | FieldKind::Reference { .. }
            | FieldKind::CreatedBy
            | FieldKind::UpdatedBy => ReturnType::Id,
            FieldKind::Text { .. }
            | FieldKind::RichText { .. }
            | FieldKind::EncryptedText { .. }
            | FieldKind::Email
            | FieldKind::Link
            | FieldKind::Phone
            | FieldKind::Enum { .. } => ReturnType::Text,
            FieldKind::Boolean => ReturnType::Boolean,
            FieldKind::Integer | FieldKind::Decimal | FieldKind::Monetary => ReturnType::Number,
            FieldKind::CreatedAt | FieldKind::UpdatedAt | FieldKind::DateTime => {
                ReturnType::Datetime
            }
            FieldKind::Date => ReturnType::Date,
            FieldKind::Time => ReturnType::Time,
            FieldKind::GeoPoint => ReturnType::Geopoint,
            FieldKind::Binary => ReturnType::Binary,
            FieldKind::Json => ReturnType::Json,
            FieldKind::BasicValuesList | FieldKind::ObjectList { .. } => ReturnType::Array,
            FieldKind::Object { .. } | FieldKind::Join { .. } => ReturnType::Object,
            FieldKind::ArrayFilter => ReturnType::Any,
        }
    }

    /// Whether this field participates in the model's full-text search
    /// index.
    pub fn is_searchable(&self) -> bool {
        match &self.kind {
            FieldKind::Text { searchable, .. } | FieldKind::RichText { searchable } => *searchable,
            _ => false,
        }
    }

    /// The nested or joined model behind this field, if any.
    pub fn sub_model(&self) -> Option<&Arc<Model>> {
        match &self.kind {
            FieldKind::Object { model }
            | FieldKind::ObjectList { model }
            | FieldKind::Join { model } => Some(model),
            _ => None,
        }
    }

    /// The referenced top-level model's internal id for reference fields.
    pub fn reference_iid(&self) -> Option<&str> {
        match &self.kind {
            FieldKind::Reference { model_iid } => Some(model_iid),
            _ => None,
        }
    }

    /// Lists can take `$push`/`$pull`/`$pop`/`$shift` update operators.
    pub fn is_list(&self) -> bool {
        matches!(
            self.kind,
            FieldKind::BasicValuesList | FieldKind::ObjectList { .. }
        )
    }

    /// Numeric fields accept `$inc`/`$mul`/`$min`/`$max`.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self.kind,
            FieldKind::Integer | FieldKind::Decimal | FieldKind::Monetary
        )
    }

    /// Synthetic fields have no storage behind them.
    pub fn is_synthetic(&self) -> bool {
        matches!(self.kind, FieldKind::Join { .. } | FieldKind::ArrayFilter)
    }
}
