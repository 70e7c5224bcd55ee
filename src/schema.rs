//! Serde descriptors for databases, models, and fields.
//!
//! Applications declare their data model once with these descriptors
//! (usually deserialized from an application manifest); a
//! [`Database`](crate::database::Database) instantiates the runtime model
//! graph from them at open time.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dialect::Dialect;

/// Who owns a field's value lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Creator {
    User,
    System,
}

impl Default for Creator {
    fn default() -> Self {
        Creator::User
    }
}

/// Whether a model is a top-level collection/table or a nested sub-model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelType {
    #[serde(rename = "model")]
    Model,
    #[serde(rename = "object")]
    Object,
    #[serde(rename = "object-list")]
    ObjectList,
}

impl Default for ModelType {
    fn default() -> Self {
        ModelType::Model
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseDescriptor {
    pub name: String,
    pub iid: String,
    #[serde(rename = "type")]
    pub dialect: Dialect,
    /// When set (the default), the effective database name becomes
    /// `{envId}_{iid}` instead of the declared name.
    #[serde(default = "default_true")]
    pub assign_unique_name: bool,
    #[serde(default)]
    pub models: Vec<ModelDescriptor>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub name: String,
    /// Optional SQL schema the table lives in.
    #[serde(default)]
    pub schema: Option<String>,
    /// Stable internal id.
    pub iid: String,
    #[serde(rename = "type", default)]
    pub model_type: ModelType,
    /// Dotted ancestor chain for nested models (e.g. `users.profile`).
    #[serde(default)]
    pub parent_hierarchy: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    /// Dotted path to the root of the model graph. Derived from the model's
    /// parent hierarchy when absent.
    #[serde(default)]
    pub query_path: Option<String>,
    #[serde(default)]
    pub creator: Creator,
    #[serde(default)]
    pub required: bool,
    /// Read-only after create.
    #[serde(default)]
    pub immutable: bool,
    /// Literal default, or the sentinel `"$$NOW"` for temporal fields.
    #[serde(default)]
    pub default_value: Option<Value>,
    #[serde(default)]
    pub text: Option<TextConfig>,
    #[serde(default)]
    pub rich_text: Option<RichTextConfig>,
    #[serde(default)]
    pub encrypted_text: Option<EncryptedTextConfig>,
    #[serde(rename = "enum", default)]
    pub enum_config: Option<EnumConfig>,
    #[serde(default)]
    pub reference: Option<ReferenceConfig>,
    #[serde(default)]
    pub object: Option<SubModelConfig>,
    #[serde(default)]
    pub object_list: Option<SubModelConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextConfig {
    #[serde(default)]
    pub max_length: Option<usize>,
    #[serde(default)]
    pub searchable: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RichTextConfig {
    #[serde(default)]
    pub searchable: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedTextConfig {
    #[serde(default)]
    pub max_length: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnumConfig {
    #[serde(default)]
    pub values: Vec<String>,
}

/// Points at the internal id of the referenced top-level model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceConfig {
    pub iid: String,
}

/// Points at the internal id of the nested sub-model descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubModelConfig {
    pub iid: String,
}
