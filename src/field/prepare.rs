//! Field value preparation: create/update policy and per-kind coercion.

use chrono::SecondsFormat;
use serde_json::{Map, Value, json};

use crate::crypto;
use crate::dialect::{Dialect, DialectExt, generate_id};
use crate::error::{ClientError, Result, ValidationCode, ValidationDetail, ValidationSink};
use crate::helpers;
use crate::model::PrepareContext;

use super::{Field, FieldKind};

/// Outcome of coercing a single raw value through a field.
#[derive(Debug)]
pub enum ValueError {
    /// Field-level validation failure, reported through the sink.
    Code(ValidationCode),
    /// Hard failure that aborts the whole operation.
    Fatal(ClientError),
}

impl From<ValidationCode> for ValueError {
    fn from(code: ValidationCode) -> Self {
        ValueError::Code(code)
    }
}

impl Field {
    /// Validate and encode this field's contribution to one record payload,
    /// appending failures to `sink`. `index` qualifies the record position
    /// in multi-record creates.
    pub fn prepare(
        &self,
        raw: Option<&Value>,
        processed: &mut Map<String, Value>,
        sink: &mut ValidationSink,
        is_create: bool,
        index: Option<usize>,
        ctx: &PrepareContext,
    ) -> Result<()> {
        if self.is_synthetic() {
            return Ok(());
        }
        if is_create {
            self.prepare_for_create(raw, processed, sink, index, ctx)
        } else {
            self.prepare_for_update(raw, processed, sink, index, ctx)
        }
    }

    fn prepare_for_create(
        &self,
        raw: Option<&Value>,
        processed: &mut Map<String, Value>,
        sink: &mut ValidationSink,
        index: Option<usize>,
        ctx: &PrepareContext,
    ) -> Result<()> {
        let value = raw.filter(|v| !v.is_null());

        let Some(value) = value else {
            if let Some(default) = self.default_value() {
                let default = default.clone();
                return self.apply_value(&default, processed, sink, index, ctx);
            }
            if self.is_required() && self.is_user_created() {
                sink.push(self.detail(ValidationCode::MissingRequiredFieldValue, index, None));
                return Ok(());
            }
            if self.is_required() {
                return self.apply_system_default(processed, sink, index, ctx);
            }
            match self.kind() {
                FieldKind::CreatedBy | FieldKind::UpdatedBy => {
                    return self.stamp_acting_user(processed, sink, index, ctx);
                }
                FieldKind::ObjectList { .. } | FieldKind::BasicValuesList => {
                    processed.insert(self.name().to_string(), json!([]));
                }
                FieldKind::Object { model } if model.has_required_or_defaulted_fields() => {
                    let empty = Map::new();
                    let nested = model.prepare_field_values(&empty, true, sink, index, ctx)?;
                    processed.insert(self.name().to_string(), Value::Object(nested));
                }
                _ => {}
            }
            return Ok(());
        };

        self.apply_value(value, processed, sink, index, ctx)
    }

    fn prepare_for_update(
        &self,
        raw: Option<&Value>,
        processed: &mut Map<String, Value>,
        sink: &mut ValidationSink,
        index: Option<usize>,
        ctx: &PrepareContext,
    ) -> Result<()> {
        if !self.is_user_created() {
            // Of the system fields, only updatedAt and updatedBy refresh on
            // update.
            match self.kind() {
                FieldKind::UpdatedAt => {
                    processed.insert(self.name().to_string(), encode_timestamp(ctx));
                }
                FieldKind::UpdatedBy => {
                    return self.stamp_acting_user(processed, sink, index, ctx);
                }
                _ => {}
            }
            return Ok(());
        }

        let Some(value) = raw else { return Ok(()) };

        // Immutable user fields are silently ignored on update.
        if self.is_read_only() {
            return Ok(());
        }

        if value.is_null() {
            if self.is_required() {
                sink.push(self.detail(ValidationCode::InvalidRequiredFieldValue, index, None));
            } else {
                // Explicit null unsets the value.
                processed.insert(self.name().to_string(), Value::Null);
            }
            return Ok(());
        }

        match self.kind() {
            FieldKind::Object { .. } | FieldKind::ObjectList { .. } => {
                sink.push(self.detail(
                    ValidationCode::DirectObjectAssignmentNotAllowed,
                    index,
                    None,
                ));
                Ok(())
            }
            _ => self.apply_value(value, processed, sink, index, ctx),
        }
    }

    /// Route a present raw value into the processed record, recursing for
    /// nested models and coercing scalars.
    fn apply_value(
        &self,
        value: &Value,
        processed: &mut Map<String, Value>,
        sink: &mut ValidationSink,
        index: Option<usize>,
        ctx: &PrepareContext,
    ) -> Result<()> {
        match self.kind() {
            FieldKind::Object { model } => {
                let Some(data) = value.as_object() else {
                    sink.push(self.detail(
                        ValidationCode::InvalidObjectValue,
                        index,
                        Some(value.clone()),
                    ));
                    return Ok(());
                };
                let nested = model.prepare_field_values(data, true, sink, index, ctx)?;
                processed.insert(self.name().to_string(), Value::Object(nested));
                Ok(())
            }
            FieldKind::ObjectList { model } => {
                let Some(items) = value.as_array() else {
                    sink.push(self.detail(
                        ValidationCode::InvalidObjectListValue,
                        index,
                        Some(value.clone()),
                    ));
                    return Ok(());
                };
                let mut prepared = Vec::with_capacity(items.len());
                for item in items {
                    let Some(data) = item.as_object() else {
                        sink.push(self.detail(
                            ValidationCode::InvalidObjectListValue,
                            index,
                            Some(item.clone()),
                        ));
                        continue;
                    };
                    let nested = model.prepare_field_values(data, true, sink, index, ctx)?;
                    prepared.push(Value::Object(nested));
                }
                processed.insert(self.name().to_string(), Value::Array(prepared));
                Ok(())
            }
            _ => match self.coerce_value(value, true, ctx) {
                Ok(encoded) => {
                    processed.insert(self.name().to_string(), encoded);
                    Ok(())
                }
                Err(ValueError::Code(code)) => {
                    sink.push(self.detail(code, index, Some(value.clone())));
                    Ok(())
                }
                Err(ValueError::Fatal(err)) => Err(err),
            },
        }
    }

    /// Default assignment for missing required system fields.
    fn apply_system_default(
        &self,
        processed: &mut Map<String, Value>,
        sink: &mut ValidationSink,
        index: Option<usize>,
        ctx: &PrepareContext,
    ) -> Result<()> {
        match self.kind() {
            FieldKind::Id => {
                if let Some(id) = generate_id(ctx.dialect) {
                    processed.insert(self.name().to_string(), id);
                }
                Ok(())
            }
            FieldKind::CreatedAt | FieldKind::UpdatedAt => {
                processed.insert(self.name().to_string(), encode_timestamp(ctx));
                Ok(())
            }
            FieldKind::CreatedBy | FieldKind::UpdatedBy => {
                self.stamp_acting_user(processed, sink, index, ctx)
            }
            _ => Ok(()),
        }
    }

    /// Record the acting user into a createdBy/updatedBy field, when one was
    /// provided with the operation.
    fn stamp_acting_user(
        &self,
        processed: &mut Map<String, Value>,
        sink: &mut ValidationSink,
        index: Option<usize>,
        ctx: &PrepareContext,
    ) -> Result<()> {
        let Some(user) = &ctx.acting_user else {
            return Ok(());
        };
        match coerce_reference(user, ctx) {
            Ok(encoded) => {
                processed.insert(self.name().to_string(), encoded);
                Ok(())
            }
            Err(ValueError::Code(code)) => {
                sink.push(self.detail(code, index, Some(user.clone())));
                Ok(())
            }
            Err(ValueError::Fatal(err)) => Err(err),
        }
    }

    /// Validate and encode a scalar value for this field. Also used by the
    /// update-operator builder for `$set`-style assignments.
    pub(crate) fn coerce_value(
        &self,
        value: &Value,
        is_create: bool,
        ctx: &PrepareContext,
    ) -> std::result::Result<Value, ValueError> {
        use ValidationCode::*;
        match self.kind() {
            FieldKind::Id => {
                if !ctx.dialect.is_valid_id(value) {
                    return Err(InvalidIdValue.into());
                }
                match (ctx.dialect, value) {
                    (Dialect::MongoDB, Value::String(raw)) => ctx
                        .dialect
                        .construct_id(raw)
                        .map_err(|_| InvalidIdValue.into()),
                    _ => Ok(value.clone()),
                }
            }
            FieldKind::Text { max_length, .. } => {
                self.coerce_text(value, *max_length)
            }
            FieldKind::RichText { .. } => self.coerce_text(value, None),
            FieldKind::EncryptedText { max_length } => {
                let text = self.coerce_text(value, *max_length)?;
                let plain = text.as_str().unwrap_or_default();
                if plain.is_empty() {
                    return Ok(text);
                }
                let sealed = crypto::encrypt_field_value(self.query_path(), plain)
                    .map_err(|e| ValueError::Fatal(ClientError::Encryption(e)))?;
                Ok(Value::String(sealed))
            }
            FieldKind::Email => {
                let Value::String(text) = value else {
                    return Err(InvalidEmailValue.into());
                };
                if text.is_empty() && self.is_required() {
                    return Err(InvalidRequiredFieldValue.into());
                }
                if !helpers::is_valid_email(text) {
                    return Err(InvalidEmailValue.into());
                }
                Ok(value.clone())
            }
            FieldKind::Link => {
                let Value::String(text) = value else {
                    return Err(InvalidLinkValue.into());
                };
                if text.len() > 2048 {
                    return Err(MaxLengthThresholdExceeded.into());
                }
                if !helpers::is_valid_link(text) {
                    return Err(InvalidLinkValue.into());
                }
                Ok(value.clone())
            }
            FieldKind::Phone => {
                let Value::String(text) = value else {
                    return Err(InvalidPhoneValue.into());
                };
                if text.len() > 16 {
                    return Err(MaxLengthThresholdExceeded.into());
                }
                if !helpers::is_valid_phone(text) {
                    return Err(InvalidPhoneValue.into());
                }
                Ok(value.clone())
            }
            FieldKind::Boolean => match value {
                Value::Bool(_) => Ok(value.clone()),
                _ => Err(InvalidBooleanValue.into()),
            },
            FieldKind::Integer => match value {
                Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        Ok(json!(i))
                    } else if let Some(f) = n.as_f64() {
                        // Integers round to zero decimal places.
                        Ok(json!(f.round() as i64))
                    } else {
                        Err(InvalidIntegerValue.into())
                    }
                }
                _ => Err(InvalidIntegerValue.into()),
            },
            FieldKind::Decimal => match value {
                Value::Number(_) => Ok(value.clone()),
                _ => Err(InvalidDecimalValue.into()),
            },
            FieldKind::Monetary => match value {
                Value::Number(n) => {
                    let amount = n.as_f64().ok_or(ValueError::Code(InvalidMonetaryValue))?;
                    Ok(json!((amount * 100.0).round() / 100.0))
                }
                _ => Err(InvalidMonetaryValue.into()),
            },
            FieldKind::CreatedAt | FieldKind::UpdatedAt | FieldKind::DateTime => {
                if is_create && value.as_str() == Some("$$NOW") {
                    return Ok(encode_timestamp(ctx));
                }
                match helpers::parse_datetime(value) {
                    Some(dt) => Ok(Value::String(
                        dt.to_rfc3339_opts(SecondsFormat::Millis, true),
                    )),
                    None => Err(InvalidDatetimeValue.into()),
                }
            }
            FieldKind::Date => {
                if is_create && value.as_str() == Some("$$NOW") {
                    return Ok(Value::String(
                        ctx.timestamp.format("%Y-%m-%d").to_string(),
                    ));
                }
                match helpers::parse_date(value) {
                    Some(date) => Ok(Value::String(date.format("%Y-%m-%d").to_string())),
                    None => Err(InvalidDateValue.into()),
                }
            }
            FieldKind::Time => {
                if is_create && value.as_str() == Some("$$NOW") {
                    return Ok(Value::String(
                        ctx.timestamp.format("%H:%M:%S").to_string(),
                    ));
                }
                match helpers::parse_time(value) {
                    Some(time) => Ok(Value::String(time.format("%H:%M:%S").to_string())),
                    None => Err(InvalidTimeValue.into()),
                }
            }
            FieldKind::Enum { values } => {
                let Value::String(text) = value else {
                    return Err(InvalidEnumValue.into());
                };
                if values.iter().any(|member| member == text) {
                    Ok(value.clone())
                } else {
                    Err(InvalidEnumValue.into())
                }
            }
            FieldKind::GeoPoint => {
                let Some(pair) = value.as_array() else {
                    return Err(InvalidGeopointValue.into());
                };
                if pair.len() != 2 {
                    return Err(InvalidGeopointValue.into());
                }
                let lon = pair[0].as_f64().ok_or(ValueError::Code(InvalidGeopointValue))?;
                let lat = pair[1].as_f64().ok_or(ValueError::Code(InvalidGeopointValue))?;
                if !(-180.0..=180.0).contains(&lon) {
                    return Err(InvalidLongitudeValue.into());
                }
                if !(-90.0..=90.0).contains(&lat) {
                    return Err(InvalidLatitudeValue.into());
                }
                Ok(ctx.dialect.encode_geo_point(lon, lat))
            }
            FieldKind::Binary => match value {
                Value::String(_) => Ok(value.clone()),
                _ => Err(InvalidBinaryValue.into()),
            },
            FieldKind::Json => match ctx.dialect {
                Dialect::MongoDB => Ok(value.clone()),
                _ => Ok(Value::String(value.to_string())),
            },
            FieldKind::Reference { .. } | FieldKind::CreatedBy | FieldKind::UpdatedBy => {
                coerce_reference(value, ctx)
            }
            FieldKind::BasicValuesList => {
                let Some(items) = value.as_array() else {
                    return Err(InvalidListValue.into());
                };
                if items.is_empty() && self.is_required() {
                    return Err(InvalidRequiredFieldValue.into());
                }
                if items.iter().all(helpers::is_primitive) {
                    Ok(value.clone())
                } else {
                    Err(InvalidListValue.into())
                }
            }
            FieldKind::Object { .. }
            | FieldKind::ObjectList { .. }
            | FieldKind::Join { .. }
            | FieldKind::ArrayFilter => Err(InvalidObjectValue.into()),
        }
    }

    fn coerce_text(
        &self,
        value: &Value,
        max_length: Option<usize>,
    ) -> std::result::Result<Value, ValueError> {
        use ValidationCode::*;
        let text = match value {
            Value::Object(_) | Value::Array(_) | Value::Null => {
                return Err(InvalidTextValue.into());
            }
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
        };
        if let Some(limit) = max_length {
            if text.chars().count() > limit {
                return Err(MaxLengthThresholdExceeded.into());
            }
        }
        if text.is_empty() && self.is_required() {
            return Err(InvalidRequiredFieldValue.into());
        }
        Ok(Value::String(text))
    }

    fn detail(
        &self,
        code: ValidationCode,
        index: Option<usize>,
        value: Option<Value>,
    ) -> ValidationDetail {
        let mut detail = ValidationDetail::new(code, self.query_path()).with_index(index);
        if let Some(value) = value {
            detail = detail.with_value(value);
        }
        detail
    }
}

/// Validate and encode a reference-like id value per dialect.
fn coerce_reference(
    value: &Value,
    ctx: &PrepareContext,
) -> std::result::Result<Value, ValueError> {
    use ValidationCode::InvalidReferenceValue;
    if !helpers::is_primitive(value) {
        return Err(InvalidReferenceValue.into());
    }
    match ctx.dialect {
        Dialect::MongoDB => {
            if !ctx.dialect.is_valid_id(value) {
                return Err(InvalidReferenceValue.into());
            }
            match value {
                Value::String(raw) => ctx
                    .dialect
                    .construct_id(raw)
                    .map_err(|_| InvalidReferenceValue.into()),
                _ => Ok(value.clone()),
            }
        }
        _ => {
            if helpers::is_key(value) {
                Ok(value.clone())
            } else {
                Err(InvalidReferenceValue.into())
            }
        }
    }
}

fn encode_timestamp(ctx: &PrepareContext) -> Value {
    Value::String(ctx.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Model;
    use crate::schema::{DatabaseDescriptor, ModelDescriptor, ModelType};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn build(dialect: Dialect) -> Vec<Arc<Model>> {
        let descriptor: DatabaseDescriptor = serde_json::from_value(json!({
            "name": "main",
            "iid": "db_01",
            "type": dialect,
            "models": [
                {
                    "name": "orders",
                    "iid": "mdl_orders",
                    "type": "model",
                    "fields": [
                        { "name": "_id", "type": "id", "creator": "system", "required": true },
                        {
                            "name": "code",
                            "type": "text",
                            "required": true,
                            "text": { "maxLength": 8 }
                        },
                        { "name": "qty", "type": "integer" },
                        { "name": "total", "type": "monetary" },
                        { "name": "open", "type": "boolean", "defaultValue": true },
                        {
                            "name": "state",
                            "type": "enum",
                            "enum": { "values": ["new", "paid", "shipped"] }
                        },
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
                        { "name": "shippedOn", "type": "date", "defaultValue": "$$NOW" },
                        { "name": "cutoff", "type": "time" },
                        {
                            "name": "createdBy",
                            "type": "createdBy",
                            "creator": "system",
                            "required": true
                        },
                        { "name": "updatedBy", "type": "updatedBy", "creator": "system" },
                        { "name": "tags", "type": "basic-values-list" },
                        { "name": "location", "type": "geo-point" },
                        { "name": "meta", "type": "json" },
                        {
                            "name": "shipping",
                            "type": "object",
                            "object": { "iid": "mdl_shipping" }
                        },
                        {
                            "name": "items",
                            "type": "object-list",
                            "objectList": { "iid": "mdl_items" }
                        }
                    ]
                },
                {
                    "name": "shipping",
                    "iid": "mdl_shipping",
                    "type": "object",
                    "fields": [
                        { "name": "street", "type": "text" },
                        { "name": "country", "type": "text", "defaultValue": "TR" }
                    ]
                },
                {
                    "name": "items",
                    "iid": "mdl_items",
                    "type": "object-list",
                    "fields": [
                        { "name": "sku", "type": "text", "required": true },
                        { "name": "count", "type": "integer" }
                    ]
                }
            ]
        }))
        .unwrap();

        let by_iid: HashMap<&str, &ModelDescriptor> = descriptor
            .models
            .iter()
            .map(|m| (m.iid.as_str(), m))
            .collect();
        let mut registry = Vec::new();
        for desc in &descriptor.models {
            if desc.model_type == ModelType::Model {
                Model::build(desc, dialect, &by_iid, &mut registry).unwrap();
            }
        }
        registry
    }

    fn orders(registry: &[Arc<Model>]) -> &Arc<Model> {
        registry.iter().find(|m| m.hierarchy() == "orders").unwrap()
    }

    fn prepare_create(
        model: &Model,
        data: Value,
        dialect: Dialect,
    ) -> (Map<String, Value>, ValidationSink) {
        let ctx = PrepareContext::new(dialect);
        let mut sink = ValidationSink::new();
        let data = data.as_object().unwrap().clone();
        let processed = model
            .prepare_field_values(&data, true, &mut sink, None, &ctx)
            .unwrap();
        (processed, sink)
    }

    #[test]
    fn create_applies_defaults_and_system_values() {
        let registry = build(Dialect::MongoDB);
        let model = orders(&registry);
        let (processed, sink) =
            prepare_create(model, json!({ "code": "A1", "state": "new" }), Dialect::MongoDB);

        assert!(sink.is_empty(), "unexpected errors: {sink:?}");
        assert_eq!(processed["open"], json!(true));
        assert!(processed.get("_id").and_then(|v| v.get("$oid")).is_some());
        assert!(processed.get("createdAt").is_some());
        assert_eq!(processed["createdAt"], processed["updatedAt"]);
        // Empty lists default to [] and defaulted sub-objects materialize.
        assert_eq!(processed["tags"], json!([]));
        assert_eq!(processed["items"], json!([]));
        assert_eq!(processed["shipping"], json!({ "country": "TR" }));
    }

    #[test]
    fn create_collects_missing_required_fields() {
        let registry = build(Dialect::MongoDB);
        let model = orders(&registry);
        let (_, sink) = prepare_create(model, json!({}), Dialect::MongoDB);

        let err = sink.into_result().unwrap_err();
        let details = err.details().unwrap();
        assert!(details.iter().any(|d| {
            d.details.field == "code" && d.code == ValidationCode::MissingRequiredFieldValue
        }));
    }

    #[test]
    fn text_length_boundary() {
        let registry = build(Dialect::MongoDB);
        let model = orders(&registry);

        let (processed, sink) =
            prepare_create(model, json!({ "code": "12345678" }), Dialect::MongoDB);
        assert!(sink.is_empty());
        assert_eq!(processed["code"], json!("12345678"));

        let (_, sink) =
            prepare_create(model, json!({ "code": "123456789" }), Dialect::MongoDB);
        let err = sink.into_result().unwrap_err();
        assert_eq!(
            err.details().unwrap()[0].code,
            ValidationCode::MaxLengthThresholdExceeded
        );
    }

    #[test]
    fn integer_rounds_and_monetary_truncates_to_cents() {
        let registry = build(Dialect::MongoDB);
        let model = orders(&registry);
        let (processed, sink) = prepare_create(
            model,
            json!({ "code": "A1", "qty": 2.6, "total": 10.009 }),
            Dialect::MongoDB,
        );
        assert!(sink.is_empty());
        assert_eq!(processed["qty"], json!(3));
        assert_eq!(processed["total"], json!(10.01));
    }

    #[test]
    fn date_and_time_values_coerce_and_format() {
        let registry = build(Dialect::MongoDB);
        let model = orders(&registry);
        let (processed, sink) = prepare_create(
            model,
            json!({ "code": "A1", "shippedOn": "2024-02-29", "cutoff": "23:15" }),
            Dialect::MongoDB,
        );
        assert!(sink.is_empty());
        assert_eq!(processed["shippedOn"], json!("2024-02-29"));
        assert_eq!(processed["cutoff"], json!("23:15:00"));

        let (_, sink) = prepare_create(
            model,
            json!({ "code": "A1", "shippedOn": "2024-02-30" }),
            Dialect::MongoDB,
        );
        assert_eq!(
            sink.into_result().unwrap_err().details().unwrap()[0].code,
            ValidationCode::InvalidDateValue
        );

        let (_, sink) = prepare_create(
            model,
            json!({ "code": "A1", "cutoff": "25:99" }),
            Dialect::MongoDB,
        );
        assert_eq!(
            sink.into_result().unwrap_err().details().unwrap()[0].code,
            ValidationCode::InvalidTimeValue
        );
    }

    #[test]
    fn date_and_time_now_sentinels_resolve_to_the_bound_timestamp() {
        let registry = build(Dialect::MongoDB);
        let model = orders(&registry);
        let (processed, sink) = prepare_create(
            model,
            json!({ "code": "A1", "cutoff": "$$NOW" }),
            Dialect::MongoDB,
        );
        assert!(sink.is_empty(), "unexpected errors: {sink:?}");

        // shippedOn defaults to "$$NOW" and projects the shared timestamp's
        // date; createdAt carries the full instant.
        let created_at = processed["createdAt"].as_str().unwrap();
        let shipped_on = processed["shippedOn"].as_str().unwrap();
        assert!(created_at.starts_with(shipped_on));

        let cutoff = processed["cutoff"].as_str().unwrap();
        assert_eq!(cutoff.len(), 8);
        assert!(cutoff.chars().nth(2) == Some(':') && cutoff.chars().nth(5) == Some(':'));
    }

    #[test]
    fn acting_user_stamps_created_by_and_updated_by() {
        let registry = build(Dialect::MongoDB);
        let model = orders(&registry);
        let ctx = PrepareContext::new(Dialect::MongoDB)
            .with_acting_user(Some(json!("507f1f77bcf86cd799439011")));

        let mut sink = ValidationSink::new();
        let data = json!({ "code": "A1" }).as_object().unwrap().clone();
        let processed = model
            .prepare_field_values(&data, true, &mut sink, None, &ctx)
            .unwrap();
        assert!(sink.is_empty());
        assert_eq!(
            processed["createdBy"],
            json!({ "$oid": "507f1f77bcf86cd799439011" })
        );
        assert_eq!(processed["createdBy"], processed["updatedBy"]);

        // On update only updatedBy refreshes.
        let mut sink = ValidationSink::new();
        let data = json!({ "qty": 2 }).as_object().unwrap().clone();
        let processed = model
            .prepare_field_values(&data, false, &mut sink, None, &ctx)
            .unwrap();
        assert!(sink.is_empty());
        assert!(processed.get("createdBy").is_none());
        assert_eq!(
            processed["updatedBy"],
            json!({ "$oid": "507f1f77bcf86cd799439011" })
        );
    }

    #[test]
    fn missing_or_invalid_acting_user() {
        let registry = build(Dialect::MongoDB);
        let model = orders(&registry);

        // Without an acting user the by-fields are simply skipped.
        let (processed, sink) = prepare_create(model, json!({ "code": "A1" }), Dialect::MongoDB);
        assert!(sink.is_empty());
        assert!(processed.get("createdBy").is_none());
        assert!(processed.get("updatedBy").is_none());

        // A malformed id is reported against the by-fields.
        let ctx = PrepareContext::new(Dialect::MongoDB)
            .with_acting_user(Some(json!("not-an-object-id")));
        let mut sink = ValidationSink::new();
        let data = json!({ "code": "A1" }).as_object().unwrap().clone();
        model
            .prepare_field_values(&data, true, &mut sink, None, &ctx)
            .unwrap();
        let err = sink.into_result().unwrap_err();
        assert!(err.details().unwrap().iter().any(|d| {
            d.details.field == "createdBy" && d.code == ValidationCode::InvalidReferenceValue
        }));
    }

    #[test]
    fn geo_point_boundaries() {
        let registry = build(Dialect::MongoDB);
        let model = orders(&registry);

        let (processed, sink) = prepare_create(
            model,
            json!({ "code": "A1", "location": [180.0, -90.0] }),
            Dialect::MongoDB,
        );
        assert!(sink.is_empty());
        assert_eq!(
            processed["location"],
            json!({ "type": "Point", "coordinates": [180.0, -90.0] })
        );

        let (_, sink) = prepare_create(
            model,
            json!({ "code": "A1", "location": [180.5, 0.0] }),
            Dialect::MongoDB,
        );
        assert_eq!(
            sink.into_result().unwrap_err().details().unwrap()[0].code,
            ValidationCode::InvalidLongitudeValue
        );

        let (_, sink) = prepare_create(
            model,
            json!({ "code": "A1", "location": [0.0, 90.1] }),
            Dialect::MongoDB,
        );
        assert_eq!(
            sink.into_result().unwrap_err().details().unwrap()[0].code,
            ValidationCode::InvalidLatitudeValue
        );
    }

    #[test]
    fn json_fields_serialize_on_sql_dialects() {
        let registry = build(Dialect::PostgreSQL);
        let model = orders(&registry);
        let (processed, sink) = prepare_create(
            model,
            json!({ "code": "A1", "meta": { "a": [1, 2] } }),
            Dialect::PostgreSQL,
        );
        assert!(sink.is_empty());
        assert_eq!(processed["meta"], json!("{\"a\":[1,2]}"));
    }

    #[test]
    fn object_list_elements_validate_recursively() {
        let registry = build(Dialect::MongoDB);
        let model = orders(&registry);
        let (_, sink) = prepare_create(
            model,
            json!({ "code": "A1", "items": [{ "count": 1 }] }),
            Dialect::MongoDB,
        );
        let err = sink.into_result().unwrap_err();
        assert!(err
            .details()
            .unwrap()
            .iter()
            .any(|d| d.details.field == "items.sku"));
    }

    #[test]
    fn update_refreshes_only_updated_at() {
        let registry = build(Dialect::MongoDB);
        let model = orders(&registry);
        let ctx = PrepareContext::new(Dialect::MongoDB);
        let mut sink = ValidationSink::new();
        let data = json!({ "qty": 5 }).as_object().unwrap().clone();
        let processed = model
            .prepare_field_values(&data, false, &mut sink, None, &ctx)
            .unwrap();

        assert!(sink.is_empty());
        assert_eq!(processed["qty"], json!(5));
        assert!(processed.get("updatedAt").is_some());
        assert!(processed.get("createdAt").is_none());
        assert!(processed.get("_id").is_none());
    }

    #[test]
    fn update_null_unsets_optional_and_rejects_required() {
        let registry = build(Dialect::MongoDB);
        let model = orders(&registry);
        let ctx = PrepareContext::new(Dialect::MongoDB);

        let mut sink = ValidationSink::new();
        let data = json!({ "qty": null }).as_object().unwrap().clone();
        let processed = model
            .prepare_field_values(&data, false, &mut sink, None, &ctx)
            .unwrap();
        assert!(sink.is_empty());
        assert_eq!(processed["qty"], Value::Null);

        let mut sink = ValidationSink::new();
        let data = json!({ "code": null }).as_object().unwrap().clone();
        model
            .prepare_field_values(&data, false, &mut sink, None, &ctx)
            .unwrap();
        assert_eq!(
            sink.into_result().unwrap_err().details().unwrap()[0].code,
            ValidationCode::InvalidRequiredFieldValue
        );
    }

    #[test]
    fn update_rejects_direct_object_assignment() {
        let registry = build(Dialect::MongoDB);
        let model = orders(&registry);
        let ctx = PrepareContext::new(Dialect::MongoDB);
        let mut sink = ValidationSink::new();
        let data = json!({ "shipping": { "street": "Main" } })
            .as_object()
            .unwrap()
            .clone();
        model
            .prepare_field_values(&data, false, &mut sink, None, &ctx)
            .unwrap();
        assert_eq!(
            sink.into_result().unwrap_err().details().unwrap()[0].code,
            ValidationCode::DirectObjectAssignmentNotAllowed
        );
    }

    #[test]
    fn prepared_create_output_revalidates_cleanly() {
        let registry = build(Dialect::MongoDB);
        let model = orders(&registry);
        let (processed, sink) = prepare_create(
            model,
            json!({ "code": "A1", "qty": 2, "state": "paid" }),
            Dialect::MongoDB,
        );
        assert!(sink.is_empty());

        // Re-running the prepared scalar output through update validation
        // leaves no errors (ids and system fields are skipped, values are
        // stable). Object kinds are excluded: direct assignment is refused
        // on update by design.
        let scalars: Map<String, Value> = processed
            .into_iter()
            .filter(|(_, value)| !value.is_object() && !value.is_array())
            .collect();
        let ctx = PrepareContext::new(Dialect::MongoDB);
        let mut sink = ValidationSink::new();
        model
            .prepare_field_values(&scalars, false, &mut sink, None, &ctx)
            .unwrap();
        assert!(sink.is_empty());
    }

    #[test]
    fn sql_ids_pass_through() {
        let registry = build(Dialect::MySQL);
        let model = orders(&registry);
        let (processed, sink) = prepare_create(
            model,
            json!({ "code": "A1", "_id": 42 }),
            Dialect::MySQL,
        );
        assert!(sink.is_empty());
        assert_eq!(processed["_id"], json!(42));
    }
}
