//! Client-facing error types shared across the data-access layer.
//!
//! Every validation or boundary failure surfaces as a [`ClientError`] with a
//! stable machine-readable code. Field-level validation failures are
//! accumulated into [`ValidationDetail`] records and raised once per
//! top-level call as [`ClientError::ValidationErrors`].

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid field: {0}")]
    InvalidField(String),

    #[error("Invalid join definition: {0}")]
    InvalidJoin(String),

    #[error("Invalid expression: {0}")]
    InvalidExpression(String),

    #[error("Invalid update instruction: {0}")]
    InvalidUpdateInstruction(String),

    #[error("Unsupported function: {0}")]
    UnsupportedFunction(String),

    #[error("Missing input parameter: {0}")]
    MissingInputParameter(String),

    #[error("The input data provided failed validation ({} error(s))", .0.len())]
    ValidationErrors(Vec<ValidationDetail>),

    #[error("Cannot find the database named '{0}'")]
    DatabaseNotFound(String),

    #[error("Cannot find the model named '{0}'")]
    ModelNotFound(String),

    #[error("Cannot find an adapter for '{0}'")]
    AdapterNotFound(String),

    #[error("Cannot find the storage named '{0}'")]
    StorageNotFound(String),

    #[error("Cannot find the queue named '{0}'")]
    QueueNotFound(String),

    #[error("Cannot find the cache named '{0}'")]
    CacheNotFound(String),

    #[error("Cannot find the function named '{0}'")]
    FunctionNotFound(String),

    #[error("Cannot find the task named '{0}'")]
    TaskNotFound(String),

    #[error("Model '{0}' does not have any searchable text fields")]
    NotSearchableModel(String),

    #[error("Value encryption failed: {0}")]
    Encryption(#[from] crate::crypto::EncryptionError),

    /// Errors raised by a backend adapter pass through unchanged.
    #[error("{0}")]
    Adapter(String),
}

impl ClientError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            ClientError::InvalidValue(_) => "invalid_value",
            ClientError::InvalidParameter(_) => "invalid_parameter",
            ClientError::InvalidField(_) => "invalid_field",
            ClientError::InvalidJoin(_) => "invalid_join",
            ClientError::InvalidExpression(_) => "invalid_expression",
            ClientError::InvalidUpdateInstruction(_) => "invalid_update_instruction",
            ClientError::UnsupportedFunction(_) => "unsupported_function",
            ClientError::MissingInputParameter(_) => "missing_input_parameter",
            ClientError::ValidationErrors(_) => "validation_errors",
            ClientError::DatabaseNotFound(_) => "database_not_found",
            ClientError::ModelNotFound(_) => "model_not_found",
            ClientError::AdapterNotFound(_) => "adapter_not_found",
            ClientError::StorageNotFound(_) => "storage_not_found",
            ClientError::QueueNotFound(_) => "queue_not_found",
            ClientError::CacheNotFound(_) => "cache_not_found",
            ClientError::FunctionNotFound(_) => "function_not_found",
            ClientError::TaskNotFound(_) => "task_not_found",
            ClientError::NotSearchableModel(_) => "not_searchable_model",
            ClientError::Encryption(_) => "encryption_error",
            ClientError::Adapter(_) => "adapter_error",
        }
    }

    /// Validation detail list, when this is an aggregated validation error.
    pub fn details(&self) -> Option<&[ValidationDetail]> {
        match self {
            ClientError::ValidationErrors(details) => Some(details),
            _ => None,
        }
    }
}

/// A single field-level validation failure collected during input preparation.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationDetail {
    pub origin: &'static str,
    pub code: ValidationCode,
    pub details: ValidationTarget,
}

/// The field (and optionally array index and offending value) a validation
/// failure points at.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationTarget {
    pub field: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl ValidationDetail {
    pub fn new(code: ValidationCode, field: impl Into<String>) -> Self {
        ValidationDetail {
            origin: "client_error",
            code,
            details: ValidationTarget {
                field: field.into(),
                index: None,
                value: None,
            },
        }
    }

    pub fn with_index(mut self, index: Option<usize>) -> Self {
        self.details.index = index;
        self
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.details.value = Some(value);
        self
    }
}

/// Accumulator handed down through recursive field preparation.
#[derive(Debug, Default)]
pub struct ValidationSink {
    errors: Vec<ValidationDetail>,
}

impl ValidationSink {
    pub fn new() -> Self {
        ValidationSink::default()
    }

    pub fn push(&mut self, detail: ValidationDetail) {
        self.errors.push(detail);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Raise the accumulated details as a single aggregated error, or `Ok`
    /// when nothing was collected. Called once per top-level create/update.
    pub fn into_result(self) -> Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ClientError::ValidationErrors(self.errors))
        }
    }
}

/// Machine-readable codes for field-level validation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationCode {
    MissingRequiredFieldValue,
    InvalidRequiredFieldValue,
    MaxLengthThresholdExceeded,
    DirectObjectAssignmentNotAllowed,
    InvalidIdValue,
    InvalidTextValue,
    InvalidEmailValue,
    InvalidLinkValue,
    InvalidPhoneValue,
    InvalidBooleanValue,
    InvalidIntegerValue,
    InvalidDecimalValue,
    InvalidMonetaryValue,
    InvalidDatetimeValue,
    InvalidDateValue,
    InvalidTimeValue,
    InvalidEnumValue,
    InvalidGeopointValue,
    InvalidLongitudeValue,
    InvalidLatitudeValue,
    InvalidBinaryValue,
    InvalidJsonValue,
    InvalidReferenceValue,
    InvalidListValue,
    InvalidObjectValue,
    InvalidObjectListValue,
}

impl ValidationCode {
    pub fn as_str(self) -> &'static str {
        use ValidationCode::*;
        match self {
            MissingRequiredFieldValue => "missing_required_field_value",
            InvalidRequiredFieldValue => "invalid_required_field_value",
            MaxLengthThresholdExceeded => "max_length_threshold_exceeded",
            DirectObjectAssignmentNotAllowed => "direct_object_assignment_not_allowed",
            InvalidIdValue => "invalid_id_value",
            InvalidTextValue => "invalid_text_value",
            InvalidEmailValue => "invalid_email_value",
            InvalidLinkValue => "invalid_link_value",
            InvalidPhoneValue => "invalid_phone_value",
            InvalidBooleanValue => "invalid_boolean_value",
            InvalidIntegerValue => "invalid_integer_value",
            InvalidDecimalValue => "invalid_decimal_value",
            InvalidMonetaryValue => "invalid_monetary_value",
            InvalidDatetimeValue => "invalid_datetime_value",
            InvalidDateValue => "invalid_date_value",
            InvalidTimeValue => "invalid_time_value",
            InvalidEnumValue => "invalid_enum_value",
            InvalidGeopointValue => "invalid_geopoint_value",
            InvalidLongitudeValue => "invalid_longitude_value",
            InvalidLatitudeValue => "invalid_latitude_value",
            InvalidBinaryValue => "invalid_binary_value",
            InvalidJsonValue => "invalid_json_value",
            InvalidReferenceValue => "invalid_reference_value",
            InvalidListValue => "invalid_list_value",
            InvalidObjectValue => "invalid_object_value",
            InvalidObjectListValue => "invalid_object_list_value",
        }
    }
}

impl std::fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregated_error_carries_details() {
        let mut sink = ValidationSink::new();
        sink.push(
            ValidationDetail::new(ValidationCode::MissingRequiredFieldValue, "email")
                .with_index(Some(2)),
        );
        sink.push(
            ValidationDetail::new(ValidationCode::MaxLengthThresholdExceeded, "name")
                .with_value(serde_json::json!("much too long")),
        );

        let err = sink.into_result().unwrap_err();
        assert_eq!(err.code(), "validation_errors");
        let details = err.details().unwrap();
        assert_eq!(details.len(), 2);
        assert_eq!(details[0].details.field, "email");
        assert_eq!(details[0].details.index, Some(2));
        assert_eq!(details[1].code, ValidationCode::MaxLengthThresholdExceeded);
    }

    #[test]
    fn empty_sink_is_ok() {
        assert!(ValidationSink::new().into_result().is_ok());
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            ClientError::UnsupportedFunction("$foo".into()).code(),
            "unsupported_function"
        );
        assert_eq!(
            ClientError::DatabaseNotFound("main".into()).code(),
            "database_not_found"
        );
        assert_eq!(
            ValidationCode::DirectObjectAssignmentNotAllowed.as_str(),
            "direct_object_assignment_not_allowed"
        );
    }
}
