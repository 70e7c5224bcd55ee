//! Expression tree used by conditions, computations, and update operators.
//!
//! A node is a resolved model field reference, a free array-filter
//! identifier, a literal, an array of sub-expressions, or a registered
//! function applied to parameters. Nodes know their return type, validate
//! themselves against the active dialect, and lower to a dialect plan
//! fragment (see [`lowering`]).

mod lowering;

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::dialect::{Dialect, DialectExt};
use crate::error::{ClientError, Result};
use crate::field::Field;
use crate::functions::{DATE_UNITS, FunctionSpec, Mapping, ParamCount, UPDATE_PULL_FUNCTIONS};

/// Coarse expression node kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpressionKind {
    Field,
    ArrayField,
    Static,
    Function,
}

/// How a field reference entered the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    /// The field lives on the base model.
    None,
    /// Automatic join along a declared reference field.
    Simple,
    /// Explicit `{as, from, where}` aliased join.
    Complex,
}

/// Abstract value types used to type-check function parameters independent
/// of dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnType {
    Number,
    Text,
    Boolean,
    Object,
    Datetime,
    Null,
    Binary,
    Json,
    Id,
    Array,
    Geopoint,
    Undefined,
    Any,
    Primitive,
    Date,
    Time,
    StaticBoolean,
}

impl ReturnType {
    /// Whether a parameter declared as `self` accepts a value whose inferred
    /// return type is `actual`. Static-ness of `StaticBoolean` is enforced
    /// separately by the function validator.
    pub fn accepts(self, actual: ReturnType) -> bool {
        if self == ReturnType::Any || actual == ReturnType::Any || actual == ReturnType::Null {
            return true;
        }
        match self {
            ReturnType::Primitive => !matches!(
                actual,
                ReturnType::Object | ReturnType::Array | ReturnType::Binary | ReturnType::Json
            ),
            ReturnType::Date | ReturnType::Datetime => {
                matches!(actual, ReturnType::Date | ReturnType::Datetime)
            }
            ReturnType::StaticBoolean => actual == ReturnType::Boolean,
            other => other == actual,
        }
    }

    /// Whether two operand types can be compared with `$eq`-family
    /// functions. `NULL` and `ANY` on either side compare with anything;
    /// ids compare with numbers and text; temporal types compare among
    /// themselves and with text.
    pub fn comparable_with(self, other: ReturnType) -> bool {
        use ReturnType::*;
        if self == other {
            return true;
        }
        if matches!(self, Null | Any) || matches!(other, Null | Any) {
            return true;
        }
        let pair = |a: ReturnType, b: ReturnType| {
            (self == a && other == b) || (self == b && other == a)
        };
        if pair(Id, Number) || pair(Id, Text) {
            return true;
        }
        let temporal = |t: ReturnType| matches!(t, Date | Datetime | Text);
        temporal(self) && temporal(other)
    }
}

/// Resolved reference to a model field at a dotted path.
#[derive(Debug, Clone)]
pub struct FieldRef {
    pub field: Arc<Field>,
    pub path: String,
    pub join_type: JoinType,
}

/// Free identifier used inside a MongoDB array-filter conditional; it has no
/// backing field and lowers to its own name.
#[derive(Debug, Clone)]
pub struct ArrayFilterRef {
    pub name: String,
}

/// A registered function applied to an ordered parameter list.
#[derive(Debug, Clone)]
pub struct FunctionCall {
    pub spec: &'static FunctionSpec,
    pub params: Vec<Expression>,
}

/// A node of the expression tree.
#[derive(Debug, Clone)]
pub enum Expression {
    Field(FieldRef),
    ArrayFilterField(ArrayFilterRef),
    Static(Value),
    Array(Vec<Expression>),
    Function(FunctionCall),
}

impl Expression {
    pub fn field(field: Arc<Field>, path: impl Into<String>, join_type: JoinType) -> Self {
        Expression::Field(FieldRef {
            field,
            path: path.into(),
            join_type,
        })
    }

    pub fn array_filter_field(name: impl Into<String>) -> Self {
        Expression::ArrayFilterField(ArrayFilterRef { name: name.into() })
    }

    pub fn static_value(value: Value) -> Self {
        Expression::Static(value)
    }

    pub fn function(spec: &'static FunctionSpec, params: Vec<Expression>) -> Self {
        Expression::Function(FunctionCall { spec, params })
    }

    pub fn kind(&self) -> ExpressionKind {
        match self {
            Expression::Field(_) => ExpressionKind::Field,
            Expression::ArrayFilterField(_) => ExpressionKind::ArrayField,
            Expression::Static(_) | Expression::Array(_) => ExpressionKind::Static,
            Expression::Function(_) => ExpressionKind::Function,
        }
    }

    pub fn return_type(&self) -> ReturnType {
        match self {
            Expression::Field(fr) => fr.field.return_type(),
            Expression::ArrayFilterField(_) => ReturnType::Any,
            Expression::Static(value) => static_return_type(value),
            Expression::Array(_) => ReturnType::Array,
            Expression::Function(call) => call.spec.return_type,
        }
    }

    /// True if any field reference in the tree entered through a join.
    pub fn has_join_field_values(&self) -> bool {
        match self {
            Expression::Field(fr) => fr.join_type != JoinType::None,
            Expression::ArrayFilterField(_) | Expression::Static(_) => false,
            Expression::Array(items) => items.iter().any(Expression::has_join_field_values),
            Expression::Function(call) => {
                call.params.iter().any(Expression::has_join_field_values)
            }
        }
    }

    /// Recursive contract check against the active dialect.
    pub fn validate(&self, dialect: Dialect) -> Result<()> {
        match self {
            Expression::Field(_) | Expression::ArrayFilterField(_) | Expression::Static(_) => {
                Ok(())
            }
            Expression::Array(items) => {
                for item in items {
                    item.validate(dialect)?;
                }
                Ok(())
            }
            Expression::Function(call) => validate_call(call, dialect, false),
        }
    }

    /// Validation restricted to the `$pull` condition subset.
    pub fn validate_for_pull(&self, dialect: Dialect) -> Result<()> {
        match self {
            Expression::Field(_) | Expression::ArrayFilterField(_) | Expression::Static(_) => {
                Ok(())
            }
            Expression::Array(items) => {
                for item in items {
                    item.validate_for_pull(dialect)?;
                }
                Ok(())
            }
            Expression::Function(call) => {
                if !UPDATE_PULL_FUNCTIONS.contains(&call.spec.name) {
                    return Err(ClientError::UnsupportedFunction(format!(
                        "Function '{}' cannot be used in a pull condition",
                        call.spec.name
                    )));
                }
                validate_call(call, dialect, true)
            }
        }
    }

    /// Static literal payload, when this node is a static expression.
    pub fn as_static(&self) -> Option<&Value> {
        match self {
            Expression::Static(value) => Some(value),
            _ => None,
        }
    }
}

impl PartialEq for Expression {
    /// Structural equality: field references compare by leaf name, path, and
    /// join type; function calls by registry entry and parameters.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Expression::Field(a), Expression::Field(b)) => {
                a.field.name() == b.field.name()
                    && a.path == b.path
                    && a.join_type == b.join_type
            }
            (Expression::ArrayFilterField(a), Expression::ArrayFilterField(b)) => a.name == b.name,
            (Expression::Static(a), Expression::Static(b)) => a == b,
            (Expression::Array(a), Expression::Array(b)) => a == b,
            (Expression::Function(a), Expression::Function(b)) => {
                std::ptr::eq(a.spec, b.spec) && a.params == b.params
            }
            _ => false,
        }
    }
}

fn static_return_type(value: &Value) -> ReturnType {
    match value {
        Value::Null => ReturnType::Null,
        Value::Bool(_) => ReturnType::Boolean,
        Value::Number(_) => ReturnType::Number,
        Value::String(_) => ReturnType::Text,
        Value::Array(_) => ReturnType::Array,
        Value::Object(_) => ReturnType::Object,
    }
}

fn validate_call(call: &FunctionCall, dialect: Dialect, for_pull: bool) -> Result<()> {
    let spec = call.spec;

    if spec.mapping(dialect) == Mapping::NotAvailable {
        return Err(ClientError::UnsupportedFunction(format!(
            "Function '{}' is not supported on {} databases",
            spec.name,
            dialect.display_name()
        )));
    }

    match spec.param_count {
        ParamCount::Exact(expected) => {
            if call.params.len() != expected {
                return Err(ClientError::InvalidParameter(format!(
                    "Function '{}' expects exactly {} parameter(s) but received {}",
                    spec.name,
                    expected,
                    call.params.len()
                )));
            }
        }
        ParamCount::AtLeastTwo => {
            if call.params.len() < 2 {
                return Err(ClientError::InvalidParameter(format!(
                    "Function '{}' expects at least 2 parameters but received {}",
                    spec.name,
                    call.params.len()
                )));
            }
        }
    }

    if spec.is_comparison() {
        let left = call.params[0].return_type();
        let right = call.params[1].return_type();
        if !left.comparable_with(right) {
            return Err(ClientError::InvalidField(format!(
                "Function '{}' cannot compare a '{:?}' value with a '{:?}' value",
                spec.name, left, right
            )));
        }
    } else {
        for (index, param) in call.params.iter().enumerate() {
            let expected = spec.param_type_at(index);
            let actual = param.return_type();
            if !expected.accepts(actual) {
                return Err(ClientError::InvalidParameter(format!(
                    "Parameter #{} of function '{}' expects a '{:?}' value but received a '{:?}' value",
                    index + 1,
                    spec.name,
                    expected,
                    actual
                )));
            }
            if expected == ReturnType::StaticBoolean && param.kind() != ExpressionKind::Static {
                return Err(ClientError::InvalidParameter(format!(
                    "Parameter #{} of function '{}' must be a constant boolean value",
                    index + 1,
                    spec.name
                )));
            }
        }
    }

    if matches!(spec.name, "$dateAdd" | "$dateDiff") {
        validate_date_unit(spec.name, &call.params[2])?;
    }

    for param in &call.params {
        if for_pull {
            param.validate_for_pull(dialect)?;
        } else {
            param.validate(dialect)?;
        }
    }

    Ok(())
}

fn validate_date_unit(function: &str, unit: &Expression) -> Result<()> {
    let valid = unit
        .as_static()
        .and_then(Value::as_str)
        .is_some_and(|u| DATE_UNITS.contains(&u));
    if valid {
        Ok(())
    } else {
        Err(ClientError::InvalidParameter(format!(
            "The unit parameter of function '{function}' must be one of {}",
            DATE_UNITS.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::lookup;
    use serde_json::json;

    fn call(name: &str, params: Vec<Expression>) -> Expression {
        Expression::function(lookup(name).unwrap(), params)
    }

    #[test]
    fn static_return_types_are_inferred() {
        assert_eq!(
            Expression::static_value(json!("t")).return_type(),
            ReturnType::Text
        );
        assert_eq!(
            Expression::static_value(json!(3)).return_type(),
            ReturnType::Number
        );
        assert_eq!(
            Expression::static_value(json!(null)).return_type(),
            ReturnType::Null
        );
        assert_eq!(
            Expression::static_value(json!({"a": 1})).return_type(),
            ReturnType::Object
        );
    }

    #[test]
    fn unsupported_mapping_is_rejected() {
        let expr = call("$size", vec![Expression::static_value(json!([1, 2]))]);
        let err = expr.validate(Dialect::PostgreSQL).unwrap_err();
        assert_eq!(err.code(), "unsupported_function");
        assert!(expr.validate(Dialect::MongoDB).is_ok());
    }

    #[test]
    fn variadic_functions_need_two_parameters() {
        let one = call("$and", vec![Expression::static_value(json!(true))]);
        assert_eq!(
            one.validate(Dialect::MongoDB).unwrap_err().code(),
            "invalid_parameter"
        );

        let two = call(
            "$and",
            vec![
                Expression::static_value(json!(true)),
                Expression::static_value(json!(false)),
            ],
        );
        assert!(two.validate(Dialect::MongoDB).is_ok());
    }

    #[test]
    fn exact_arity_is_enforced() {
        let expr = call("$subtract", vec![Expression::static_value(json!(4))]);
        assert_eq!(
            expr.validate(Dialect::MySQL).unwrap_err().code(),
            "invalid_parameter"
        );
    }

    #[test]
    fn parameter_types_are_checked() {
        let expr = call(
            "$add",
            vec![
                Expression::static_value(json!(1)),
                Expression::static_value(json!("two")),
            ],
        );
        assert_eq!(
            expr.validate(Dialect::MongoDB).unwrap_err().code(),
            "invalid_parameter"
        );
    }

    #[test]
    fn static_boolean_requires_a_constant() {
        let flag = call("$exists", vec![Expression::static_value(json!("x"))]);
        let expr = call(
            "$includes",
            vec![
                Expression::static_value(json!("haystack")),
                Expression::static_value(json!("needle")),
                flag,
            ],
        );
        assert_eq!(
            expr.validate(Dialect::MongoDB).unwrap_err().code(),
            "invalid_parameter"
        );
    }

    #[test]
    fn comparison_compatibility_matrix() {
        use ReturnType::*;
        assert!(Id.comparable_with(Id));
        assert!(Id.comparable_with(Number));
        assert!(Id.comparable_with(Text));
        assert!(Date.comparable_with(Datetime));
        assert!(Datetime.comparable_with(Text));
        assert!(Null.comparable_with(Boolean));
        assert!(!Boolean.comparable_with(Number));
        assert!(!Geopoint.comparable_with(Text));
    }

    #[test]
    fn date_unit_must_be_a_known_constant() {
        let bad = call(
            "$dateAdd",
            vec![
                Expression::static_value(json!("2024-01-01")),
                Expression::static_value(json!(3)),
                Expression::static_value(json!("fortnight")),
            ],
        );
        assert_eq!(
            bad.validate(Dialect::MongoDB).unwrap_err().code(),
            "invalid_parameter"
        );
    }

    #[test]
    fn pull_subset_is_enforced() {
        let allowed = call(
            "$gte",
            vec![
                Expression::static_value(json!(1)),
                Expression::static_value(json!(2)),
            ],
        );
        assert!(allowed.validate_for_pull(Dialect::MongoDB).is_ok());

        let denied = call(
            "$concat",
            vec![
                Expression::static_value(json!("a")),
                Expression::static_value(json!("b")),
            ],
        );
        assert_eq!(
            denied.validate_for_pull(Dialect::MongoDB).unwrap_err().code(),
            "unsupported_function"
        );
    }

    #[test]
    fn every_unavailable_mapping_is_rejected_on_its_dialect() {
        // The mapping check runs before arity, so an empty parameter list is
        // enough to probe it.
        for spec in crate::functions::FUNCTIONS {
            for dialect in [
                Dialect::MongoDB,
                Dialect::PostgreSQL,
                Dialect::MySQL,
                Dialect::SQLServer,
                Dialect::Oracle,
            ] {
                if spec.mapping(dialect) == Mapping::NotAvailable {
                    let expr = Expression::function(spec, Vec::new());
                    assert_eq!(
                        expr.validate(dialect).unwrap_err().code(),
                        "unsupported_function",
                        "{} on {dialect:?}",
                        spec.name
                    );
                }
            }
        }
    }

    #[test]
    fn join_scan_recurses_through_functions() {
        let expr = call(
            "$and",
            vec![
                Expression::static_value(json!(true)),
                Expression::static_value(json!(false)),
            ],
        );
        assert!(!expr.has_join_field_values());
    }
}
