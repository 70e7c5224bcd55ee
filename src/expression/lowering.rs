//! Dialect lowering of expression trees.
//!
//! MongoDB lowering produces nested operator documents (`{ $op: args }`).
//! SQL lowering produces string fragments with operators positioned
//! in-order (`a = b`); functions without an inline SQL form lower to an
//! intermediate `{ "fn": ..., "args": [...] }` document that the adapter
//! finalizes.

use serde_json::{Value, json};

use crate::dialect::Dialect;
use crate::error::{ClientError, Result};

use super::{Expression, FunctionCall};
use crate::functions::Mapping;

impl Expression {
    /// Lower this node to a plan fragment for the given dialect.
    pub fn get_query(&self, dialect: Dialect) -> Result<Value> {
        match self {
            Expression::Field(fr) => Ok(Value::String(fr.path.clone())),
            Expression::ArrayFilterField(af) => Ok(Value::String(af.name.clone())),
            Expression::Static(value) => match dialect {
                Dialect::MongoDB => Ok(value.clone()),
                _ => Ok(Value::String(sql_literal(value))),
            },
            Expression::Array(items) => {
                let lowered = items
                    .iter()
                    .map(|item| item.get_query(dialect))
                    .collect::<Result<Vec<_>>>()?;
                match dialect {
                    Dialect::MongoDB => Ok(Value::Array(lowered)),
                    _ => {
                        let parts: Vec<String> =
                            lowered.iter().map(sql_fragment).collect();
                        Ok(Value::String(format!("({})", parts.join(", "))))
                    }
                }
            }
            Expression::Function(call) => lower_call(call, dialect),
        }
    }

    /// Lowering restricted to the MongoDB `$pull` subset. When
    /// `drop_field_name` is set the produced condition applies directly to
    /// the array elements instead of one of their named fields.
    pub fn get_pull_query(&self, dialect: Dialect, drop_field_name: bool) -> Result<Value> {
        if dialect != Dialect::MongoDB {
            return Err(ClientError::InvalidUpdateInstruction(format!(
                "Pull conditions are only available on MongoDB databases, not {dialect}"
            )));
        }
        match self {
            // Inside a pull condition paths are relative to the array
            // elements, so only the leaf name is emitted.
            Expression::Field(fr) => Ok(Value::String(fr.field.name().to_string())),
            Expression::ArrayFilterField(af) => Ok(Value::String(af.name.clone())),
            Expression::Static(value) => Ok(value.clone()),
            Expression::Array(items) => {
                let lowered = items
                    .iter()
                    .map(|item| item.get_pull_query(dialect, drop_field_name))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::Array(lowered))
            }
            Expression::Function(call) => lower_pull_call(call, dialect, drop_field_name),
        }
    }
}

fn lower_call(call: &FunctionCall, dialect: Dialect) -> Result<Value> {
    let spec = call.spec;
    let args = call
        .params
        .iter()
        .map(|param| param.get_query(dialect))
        .collect::<Result<Vec<_>>>()?;

    match spec.mapping(dialect) {
        Mapping::Name(op) => match dialect {
            Dialect::MongoDB => {
                if args.len() == 1 {
                    Ok(json!({ op: args.into_iter().next().unwrap() }))
                } else {
                    Ok(json!({ op: args }))
                }
            }
            _ => {
                let parts: Vec<String> = args.iter().map(sql_fragment).collect();
                Ok(Value::String(format!("{}({})", op, parts.join(", "))))
            }
        },
        Mapping::Symbol(symbol) => {
            // Symbols only exist for SQL dialects; operators go in-order.
            let parts: Vec<String> = args.iter().map(sql_fragment).collect();
            if parts.len() == 2 {
                Ok(Value::String(format!(
                    "{} {} {}",
                    parts[0], symbol, parts[1]
                )))
            } else {
                Ok(Value::String(format!(
                    "({})",
                    parts.join(&format!(" {symbol} "))
                )))
            }
        }
        Mapping::Custom => match dialect {
            Dialect::MongoDB => lower_custom_mongo(call, args),
            _ => lower_custom_sql(call, dialect, args),
        },
        Mapping::NotAvailable => Err(ClientError::UnsupportedFunction(format!(
            "Function '{}' is not supported on {} databases",
            spec.name, dialect
        ))),
    }
}

/// MongoDB forms that do not follow the plain `{ $op: [args] }` pattern.
fn lower_custom_mongo(call: &FunctionCall, args: Vec<Value>) -> Result<Value> {
    let spec = call.spec;
    match spec.name {
        "$nin" => Ok(json!({ "$not": [{ "$in": args }] })),
        "$exists" => Ok(json!({ "$ne": [{ "$type": args[0] }, "missing"] })),
        "$isnotnull" => Ok(json!({ "$ne": [args[0], null] })),
        "$startsWith" => Ok(json!({ "$eq": [{ "$indexOfCP": [args[0], args[1]] }, 0] })),
        "$endsWith" => {
            let offset = json!({
                "$subtract": [{ "$strLenCP": args[0] }, { "$strLenCP": args[1] }]
            });
            Ok(json!({
                "$cond": {
                    "if": { "$gte": [offset, 0] },
                    "then": {
                        "$eq": [{ "$indexOfCP": [args[0], args[1], offset] }, offset]
                    },
                    "else": false
                }
            }))
        }
        "$includes" => {
            let case_sensitive = call.params[2]
                .as_static()
                .and_then(Value::as_bool)
                .unwrap_or(true);
            if case_sensitive {
                Ok(json!({ "$regexMatch": { "input": args[0], "regex": args[1] } }))
            } else {
                Ok(json!({
                    "$regexMatch": { "input": args[0], "regex": args[1], "options": "i" }
                }))
            }
        }
        "$left" => Ok(json!({ "$substrCP": [args[0], 0, args[1]] })),
        "$right" => {
            let start = json!({ "$subtract": [{ "$strLenCP": args[0] }, args[1]] });
            Ok(json!({
                "$cond": {
                    "if": { "$gte": [{ "$strLenCP": args[0] }, args[1]] },
                    "then": { "$substrCP": [args[0], start, args[1]] },
                    "else": args[0]
                }
            }))
        }
        "$trim" => Ok(json!({ "$trim": { "input": args[0] } })),
        "$ltrim" => Ok(json!({ "$ltrim": { "input": args[0] } })),
        "$rtrim" => Ok(json!({ "$rtrim": { "input": args[0] } })),
        "$dateAdd" => Ok(json!({
            "$dateAdd": { "startDate": args[0], "unit": args[2], "amount": args[1] }
        })),
        "$dateDiff" => Ok(json!({
            "$dateDiff": { "startDate": args[0], "endDate": args[1], "unit": args[2] }
        })),
        "$strToDate" => Ok(json!({ "$dateFromString": { "dateString": args[0] } })),
        "$now" => Ok(Value::String("$$NOW".to_string())),
        "$point" => Ok(json!({ "type": "Point", "coordinates": [args[0], args[1]] })),
        // Point-to-point distance has no single aggregation operator; the
        // adapter finalizes this into its geo pipeline form.
        "$distance" => Ok(json!({ "$distance": args })),
        other => Err(ClientError::UnsupportedFunction(format!(
            "Function '{other}' has no MongoDB lowering"
        ))),
    }
}

/// SQL forms with an inline fragment; everything else becomes an
/// intermediate `{ "fn": ..., "args": [...] }` document for the adapter.
fn lower_custom_sql(call: &FunctionCall, dialect: Dialect, args: Vec<Value>) -> Result<Value> {
    let spec = call.spec;
    let frag: Vec<String> = args.iter().map(sql_fragment).collect();
    match spec.name {
        "$exists" => Ok(Value::String(format!("{} IS NOT NULL", frag[0]))),
        "$isnotnull" => {
            // Single-quoted fragments are unwrapped before the null check.
            // This is only safe on literal-like fragments; a path that
            // legitimately starts and ends with apostrophes would also be
            // unwrapped.
            let inner = frag[0]
                .strip_prefix('\'')
                .and_then(|rest| rest.strip_suffix('\''))
                .unwrap_or(&frag[0]);
            Ok(Value::String(format!("{inner} IS NOT NULL")))
        }
        "$year" | "$month" | "$dayOfMonth" | "$dayOfWeek" | "$dayOfYear" | "$hour"
        | "$minute" | "$second" => Ok(Value::String(date_part(spec.name, dialect, &frag[0]))),
        "$now" => match dialect {
            Dialect::Oracle => Ok(Value::String("SYSTIMESTAMP".to_string())),
            _ => Ok(Value::String("NOW()".to_string())),
        },
        "$startsWith" => Ok(Value::String(format!(
            "{} LIKE {}",
            frag[0],
            concat_fragments(dialect, &[frag[1].clone(), "'%'".to_string()])
        ))),
        "$endsWith" => Ok(Value::String(format!(
            "{} LIKE {}",
            frag[0],
            concat_fragments(dialect, &["'%'".to_string(), frag[1].clone()])
        ))),
        "$includes" => {
            let case_sensitive = call.params[2]
                .as_static()
                .and_then(Value::as_bool)
                .unwrap_or(true);
            let pattern = concat_fragments(
                dialect,
                &["'%'".to_string(), frag[1].clone(), "'%'".to_string()],
            );
            if case_sensitive {
                Ok(Value::String(format!("{} LIKE {}", frag[0], pattern)))
            } else {
                Ok(Value::String(format!(
                    "LOWER({}) LIKE LOWER({})",
                    frag[0], pattern
                )))
            }
        }
        "$left" if dialect == Dialect::Oracle => Ok(Value::String(format!(
            "SUBSTR({}, 1, {})",
            frag[0], frag[1]
        ))),
        "$right" if dialect == Dialect::Oracle => Ok(Value::String(format!(
            "SUBSTR({}, -({}))",
            frag[0], frag[1]
        ))),
        "$charindex" if dialect == Dialect::PostgreSQL => Ok(Value::String(format!(
            "POSITION({} IN {})",
            frag[1], frag[0]
        ))),
        "$toBoolean" | "$toInteger" | "$toDecimal" | "$toDate" | "$toString" => Ok(
            Value::String(format!("CAST({} AS {})", frag[0], cast_type(spec.name, dialect))),
        ),
        "$point" => Ok(Value::String(match dialect {
            Dialect::PostgreSQL | Dialect::MySQL => format!("POINT({} {})", frag[0], frag[1]),
            Dialect::SQLServer => {
                format!("geography::Point({}, {}, 4326)", frag[1], frag[0])
            }
            Dialect::Oracle => format!(
                "SDO_GEOMETRY(2001, NULL, SDO_POINT_TYPE({}, {}, NULL), NULL, NULL)",
                frag[0], frag[1]
            ),
            Dialect::MongoDB => unreachable!(),
        })),
        // No inline SQL form; the adapter finalizes the intermediate.
        "$dateAdd" | "$dateDiff" | "$strToDate" | "$distance" => {
            Ok(json!({ "fn": spec.name, "args": args }))
        }
        other => Err(ClientError::UnsupportedFunction(format!(
            "Function '{other}' has no {dialect} lowering"
        ))),
    }
}

fn lower_pull_call(call: &FunctionCall, dialect: Dialect, drop_field_name: bool) -> Result<Value> {
    let spec = call.spec;
    match spec.name {
        "$and" => {
            let parts = call
                .params
                .iter()
                .map(|param| param.get_pull_query(dialect, drop_field_name))
                .collect::<Result<Vec<_>>>()?;
            Ok(json!({ "$and": parts }))
        }
        "$exists" => {
            if drop_field_name {
                Ok(json!({ "$exists": true }))
            } else {
                let field = call.params[0].get_pull_query(dialect, drop_field_name)?;
                let name = fragment_name(&field)?;
                Ok(json!({ name: { "$exists": true } }))
            }
        }
        "$eq" | "$neq" | "$lt" | "$lte" | "$gt" | "$gte" | "$in" | "$nin" => {
            let op = pull_operator(spec.name);
            let value = call.params[1].get_pull_query(dialect, drop_field_name)?;
            if drop_field_name {
                Ok(json!({ op: value }))
            } else {
                let field = call.params[0].get_pull_query(dialect, drop_field_name)?;
                let name = fragment_name(&field)?;
                Ok(json!({ name: { op: value } }))
            }
        }
        other => Err(ClientError::UnsupportedFunction(format!(
            "Function '{other}' cannot be used in a pull condition"
        ))),
    }
}

/// Map a registry name to the MongoDB query-operator used inside `$pull`.
fn pull_operator(name: &str) -> &'static str {
    match name {
        "$eq" => "$eq",
        "$neq" => "$ne",
        "$lt" => "$lt",
        "$lte" => "$lte",
        "$gt" => "$gt",
        "$gte" => "$gte",
        "$in" => "$in",
        "$nin" => "$nin",
        _ => unreachable!("not a pull comparison operator"),
    }
}

fn fragment_name(fragment: &Value) -> Result<String> {
    fragment
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            ClientError::InvalidExpression(
                "The first parameter of a pull comparison must be a field".to_string(),
            )
        })
}

/// Render a JSON literal as an inline SQL literal fragment.
fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(sql_literal).collect();
            format!("({})", parts.join(", "))
        }
        Value::Object(_) => format!("'{}'", value.to_string().replace('\'', "''")),
    }
}

/// Extract the textual fragment of a lowered SQL argument.
fn sql_fragment(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// String concatenation in the dialect's native form.
fn concat_fragments(dialect: Dialect, parts: &[String]) -> String {
    match dialect {
        Dialect::MySQL => format!("CONCAT({})", parts.join(", ")),
        Dialect::SQLServer => parts.join(" + "),
        _ => parts.join(" || "),
    }
}

fn date_part(name: &str, dialect: Dialect, arg: &str) -> String {
    let part = match name {
        "$year" => "YEAR",
        "$month" => "MONTH",
        "$dayOfMonth" => "DAY",
        "$dayOfWeek" => "DOW",
        "$dayOfYear" => "DOY",
        "$hour" => "HOUR",
        "$minute" => "MINUTE",
        "$second" => "SECOND",
        _ => unreachable!("not a date part function"),
    };
    match dialect {
        Dialect::SQLServer => {
            let keyword = match part {
                "DOW" => "weekday",
                "DOY" => "dayofyear",
                other => {
                    return format!("DATEPART({}, {arg})", other.to_ascii_lowercase());
                }
            };
            format!("DATEPART({keyword}, {arg})")
        }
        Dialect::MySQL => match part {
            "DOW" => format!("DAYOFWEEK({arg})"),
            "DOY" => format!("DAYOFYEAR({arg})"),
            other => format!("EXTRACT({other} FROM {arg})"),
        },
        _ => format!("EXTRACT({part} FROM {arg})"),
    }
}

fn cast_type(name: &str, dialect: Dialect) -> &'static str {
    match (name, dialect) {
        ("$toBoolean", Dialect::PostgreSQL) => "BOOLEAN",
        ("$toBoolean", Dialect::MySQL) => "UNSIGNED",
        ("$toBoolean", _) => "BIT",
        ("$toInteger", Dialect::PostgreSQL) => "INTEGER",
        ("$toInteger", Dialect::MySQL) => "SIGNED",
        ("$toInteger", Dialect::SQLServer) => "INT",
        ("$toInteger", _) => "NUMBER(38)",
        ("$toDecimal", Dialect::PostgreSQL) => "NUMERIC",
        ("$toDecimal", Dialect::MySQL) => "DECIMAL(65, 10)",
        ("$toDecimal", Dialect::SQLServer) => "DECIMAL(38, 10)",
        ("$toDecimal", _) => "NUMBER",
        ("$toDate", Dialect::PostgreSQL) => "TIMESTAMP",
        ("$toDate", Dialect::MySQL) => "DATETIME",
        ("$toDate", Dialect::SQLServer) => "DATETIME2",
        ("$toDate", _) => "TIMESTAMP",
        ("$toString", Dialect::PostgreSQL) => "TEXT",
        ("$toString", Dialect::MySQL) => "CHAR",
        ("$toString", Dialect::SQLServer) => "NVARCHAR(MAX)",
        ("$toString", _) => "VARCHAR2(4000)",
        _ => unreachable!("not a cast function"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::Expression;
    use crate::functions::lookup;

    fn call(name: &str, params: Vec<Expression>) -> Expression {
        Expression::function(lookup(name).unwrap(), params)
    }

    fn text(s: &str) -> Expression {
        Expression::static_value(json!(s))
    }

    fn number(n: i64) -> Expression {
        Expression::static_value(json!(n))
    }

    #[test]
    fn mongodb_operators_nest_as_documents() {
        let expr = call("$eq", vec![text("email"), text("a@b.c")]);
        assert_eq!(
            expr.get_query(Dialect::MongoDB).unwrap(),
            json!({ "$eq": ["email", "a@b.c"] })
        );
    }

    #[test]
    fn mongodb_single_parameter_operators_unwrap() {
        let expr = call("$abs", vec![number(-4)]);
        assert_eq!(
            expr.get_query(Dialect::MongoDB).unwrap(),
            json!({ "$abs": -4 })
        );
    }

    #[test]
    fn sql_symbols_position_in_order() {
        let expr = call("$eq", vec![text("a"), number(2)]);
        assert_eq!(
            expr.get_query(Dialect::PostgreSQL).unwrap(),
            json!("'a' = 2")
        );
    }

    #[test]
    fn sql_variadic_logicals_parenthesize() {
        let expr = call(
            "$and",
            vec![
                Expression::static_value(json!(true)),
                Expression::static_value(json!(false)),
                Expression::static_value(json!(true)),
            ],
        );
        assert_eq!(
            expr.get_query(Dialect::MySQL).unwrap(),
            json!("(TRUE AND FALSE AND TRUE)")
        );
    }

    #[test]
    fn sql_string_literals_escape_quotes() {
        let expr = call("$eq", vec![text("it's"), text("x")]);
        assert_eq!(
            expr.get_query(Dialect::Oracle).unwrap(),
            json!("'it''s' = 'x'")
        );
    }

    #[test]
    fn exists_lowers_to_missing_type_check_on_mongodb() {
        let expr = call("$exists", vec![text("profile.age")]);
        assert_eq!(
            expr.get_query(Dialect::MongoDB).unwrap(),
            json!({ "$ne": [{ "$type": "profile.age" }, "missing"] })
        );
    }

    #[test]
    fn isnotnull_unwraps_quoted_fragments_on_sql() {
        let expr = call("$isnotnull", vec![text("name")]);
        assert_eq!(
            expr.get_query(Dialect::PostgreSQL).unwrap(),
            json!("name IS NOT NULL")
        );
    }

    #[test]
    fn isnotnull_lowers_to_null_compare_on_mongodb() {
        let expr = call("$isnotnull", vec![text("name")]);
        assert_eq!(
            expr.get_query(Dialect::MongoDB).unwrap(),
            json!({ "$ne": ["name", null] })
        );
    }

    #[test]
    fn includes_is_case_insensitive_when_flag_is_false() {
        let expr = call(
            "$includes",
            vec![
                text("title"),
                text("rust"),
                Expression::static_value(json!(false)),
            ],
        );
        assert_eq!(
            expr.get_query(Dialect::MongoDB).unwrap(),
            json!({ "$regexMatch": { "input": "title", "regex": "rust", "options": "i" } })
        );
    }

    #[test]
    fn right_guards_short_strings_on_mongodb() {
        let expr = call("$right", vec![text("abc"), number(2)]);
        let lowered = expr.get_query(Dialect::MongoDB).unwrap();
        assert!(lowered.get("$cond").is_some());
    }

    #[test]
    fn in_composes_with_array_literals_on_sql() {
        let expr = call(
            "$in",
            vec![text("x"), Expression::static_value(json!([1, 2, 3]))],
        );
        assert_eq!(
            expr.get_query(Dialect::MySQL).unwrap(),
            json!("'x' IN (1, 2, 3)")
        );
    }

    #[test]
    fn nin_has_no_native_mongodb_operator() {
        let expr = call(
            "$nin",
            vec![text("x"), Expression::static_value(json!(["a"]))],
        );
        assert_eq!(
            expr.get_query(Dialect::MongoDB).unwrap(),
            json!({ "$not": [{ "$in": ["x", ["a"]] }] })
        );
    }

    #[test]
    fn date_parts_extract_per_dialect() {
        let expr = call("$year", vec![text("createdAt")]);
        assert_eq!(
            expr.get_query(Dialect::PostgreSQL).unwrap(),
            json!("EXTRACT(YEAR FROM 'createdAt')")
        );
        assert_eq!(
            expr.get_query(Dialect::SQLServer).unwrap(),
            json!("DATEPART(year, 'createdAt')")
        );
    }

    #[test]
    fn date_add_uses_object_form_on_mongodb() {
        let expr = call(
            "$dateAdd",
            vec![text("createdAt"), number(3), text("day")],
        );
        assert_eq!(
            expr.get_query(Dialect::MongoDB).unwrap(),
            json!({ "$dateAdd": { "startDate": "createdAt", "unit": "day", "amount": 3 } })
        );
    }

    #[test]
    fn date_add_is_an_intermediate_on_sql() {
        let expr = call(
            "$dateAdd",
            vec![text("createdAt"), number(3), text("day")],
        );
        let lowered = expr.get_query(Dialect::PostgreSQL).unwrap();
        assert_eq!(lowered["fn"], "$dateAdd");
    }

    #[test]
    fn pull_comparison_keys_on_leaf_name() {
        let expr = call("$gt", vec![text("qty"), number(5)]);
        assert_eq!(
            expr.get_pull_query(Dialect::MongoDB, false).unwrap(),
            json!({ "qty": { "$gt": 5 } })
        );
        assert_eq!(
            expr.get_pull_query(Dialect::MongoDB, true).unwrap(),
            json!({ "$gt": 5 })
        );
    }

    #[test]
    fn pull_and_composes_subconditions() {
        let expr = call(
            "$and",
            vec![
                call("$gte", vec![text("qty"), number(1)]),
                call("$in", vec![text("tag"), Expression::static_value(json!(["a", "b"]))]),
            ],
        );
        assert_eq!(
            expr.get_pull_query(Dialect::MongoDB, false).unwrap(),
            json!({ "$and": [
                { "qty": { "$gte": 1 } },
                { "tag": { "$in": ["a", "b"] } }
            ]})
        );
    }

    #[test]
    fn pull_is_mongodb_only() {
        let expr = call("$eq", vec![text("a"), number(1)]);
        assert_eq!(
            expr.get_pull_query(Dialect::PostgreSQL, false)
                .unwrap_err()
                .code(),
            "invalid_update_instruction"
        );
    }

    #[test]
    fn neq_maps_to_query_operator_ne_in_pull() {
        let expr = call("$neq", vec![text("state"), text("done")]);
        assert_eq!(
            expr.get_pull_query(Dialect::MongoDB, false).unwrap(),
            json!({ "state": { "$ne": "done" } })
        );
    }
}
