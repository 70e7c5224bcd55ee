//! Database dialect identification and dialect-specific behavior.
//!
//! The dialect partitions the whole engine: MongoDB is the sole document
//! dialect, the other four are SQL dialects and share most of the lowering.

use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;

use crate::error::{ClientError, Result};

/// Supported database dialects.
///
/// The serialized names are wire-exact: metadata descriptors and adapters
/// identify dialects by these strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dialect {
    MongoDB,
    PostgreSQL,
    MySQL,
    #[serde(rename = "SQL Server")]
    SQLServer,
    Oracle,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Dialect-specific behavior, kept behind a trait to avoid scattering match
/// statements through the engine.
pub trait DialectExt {
    /// Get the display name for this dialect
    fn display_name(&self) -> &'static str;

    /// Check if this dialect is a SQL database (everything except MongoDB)
    fn is_sql(&self) -> bool;

    /// Check if a record identifier value is well formed for this dialect
    fn is_valid_id(&self, value: &Value) -> bool;

    /// Wrap a raw identifier in the dialect's native id representation
    fn construct_id(&self, raw: &str) -> Result<Value>;

    /// Encode a `[longitude, latitude]` pair in the dialect's point form
    fn encode_geo_point(&self, lon: f64, lat: f64) -> Value;
}

impl DialectExt for Dialect {
    fn display_name(&self) -> &'static str {
        match self {
            Dialect::MongoDB => "MongoDB",
            Dialect::PostgreSQL => "PostgreSQL",
            Dialect::MySQL => "MySQL",
            Dialect::SQLServer => "SQL Server",
            Dialect::Oracle => "Oracle",
        }
    }

    fn is_sql(&self) -> bool {
        match self {
            Dialect::MongoDB => false,
            Dialect::PostgreSQL | Dialect::MySQL | Dialect::SQLServer | Dialect::Oracle => true,
        }
    }

    fn is_valid_id(&self, value: &Value) -> bool {
        match self {
            // MongoDB requires a well-formed 24-hex-character object id,
            // either as a plain string or already in extended-JSON form.
            Dialect::MongoDB => match value {
                Value::String(s) => ObjectId::parse_str(s).is_ok(),
                Value::Object(map) => map
                    .get("$oid")
                    .and_then(Value::as_str)
                    .is_some_and(|s| ObjectId::parse_str(s).is_ok()),
                _ => false,
            },
            // SQL dialects accept any non-empty string or integer key.
            Dialect::PostgreSQL | Dialect::MySQL | Dialect::SQLServer | Dialect::Oracle => {
                match value {
                    Value::String(s) => !s.trim().is_empty(),
                    Value::Number(n) => n.is_i64() || n.is_u64(),
                    _ => false,
                }
            }
        }
    }

    fn construct_id(&self, raw: &str) -> Result<Value> {
        match self {
            Dialect::MongoDB => {
                let oid = ObjectId::parse_str(raw).map_err(|_| {
                    ClientError::InvalidValue(format!("Not a valid MongoDB object id: '{raw}'"))
                })?;
                Ok(json!({ "$oid": oid.to_hex() }))
            }
            Dialect::PostgreSQL | Dialect::MySQL | Dialect::SQLServer | Dialect::Oracle => {
                if raw.trim().is_empty() {
                    return Err(ClientError::InvalidValue(
                        "Record identifiers cannot be empty".to_string(),
                    ));
                }
                Ok(Value::String(raw.to_string()))
            }
        }
    }

    fn encode_geo_point(&self, lon: f64, lat: f64) -> Value {
        match self {
            Dialect::MongoDB => json!({ "type": "Point", "coordinates": [lon, lat] }),
            Dialect::PostgreSQL | Dialect::MySQL => Value::String(format!("POINT({lon} {lat})")),
            Dialect::SQLServer => Value::String(format!("geography::Point({lat}, {lon}, 4326)")),
            Dialect::Oracle => Value::String(format!(
                "SDO_GEOMETRY(2001, NULL, SDO_POINT_TYPE({lon}, {lat}, NULL), NULL, NULL)"
            )),
        }
    }
}

/// Generate a fresh record identifier for dialects that mint ids client-side.
///
/// MongoDB ids are minted as object ids; SQL dialects leave id assignment to
/// the backing engine and return `None`.
pub fn generate_id(dialect: Dialect) -> Option<Value> {
    match dialect {
        Dialect::MongoDB => Some(json!({ "$oid": ObjectId::new().to_hex() })),
        Dialect::PostgreSQL | Dialect::MySQL | Dialect::SQLServer | Dialect::Oracle => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Dialect::MongoDB, "MongoDB", false)]
    #[case(Dialect::PostgreSQL, "PostgreSQL", true)]
    #[case(Dialect::MySQL, "MySQL", true)]
    #[case(Dialect::SQLServer, "SQL Server", true)]
    #[case(Dialect::Oracle, "Oracle", true)]
    fn dialect_basics(#[case] dialect: Dialect, #[case] name: &str, #[case] sql: bool) {
        assert_eq!(dialect.display_name(), name);
        assert_eq!(dialect.is_sql(), sql);
    }

    #[test]
    fn dialect_names_are_wire_exact() {
        let parsed: Dialect = serde_json::from_str("\"SQL Server\"").unwrap();
        assert_eq!(parsed, Dialect::SQLServer);
        assert_eq!(
            serde_json::to_string(&Dialect::MongoDB).unwrap(),
            "\"MongoDB\""
        );
    }

    #[test]
    fn mongodb_id_validation() {
        let dialect = Dialect::MongoDB;
        assert!(dialect.is_valid_id(&json!("507f1f77bcf86cd799439011")));
        assert!(dialect.is_valid_id(&json!({ "$oid": "507f1f77bcf86cd799439011" })));
        assert!(!dialect.is_valid_id(&json!("not-an-object-id")));
        assert!(!dialect.is_valid_id(&json!(42)));
    }

    #[test]
    fn sql_id_validation() {
        let dialect = Dialect::PostgreSQL;
        assert!(dialect.is_valid_id(&json!("user-1")));
        assert!(dialect.is_valid_id(&json!(42)));
        assert!(!dialect.is_valid_id(&json!("   ")));
        assert!(!dialect.is_valid_id(&json!(1.5)));
        assert!(!dialect.is_valid_id(&json!(true)));
    }

    #[test]
    fn id_construction_wraps_native_form() {
        let id = Dialect::MongoDB
            .construct_id("507f1f77bcf86cd799439011")
            .unwrap();
        assert_eq!(id, json!({ "$oid": "507f1f77bcf86cd799439011" }));
        assert!(Dialect::MongoDB.construct_id("xyz").is_err());

        let id = Dialect::MySQL.construct_id("1234").unwrap();
        assert_eq!(id, json!("1234"));
    }

    #[rstest]
    #[case(Dialect::PostgreSQL, json!("POINT(28.97 41.01)"))]
    #[case(Dialect::MySQL, json!("POINT(28.97 41.01)"))]
    #[case(Dialect::SQLServer, json!("geography::Point(41.01, 28.97, 4326)"))]
    fn geo_point_encoding(#[case] dialect: Dialect, #[case] expected: Value) {
        assert_eq!(dialect.encode_geo_point(28.97, 41.01), expected);
    }

    #[test]
    fn geo_point_encoding_mongodb() {
        assert_eq!(
            Dialect::MongoDB.encode_geo_point(28.97, 41.01),
            json!({ "type": "Point", "coordinates": [28.97, 41.01] })
        );
    }

    #[test]
    fn generated_ids_are_dialect_shaped() {
        let id = generate_id(Dialect::MongoDB).unwrap();
        assert!(Dialect::MongoDB.is_valid_id(&id));
        assert!(generate_id(Dialect::Oracle).is_none());
    }
}
