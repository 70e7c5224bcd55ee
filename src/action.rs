//! The database action builder.
//!
//! A [`DbAction`] accepts user-facing modifiers (method, id, where, select,
//! join, sort, grouping, updates, …), resolves field paths through nested
//! objects and joins, type-checks the resulting expression trees, and at
//! execute time lowers everything into an [`ActionDefinition`] dispatched to
//! the adapter. Actions are single-use.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::adapter::{DatabaseAdapter, ModelMetadata};
use crate::database::Database;
use crate::dialect::{Dialect, DialectExt};
use crate::error::{ClientError, Result, ValidationSink};
use crate::expression::{Expression, JoinType, ReturnType};
use crate::field::{Field, FieldKind};
use crate::functions::{self, ParamCount};
use crate::model::{Model, PrepareContext};

/// The CRUD / aggregation / search methods an action can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Method {
    CreateOne,
    CreateMany,
    DeleteById,
    DeleteOne,
    DeleteMany,
    FindById,
    FindOne,
    FindMany,
    UpdateById,
    UpdateOne,
    UpdateMany,
    Aggregate,
    SearchText,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::CreateOne => "createOne",
            Method::CreateMany => "createMany",
            Method::DeleteById => "deleteById",
            Method::DeleteOne => "deleteOne",
            Method::DeleteMany => "deleteMany",
            Method::FindById => "findById",
            Method::FindOne => "findOne",
            Method::FindMany => "findMany",
            Method::UpdateById => "updateById",
            Method::UpdateOne => "updateOne",
            Method::UpdateMany => "updateMany",
            Method::Aggregate => "aggregate",
            Method::SearchText => "searchText",
        }
    }

    /// Read-side methods may be served by a read replica.
    pub fn is_read(self) -> bool {
        matches!(
            self,
            Method::FindById
                | Method::FindOne
                | Method::FindMany
                | Method::Aggregate
                | Method::SearchText
        )
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a condition object is interpreted during parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionType {
    Query,
    PullCondition,
    ArrayFilter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SortEntry {
    pub field_name: String,
    pub order: SortOrder,
    pub join_type: JoinType,
}

/// Aggregation operators usable inside `computations`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeOp {
    Count,
    CountIf,
    Sum,
    Avg,
    Min,
    Max,
}

impl ComputeOp {
    fn parse(raw: &str) -> Option<Self> {
        let key = raw.strip_prefix('$').unwrap_or(raw);
        match key.to_ascii_lowercase().as_str() {
            "count" => Some(ComputeOp::Count),
            "countif" => Some(ComputeOp::CountIf),
            "sum" => Some(ComputeOp::Sum),
            "avg" => Some(ComputeOp::Avg),
            "min" => Some(ComputeOp::Min),
            "max" => Some(ComputeOp::Max),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ComputeOp::Count => "$count",
            ComputeOp::CountIf => "$countIf",
            ComputeOp::Sum => "$sum",
            ComputeOp::Avg => "$avg",
            ComputeOp::Min => "$min",
            ComputeOp::Max => "$max",
        }
    }
}

/// A parsed join list entry.
#[derive(Debug, Clone)]
pub struct JoinDefinition {
    pub join_type: JoinType,
    /// The reference field name for simple joins, the alias for complex
    /// joins.
    pub field_name: String,
    pub model: Arc<Model>,
    pub where_expr: Option<Expression>,
}

#[derive(Debug, Clone)]
struct GroupBy {
    alias: String,
    expr: Expression,
}

#[derive(Debug, Clone)]
struct Computation {
    alias: String,
    op: ComputeOp,
    expr: Option<Expression>,
}

/// Update operators recognized inside `setUpdates` entries.
const UPDATE_OPERATORS: &[&str] = &[
    "$set", "$unset", "$inc", "$mul", "$min", "$max", "$push", "$pull", "$pop", "$shift",
];

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateData {
    pub set: Map<String, Value>,
    pub others: Vec<UpdateEntry>,
}

impl UpdateData {
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.others.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEntry {
    pub field_name: String,
    /// Field type tag.
    pub field: &'static str,
    #[serde(rename = "type")]
    pub op: String,
    pub value: Value,
}

/// Serialized join entry inside the action definition.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinSpec {
    #[serde(rename = "type")]
    pub join_type: JoinType,
    pub field_name: String,
    pub from: String,
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_query: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupByEntry {
    #[serde(rename = "as")]
    pub alias: String,
    pub expression: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComputationEntry {
    #[serde(rename = "as")]
    pub alias: String,
    pub operator: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compute: Option<Value>,
}

/// The record handed to the adapter; opaque from its point of view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDefinition {
    pub method: Method,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_query: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub select: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub omit: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join: Option<Vec<JoinSpec>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<Vec<SortEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_by: Option<Vec<GroupByEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub computations: Option<Vec<ComputationEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_sort: Option<Vec<SortEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub having: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub array_filters: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_data: Option<UpdateData>,
    pub use_read_replica: bool,
}

/// Single-use builder compiling one database action.
#[derive(Debug)]
pub struct DbAction {
    db: Arc<Database>,
    model: Arc<Model>,
    method: Option<Method>,
    id: Option<Value>,
    where_expr: Option<Expression>,
    select: Vec<String>,
    omit: Vec<String>,
    joins: Vec<JoinDefinition>,
    sort: Vec<SortEntry>,
    acting_user: Option<Value>,
    skip: Option<u64>,
    limit: Option<u64>,
    use_read_replica: bool,
    create_data: Option<Value>,
    update_data: Option<UpdateData>,
    array_filters: Vec<Expression>,
    group_by: Vec<GroupBy>,
    computations: Vec<Computation>,
    group_sort: Vec<SortEntry>,
    having: Option<Expression>,
    search_text: Option<String>,
}

impl DbAction {
    pub fn new(db: Arc<Database>, model: Arc<Model>) -> Self {
        DbAction {
            db,
            model,
            method: None,
            id: None,
            where_expr: None,
            select: Vec::new(),
            omit: Vec::new(),
            joins: Vec::new(),
            sort: Vec::new(),
            acting_user: None,
            skip: None,
            limit: None,
            use_read_replica: false,
            create_data: None,
            update_data: None,
            array_filters: Vec::new(),
            group_by: Vec::new(),
            computations: Vec::new(),
            group_sort: Vec::new(),
            having: None,
            search_text: None,
        }
    }

    fn parser<'a>(&'a self, model: &'a Arc<Model>, condition_type: ConditionType) -> ConditionParser<'a> {
        ConditionParser {
            db: &self.db,
            model,
            joins: &self.joins,
            condition_type,
        }
    }

    pub fn set_method(&mut self, method: Method) -> Result<&mut Self> {
        self.method = Some(method);
        Ok(self)
    }

    pub fn set_id(&mut self, id: &Value) -> Result<&mut Self> {
        let dialect = self.db.dialect();
        if !dialect.is_valid_id(id) {
            return Err(ClientError::InvalidValue(format!(
                "Not a valid {dialect} record identifier: {id}"
            )));
        }
        let normalized = match (dialect, id) {
            (Dialect::MongoDB, Value::String(raw)) => dialect.construct_id(raw)?,
            _ => id.clone(),
        };
        self.id = Some(normalized);
        Ok(self)
    }

    pub fn set_read_replica(&mut self, use_read_replica: bool) -> Result<&mut Self> {
        self.use_read_replica = use_read_replica;
        Ok(self)
    }

    /// Record the id of the user performing this action; createdBy/updatedBy
    /// fields of the model stamp it during preparation. Must be set before
    /// the create data or updates.
    pub fn set_acting_user(&mut self, user: &Value) -> Result<&mut Self> {
        if !crate::helpers::is_key(user) {
            return Err(ClientError::InvalidValue(format!(
                "Not a valid acting user identifier: {user}"
            )));
        }
        self.acting_user = Some(user.clone());
        Ok(self)
    }

    pub fn set_skip(&mut self, skip: i64) -> Result<&mut Self> {
        if skip < 0 {
            return Err(ClientError::InvalidValue(format!(
                "The skip count cannot be negative, received {skip}"
            )));
        }
        self.skip = Some(skip as u64);
        Ok(self)
    }

    pub fn set_limit(&mut self, limit: i64) -> Result<&mut Self> {
        if limit <= 0 {
            return Err(ClientError::InvalidValue(format!(
                "The limit needs to be a positive integer, received {limit}"
            )));
        }
        self.limit = Some(limit as u64);
        Ok(self)
    }

    /// Validate and store the create payload: one object or an array of
    /// objects, each run through the model's field preparation.
    pub fn set_create_data(&mut self, data: &Value) -> Result<&mut Self> {
        let ctx =
            PrepareContext::new(self.db.dialect()).with_acting_user(self.acting_user.clone());
        let mut sink = ValidationSink::new();
        let prepared = match data {
            Value::Object(map) => {
                let record = self
                    .model
                    .prepare_field_values(map, true, &mut sink, None, &ctx)?;
                Value::Object(record)
            }
            Value::Array(items) => {
                let mut records = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    let Some(map) = item.as_object() else {
                        return Err(ClientError::InvalidValue(format!(
                            "Each record of a multi-record create must be an object, entry #{index} is not"
                        )));
                    };
                    let record =
                        self.model
                            .prepare_field_values(map, true, &mut sink, Some(index), &ctx)?;
                    records.push(Value::Object(record));
                }
                Value::Array(records)
            }
            _ => {
                return Err(ClientError::InvalidValue(
                    "The create data must be a single object or an array of objects".to_string(),
                ));
            }
        };
        sink.into_result()?;
        self.create_data = Some(prepared);
        Ok(self)
    }

    /// Parse a condition object into an expression tree and validate it
    /// against the active dialect.
    pub fn set_where(&mut self, condition: &Value, condition_type: ConditionType) -> Result<&mut Self> {
        let model = Arc::clone(&self.model);
        let expr = self.parser(&model, condition_type).parse_condition(condition)?;
        if let Some(expr) = &expr {
            match condition_type {
                ConditionType::PullCondition => expr.validate_for_pull(self.db.dialect())?,
                _ => expr.validate(self.db.dialect())?,
            }
        }
        self.where_expr = expr;
        Ok(self)
    }

    pub fn set_select(&mut self, list: &[String]) -> Result<&mut Self> {
        if !self.omit.is_empty() {
            return Err(ClientError::InvalidParameter(
                "'select' and 'omit' definitions are mutually exclusive, only one can be used"
                    .to_string(),
            ));
        }
        self.select = self.resolve_field_list(list)?;
        Ok(self)
    }

    pub fn set_omit(&mut self, list: &[String]) -> Result<&mut Self> {
        if !self.select.is_empty() {
            return Err(ClientError::InvalidParameter(
                "'select' and 'omit' definitions are mutually exclusive, only one can be used"
                    .to_string(),
            ));
        }
        self.omit = self.resolve_field_list(list)?;
        Ok(self)
    }

    fn resolve_field_list(&self, list: &[String]) -> Result<Vec<String>> {
        let model = Arc::clone(&self.model);
        let parser = self.parser(&model, ConditionType::Query);
        let mut resolved = Vec::with_capacity(list.len());
        let mut unknown = Vec::new();
        for name in list {
            match parser.get_field_object(name) {
                Some((_, path, _)) => resolved.push(path),
                None => unknown.push(name.as_str()),
            }
        }
        if !unknown.is_empty() {
            return Err(ClientError::InvalidField(format!(
                "Cannot find field(s) '{}' of model '{}'",
                unknown.join("', '"),
                self.model.name()
            )));
        }
        Ok(resolved)
    }

    /// Register the join list. Entries are either reference field names
    /// (simple auto-joins) or `{as, from, where}` objects (complex joins).
    pub fn set_join(&mut self, spec: &Value) -> Result<&mut Self> {
        let entries: Vec<&Value> = match spec {
            Value::Null => Vec::new(),
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };

        let mut joins: Vec<JoinDefinition> = Vec::new();
        let mut raw_wheres: Vec<Option<Value>> = Vec::new();

        for entry in entries {
            match entry {
                Value::String(name) => {
                    let field = self.model.get_field(name).ok_or_else(|| {
                        ClientError::InvalidJoin(format!(
                            "Model '{}' does not have a field named '{name}'",
                            self.model.name()
                        ))
                    })?;
                    let iid = field.reference_iid().ok_or_else(|| {
                        ClientError::InvalidJoin(format!(
                            "Field '{name}' is not a reference field, simple joins follow references"
                        ))
                    })?;
                    let target = self.db.get_model_by_iid(iid).ok_or_else(|| {
                        ClientError::InvalidJoin(format!(
                            "Cannot find the model referenced by field '{name}'"
                        ))
                    })?;
                    if joins.iter().any(|j| j.field_name == *name) {
                        return Err(ClientError::InvalidJoin(format!(
                            "Field '{name}' is joined more than once"
                        )));
                    }
                    joins.push(JoinDefinition {
                        join_type: JoinType::Simple,
                        field_name: name.clone(),
                        model: target,
                        where_expr: None,
                    });
                    raw_wheres.push(None);
                }
                Value::Object(map) => {
                    let alias = map
                        .get("as")
                        .and_then(Value::as_str)
                        .filter(|s| !s.trim().is_empty())
                        .ok_or_else(|| {
                            ClientError::InvalidJoin(
                                "Complex joins need an 'as' alias".to_string(),
                            )
                        })?;
                    if alias.contains('.') {
                        return Err(ClientError::InvalidJoin(format!(
                            "Join alias '{alias}' cannot include '.'"
                        )));
                    }
                    if self.model.get_field(alias).is_some() {
                        return Err(ClientError::InvalidJoin(format!(
                            "Join alias '{alias}' shadows a field of model '{}'",
                            self.model.name()
                        )));
                    }
                    if joins.iter().any(|j| j.field_name == alias) {
                        return Err(ClientError::InvalidJoin(format!(
                            "Join alias '{alias}' is used more than once"
                        )));
                    }
                    let from = map.get("from").and_then(Value::as_str).ok_or_else(|| {
                        ClientError::InvalidJoin(
                            "Complex joins need a 'from' model name".to_string(),
                        )
                    })?;
                    let target = self.db.get_model(from).map_err(|_| {
                        ClientError::InvalidJoin(format!("Cannot find the model named '{from}'"))
                    })?;
                    let where_raw = map
                        .get("where")
                        .filter(|w| w.as_object().is_some_and(|m| !m.is_empty()))
                        .ok_or_else(|| {
                            ClientError::InvalidJoin(format!(
                                "Complex join '{alias}' needs a non-empty 'where' condition"
                            ))
                        })?;
                    joins.push(JoinDefinition {
                        join_type: JoinType::Complex,
                        field_name: alias.to_string(),
                        model: target,
                        where_expr: None,
                    });
                    raw_wheres.push(Some(where_raw.clone()));
                }
                _ => {
                    return Err(ClientError::InvalidJoin(
                        "Join entries must be reference field names or {as, from, where} objects"
                            .to_string(),
                    ));
                }
            }
        }

        self.joins = joins;

        // Join conditions can reference every alias, so parse them with the
        // full join list registered.
        let mut parsed = Vec::with_capacity(raw_wheres.len());
        {
            let model = Arc::clone(&self.model);
            let parser = self.parser(&model, ConditionType::Query);
            for raw in &raw_wheres {
                match raw {
                    Some(condition) => {
                        let expr = parser.parse_condition(condition)?.ok_or_else(|| {
                            ClientError::InvalidJoin(
                                "Join conditions cannot be empty".to_string(),
                            )
                        })?;
                        expr.validate(self.db.dialect())?;
                        parsed.push(Some(expr));
                    }
                    None => parsed.push(None),
                }
            }
        }
        for (join, expr) in self.joins.iter_mut().zip(parsed) {
            join.where_expr = expr;
        }
        Ok(self)
    }

    pub fn set_sort(&mut self, map: &Value) -> Result<&mut Self> {
        let model = Arc::clone(&self.model);
        self.sort = self.parse_sort(map, &model)?;
        Ok(self)
    }

    fn parse_sort(&self, map: &Value, model: &Arc<Model>) -> Result<Vec<SortEntry>> {
        let Some(entries) = map.as_object() else {
            return Err(ClientError::InvalidValue(
                "The sort definition must be an object mapping field paths to 'asc' or 'desc'"
                    .to_string(),
            ));
        };
        let parser = self.parser(model, ConditionType::Query);
        let mut sorted = Vec::with_capacity(entries.len());
        for (path, direction) in entries {
            let order = direction
                .as_str()
                .and_then(SortOrder::parse)
                .ok_or_else(|| {
                    ClientError::InvalidValue(format!(
                        "Sort direction of '{path}' must be 'asc' or 'desc'"
                    ))
                })?;
            let (_, resolved, join_type) = parser.get_field_object(path).ok_or_else(|| {
                ClientError::InvalidField(format!(
                    "Cannot find the sort field '{path}' of model '{}'",
                    model.name()
                ))
            })?;
            sorted.push(SortEntry {
                field_name: resolved,
                order,
                join_type,
            });
        }
        Ok(sorted)
    }

    /// Array filters attach free-identifier conditions to a MongoDB update.
    pub fn set_array_filters(&mut self, filters: &Value) -> Result<&mut Self> {
        if self.db.dialect() != Dialect::MongoDB {
            return Err(ClientError::InvalidParameter(format!(
                "Array filters are only available on MongoDB databases, not {}",
                self.db.dialect()
            )));
        }
        let Some(entries) = filters.as_array() else {
            return Err(ClientError::InvalidValue(
                "Array filters must be provided as an array of condition objects".to_string(),
            ));
        };
        let model = Arc::clone(&self.model);
        let mut parsed = Vec::with_capacity(entries.len());
        for entry in entries {
            let expr = self
                .parser(&model, ConditionType::ArrayFilter)
                .parse_condition(entry)?
                .ok_or_else(|| {
                    ClientError::InvalidValue("Array filter conditions cannot be empty".to_string())
                })?;
            expr.validate(self.db.dialect())?;
            parsed.push(expr);
        }
        self.array_filters = parsed;
        Ok(self)
    }

    pub fn set_group_by(&mut self, spec: &Value) -> Result<&mut Self> {
        let entries: Vec<&Value> = match spec {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        let model = Arc::clone(&self.model);
        let parser = self.parser(&model, ConditionType::Query);
        let mut groupings = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry {
                Value::String(path) => {
                    let (field, resolved, join_type) =
                        parser.get_field_object(path).ok_or_else(|| {
                            ClientError::InvalidField(format!(
                                "Cannot find the group-by field '{path}' of model '{}'",
                                self.model.name()
                            ))
                        })?;
                    groupings.push(GroupBy {
                        alias: path.clone(),
                        expr: Expression::field(field, resolved, join_type),
                    });
                }
                Value::Object(map) => {
                    let alias = map
                        .get("as")
                        .and_then(Value::as_str)
                        .filter(|s| !s.trim().is_empty() && !s.contains('.'))
                        .ok_or_else(|| {
                            ClientError::InvalidValue(
                                "Group-by entries need a valid 'as' alias".to_string(),
                            )
                        })?;
                    let raw = map.get("expression").ok_or_else(|| {
                        ClientError::InvalidValue(format!(
                            "Group-by entry '{alias}' needs an 'expression'"
                        ))
                    })?;
                    let expr = parser.parse_value(raw)?;
                    expr.validate(self.db.dialect())?;
                    groupings.push(GroupBy {
                        alias: alias.to_string(),
                        expr,
                    });
                }
                _ => {
                    return Err(ClientError::InvalidValue(
                        "Group-by entries must be field paths or {as, expression} objects"
                            .to_string(),
                    ));
                }
            }
        }
        self.group_by = groupings;
        Ok(self)
    }

    pub fn set_computations(&mut self, spec: &Value) -> Result<&mut Self> {
        let entries: Vec<&Value> = match spec {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        let model = Arc::clone(&self.model);
        let parser = self.parser(&model, ConditionType::Query);
        let mut computations = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(map) = entry.as_object() else {
                return Err(ClientError::InvalidValue(
                    "Computations must be {as, compute} objects".to_string(),
                ));
            };
            let alias = map
                .get("as")
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty() && !s.contains('.'))
                .ok_or_else(|| {
                    ClientError::InvalidValue(
                        "Computations need a valid 'as' alias".to_string(),
                    )
                })?;
            let compute = map.get("compute").and_then(Value::as_object).ok_or_else(|| {
                ClientError::MissingInputParameter(format!(
                    "Computation '{alias}' needs a 'compute' definition"
                ))
            })?;
            if compute.len() != 1 {
                return Err(ClientError::InvalidValue(format!(
                    "Computation '{alias}' must define exactly one operator"
                )));
            }
            let (op_key, operand) = compute.iter().next().unwrap();
            let op = ComputeOp::parse(op_key).ok_or_else(|| {
                ClientError::InvalidParameter(format!(
                    "'{op_key}' is not a valid computation operator"
                ))
            })?;

            let expr = match op {
                ComputeOp::Count => {
                    if !operand.is_null() {
                        return Err(ClientError::InvalidParameter(format!(
                            "Computation operator '$count' does not take an expression, '{alias}' provides one"
                        )));
                    }
                    None
                }
                ComputeOp::CountIf => {
                    let expr = parser.parse_value(operand)?;
                    let rt = expr.return_type();
                    if !matches!(rt, ReturnType::Boolean | ReturnType::Any | ReturnType::Null) {
                        return Err(ClientError::InvalidParameter(format!(
                            "Computation '{alias}' needs a boolean expression, received a '{rt:?}' value"
                        )));
                    }
                    expr.validate(self.db.dialect())?;
                    Some(expr)
                }
                _ => {
                    let expr = parser.parse_value(operand)?;
                    let rt = expr.return_type();
                    if !matches!(rt, ReturnType::Number | ReturnType::Any | ReturnType::Null) {
                        return Err(ClientError::InvalidParameter(format!(
                            "Computation '{alias}' needs a numeric expression, received a '{rt:?}' value"
                        )));
                    }
                    expr.validate(self.db.dialect())?;
                    Some(expr)
                }
            };
            computations.push(Computation {
                alias: alias.to_string(),
                op,
                expr,
            });
        }
        self.computations = computations;
        Ok(self)
    }

    /// Synthetic model whose fields are the group-by aliases (text) and
    /// computation aliases (integer); group sorts and having conditions
    /// re-parse against it.
    fn grouping_model(&self) -> Arc<Model> {
        let mut fields: Vec<Arc<Field>> = Vec::new();
        for group in &self.group_by {
            fields.push(Field::alias(
                group.alias.as_str(),
                FieldKind::Text {
                    max_length: None,
                    searchable: false,
                },
            ));
        }
        for computation in &self.computations {
            fields.push(Field::alias(computation.alias.as_str(), FieldKind::Integer));
        }
        Arc::new(Model::synthetic(
            format!("{}_grouping", self.model.name()),
            self.db.dialect(),
            fields,
        ))
    }

    pub fn set_group_sort(&mut self, map: &Value) -> Result<&mut Self> {
        let grouping = self.grouping_model();
        self.group_sort = self.parse_sort(map, &grouping)?;
        Ok(self)
    }

    pub fn set_having(&mut self, condition: &Value) -> Result<&mut Self> {
        let grouping = self.grouping_model();
        let expr = self
            .parser(&grouping, ConditionType::Query)
            .parse_condition(condition)?;
        if let Some(expr) = &expr {
            expr.validate(self.db.dialect())?;
        }
        self.having = expr;
        Ok(self)
    }

    pub fn set_search_text(&mut self, text: &str) -> Result<&mut Self> {
        if text.trim().is_empty() {
            return Err(ClientError::MissingInputParameter(
                "The text to search for needs to be provided".to_string(),
            ));
        }
        if !self.model.has_search_index() {
            return Err(ClientError::NotSearchableModel(
                self.model.name().to_string(),
            ));
        }
        self.search_text = Some(text.to_string());
        Ok(self)
    }

    /// Parse the update instructions: scalar assignments go to `set`, update
    /// operators to `others`.
    pub fn set_updates(&mut self, updates: &Value) -> Result<&mut Self> {
        let Some(entries) = updates.as_object() else {
            return Err(ClientError::InvalidValue(
                "The update definition must be an object".to_string(),
            ));
        };

        let dialect = self.db.dialect();
        let ctx = PrepareContext::new(dialect).with_acting_user(self.acting_user.clone());
        let mut sink = ValidationSink::new();
        let mut data = UpdateData::default();
        let model = Arc::clone(&self.model);

        for (path, value) in entries {
            let (field, resolved_path, _) = self
                .parser(&model, ConditionType::Query)
                .get_field_object(path)
                .ok_or_else(|| {
                    ClientError::InvalidField(format!(
                        "Cannot find the field '{path}' of model '{}' to update",
                        self.model.name()
                    ))
                })?;

            if !field.is_user_created() {
                return Err(ClientError::InvalidUpdateInstruction(format!(
                    "Field '{path}' is managed by the system and cannot be updated"
                )));
            }
            if field.is_read_only() {
                return Err(ClientError::InvalidUpdateInstruction(format!(
                    "Field '{path}' is read-only and cannot be updated"
                )));
            }

            let operator = value.as_object().and_then(|map| {
                if map.len() == 1 {
                    let (key, operand) = map.iter().next().unwrap();
                    if UPDATE_OPERATORS.contains(&key.as_str()) {
                        return Some((key.clone(), operand.clone()));
                    }
                }
                None
            });

            let Some((op, operand)) = operator else {
                // Scalar assignment, including raw JSON objects whose keys
                // are not update operators.
                self.assign_set_value(&field, &resolved_path, value, &mut data, &mut sink, &ctx)?;
                continue;
            };

            match op.as_str() {
                "$set" => {
                    self.assign_set_value(
                        &field,
                        &resolved_path,
                        &operand,
                        &mut data,
                        &mut sink,
                        &ctx,
                    )?;
                }
                "$unset" => {
                    if dialect != Dialect::MongoDB {
                        return Err(ClientError::InvalidUpdateInstruction(format!(
                            "'$unset' is only available on MongoDB databases, not {dialect}"
                        )));
                    }
                    if field.is_required() {
                        return Err(ClientError::InvalidUpdateInstruction(format!(
                            "Required field '{path}' cannot be unset"
                        )));
                    }
                    data.others.push(UpdateEntry {
                        field_name: resolved_path,
                        field: field.type_name(),
                        op: op.clone(),
                        value: json!(""),
                    });
                }
                "$inc" | "$mul" | "$min" | "$max" => {
                    if !field.is_numeric() {
                        return Err(ClientError::InvalidUpdateInstruction(format!(
                            "'{op}' can only be applied to integer, decimal, or monetary fields, '{path}' is {}",
                            field.type_name()
                        )));
                    }
                    let Value::Number(number) = &operand else {
                        return Err(ClientError::InvalidUpdateInstruction(format!(
                            "'{op}' on '{path}' needs a numeric value"
                        )));
                    };
                    if matches!(field.kind(), FieldKind::Integer)
                        && number.as_i64().is_none()
                        && number.as_u64().is_none()
                    {
                        return Err(ClientError::InvalidUpdateInstruction(format!(
                            "'{op}' on integer field '{path}' needs an integer value"
                        )));
                    }
                    data.others.push(UpdateEntry {
                        field_name: resolved_path,
                        field: field.type_name(),
                        op: op.clone(),
                        value: operand,
                    });
                }
                "$push" => {
                    let value = self.prepare_push(&field, path, &operand, &mut sink, &ctx)?;
                    data.others.push(UpdateEntry {
                        field_name: resolved_path,
                        field: field.type_name(),
                        op: op.clone(),
                        value,
                    });
                }
                "$pull" => {
                    let value = self.prepare_pull(&field, path, &operand)?;
                    data.others.push(UpdateEntry {
                        field_name: resolved_path,
                        field: field.type_name(),
                        op: op.clone(),
                        value,
                    });
                }
                "$pop" | "$shift" => {
                    if !field.is_list() {
                        return Err(ClientError::InvalidUpdateInstruction(format!(
                            "'{op}' can only be applied to list fields, '{path}' is {}",
                            field.type_name()
                        )));
                    }
                    let value = if op == "$pop" { json!(1) } else { json!(-1) };
                    data.others.push(UpdateEntry {
                        field_name: resolved_path,
                        field: field.type_name(),
                        op: op.clone(),
                        value,
                    });
                }
                _ => unreachable!("operator membership checked above"),
            }
        }

        // System fields only auto-update for updatedAt.
        let mut staged = Map::new();
        for field in self.model.fields() {
            if !field.is_user_created() {
                field.prepare(None, &mut staged, &mut sink, false, None, &ctx)?;
                if let Some(value) = staged.remove(field.name()) {
                    data.set.insert(field.query_path().to_string(), value);
                }
            }
        }

        sink.into_result()?;
        self.update_data = Some(data);
        Ok(self)
    }

    fn assign_set_value(
        &self,
        field: &Arc<Field>,
        resolved_path: &str,
        value: &Value,
        data: &mut UpdateData,
        sink: &mut ValidationSink,
        ctx: &PrepareContext,
    ) -> Result<()> {
        let mut staged = Map::new();
        field.prepare(Some(value), &mut staged, sink, false, None, ctx)?;
        if let Some(prepared) = staged.remove(field.name()) {
            data.set.insert(resolved_path.to_string(), prepared);
        }
        Ok(())
    }

    fn prepare_push(
        &self,
        field: &Arc<Field>,
        path: &str,
        operand: &Value,
        sink: &mut ValidationSink,
        ctx: &PrepareContext,
    ) -> Result<Value> {
        if !field.is_list() {
            return Err(ClientError::InvalidUpdateInstruction(format!(
                "'$push' can only be applied to list fields, '{path}' is {}",
                field.type_name()
            )));
        }

        let each = operand.as_object().and_then(|map| {
            if map.len() == 1 {
                map.get("$each").and_then(Value::as_array).cloned()
            } else {
                None
            }
        });
        let (elements, wrapped) = match each {
            Some(items) => (items, true),
            None => (vec![operand.clone()], false),
        };

        let mut prepared = Vec::with_capacity(elements.len());
        match field.kind() {
            FieldKind::BasicValuesList => {
                for element in &elements {
                    if !crate::helpers::is_primitive(element) {
                        return Err(ClientError::InvalidUpdateInstruction(format!(
                            "'$push' on '{path}' accepts primitive values only"
                        )));
                    }
                    prepared.push(element.clone());
                }
            }
            FieldKind::ObjectList { model } => {
                for element in &elements {
                    let Some(map) = element.as_object() else {
                        return Err(ClientError::InvalidUpdateInstruction(format!(
                            "'$push' on '{path}' accepts objects only"
                        )));
                    };
                    let record = model.prepare_field_values(map, true, sink, None, ctx)?;
                    prepared.push(Value::Object(record));
                }
            }
            _ => unreachable!("list membership checked above"),
        }

        Ok(if wrapped {
            json!({ "$each": prepared })
        } else {
            prepared.into_iter().next().unwrap_or(Value::Null)
        })
    }

    fn prepare_pull(&self, field: &Arc<Field>, path: &str, operand: &Value) -> Result<Value> {
        if !field.is_list() {
            return Err(ClientError::InvalidUpdateInstruction(format!(
                "'$pull' can only be applied to list fields, '{path}' is {}",
                field.type_name()
            )));
        }
        let dialect = self.db.dialect();

        let (target_model, drop_field_name) = match field.kind() {
            FieldKind::ObjectList { model } => (Arc::clone(model), false),
            // Conditions on scalar lists key on the list's own name and the
            // name is dropped at lowering so they apply to the elements.
            FieldKind::BasicValuesList => {
                let element = Field::array_filter(field.name());
                (
                    Arc::new(Model::synthetic(
                        format!("{}_elements", field.name()),
                        dialect,
                        vec![element],
                    )),
                    true,
                )
            }
            _ => unreachable!("list membership checked above"),
        };

        let expr = self
            .parser(&target_model, ConditionType::PullCondition)
            .parse_condition(operand)?
            .ok_or_else(|| {
                ClientError::InvalidUpdateInstruction(format!(
                    "'$pull' on '{path}' needs a non-empty condition"
                ))
            })?;
        expr.validate_for_pull(dialect)?;
        expr.get_pull_query(dialect, drop_field_name)
    }

    /// Lower the accumulated state into the adapter wire form.
    fn build_definition(&self, method: Method) -> Result<ActionDefinition> {
        let dialect = self.db.dialect();

        let where_query = self
            .where_expr
            .as_ref()
            .map(|expr| expr.get_query(dialect))
            .transpose()?;
        let having = self
            .having
            .as_ref()
            .map(|expr| expr.get_query(dialect))
            .transpose()?;
        let array_filters = self
            .array_filters
            .iter()
            .map(|expr| expr.get_query(dialect))
            .collect::<Result<Vec<_>>>()?;

        let join = self
            .joins
            .iter()
            .map(|join| {
                Ok(JoinSpec {
                    join_type: join.join_type,
                    field_name: join.field_name.clone(),
                    from: join.model.name().to_string(),
                    where_query: join
                        .where_expr
                        .as_ref()
                        .map(|expr| expr.get_query(dialect))
                        .transpose()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let group_by = self
            .group_by
            .iter()
            .map(|group| {
                Ok(GroupByEntry {
                    alias: group.alias.clone(),
                    expression: group.expr.get_query(dialect)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let computations = self
            .computations
            .iter()
            .map(|computation| {
                Ok(ComputationEntry {
                    alias: computation.alias.clone(),
                    operator: computation.op.as_str(),
                    compute: computation
                        .expr
                        .as_ref()
                        .map(|expr| expr.get_query(dialect))
                        .transpose()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ActionDefinition {
            method,
            id: self.id.clone(),
            where_query,
            select: non_empty(self.select.clone()),
            omit: non_empty(self.omit.clone()),
            join: non_empty(join),
            sort: non_empty(self.sort.clone()),
            skip: self.skip,
            limit: self.limit,
            group_by: non_empty(group_by),
            computations: non_empty(computations),
            group_sort: non_empty(self.group_sort.clone()),
            having,
            array_filters: non_empty(array_filters),
            search_text: self.search_text.clone(),
            create_data: self.create_data.clone(),
            update_data: self.update_data.clone(),
            use_read_replica: self.use_read_replica,
        })
    }

    fn model_metadata(&self) -> ModelMetadata {
        ModelMetadata {
            name: self.model.name().to_string(),
            iid: self.model.iid().to_string(),
            schema: self.model.schema().map(str::to_string),
            hierarchy: self.model.hierarchy().to_string(),
        }
    }

    /// Validate required inputs, lower the definition, pick the adapter, and
    /// dispatch.
    pub async fn execute(&mut self) -> Result<Value> {
        let method = self.method.ok_or_else(|| {
            ClientError::MissingInputParameter("The action method needs to be set".to_string())
        })?;

        match method {
            Method::FindById | Method::DeleteById | Method::UpdateById => {
                if self.id.is_none() {
                    return Err(ClientError::MissingInputParameter(format!(
                        "'{method}' needs the record identifier"
                    )));
                }
            }
            Method::CreateOne | Method::CreateMany => {
                if self.create_data.is_none() {
                    return Err(ClientError::MissingInputParameter(format!(
                        "'{method}' needs the data to create"
                    )));
                }
            }
            Method::SearchText => {
                if self.search_text.is_none() {
                    return Err(ClientError::MissingInputParameter(
                        "'searchText' needs the text to search for".to_string(),
                    ));
                }
            }
            _ => {}
        }
        if matches!(
            method,
            Method::UpdateById | Method::UpdateOne | Method::UpdateMany
        ) && self.update_data.as_ref().is_none_or(UpdateData::is_empty)
        {
            return Err(ClientError::MissingInputParameter(format!(
                "'{method}' needs at least one update instruction"
            )));
        }

        let definition = self.build_definition(method)?;
        let db_meta = self.db.metadata();
        let model_meta = self.model_metadata();

        let use_replica = self.use_read_replica && method.is_read();
        let adapter: &Arc<dyn DatabaseAdapter> = if use_replica {
            self.db.adapters().read()
        } else {
            self.db.adapters().read_write()
        };

        debug!(
            method = %method,
            model = %self.model.name(),
            database = %self.db.name(),
            replica = use_replica,
            "executing action"
        );

        match method {
            Method::CreateOne => adapter.create_one(&db_meta, &model_meta, &definition).await,
            Method::CreateMany => adapter.create_many(&db_meta, &model_meta, &definition).await,
            Method::FindById => adapter.find_by_id(&db_meta, &model_meta, &definition).await,
            Method::FindOne => adapter.find_one(&db_meta, &model_meta, &definition).await,
            Method::FindMany => adapter.find_many(&db_meta, &model_meta, &definition).await,
            Method::DeleteById => adapter.delete_by_id(&db_meta, &model_meta, &definition).await,
            Method::DeleteOne => adapter.delete_one(&db_meta, &model_meta, &definition).await,
            Method::DeleteMany => adapter.delete_many(&db_meta, &model_meta, &definition).await,
            Method::UpdateById => adapter.update_by_id(&db_meta, &model_meta, &definition).await,
            Method::UpdateOne => adapter.update_one(&db_meta, &model_meta, &definition).await,
            Method::UpdateMany => adapter.update_many(&db_meta, &model_meta, &definition).await,
            Method::Aggregate => adapter.aggregate(&db_meta, &model_meta, &definition).await,
            Method::SearchText => adapter.search_text(&db_meta, &model_meta, &definition).await,
        }
    }

    #[cfg(test)]
    pub(crate) fn where_expression(&self) -> Option<&Expression> {
        self.where_expr.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn definition_for(&self, method: Method) -> Result<ActionDefinition> {
        self.build_definition(method)
    }
}

fn non_empty<T>(list: Vec<T>) -> Option<Vec<T>> {
    if list.is_empty() { None } else { Some(list) }
}

/// Recursive condition-object parser bound to one model and join list.
struct ConditionParser<'a> {
    db: &'a Arc<Database>,
    model: &'a Arc<Model>,
    joins: &'a [JoinDefinition],
    condition_type: ConditionType,
}

impl ConditionParser<'_> {
    fn parse_condition(&self, condition: &Value) -> Result<Option<Expression>> {
        let Some(map) = condition.as_object() else {
            return Err(ClientError::InvalidValue(
                "Query conditions must be objects".to_string(),
            ));
        };
        match map.len() {
            0 => Ok(None),
            1 => {
                let (key, value) = map.iter().next().unwrap();
                Ok(Some(self.parse_entry(key, value)?))
            }
            _ => {
                // Multi-key conditions are an implicit logical and.
                let params = map
                    .iter()
                    .map(|(key, value)| self.parse_entry(key, value))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Some(Expression::function(
                    functions::lookup("$and").unwrap(),
                    params,
                )))
            }
        }
    }

    fn parse_entry(&self, key: &str, value: &Value) -> Result<Expression> {
        if let Some(spec) = functions::lookup(key) {
            let params = match value {
                Value::Array(items) => items
                    .iter()
                    .map(|item| self.parse_value(item))
                    .collect::<Result<Vec<_>>>()?,
                other => vec![self.parse_value(other)?],
            };
            return Ok(Expression::function(spec, params));
        }

        if let Some((field, path, join_type)) = self.get_field_object(key) {
            let anchor = Expression::field(field, path, join_type);
            return self.parse_field_condition(anchor, value);
        }

        if self.condition_type == ConditionType::ArrayFilter {
            let anchor = Expression::array_filter_field(key);
            return self.parse_field_condition(anchor, value);
        }

        Err(ClientError::InvalidExpression(format!(
            "'{key}' is neither a registered query function nor a field of model '{}'",
            self.model.name()
        )))
    }

    /// Conditions keyed by a field anchor the field as the first parameter:
    /// `{age: {$gte: 18}}` parses as `$gte(age, 18)` and a plain value as
    /// `$eq(age, value)`.
    fn parse_field_condition(&self, anchor: Expression, value: &Value) -> Result<Expression> {
        if let Some(map) = value.as_object() {
            let all_functions =
                !map.is_empty() && map.keys().all(|key| functions::lookup(key).is_some());
            if all_functions {
                let mut parts = Vec::with_capacity(map.len());
                for (op, operand) in map {
                    let spec = functions::lookup(op).unwrap();
                    parts.push(self.anchored_call(spec, anchor.clone(), operand)?);
                }
                return Ok(if parts.len() == 1 {
                    parts.pop().unwrap()
                } else {
                    Expression::function(functions::lookup("$and").unwrap(), parts)
                });
            }
        }

        let operand = self.parse_value(value)?;
        Ok(Expression::function(
            functions::lookup("$eq").unwrap(),
            vec![anchor, operand],
        ))
    }

    fn anchored_call(
        &self,
        spec: &'static functions::FunctionSpec,
        anchor: Expression,
        operand: &Value,
    ) -> Result<Expression> {
        // Unary functions take only the anchor: `{tags: {$exists: true}}`;
        // a false flag negates.
        if spec.param_count == ParamCount::Exact(1) {
            let call = Expression::function(spec, vec![anchor]);
            return Ok(if operand.as_bool() == Some(false) {
                Expression::function(functions::lookup("$not").unwrap(), vec![call])
            } else {
                call
            });
        }
        let operand = self.parse_value(operand)?;
        Ok(Expression::function(spec, vec![anchor, operand]))
    }

    fn parse_value(&self, value: &Value) -> Result<Expression> {
        match value {
            Value::Bool(_) | Value::Number(_) | Value::Null => {
                Ok(Expression::static_value(value.clone()))
            }
            Value::String(text) => {
                if let Some((field, path, join_type)) = self.get_field_object(text) {
                    Ok(Expression::field(field, path, join_type))
                } else if self.condition_type == ConditionType::ArrayFilter {
                    Ok(Expression::array_filter_field(text.clone()))
                } else {
                    Ok(Expression::static_value(value.clone()))
                }
            }
            Value::Object(map) => {
                if map.is_empty() {
                    return Ok(Expression::static_value(value.clone()));
                }
                if map.len() == 1 {
                    let (key, entry) = map.iter().next().unwrap();
                    self.parse_entry(key, entry)
                } else {
                    let params = map
                        .iter()
                        .map(|(key, entry)| self.parse_entry(key, entry))
                        .collect::<Result<Vec<_>>>()?;
                    Ok(Expression::function(
                        functions::lookup("$and").unwrap(),
                        params,
                    ))
                }
            }
            Value::Array(items) => {
                let entries = items
                    .iter()
                    .map(|item| self.parse_value(item))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Expression::Array(entries))
            }
        }
    }

    /// Resolve a dotted path to its leaf field.
    ///
    /// `$`-prefixed positional segments are stripped. Intermediate segments
    /// must land in an object, an object-list, or a reference field that is
    /// explicitly auto-joined; following a reference promotes the join type
    /// to simple unless a complex alias already owns the path. Any break
    /// resolves to `None`.
    fn get_field_object(&self, raw_path: &str) -> Option<(Arc<Field>, String, JoinType)> {
        let segments: Vec<&str> = raw_path
            .split('.')
            .filter(|segment| !segment.starts_with('$'))
            .collect();
        if segments.is_empty() || segments.iter().any(|segment| segment.is_empty()) {
            return None;
        }
        let clean_path = segments.join(".");

        if segments.len() == 1 {
            let name = segments[0];
            if let Some(field) = self.model.get_field(name) {
                return Some((
                    Arc::clone(field),
                    field.query_path().to_string(),
                    JoinType::None,
                ));
            }
            let join = self
                .joins
                .iter()
                .find(|join| join.join_type == JoinType::Complex && join.field_name == name)?;
            return Some((
                Field::join(name, Arc::clone(&join.model)),
                name.to_string(),
                JoinType::Complex,
            ));
        }

        let mut current = Arc::clone(self.model);
        let mut join_type = JoinType::None;
        for (position, segment) in segments.iter().enumerate() {
            let is_last = position + 1 == segments.len();
            if is_last {
                let field = current.get_field(segment)?;
                return Some((Arc::clone(field), clean_path, join_type));
            }

            if let Some(field) = current.get_field(segment) {
                match field.kind() {
                    FieldKind::Object { model } | FieldKind::ObjectList { model } => {
                        current = Arc::clone(model);
                    }
                    FieldKind::Reference { .. } => {
                        let auto_joined = self.joins.iter().any(|join| {
                            join.join_type == JoinType::Simple && join.field_name == *segment
                        });
                        if !auto_joined {
                            return None;
                        }
                        current = self.db.get_model_by_iid(field.reference_iid()?)?;
                        if join_type != JoinType::Complex {
                            join_type = JoinType::Simple;
                        }
                    }
                    _ => return None,
                }
            } else if position == 0 {
                let join = self.joins.iter().find(|join| {
                    join.join_type == JoinType::Complex && join.field_name == *segment
                })?;
                current = Arc::clone(&join.model);
                join_type = JoinType::Complex;
            } else {
                return None;
            }
        }
        None
    }
}
