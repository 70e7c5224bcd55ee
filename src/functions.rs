//! Registry of the query functions usable inside condition, grouping, and
//! update expressions.
//!
//! Each entry fixes the arity, the parameter and result types, and the
//! per-dialect mapping: an infix symbol, a function name, `Custom` (the
//! expression node lowers it with dialect-specific logic), or `NotAvailable`.
//! Lookup is case-insensitive and accepts the name with or without the
//! leading `$`.

use crate::dialect::Dialect;
use crate::expression::ReturnType;

/// How a function lowers on one dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mapping {
    /// Infix operator symbol, positioned in-order on SQL dialects.
    Symbol(&'static str),
    /// Native function/operator name (`$`-prefixed for MongoDB).
    Name(&'static str),
    /// The expression node implements dialect-specific lowering locally.
    Custom,
    /// The function cannot be used on this dialect.
    NotAvailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamCount {
    Exact(usize),
    /// Variadic with a minimum of two parameters.
    AtLeastTwo,
}

#[derive(Debug, Clone, Copy)]
pub enum ParamTypes {
    /// One type applied to every parameter.
    Same(ReturnType),
    /// Positional types; parameters beyond the list accept anything.
    Each(&'static [ReturnType]),
}

#[derive(Debug)]
pub struct FunctionSpec {
    pub name: &'static str,
    pub param_count: ParamCount,
    pub params: ParamTypes,
    pub return_type: ReturnType,
    pub mongo: Mapping,
    pub postgres: Mapping,
    pub mysql: Mapping,
    pub sqlserver: Mapping,
    pub oracle: Mapping,
}

impl FunctionSpec {
    pub fn mapping(&self, dialect: Dialect) -> Mapping {
        match dialect {
            Dialect::MongoDB => self.mongo,
            Dialect::PostgreSQL => self.postgres,
            Dialect::MySQL => self.mysql,
            Dialect::SQLServer => self.sqlserver,
            Dialect::Oracle => self.oracle,
        }
    }

    pub fn param_type_at(&self, index: usize) -> ReturnType {
        match self.params {
            ParamTypes::Same(ty) => ty,
            ParamTypes::Each(list) => list.get(index).copied().unwrap_or(ReturnType::Any),
        }
    }

    /// Comparison functions get pairwise operand-compatibility checking on
    /// top of the declared parameter types.
    pub fn is_comparison(&self) -> bool {
        matches!(self.name, "$eq" | "$neq" | "$lt" | "$lte" | "$gt" | "$gte")
    }
}

/// The functions permitted inside a `$pull` update condition.
pub const UPDATE_PULL_FUNCTIONS: &[&str] = &[
    "$eq", "$neq", "$lt", "$lte", "$gt", "$gte", "$in", "$nin", "$and", "$exists",
];

/// Units accepted by `$dateAdd` / `$dateDiff`.
pub const DATE_UNITS: &[&str] = &[
    "year", "quarter", "week", "month", "day", "hour", "minute", "second", "millisecond",
];

/// Look up a function by user-supplied name, with or without the leading `$`,
/// case-insensitively.
pub fn lookup(name: &str) -> Option<&'static FunctionSpec> {
    let key = name.strip_prefix('$').unwrap_or(name);
    if key.is_empty() {
        return None;
    }
    FUNCTIONS
        .iter()
        .find(|spec| spec.name[1..].eq_ignore_ascii_case(key))
}

pub fn is_function_name(name: &str) -> bool {
    lookup(name).is_some()
}

use Mapping::{Custom, Name, NotAvailable, Symbol};
use ParamCount::{AtLeastTwo, Exact};
use ParamTypes::{Each, Same};

macro_rules! fun {
    ($name:literal, $count:expr, $params:expr, $ret:expr, $mongo:expr, $pg:expr, $my:expr, $ms:expr, $ora:expr) => {
        FunctionSpec {
            name: $name,
            param_count: $count,
            params: $params,
            return_type: $ret,
            mongo: $mongo,
            postgres: $pg,
            mysql: $my,
            sqlserver: $ms,
            oracle: $ora,
        }
    };
}

use ReturnType::{Any, Array, Boolean, Date, Geopoint, Number, Primitive, StaticBoolean, Text};

pub static FUNCTIONS: &[FunctionSpec] = &[
    // Logical
    fun!("$and", AtLeastTwo, Same(Boolean), Boolean, Name("$and"), Symbol("AND"), Symbol("AND"), Symbol("AND"), Symbol("AND")),
    fun!("$or", AtLeastTwo, Same(Boolean), Boolean, Name("$or"), Symbol("OR"), Symbol("OR"), Symbol("OR"), Symbol("OR")),
    fun!("$not", Exact(1), Same(Boolean), Boolean, Name("$not"), Name("NOT"), Name("NOT"), Name("NOT"), Name("NOT")),
    // Comparison
    fun!("$eq", Exact(2), Same(Any), Boolean, Name("$eq"), Symbol("="), Symbol("="), Symbol("="), Symbol("=")),
    fun!("$neq", Exact(2), Same(Any), Boolean, Name("$ne"), Symbol("<>"), Symbol("<>"), Symbol("<>"), Symbol("<>")),
    fun!("$lt", Exact(2), Same(Any), Boolean, Name("$lt"), Symbol("<"), Symbol("<"), Symbol("<"), Symbol("<")),
    fun!("$lte", Exact(2), Same(Any), Boolean, Name("$lte"), Symbol("<="), Symbol("<="), Symbol("<="), Symbol("<=")),
    fun!("$gt", Exact(2), Same(Any), Boolean, Name("$gt"), Symbol(">"), Symbol(">"), Symbol(">"), Symbol(">")),
    fun!("$gte", Exact(2), Same(Any), Boolean, Name("$gte"), Symbol(">="), Symbol(">="), Symbol(">="), Symbol(">=")),
    fun!("$in", Exact(2), Each(&[Primitive, Array]), Boolean, Name("$in"), Symbol("IN"), Symbol("IN"), Symbol("IN"), Symbol("IN")),
    fun!("$nin", Exact(2), Each(&[Primitive, Array]), Boolean, Custom, Symbol("NOT IN"), Symbol("NOT IN"), Symbol("NOT IN"), Symbol("NOT IN")),
    // Existence
    fun!("$exists", Exact(1), Same(Any), Boolean, Custom, Custom, Custom, Custom, Custom),
    fun!("$isnotnull", Exact(1), Same(Any), Boolean, Custom, Custom, Custom, Custom, Custom),
    // Arithmetic
    fun!("$add", AtLeastTwo, Same(Number), Number, Name("$add"), Symbol("+"), Symbol("+"), Symbol("+"), Symbol("+")),
    fun!("$subtract", Exact(2), Same(Number), Number, Name("$subtract"), Symbol("-"), Symbol("-"), Symbol("-"), Symbol("-")),
    fun!("$multiply", AtLeastTwo, Same(Number), Number, Name("$multiply"), Symbol("*"), Symbol("*"), Symbol("*"), Symbol("*")),
    fun!("$divide", Exact(2), Same(Number), Number, Name("$divide"), Symbol("/"), Symbol("/"), Symbol("/"), Symbol("/")),
    fun!("$mod", Exact(2), Same(Number), Number, Name("$mod"), Symbol("%"), Name("MOD"), Symbol("%"), Name("MOD")),
    fun!("$abs", Exact(1), Same(Number), Number, Name("$abs"), Name("ABS"), Name("ABS"), Name("ABS"), Name("ABS")),
    fun!("$ceil", Exact(1), Same(Number), Number, Name("$ceil"), Name("CEIL"), Name("CEIL"), Name("CEILING"), Name("CEIL")),
    fun!("$floor", Exact(1), Same(Number), Number, Name("$floor"), Name("FLOOR"), Name("FLOOR"), Name("FLOOR"), Name("FLOOR")),
    fun!("$round", Exact(2), Same(Number), Number, Name("$round"), Name("ROUND"), Name("ROUND"), Name("ROUND"), Name("ROUND")),
    fun!("$sqrt", Exact(1), Same(Number), Number, Name("$sqrt"), Name("SQRT"), Name("SQRT"), Name("SQRT"), Name("SQRT")),
    fun!("$pow", Exact(2), Same(Number), Number, Name("$pow"), Name("POWER"), Name("POWER"), Name("POWER"), Name("POWER")),
    fun!("$exp", Exact(1), Same(Number), Number, Name("$exp"), Name("EXP"), Name("EXP"), Name("EXP"), Name("EXP")),
    fun!("$ln", Exact(1), Same(Number), Number, Name("$ln"), Name("LN"), Name("LN"), Name("LOG"), Name("LN")),
    fun!("$log", Exact(2), Same(Number), Number, Name("$log"), Name("LOG"), Name("LOG"), Name("LOG"), Name("LOG")),
    fun!("$log10", Exact(1), Same(Number), Number, Name("$log10"), Name("LOG10"), Name("LOG10"), Name("LOG10"), NotAvailable),
    // Trigonometry
    fun!("$sin", Exact(1), Same(Number), Number, Name("$sin"), Name("SIN"), Name("SIN"), Name("SIN"), Name("SIN")),
    fun!("$cos", Exact(1), Same(Number), Number, Name("$cos"), Name("COS"), Name("COS"), Name("COS"), Name("COS")),
    fun!("$tan", Exact(1), Same(Number), Number, Name("$tan"), Name("TAN"), Name("TAN"), Name("TAN"), Name("TAN")),
    fun!("$asin", Exact(1), Same(Number), Number, Name("$asin"), Name("ASIN"), Name("ASIN"), Name("ASIN"), Name("ASIN")),
    fun!("$acos", Exact(1), Same(Number), Number, Name("$acos"), Name("ACOS"), Name("ACOS"), Name("ACOS"), Name("ACOS")),
    fun!("$atan", Exact(1), Same(Number), Number, Name("$atan"), Name("ATAN"), Name("ATAN"), Name("ATAN"), Name("ATAN")),
    fun!("$atan2", Exact(2), Same(Number), Number, Name("$atan2"), Name("ATAN2"), Name("ATAN2"), Name("ATN2"), Name("ATAN2")),
    fun!("$sinh", Exact(1), Same(Number), Number, Name("$sinh"), Name("SINH"), NotAvailable, NotAvailable, Name("SINH")),
    fun!("$cosh", Exact(1), Same(Number), Number, Name("$cosh"), Name("COSH"), NotAvailable, NotAvailable, Name("COSH")),
    fun!("$tanh", Exact(1), Same(Number), Number, Name("$tanh"), Name("TANH"), NotAvailable, NotAvailable, Name("TANH")),
    fun!("$asinh", Exact(1), Same(Number), Number, Name("$asinh"), Name("ASINH"), NotAvailable, NotAvailable, NotAvailable),
    fun!("$acosh", Exact(1), Same(Number), Number, Name("$acosh"), Name("ACOSH"), NotAvailable, NotAvailable, NotAvailable),
    fun!("$atanh", Exact(1), Same(Number), Number, Name("$atanh"), Name("ATANH"), NotAvailable, NotAvailable, NotAvailable),
    fun!("$degrees", Exact(1), Same(Number), Number, Name("$radiansToDegrees"), Name("DEGREES"), Name("DEGREES"), Name("DEGREES"), NotAvailable),
    fun!("$radians", Exact(1), Same(Number), Number, Name("$degreesToRadians"), Name("RADIANS"), Name("RADIANS"), Name("RADIANS"), NotAvailable),
    // Date arithmetic and parts
    fun!("$dateAdd", Exact(3), Each(&[Date, Number, Text]), ReturnType::Datetime, Custom, Custom, Custom, Custom, Custom),
    fun!("$dateDiff", Exact(3), Each(&[Date, Date, Text]), Number, Custom, Custom, Custom, Custom, Custom),
    fun!("$year", Exact(1), Same(Date), Number, Name("$year"), Custom, Custom, Custom, Custom),
    fun!("$month", Exact(1), Same(Date), Number, Name("$month"), Custom, Custom, Custom, Custom),
    fun!("$dayOfMonth", Exact(1), Same(Date), Number, Name("$dayOfMonth"), Custom, Custom, Custom, Custom),
    fun!("$dayOfWeek", Exact(1), Same(Date), Number, Name("$dayOfWeek"), Custom, Custom, Custom, Custom),
    fun!("$dayOfYear", Exact(1), Same(Date), Number, Name("$dayOfYear"), Custom, Custom, Custom, Custom),
    fun!("$hour", Exact(1), Same(Date), Number, Name("$hour"), Custom, Custom, Custom, Custom),
    fun!("$minute", Exact(1), Same(Date), Number, Name("$minute"), Custom, Custom, Custom, Custom),
    fun!("$second", Exact(1), Same(Date), Number, Name("$second"), Custom, Custom, Custom, Custom),
    fun!("$strToDate", Exact(1), Same(Text), ReturnType::Datetime, Custom, Custom, Custom, Custom, Custom),
    fun!("$now", Exact(0), Same(Any), ReturnType::Datetime, Custom, Name("NOW"), Name("NOW"), Name("GETDATE"), Custom),
    // Strings
    fun!("$concat", AtLeastTwo, Same(Text), Text, Name("$concat"), Symbol("||"), Name("CONCAT"), Symbol("+"), Symbol("||")),
    fun!("$startsWith", Exact(2), Same(Text), Boolean, Custom, Custom, Custom, Custom, Custom),
    fun!("$endsWith", Exact(2), Same(Text), Boolean, Custom, Custom, Custom, Custom, Custom),
    fun!("$includes", Exact(3), Each(&[Text, Text, StaticBoolean]), Boolean, Custom, Custom, Custom, Custom, Custom),
    fun!("$left", Exact(2), Each(&[Text, Number]), Text, Custom, Name("LEFT"), Name("LEFT"), Name("LEFT"), Custom),
    fun!("$right", Exact(2), Each(&[Text, Number]), Text, Custom, Name("RIGHT"), Name("RIGHT"), Name("RIGHT"), Custom),
    fun!("$length", Exact(1), Same(Text), Number, Name("$strLenCP"), Name("LENGTH"), Name("CHAR_LENGTH"), Name("LEN"), Name("LENGTH")),
    fun!("$substring", Exact(3), Each(&[Text, Number, Number]), Text, Name("$substrCP"), Name("SUBSTRING"), Name("SUBSTRING"), Name("SUBSTRING"), Name("SUBSTR")),
    fun!("$lower", Exact(1), Same(Text), Text, Name("$toLower"), Name("LOWER"), Name("LOWER"), Name("LOWER"), Name("LOWER")),
    fun!("$upper", Exact(1), Same(Text), Text, Name("$toUpper"), Name("UPPER"), Name("UPPER"), Name("UPPER"), Name("UPPER")),
    fun!("$trim", Exact(1), Same(Text), Text, Custom, Name("TRIM"), Name("TRIM"), Name("TRIM"), Name("TRIM")),
    fun!("$ltrim", Exact(1), Same(Text), Text, Custom, Name("LTRIM"), Name("LTRIM"), Name("LTRIM"), Name("LTRIM")),
    fun!("$rtrim", Exact(1), Same(Text), Text, Custom, Name("RTRIM"), Name("RTRIM"), Name("RTRIM"), Name("RTRIM")),
    fun!("$charindex", Exact(3), Each(&[Text, Text, Number]), Number, Name("$indexOfCP"), Custom, Name("LOCATE"), Name("CHARINDEX"), Name("INSTR")),
    // Arrays
    fun!("$size", Exact(1), Same(Array), Number, Name("$size"), NotAvailable, NotAvailable, NotAvailable, NotAvailable),
    // Type coercion
    fun!("$toBoolean", Exact(1), Same(Any), Boolean, Name("$toBool"), Custom, Custom, Custom, NotAvailable),
    fun!("$toInteger", Exact(1), Same(Any), Number, Name("$toInt"), Custom, Custom, Custom, Custom),
    fun!("$toDecimal", Exact(1), Same(Any), Number, Name("$toDecimal"), Custom, Custom, Custom, Custom),
    fun!("$toDate", Exact(1), Same(Any), ReturnType::Datetime, Name("$toDate"), Custom, Custom, Custom, Custom),
    fun!("$toString", Exact(1), Same(Any), Text, Name("$toString"), Custom, Custom, Custom, Custom),
    fun!("$toObjectId", Exact(1), Same(Any), ReturnType::Id, Name("$toObjectId"), NotAvailable, NotAvailable, NotAvailable, NotAvailable),
    // Geo
    fun!("$distance", Exact(2), Same(Geopoint), Number, Custom, Custom, Name("ST_Distance_Sphere"), Custom, Custom),
    fun!("$point", Exact(2), Same(Number), Geopoint, Custom, Custom, Custom, Custom, Custom),
];
