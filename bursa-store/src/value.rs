//! Typed cell values and column types.
//!
//! Every cell in the store is a `Value`; every column declares a
//! `ColumnType`. Integer values are accepted wherever a decimal column is
//! declared, and `Null` conforms to any column type.

use std::cmp::Ordering;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Semantic type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Decimal,
    Text,
    Date,
    Boolean,
}

/// A single typed cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Value {
    Int(i64),
    Decimal(f64),
    Text(String),
    Date(NaiveDate),
    Bool(bool),
    Null,
}

impl Value {
    /// The zero default substituted for missing values during ingestion.
    ///
    /// Dates have no meaningful zero; a null date stays `Null`.
    pub fn zero_for(ty: ColumnType) -> Value {
        match ty {
            ColumnType::Integer => Value::Int(0),
            ColumnType::Decimal => Value::Decimal(0.0),
            ColumnType::Text => Value::Text(String::new()),
            ColumnType::Date => Value::Null,
            ColumnType::Boolean => Value::Bool(false),
        }
    }

    /// Whether this value conforms to the declared column type.
    pub fn matches(&self, ty: ColumnType) -> bool {
        match (self, ty) {
            (Value::Null, _) => true,
            (Value::Int(_), ColumnType::Integer) => true,
            // Integers are accepted in decimal columns.
            (Value::Int(_), ColumnType::Decimal) => true,
            (Value::Decimal(_), ColumnType::Decimal) => true,
            (Value::Text(_), ColumnType::Text) => true,
            (Value::Date(_), ColumnType::Date) => true,
            (Value::Bool(_), ColumnType::Boolean) => true,
            _ => false,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    /// Value ordering used by `between`, `min` and `max`.
    ///
    /// Int and Decimal compare numerically against each other; all other
    /// comparisons require matching variants. `Null` compares with nothing.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => {
                let (a, b) = (self.as_f64()?, other.as_f64()?);
                a.partial_cmp(&b)
            }
        }
    }

    /// Canonical string form used for group keys and row deduplication.
    pub fn key_repr(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "null".to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Date(d) => write!(f, "{d}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Null => write!(f, "NULL"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Decimal(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
