//! Declarative query descriptors.
//!
//! A descriptor is an immutable value describing selection, filtering and
//! grouping. The dynamic list-vs-mapping shapes of the original DSL are
//! tagged variants here, compiled explicitly per variant.

use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::value::Value;

/// Projection aggregation operators.
///
/// `mean` is deliberately absent: it is accepted only as a group operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateOp {
    Sum,
    Avg,
    Min,
    Max,
    Distinct,
    Day,
    Month,
    Year,
}

impl AggregateOp {
    pub fn parse(op: &str) -> Result<AggregateOp, QueryError> {
        match op.to_ascii_lowercase().as_str() {
            "sum" => Ok(AggregateOp::Sum),
            "avg" => Ok(AggregateOp::Avg),
            "min" => Ok(AggregateOp::Min),
            "max" => Ok(AggregateOp::Max),
            "distinct" => Ok(AggregateOp::Distinct),
            "day" => Ok(AggregateOp::Day),
            "month" => Ok(AggregateOp::Month),
            "year" => Ok(AggregateOp::Year),
            other => Err(QueryError::UnsupportedOperation(other.to_string())),
        }
    }

    /// Whether the operator collapses a group to a single value.
    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            AggregateOp::Sum | AggregateOp::Avg | AggregateOp::Min | AggregateOp::Max
        )
    }
}

/// Group operators — the projection set plus `mean`.
///
/// Only `day`/`month`/`year` bucket the field before grouping; the other
/// members of the validated set group by the raw field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupOp {
    Sum,
    Avg,
    Mean,
    Min,
    Max,
    Distinct,
    Day,
    Month,
    Year,
}

impl GroupOp {
    pub fn parse(op: &str) -> Result<GroupOp, QueryError> {
        match op.to_ascii_lowercase().as_str() {
            "sum" => Ok(GroupOp::Sum),
            "avg" => Ok(GroupOp::Avg),
            "mean" => Ok(GroupOp::Mean),
            "min" => Ok(GroupOp::Min),
            "max" => Ok(GroupOp::Max),
            "distinct" => Ok(GroupOp::Distinct),
            "day" => Ok(GroupOp::Day),
            "month" => Ok(GroupOp::Month),
            "year" => Ok(GroupOp::Year),
            other => Err(QueryError::InvalidGroupOperator(other.to_string())),
        }
    }
}

/// One projected column: `op(field) as alias`, or a bare field under the
/// alias when `op` is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub alias: String,
    pub op: Option<AggregateOp>,
    pub field: String,
}

/// What the query selects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Selection {
    /// Bare projected fields, in order.
    Fields(Vec<String>),
    /// Aliased projections, possibly aggregated.
    Aggregated(Vec<Projection>),
}

/// How the query groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Grouping {
    Fields(Vec<String>),
    /// Field paired with a bucketing/group operator.
    Bucketed(Vec<(String, GroupOp)>),
}

impl Grouping {
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Grouping::Fields(fields) => fields.iter().map(String::as_str).collect(),
            Grouping::Bucketed(pairs) => pairs.iter().map(|(f, _)| f.as_str()).collect(),
        }
    }
}

/// A single where-clause predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    Eq {
        field: String,
        value: Value,
    },
    In {
        field: String,
        values: Vec<Value>,
    },
    /// Closed interval, inclusive on both ends; either bound may be open.
    /// Both bounds `None` is a documented no-op, not an error.
    Between {
        field: String,
        lo: Option<Value>,
        hi: Option<Value>,
    },
}

impl Predicate {
    pub fn eq(field: &str, value: impl Into<Value>) -> Predicate {
        Predicate::Eq {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn is_in(field: &str, values: Vec<Value>) -> Predicate {
        Predicate::In {
            field: field.to_string(),
            values,
        }
    }

    pub fn between(field: &str, lo: Option<Value>, hi: Option<Value>) -> Predicate {
        Predicate::Between {
            field: field.to_string(),
            lo,
            hi,
        }
    }

    /// String front-end matching the original DSL's `(field, params, op)`
    /// tuples. Unrecognized comparison operators are caller errors.
    pub fn parse(field: &str, params: Vec<Value>, op: &str) -> Result<Predicate, QueryError> {
        match op.to_ascii_lowercase().as_str() {
            "in" => Ok(Predicate::is_in(field, params)),
            "between" => {
                let mut it = params.into_iter();
                let lo = it.next().filter(|v| !v.is_null());
                let hi = it.next().filter(|v| !v.is_null());
                Ok(Predicate::between(field, lo, hi))
            }
            other => Err(QueryError::InvalidPredicate(format!(
                "'{other}' operation is not supported"
            ))),
        }
    }

    pub fn field(&self) -> &str {
        match self {
            Predicate::Eq { field, .. }
            | Predicate::In { field, .. }
            | Predicate::Between { field, .. } => field,
        }
    }
}

/// Tabular (columnar) or entity-list results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultShape {
    Tabular,
    Entities,
}

/// The declarative query: selection, filter, grouping, result shape.
///
/// `columns: None` selects all entity columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    pub columns: Option<Selection>,
    pub filters: Vec<Predicate>,
    pub group_by: Option<Grouping>,
    pub shape: ResultShape,
}

impl Default for QueryDescriptor {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryDescriptor {
    /// Select the whole entity, no filter, no grouping, tabular result.
    pub fn new() -> Self {
        Self {
            columns: None,
            filters: Vec::new(),
            group_by: None,
            shape: ResultShape::Tabular,
        }
    }

    pub fn fields<I: IntoIterator<Item = S>, S: Into<String>>(mut self, fields: I) -> Self {
        self.columns = Some(Selection::Fields(
            fields.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Add one aliased projection, keeping earlier ones.
    pub fn project(mut self, alias: &str, op: Option<AggregateOp>, field: &str) -> Self {
        let projection = Projection {
            alias: alias.to_string(),
            op,
            field: field.to_string(),
        };
        match &mut self.columns {
            Some(Selection::Aggregated(list)) => list.push(projection),
            _ => self.columns = Some(Selection::Aggregated(vec![projection])),
        }
        self
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filters.push(predicate);
        self
    }

    pub fn group_by<I: IntoIterator<Item = S>, S: Into<String>>(mut self, fields: I) -> Self {
        self.group_by = Some(Grouping::Fields(
            fields.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn group_by_bucketed(mut self, pairs: Vec<(String, GroupOp)>) -> Self {
        self.group_by = Some(Grouping::Bucketed(pairs));
        self
    }

    pub fn as_entities(mut self) -> Self {
        self.shape = ResultShape::Entities;
        self
    }
}
