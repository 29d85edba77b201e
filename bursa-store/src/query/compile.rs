//! Descriptor compilation — validation and plan construction.
//!
//! Every caller error surfaces here, synchronously, before any engine
//! access: unknown fields, the entity-shape/grouping conflict, and the
//! classic SQL grouping rule.

use crate::error::QueryError;
use crate::schema::{SchemaRegistry, TableSchema};

use super::descriptor::{
    Grouping, Predicate, Projection, QueryDescriptor, ResultShape, Selection,
};

/// A validated, executable plan.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub schema: TableSchema,
    /// `None` selects the whole entity.
    pub projections: Option<Vec<Projection>>,
    pub filters: Vec<Predicate>,
    pub grouping: Option<Grouping>,
    pub shape: ResultShape,
}

pub fn compile(
    registry: &SchemaRegistry,
    table: &str,
    descriptor: &QueryDescriptor,
) -> Result<QueryPlan, QueryError> {
    let schema = registry.schema(table)?.clone();

    let projections = match &descriptor.columns {
        None => None,
        Some(Selection::Fields(fields)) => {
            if fields.is_empty() {
                return Err(QueryError::InvalidDescriptor(
                    "column list must not be empty".to_string(),
                ));
            }
            Some(
                fields
                    .iter()
                    .map(|f| {
                        registry.resolve(table, f)?;
                        Ok(Projection {
                            alias: f.clone(),
                            op: None,
                            field: f.clone(),
                        })
                    })
                    .collect::<Result<Vec<_>, QueryError>>()?,
            )
        }
        Some(Selection::Aggregated(list)) => {
            if list.is_empty() {
                return Err(QueryError::InvalidDescriptor(
                    "projection list must not be empty".to_string(),
                ));
            }
            for p in list {
                registry.resolve(table, &p.field)?;
            }
            Some(list.clone())
        }
    };

    for predicate in &descriptor.filters {
        registry.resolve(table, predicate.field())?;
    }

    if let Some(grouping) = &descriptor.group_by {
        if projections.is_none() {
            return Err(QueryError::InvalidDescriptor(
                "grouping requires a column selection, not a whole-entity query".to_string(),
            ));
        }
        for field in grouping.fields() {
            registry.resolve(table, field)?;
        }
    }

    // Classic SQL grouping rule: once any aggregation operator appears,
    // every bare selected field must be a group key.
    if let Some(list) = &projections {
        let has_aggregation = list.iter().any(|p| p.op.is_some());
        if has_aggregation {
            let group_fields: Vec<&str> = descriptor
                .group_by
                .as_ref()
                .map(|g| g.fields())
                .unwrap_or_default();
            for p in list.iter().filter(|p| p.op.is_none()) {
                if !group_fields.contains(&p.field.as_str()) {
                    return Err(QueryError::InvalidDescriptor(format!(
                        "non-aggregated field '{}' must appear in the group-by clause",
                        p.field
                    )));
                }
            }
        }
    }

    Ok(QueryPlan {
        schema,
        projections,
        filters: descriptor.filters.clone(),
        grouping: descriptor.group_by.clone(),
        shape: descriptor.shape,
    })
}
