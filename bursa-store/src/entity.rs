//! Entities — typed records bound to one table and one schema.
//!
//! Construction goes through the schema-driven builder: unknown keys,
//! missing columns or type-nonconforming values are rejected up front
//! rather than silently accepted.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::schema::{SchemaRegistry, TableSchema};
use crate::value::Value;

/// A typed record. `id` is the surrogate key, assigned by the engine on
/// insert; `values` are ordered by the schema's column list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub table: String,
    pub id: Option<i64>,
    pub values: Vec<Value>,
}

impl Entity {
    /// Build an entity from a field-name keyed row, validated against the
    /// registered schema.
    pub fn from_row(
        registry: &SchemaRegistry,
        table: &str,
        row: &HashMap<String, Value>,
    ) -> Result<Entity, QueryError> {
        let schema = registry.schema(table)?;

        for key in row.keys() {
            if schema.column(key).is_none() {
                return Err(QueryError::SchemaMismatch {
                    table: table.to_string(),
                    detail: format!("unknown field '{key}'"),
                });
            }
        }

        let mut values = Vec::with_capacity(schema.columns.len());
        for col in &schema.columns {
            let value = row
                .get(&col.name)
                .ok_or_else(|| QueryError::SchemaMismatch {
                    table: table.to_string(),
                    detail: format!("missing field '{}'", col.name),
                })?;
            if !value.matches(col.ty) {
                return Err(QueryError::SchemaMismatch {
                    table: table.to_string(),
                    detail: format!(
                        "field '{}' expects {:?}, got {value:?}",
                        col.name, col.ty
                    ),
                });
            }
            values.push(value.clone());
        }

        Ok(Entity {
            table: table.to_string(),
            id: None,
            values,
        })
    }

    /// Value of a field, by schema position.
    pub fn get<'a>(&'a self, schema: &TableSchema, field: &str) -> Option<&'a Value> {
        schema.index_of(field).and_then(|i| self.values.get(i))
    }

    /// The logical date of this record, when the table is date-partitioned.
    pub fn logical_date(&self, schema: &TableSchema) -> Option<NaiveDate> {
        let col = schema.date_column.as_deref()?;
        self.get(schema, col).and_then(Value::as_date)
    }

    /// Flatten back to a field-name keyed row.
    pub fn to_row(&self, schema: &TableSchema) -> HashMap<String, Value> {
        schema
            .columns
            .iter()
            .zip(&self.values)
            .map(|(c, v)| (c.name.clone(), v.clone()))
            .collect()
    }
}
