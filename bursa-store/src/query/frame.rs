//! Columnar tabular result.
//!
//! A `Frame` always carries its column header, even with zero rows — an
//! empty result from an entity-shaped query still exposes the schema's
//! full column set.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::schema::TableSchema;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Frame {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        debug_assert!(rows.iter().all(|r| r.len() == columns.len()));
        Self { columns, rows }
    }

    /// Flatten entities to a frame whose columns equal the schema's column
    /// list, preserving row order.
    pub fn from_entities(schema: &TableSchema, entities: &[Entity]) -> Self {
        Self {
            columns: schema.column_names(),
            rows: entities.iter().map(|e| e.values.clone()).collect(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Value>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// One column's cells, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let i = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|r| &r[i]).collect())
    }

    /// Rows as field-name keyed maps, for entity building.
    pub fn rows_as_maps(&self) -> Vec<HashMap<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }

    /// A frame with at most `size` rows starting at `offset`.
    pub fn slice(&self, offset: usize, size: usize) -> Frame {
        let end = (offset + size).min(self.rows.len());
        let rows = if offset >= self.rows.len() {
            Vec::new()
        } else {
            self.rows[offset..end].to_vec()
        };
        Frame {
            columns: self.columns.clone(),
            rows,
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut widths: Vec<usize> = self.columns.iter().map(String::len).collect();
        let rendered: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| row.iter().map(Value::to_string).collect())
            .collect();
        for row in &rendered {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.len());
            }
        }
        for (i, col) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, "  ")?;
            }
            write!(f, "{col:>width$}", width = widths[i])?;
        }
        for row in &rendered {
            writeln!(f)?;
            for (i, cell) in row.iter().enumerate() {
                if i > 0 {
                    write!(f, "  ")?;
                }
                write!(f, "{cell:>width$}", width = widths[i])?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;

    #[test]
    fn empty_entity_frame_keeps_schema_columns() {
        let reg = SchemaRegistry::builtin();
        let schema = reg.schema("metadata").unwrap();
        let frame = Frame::from_entities(schema, &[]);
        assert!(frame.is_empty());
        assert_eq!(frame.columns(), ["table", "field", "description"]);
    }

    #[test]
    fn column_extraction() {
        let frame = Frame::from_rows(
            vec!["a".into(), "b".into()],
            vec![
                vec![Value::Int(1), Value::from("x")],
                vec![Value::Int(2), Value::from("y")],
            ],
        );
        let col = frame.column("b").unwrap();
        assert_eq!(col, vec![&Value::from("x"), &Value::from("y")]);
        assert!(frame.column("c").is_none());
    }

    #[test]
    fn slice_is_bounded() {
        let frame = Frame::from_rows(
            vec!["a".into()],
            (0..5).map(|i| vec![Value::Int(i)]).collect(),
        );
        assert_eq!(frame.slice(0, 2).len(), 2);
        assert_eq!(frame.slice(4, 2).len(), 1);
        assert_eq!(frame.slice(9, 2).len(), 0);
        assert_eq!(frame.slice(9, 2).columns(), ["a"]);
    }

    #[test]
    fn display_aligns_columns() {
        let frame = Frame::from_rows(
            vec!["name".into(), "amount".into()],
            vec![vec![Value::from("A"), Value::Decimal(10.5)]],
        );
        let text = frame.to_string();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().contains("amount"));
        assert!(lines.next().unwrap().contains("10.5"));
    }
}
