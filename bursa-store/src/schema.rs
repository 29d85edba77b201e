//! Schema registry — maps logical table names to typed column lists.
//!
//! Populated at process start from the fixed set of managed tables and
//! consulted by the query compiler and the ingestion pipeline to resolve
//! field names. The surrogate `id` key is owned by the engine and is never
//! part of a schema's column list.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::value::ColumnType;

/// A single declared column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub ty: ColumnType,
    pub indexed: bool,
}

impl ColumnDef {
    pub fn new(name: &str, ty: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            ty,
            indexed: false,
        }
    }

    pub fn indexed(name: &str, ty: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            ty,
            indexed: true,
        }
    }
}

/// One table: ordered columns plus the logical-date column, when the table
/// is date-partitioned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<ColumnDef>,
    pub date_column: Option<String>,
}

impl TableSchema {
    pub fn new(table: &str, columns: Vec<ColumnDef>, date_column: Option<&str>) -> Self {
        Self {
            table: table.to_string(),
            columns,
            date_column: date_column.map(str::to_string),
        }
    }

    pub fn column(&self, field: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == field)
    }

    /// Position of a field within the column list.
    pub fn index_of(&self, field: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == field)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Read-mostly registry of table schemas.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    tables: HashMap<String, TableSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The five managed tables of the reference system.
    pub fn builtin() -> Self {
        let mut reg = Self::new();
        for schema in [
            reference_data(),
            blotter(),
            dividends(),
            market_dividends(),
            metadata(),
        ] {
            reg.register(schema);
        }
        reg
    }

    /// Insert or replace a table schema.
    pub fn register(&mut self, schema: TableSchema) {
        self.tables.insert(schema.table.clone(), schema);
    }

    pub fn schema(&self, table: &str) -> Result<&TableSchema, QueryError> {
        self.tables
            .get(table)
            .ok_or_else(|| QueryError::UnknownTable(table.to_string()))
    }

    /// Resolve a field name to its column definition.
    pub fn resolve(&self, table: &str, field: &str) -> Result<&ColumnDef, QueryError> {
        self.schema(table)?
            .column(field)
            .ok_or_else(|| QueryError::UnknownField {
                table: table.to_string(),
                field: field.to_string(),
            })
    }

    /// Ordered column list for a table.
    pub fn all_columns(&self, table: &str) -> Result<&[ColumnDef], QueryError> {
        Ok(&self.schema(table)?.columns)
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }
}

fn reference_data() -> TableSchema {
    use ColumnType::*;
    TableSchema::new(
        "reference_data",
        vec![
            ColumnDef::indexed("name", Text),
            ColumnDef::indexed("short_name", Text),
            ColumnDef::indexed("short_name_grouped", Text),
            ColumnDef::new("description", Text),
            ColumnDef::indexed("yahoo_ticker", Text),
            ColumnDef::indexed("google_ticker", Text),
            ColumnDef::indexed("tradingview_ticker", Text),
            ColumnDef::new("asset_class", Text),
            ColumnDef::new("product", Text),
            ColumnDef::new("sub_product", Text),
            ColumnDef::new("main_country", Text),
            ColumnDef::new("exchange", Text),
            ColumnDef::new("trade_ccy", Text),
            ColumnDef::new("ccy1", Text),
            ColumnDef::new("ccy2", Text),
            ColumnDef::new("active", Boolean),
            ColumnDef::new("price_overwrite", Decimal),
        ],
        None,
    )
}

fn blotter() -> TableSchema {
    use ColumnType::*;
    TableSchema::new(
        "blotter",
        vec![
            ColumnDef::indexed("date", Date),
            ColumnDef::new("account", Text),
            ColumnDef::indexed("name", Text),
            ColumnDef::indexed("strategy", Text),
            ColumnDef::new("price", Decimal),
            ColumnDef::new("qty", Integer),
            ColumnDef::new("price_qty", Decimal),
            ColumnDef::new("action", Text),
            ColumnDef::new("execution_status", Text),
            ColumnDef::new("fees", Decimal),
            ColumnDef::new("amount", Decimal),
            ColumnDef::indexed("portfolio", Text),
            ColumnDef::indexed("book", Text),
        ],
        Some("date"),
    )
}

fn dividends() -> TableSchema {
    use ColumnType::*;
    TableSchema::new(
        "dividends",
        vec![
            ColumnDef::indexed("date", Date),
            ColumnDef::indexed("name", Text),
            ColumnDef::indexed("strategy", Text),
            ColumnDef::indexed("portfolio", Text),
            ColumnDef::indexed("book", Text),
            ColumnDef::new("qty", Decimal),
            ColumnDef::new("dps", Decimal),
            ColumnDef::new("amount", Decimal),
        ],
        Some("date"),
    )
}

fn market_dividends() -> TableSchema {
    use ColumnType::*;
    TableSchema::new(
        "market_dividends",
        vec![
            ColumnDef::indexed("date", Date),
            ColumnDef::indexed("ex_date", Date),
            ColumnDef::indexed("name", Text),
            ColumnDef::new("dividend_amount", Decimal),
            ColumnDef::new("witholding_tax", Integer),
        ],
        Some("date"),
    )
}

fn metadata() -> TableSchema {
    use ColumnType::*;
    TableSchema::new(
        "metadata",
        vec![
            ColumnDef::new("table", Text),
            ColumnDef::new("field", Text),
            ColumnDef::new("description", Text),
        ],
        None,
    )
}
