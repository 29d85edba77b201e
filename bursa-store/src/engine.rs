//! Embedded relational engine — one engine per logical database.
//!
//! Tables live in memory. When the engine is opened with a data directory,
//! each table is mirrored as `<dir>/<table>.jsonl` (one serde_json record
//! per line: the schema record first, then one record per row). Mutations
//! take a per-table pre-image snapshot on first write, so a
//! close-without-commit restores the last committed state. Commit flushes
//! dirty tables atomically via temp file + rename.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::error::{QueryError, StoreError};
use crate::schema::TableSchema;
use crate::value::Value;

/// On-disk line format for a table file.
#[derive(Debug, Serialize, Deserialize)]
enum Record {
    Schema(TableSchema),
    Row { id: i64, values: HashMap<String, Value> },
}

#[derive(Debug, Clone)]
struct TableState {
    rows: Vec<Entity>,
    next_id: i64,
}

#[derive(Debug)]
struct TableData {
    schema: TableSchema,
    state: TableState,
    /// Pre-image of the last committed state, taken on first uncommitted write.
    snapshot: Option<TableState>,
    dirty: bool,
    /// Created since the last commit; rollback removes the table outright.
    created: bool,
}

impl TableData {
    fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            state: TableState {
                rows: Vec::new(),
                next_id: 1,
            },
            snapshot: None,
            dirty: true,
            created: true,
        }
    }

    fn mark_dirty(&mut self) {
        if self.snapshot.is_none() {
            self.snapshot = Some(self.state.clone());
        }
        self.dirty = true;
    }
}

/// The embedded store for one logical database.
#[derive(Debug)]
pub struct StoreEngine {
    db: String,
    dir: Option<PathBuf>,
    tables: HashMap<String, TableData>,
    /// Tables dropped since the last commit, kept for rollback.
    dropped: Vec<(String, TableData)>,
}

impl StoreEngine {
    /// Open the engine for a database, loading any persisted tables.
    ///
    /// `dir` of `None` gives a purely in-memory engine. Unreadable
    /// directories or corrupt table files are connection failures.
    pub fn open(db: &str, dir: Option<PathBuf>) -> Result<Self, StoreError> {
        let mut engine = StoreEngine {
            db: db.to_string(),
            dir,
            tables: HashMap::new(),
            dropped: Vec::new(),
        };
        if let Some(dir) = engine.dir.clone() {
            fs::create_dir_all(&dir).map_err(|e| {
                StoreError::Connection(format!("cannot create data dir {}: {e}", dir.display()))
            })?;
            engine.load_tables(&dir)?;
        }
        Ok(engine)
    }

    pub fn db(&self) -> &str {
        &self.db
    }

    fn load_tables(&mut self, dir: &PathBuf) -> Result<(), StoreError> {
        let entries = fs::read_dir(dir)
            .map_err(|e| StoreError::Connection(format!("cannot read {}: {e}", dir.display())))?;
        for entry in entries {
            let path = entry
                .map_err(|e| StoreError::Connection(e.to_string()))?
                .path();
            if path.extension().and_then(|x| x.to_str()) != Some("jsonl") {
                continue;
            }
            let file = File::open(&path)
                .map_err(|e| StoreError::Connection(format!("{}: {e}", path.display())))?;
            let mut schema: Option<TableSchema> = None;
            let mut state = TableState {
                rows: Vec::new(),
                next_id: 1,
            };
            for line in BufReader::new(file).lines() {
                let line = line.map_err(|e| StoreError::Connection(e.to_string()))?;
                if line.trim().is_empty() {
                    continue;
                }
                let record: Record = serde_json::from_str(&line).map_err(|e| {
                    StoreError::Connection(format!("corrupt table file {}: {e}", path.display()))
                })?;
                match record {
                    Record::Schema(s) => schema = Some(s),
                    Record::Row { id, values } => {
                        let schema = schema.as_ref().ok_or_else(|| {
                            StoreError::Connection(format!(
                                "table file {} has rows before schema",
                                path.display()
                            ))
                        })?;
                        let ordered = schema
                            .columns
                            .iter()
                            .map(|c| values.get(&c.name).cloned().unwrap_or(Value::Null))
                            .collect();
                        state.next_id = state.next_id.max(id + 1);
                        state.rows.push(Entity {
                            table: schema.table.clone(),
                            id: Some(id),
                            values: ordered,
                        });
                    }
                }
            }
            if let Some(schema) = schema {
                let name = schema.table.clone();
                self.tables.insert(
                    name,
                    TableData {
                        schema,
                        state,
                        snapshot: None,
                        dirty: false,
                        created: false,
                    },
                );
            }
        }
        Ok(())
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    fn table(&self, table: &str) -> Result<&TableData, StoreError> {
        self.tables
            .get(table)
            .ok_or_else(|| QueryError::UnknownTable(table.to_string()).into())
    }

    fn table_mut(&mut self, table: &str) -> Result<&mut TableData, StoreError> {
        self.tables
            .get_mut(table)
            .ok_or_else(|| QueryError::UnknownTable(table.to_string()).into())
    }

    /// Create-if-absent. Re-creating an existing table is a no-op.
    pub fn create_table(&mut self, schema: &TableSchema) {
        if !self.tables.contains_key(&schema.table) {
            self.tables
                .insert(schema.table.clone(), TableData::new(schema.clone()));
        }
    }

    /// Destructive: removes the table and its rows. Takes effect on commit;
    /// rollback reinstates the table.
    pub fn drop_table(&mut self, table: &str) {
        if let Some(data) = self.tables.remove(table) {
            self.dropped.push((table.to_string(), data));
        }
    }

    /// Insert a batch, assigning surrogate ids. The batch is validated in
    /// full before any row is stored.
    pub fn insert(&mut self, entities: &[Entity]) -> Result<(), StoreError> {
        if entities.is_empty() {
            return Ok(());
        }
        let table = &entities[0].table;
        let data = self.table(table)?;
        for e in entities {
            if e.table != *table {
                return Err(StoreError::Write {
                    table: table.clone(),
                    detail: format!("batch mixes tables '{table}' and '{}'", e.table),
                });
            }
            if e.values.len() != data.schema.columns.len() {
                return Err(QueryError::SchemaMismatch {
                    table: table.clone(),
                    detail: format!(
                        "expected {} values, got {}",
                        data.schema.columns.len(),
                        e.values.len()
                    ),
                }
                .into());
            }
        }
        let data = self.table_mut(&table.clone())?;
        data.mark_dirty();
        for e in entities {
            let mut stored = e.clone();
            stored.id = Some(data.state.next_id);
            data.state.next_id += 1;
            data.state.rows.push(stored);
        }
        Ok(())
    }

    /// Delete every row carrying the given logical date.
    pub fn delete_by_date(
        &mut self,
        table: &str,
        date: chrono::NaiveDate,
    ) -> Result<usize, StoreError> {
        let data = self.table(table)?;
        if data.schema.date_column.is_none() {
            return Err(StoreError::UndatedTable(table.to_string()));
        }
        let schema = data.schema.clone();
        let data = self.table_mut(table)?;
        let before = data.state.rows.len();
        data.mark_dirty();
        data.state
            .rows
            .retain(|e| e.logical_date(&schema) != Some(date));
        Ok(before - data.state.rows.len())
    }

    pub fn delete_all(&mut self, table: &str) -> Result<usize, StoreError> {
        let data = self.table_mut(table)?;
        let removed = data.state.rows.len();
        data.mark_dirty();
        data.state.rows.clear();
        Ok(removed)
    }

    /// All rows of a table, in natural (insertion) order.
    pub fn rows(&self, table: &str) -> Result<Vec<Entity>, StoreError> {
        Ok(self.table(table)?.state.rows.clone())
    }

    pub fn schema(&self, table: &str) -> Result<TableSchema, StoreError> {
        Ok(self.table(table)?.schema.clone())
    }

    /// Flush dirty tables and finalize pending drops.
    pub fn commit(&mut self) -> Result<(), StoreError> {
        if let Some(dir) = self.dir.clone() {
            for data in self.tables.values() {
                if data.dirty {
                    write_table(&dir, data)?;
                }
            }
            for (name, _) in &self.dropped {
                let path = dir.join(format!("{name}.jsonl"));
                if path.exists() {
                    fs::remove_file(&path)?;
                }
            }
        }
        for data in self.tables.values_mut() {
            data.snapshot = None;
            data.dirty = false;
            data.created = false;
        }
        self.dropped.clear();
        Ok(())
    }

    /// Restore every table to its last committed state.
    pub fn rollback(&mut self) {
        // A table created since the last commit never existed in committed
        // state; it is discarded outright, written to or not.
        self.tables.retain(|_, data| !data.created);
        for data in self.tables.values_mut() {
            if let Some(snapshot) = data.snapshot.take() {
                data.state = snapshot;
                data.dirty = false;
            }
        }
        for (name, data) in self.dropped.drain(..) {
            if !data.created {
                self.tables.insert(name, data);
            }
        }
    }
}

fn write_table(dir: &PathBuf, data: &TableData) -> Result<(), StoreError> {
    let path = dir.join(format!("{}.jsonl", data.schema.table));
    let tmp = dir.join(format!("{}.jsonl.tmp", data.schema.table));
    let mut file = File::create(&tmp)?;
    let schema_line = serde_json::to_string(&Record::Schema(data.schema.clone()))
        .map_err(|e| StoreError::Write {
            table: data.schema.table.clone(),
            detail: e.to_string(),
        })?;
    writeln!(file, "{schema_line}")?;
    for row in &data.state.rows {
        let record = Record::Row {
            id: row.id.unwrap_or(0),
            values: row.to_row(&data.schema),
        };
        let line = serde_json::to_string(&record).map_err(|e| StoreError::Write {
            table: data.schema.table.clone(),
            detail: e.to_string(),
        })?;
        writeln!(file, "{line}")?;
    }
    file.flush()?;
    fs::rename(&tmp, &path)?;
    Ok(())
}
