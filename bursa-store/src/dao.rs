//! Table-scoped data access: functional query entry point plus the
//! date-partitioned write primitives.
//!
//! `add_by_date` is the idempotent write strategy: all existing rows for
//! the batch's single logical date are deleted, then the batch is
//! inserted, inside the caller's transaction scope. Re-ingesting a date
//! replaces rather than duplicates.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::entity::Entity;
use crate::error::{QueryError, StoreError};
use crate::query::{self, AggregateOp, Predicate, QueryDescriptor, QueryOutput};
use crate::schema::{SchemaRegistry, TableSchema};
use crate::session::Session;
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct Dao {
    registry: Arc<SchemaRegistry>,
    schema: TableSchema,
}

impl Dao {
    pub fn new(registry: Arc<SchemaRegistry>, table: &str) -> Result<Self, QueryError> {
        let schema = registry.schema(table)?.clone();
        Ok(Self { registry, schema })
    }

    pub fn table(&self) -> &str {
        &self.schema.table
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    fn date_column(&self) -> Result<&str, StoreError> {
        self.schema
            .date_column
            .as_deref()
            .ok_or_else(|| StoreError::UndatedTable(self.schema.table.clone()))
    }

    /// The functional-SQL entry point: compile and run a descriptor
    /// against the given session.
    pub fn get(
        &self,
        session: &Session,
        descriptor: &QueryDescriptor,
    ) -> Result<QueryOutput, StoreError> {
        query::run(&self.registry, session, &self.schema.table, descriptor)
    }

    pub fn add(&self, session: &mut Session, entity: Entity) -> Result<(), StoreError> {
        session.insert(&[entity])
    }

    /// Bulk insert with no dedup guard. Prefer `add_by_date` for
    /// date-partitioned feeds; use this only for seeding.
    pub fn add_all(&self, session: &mut Session, entities: &[Entity]) -> Result<(), StoreError> {
        session.insert(entities)
    }

    /// Delete-then-insert-by-date. The batch must carry exactly one
    /// logical date; mixed-date batches fail before any row is touched.
    pub fn add_by_date(&self, session: &mut Session, entities: &[Entity]) -> Result<(), StoreError> {
        self.date_column()?;
        let dates: BTreeSet<Option<NaiveDate>> = entities
            .iter()
            .map(|e| e.logical_date(&self.schema))
            .collect();
        let count = dates.len();
        match dates.into_iter().next() {
            Some(Some(date)) if count == 1 => {
                session.delete_by_date(&self.schema.table, date)?;
                session.insert(entities)
            }
            _ => Err(StoreError::MultipleDatesInBatch(count)),
        }
    }

    pub fn get_all(&self, session: &Session) -> Result<Vec<Entity>, StoreError> {
        Ok(self
            .get(session, &QueryDescriptor::new().as_entities())?
            .into_entities())
    }

    /// The ingestion watermark: distinct logical dates already persisted,
    /// recomputed from committed state via the query compiler.
    pub fn distinct_dates(&self, session: &Session) -> Result<BTreeSet<NaiveDate>, StoreError> {
        let col = self.date_column()?.to_string();
        let descriptor =
            QueryDescriptor::new().project(&col, Some(AggregateOp::Distinct), &col);
        let output = self.get(session, &descriptor)?;
        let frame = match output {
            QueryOutput::Frame(frame) => frame,
            QueryOutput::Entities { .. } => unreachable!("distinct projection is always tabular"),
        };
        Ok(frame
            .column(&col)
            .unwrap_or_default()
            .into_iter()
            .filter_map(Value::as_date)
            .collect())
    }

    pub fn get_by_date(
        &self,
        session: &Session,
        date: NaiveDate,
    ) -> Result<Vec<Entity>, StoreError> {
        self.get_by_dates(session, date, date)
    }

    /// Rows within a closed date interval.
    pub fn get_by_dates(
        &self,
        session: &Session,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Entity>, StoreError> {
        let col = self.date_column()?;
        let descriptor = QueryDescriptor::new()
            .filter(Predicate::between(
                col,
                Some(Value::from(start)),
                Some(Value::from(end)),
            ))
            .as_entities();
        Ok(self.get(session, &descriptor)?.into_entities())
    }

    pub fn delete_by_date(
        &self,
        session: &mut Session,
        date: NaiveDate,
    ) -> Result<usize, StoreError> {
        session.delete_by_date(&self.schema.table, date)
    }

    pub fn delete_all(&self, session: &mut Session) -> Result<usize, StoreError> {
        session.delete_all(&self.schema.table)
    }
}
