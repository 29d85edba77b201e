//! The ingestion pipeline: date-diffed, dedup-aware dumping of external
//! tabular feeds into one managed table.
//!
//! Per run: compute the source's available dates, subtract the persisted
//! watermark, then load / transform / write each remaining date. Writes
//! are delete-then-insert-by-date inside one transaction scope, which
//! makes re-ingestion of a date idempotent. The parallel mode bounds the
//! worker pool and keeps writes strictly sequential.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;
use rayon::prelude::*;
use thiserror::Error;

use bursa_store::{
    Dao, Entity, Frame, SchemaRegistry, StoreContext, StoreError, StoreTarget, Value,
};

use crate::extractor::{ExtractError, ExtractOpts, Extractor};

/// Upper bound on concurrent extraction workers, a guard against
/// overloading the upstream source.
pub const MAX_WORKERS: usize = 8;

#[derive(Debug, Error)]
pub enum DumpError {
    #[error("extract failed: {0}")]
    Extract(#[from] ExtractError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("{0} workers requested, at most {MAX_WORKERS} are allowed")]
    WorkerLimit(usize),
}

pub struct Dumper {
    ctx: Arc<StoreContext>,
    registry: Arc<SchemaRegistry>,
    dao: Dao,
    extractor: Box<dyn Extractor>,
    target: StoreTarget,
}

impl Dumper {
    pub fn new(
        ctx: Arc<StoreContext>,
        registry: Arc<SchemaRegistry>,
        extractor: Box<dyn Extractor>,
        table: &str,
    ) -> Result<Self, StoreError> {
        let dao = Dao::new(Arc::clone(&registry), table)?;
        Ok(Self {
            ctx,
            registry,
            dao,
            extractor,
            target: StoreTarget::Default,
        })
    }

    /// Dump against a named alternate store instead of the default.
    pub fn with_target(mut self, target: StoreTarget) -> Self {
        self.target = target;
        self
    }

    pub fn table(&self) -> &str {
        self.dao.table()
    }

    /// Dump every source date not yet persisted. Returns the number of
    /// dates written. Extraction failures abort the run at the failing
    /// date; earlier dates stay committed.
    pub fn dump(&self, opts: &ExtractOpts) -> Result<usize, DumpError> {
        let (pending, opts) = self.pending_dates(opts)?;
        log::info!(
            "detected {} new dates to be dumped into '{}'",
            pending.len(),
            self.table()
        );

        // Loading and dumping stay sequential here; parallel loading is
        // opt-in via dump_parallel.
        let mut written = 0;
        for date in pending {
            log::info!("begin loading data for {date}");
            if self.load_and_write(date, &opts)? {
                written += 1;
            }
        }
        Ok(written)
    }

    /// Same date-diffing as `dump`, with extraction parallelized over a
    /// bounded worker pool. Writes remain strictly sequential within each
    /// batch, in batch-collection order.
    pub fn dump_parallel(&self, n_workers: usize, opts: &ExtractOpts) -> Result<usize, DumpError> {
        if n_workers == 0 || n_workers > MAX_WORKERS {
            return Err(DumpError::WorkerLimit(n_workers));
        }
        let (pending, opts) = self.pending_dates(opts)?;
        log::info!(
            "detected {} new dates to be dumped into '{}' ({n_workers} workers)",
            pending.len(),
            self.table()
        );

        let dates: Vec<NaiveDate> = pending.into_iter().collect();
        let mut written = 0;
        for batch in dates.chunks(n_workers) {
            log::info!("begin loading batch of {} dates", batch.len());
            let loaded: Vec<(NaiveDate, Frame)> = batch
                .par_iter()
                .map(|date| {
                    self.extractor
                        .load_single(*date, &opts)
                        .map(|frame| (*date, frame))
                })
                .collect::<Result<_, _>>()?;

            for (date, frame) in loaded {
                if frame.is_empty() {
                    log::info!("no data to be dumped for {date}");
                    continue;
                }
                let entities = self.to_entities(&frame)?;
                self.dump_entities(&entities)?;
                written += 1;
            }
        }
        Ok(written)
    }

    /// Caller-directed single-date dump; skips date-diffing and may
    /// overwrite (delete-then-insert still applies).
    pub fn dump_single(&self, date: NaiveDate, opts: &ExtractOpts) -> Result<bool, DumpError> {
        log::info!("begin loading data for {date}");
        self.load_and_write(date, opts)
    }

    /// Destructive full reload: drop and recreate the table, then `dump`.
    /// Never invoked implicitly.
    pub fn dump_all(&self) -> Result<usize, DumpError> {
        self.recreate_table()?;
        self.dump(&ExtractOpts::default())
    }

    /// Idempotent create-if-absent from the registered schema.
    pub fn create_table(&self) -> Result<(), DumpError> {
        let schema = self.dao.schema().clone();
        self.ctx
            .with_session(&self.target, true, |ss| ss.create_table(&schema))?;
        Ok(())
    }

    /// Drop-and-recreate, the explicitly destructive variant.
    pub fn recreate_table(&self) -> Result<(), DumpError> {
        let schema = self.dao.schema().clone();
        self.ctx.with_session(&self.target, true, |ss| {
            ss.drop_table(&schema.table)?;
            ss.create_table(&schema)
        })?;
        Ok(())
    }

    /// The ingestion watermark, recomputed from committed state.
    pub fn persisted_dates(&self) -> Result<BTreeSet<NaiveDate>, DumpError> {
        Ok(self
            .ctx
            .with_session(&self.target, true, |ss| self.dao.distinct_dates(ss))?)
    }

    /// Source dates minus the watermark, plus the opts enriched with any
    /// per-date metadata the source reported.
    fn pending_dates(
        &self,
        opts: &ExtractOpts,
    ) -> Result<(BTreeSet<NaiveDate>, ExtractOpts), DumpError> {
        let source = self.extractor.file_dates(opts)?;
        let mut opts = opts.clone();
        if let Some(meta) = source.meta() {
            opts.date_meta = Some(meta.clone());
        }
        let persisted = self.persisted_dates()?;
        let pending = source.dates().difference(&persisted).copied().collect();
        Ok((pending, opts))
    }

    fn load_and_write(&self, date: NaiveDate, opts: &ExtractOpts) -> Result<bool, DumpError> {
        let frame = self.extractor.load_single(date, opts)?;
        if frame.is_empty() {
            log::info!("no data to be dumped for {date}");
            return Ok(false);
        }
        let entities = self.to_entities(&frame)?;
        self.dump_entities(&entities)?;
        Ok(true)
    }

    /// Convert raw rows to entities, substituting missing values with the
    /// column type's zero default.
    fn to_entities(&self, frame: &Frame) -> Result<Vec<Entity>, DumpError> {
        let schema = self.dao.schema();
        let mut entities = Vec::with_capacity(frame.len());
        for mut row in frame.rows_as_maps() {
            for col in &schema.columns {
                let cell = row.entry(col.name.clone()).or_insert(Value::Null);
                if cell.is_null() {
                    *cell = Value::zero_for(col.ty);
                }
            }
            entities.push(
                Entity::from_row(&self.registry, &schema.table, &row)
                    .map_err(StoreError::from)?,
            );
        }
        Ok(entities)
    }

    /// Write one single-date batch through the DAO. Failures propagate
    /// after logging which date failed.
    pub fn dump_entities(&self, entities: &[Entity]) -> Result<(), DumpError> {
        let date = entities
            .first()
            .and_then(|e| e.logical_date(self.dao.schema()));
        log::info!("attempting to dump {} entities", entities.len());
        match self
            .ctx
            .with_session(&self.target, true, |ss| self.dao.add_by_date(ss, entities))
        {
            Ok(()) => {
                log::info!("successfully dumped {} entities", entities.len());
                Ok(())
            }
            Err(e) => {
                log::error!("dumping failed for {date:?}: {e}");
                Err(e.into())
            }
        }
    }
}
