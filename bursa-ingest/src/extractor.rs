//! Extractor collaborator contract.
//!
//! Implemented by callers (market-data fetchers, broker-file readers).
//! A date with legitimately no data returns an empty frame, not an error.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;
use thiserror::Error;

use bursa_store::Frame;

/// Dates available from the source, optionally carrying per-date metadata
/// (e.g. the file path or upstream cursor for each date).
#[derive(Debug, Clone)]
pub enum SourceDates {
    Dates(BTreeSet<NaiveDate>),
    WithMeta(BTreeMap<NaiveDate, serde_json::Value>),
}

impl SourceDates {
    pub fn dates(&self) -> BTreeSet<NaiveDate> {
        match self {
            SourceDates::Dates(dates) => dates.clone(),
            SourceDates::WithMeta(map) => map.keys().copied().collect(),
        }
    }

    pub fn meta(&self) -> Option<&BTreeMap<NaiveDate, serde_json::Value>> {
        match self {
            SourceDates::Dates(_) => None,
            SourceDates::WithMeta(map) => Some(map),
        }
    }
}

/// Free-form options threaded through an ingestion run. When the source
/// reported per-date metadata, the dumper places it here before any load
/// call.
#[derive(Debug, Clone, Default)]
pub struct ExtractOpts {
    pub params: HashMap<String, String>,
    pub date_meta: Option<BTreeMap<NaiveDate, serde_json::Value>>,
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("source unavailable: {0}")]
    Unavailable(String),

    #[error("malformed source data for {date}: {detail}")]
    Malformed { date: NaiveDate, detail: String },
}

/// The external data source feeding one table.
pub trait Extractor: Send + Sync {
    /// Dates the source can supply; compared against the persisted
    /// watermark to compute the ingestion delta.
    fn file_dates(&self, opts: &ExtractOpts) -> Result<SourceDates, ExtractError>;

    /// Raw tabular data for one date. Zero rows means "nothing for this
    /// date", which the pipeline skips without error.
    fn load_single(&self, date: NaiveDate, opts: &ExtractOpts) -> Result<Frame, ExtractError>;
}
