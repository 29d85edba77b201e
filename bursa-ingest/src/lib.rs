//! Bursa Ingest — date-partitioned ingestion of external feeds into the
//! store.
//!
//! This crate builds on `bursa-store` to provide:
//! - The `Extractor` contract for external tabular sources
//! - The `Dumper` pipeline: watermark diffing, bounded-parallel loading,
//!   delete-then-insert-by-date writes
//! - Credential and table configuration files
//! - Alert payload chunking for operational notifications

pub mod config;
pub mod dumper;
pub mod extractor;
pub mod notify;

pub use config::{read_config, read_creds, store_settings, AppConfig, ConfigError, ConnParams};
pub use dumper::{DumpError, Dumper, MAX_WORKERS};
pub use extractor::{ExtractError, ExtractOpts, Extractor, SourceDates};
pub use notify::{make_blocks, send_alert, AlertSink, NotifyError, CHUNK_ROWS};
