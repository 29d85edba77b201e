//! Bursa Store — embedded relational store for financial records.
//!
//! This crate contains the storage core:
//! - Typed values, schemas and the schema registry
//! - Schema-validated entities
//! - The embedded table engine with JSONL persistence
//! - Session manager with scoped, reentrant transactions
//! - The declarative query compiler (select / filter / group-by / aggregate)
//! - Table-scoped DAOs with the delete-then-insert-by-date write strategy

pub mod dao;
pub mod engine;
pub mod entity;
pub mod error;
pub mod query;
pub mod schema;
pub mod session;
pub mod value;

pub use dao::Dao;
pub use entity::Entity;
pub use error::{QueryError, StoreError};
pub use query::{Frame, QueryDescriptor, QueryOutput};
pub use schema::{ColumnDef, SchemaRegistry, TableSchema};
pub use session::{CommitOutcome, Session, StoreContext, StoreSettings, StoreTarget};
pub use value::{ColumnType, Value};
