//! Session manager — process-wide connection factories and scoped sessions.
//!
//! `StoreContext` owns a lazily-populated map from target identifier to a
//! shared engine. A `Session` is a handle bound to one engine; its
//! transaction lifecycle is bounded to one logical call scope. The
//! reentrant-transaction rule is explicit: callers thread an optional
//! active session handle down the call chain, and an inner call running
//! against an outer handle never commits or closes it.
//!
//! Commit failures at the scope boundary are logged and swallowed by
//! policy — a cleanup failure must not mask a successful read. Callers
//! needing commit-failure visibility commit explicitly inside the scope.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::engine::StoreEngine;
use crate::entity::Entity;
use crate::error::StoreError;
use crate::schema::TableSchema;

/// Where engines live and which database is the default.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// Root directory for persisted databases; `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
    pub default_db: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            data_dir: None,
            default_db: "coredb".to_string(),
        }
    }
}

/// Target identifier: the default store or a named alternate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTarget {
    Default,
    Named(String),
}

impl StoreTarget {
    fn db_name<'a>(&'a self, settings: &'a StoreSettings) -> &'a str {
        match self {
            StoreTarget::Default => &settings.default_db,
            StoreTarget::Named(db) => db,
        }
    }
}

/// Result of the commit attempt at a scope boundary. A value, never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    Failed(String),
    /// Auto-commit was disabled for the scope.
    Skipped,
}

/// Process-wide connection factory.
#[derive(Debug, Default)]
pub struct StoreContext {
    settings: StoreSettings,
    engines: Mutex<HashMap<String, Arc<Mutex<StoreEngine>>>>,
}

impl StoreContext {
    pub fn new(settings: StoreSettings) -> Self {
        Self {
            settings,
            engines: Mutex::new(HashMap::new()),
        }
    }

    /// Purely in-memory context, used by tests and seeding dry runs.
    pub fn in_memory() -> Self {
        Self::new(StoreSettings::default())
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    /// Open a session against a target, lazily constructing the engine on
    /// first use. Repeated calls with the same target share one engine.
    /// Connection failures propagate; there is no built-in retry.
    pub fn open_session(&self, target: &StoreTarget) -> Result<Session, StoreError> {
        let db = target.db_name(&self.settings).to_string();
        let mut engines = self
            .engines
            .lock()
            .map_err(|_| StoreError::Connection("engine registry lock poisoned".into()))?;
        let engine = match engines.get(&db) {
            Some(engine) => Arc::clone(engine),
            None => {
                let dir = self.settings.data_dir.as_ref().map(|root| root.join(&db));
                let engine = Arc::new(Mutex::new(StoreEngine::open(&db, dir)?));
                engines.insert(db, Arc::clone(&engine));
                engine
            }
        };
        Ok(Session { engine })
    }

    /// Scoped session: runs `f`, then finalizes.
    ///
    /// On `Ok` with `auto_commit`, the commit is attempted once; a failure
    /// is logged and swallowed. On `Err`, nothing is committed. Release
    /// (rollback of uncommitted state) happens on every exit path, and
    /// `f`'s error propagates after release.
    pub fn with_session<T>(
        &self,
        target: &StoreTarget,
        auto_commit: bool,
        f: impl FnOnce(&mut Session) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut session = self.open_session(target)?;
        let result = f(&mut session);
        if result.is_ok() && auto_commit {
            if let CommitOutcome::Failed(detail) = session.commit() {
                log::error!("failed to commit session: {detail}");
            }
        }
        session.close();
        result
    }

    /// Reentrant transaction: when an active session handle is supplied,
    /// `f` runs against it without independent commit or close — an inner
    /// call never finalizes an outer transaction. Otherwise this opens a
    /// fresh scope with `with_session` semantics.
    pub fn run_in_transaction<T>(
        &self,
        active: Option<&mut Session>,
        target: &StoreTarget,
        auto_commit: bool,
        f: impl FnOnce(&mut Session) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        match active {
            Some(session) => f(session),
            None => self.with_session(target, auto_commit, f),
        }
    }

    /// Drop every engine. Subsequent opens reconstruct the factories.
    pub fn dispose(&self) {
        if let Ok(mut engines) = self.engines.lock() {
            engines.clear();
        }
    }
}

/// A store handle bound to one engine for one logical scope.
#[derive(Debug)]
pub struct Session {
    engine: Arc<Mutex<StoreEngine>>,
}

impl Session {
    fn engine(&self) -> Result<MutexGuard<'_, StoreEngine>, StoreError> {
        self.engine
            .lock()
            .map_err(|_| StoreError::Connection("engine lock poisoned".into()))
    }

    pub fn create_table(&mut self, schema: &TableSchema) -> Result<(), StoreError> {
        self.engine()?.create_table(schema);
        Ok(())
    }

    pub fn drop_table(&mut self, table: &str) -> Result<(), StoreError> {
        self.engine()?.drop_table(table);
        Ok(())
    }

    pub fn has_table(&self, table: &str) -> Result<bool, StoreError> {
        Ok(self.engine()?.has_table(table))
    }

    pub fn insert(&mut self, entities: &[Entity]) -> Result<(), StoreError> {
        self.engine()?.insert(entities)
    }

    pub fn delete_by_date(
        &mut self,
        table: &str,
        date: chrono::NaiveDate,
    ) -> Result<usize, StoreError> {
        self.engine()?.delete_by_date(table, date)
    }

    pub fn delete_all(&mut self, table: &str) -> Result<usize, StoreError> {
        self.engine()?.delete_all(table)
    }

    pub fn rows(&self, table: &str) -> Result<Vec<Entity>, StoreError> {
        self.engine()?.rows(table)
    }

    /// Explicit commit. Failures are reported as a value; the session stays
    /// usable either way.
    pub fn commit(&mut self) -> CommitOutcome {
        match self.engine() {
            Ok(mut engine) => match engine.commit() {
                Ok(()) => CommitOutcome::Committed,
                Err(e) => CommitOutcome::Failed(e.to_string()),
            },
            Err(e) => CommitOutcome::Failed(e.to_string()),
        }
    }

    /// Release the session, rolling back any uncommitted state.
    pub fn close(self) {
        match self.engine.lock() {
            Ok(mut engine) => engine.rollback(),
            Err(_) => log::error!("failed to close session: engine lock poisoned"),
        }
    }
}
