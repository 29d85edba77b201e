//! Configuration collaborator — store credentials and managed tables.
//!
//! Credentials live in a JSON creds file under `conn_param_admin`; the
//! application config lists the managed tables and the data directory.
//! Both are read once at process start.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use bursa_store::StoreSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Connection credentials for the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnParams {
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(rename = "passwd")]
    pub password: String,
    pub db: String,
}

#[derive(Debug, Deserialize)]
struct CredsFile {
    conn_param_admin: ConnParams,
}

/// Application configuration: the managed tables and where the store
/// keeps its data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub tables: Vec<String>,
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

pub fn read_creds(path: &Path) -> Result<ConnParams, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let creds: CredsFile = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(creds.conn_param_admin)
}

pub fn read_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Derive engine settings. The embedded engine keys its factory on the
/// configured database name; the full credential tuple remains the target
/// identity, as the DSN was for the networked original.
pub fn store_settings(config: &AppConfig, conn: &ConnParams) -> StoreSettings {
    StoreSettings {
        data_dir: config.data_dir.clone(),
        default_db: conn.db.clone(),
    }
}
