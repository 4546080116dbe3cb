//! Command implementations.

pub mod completions;
pub mod init;
mod render;
pub mod sheet;
pub mod sync;
pub mod ticket;
pub mod version;

use crate::config::{load_config, resolve_actor, resolve_cache_path, resolve_db_path, Config};
use crate::error::{Error, Result};
use crate::sheets::{GoogleSheetsBackend, SheetAdapter};
use crate::storage::SqliteStorage;
use crate::sync::{ClientCache, SyncSession};
use std::collections::HashMap;
use std::path::PathBuf;

/// Global options every command receives.
#[derive(Debug, Clone, Copy)]
pub struct Globals<'a> {
    pub db: Option<&'a PathBuf>,
    pub cache: Option<&'a PathBuf>,
    pub actor: Option<&'a str>,
    pub json: bool,
}

/// Session type used by the binary.
pub type DeskSession = SyncSession<SqliteStorage, GoogleSheetsBackend>;

/// Open the ticket database; it must have been created by `crowd init`.
fn open_storage(db: Option<&PathBuf>, config: &Config) -> Result<SqliteStorage> {
    let db_path = resolve_db_path(db.map(PathBuf::as_path)).ok_or(Error::NotInitialized)?;
    if !db_path.exists() {
        return Err(Error::NotInitialized);
    }
    Ok(SqliteStorage::open(&db_path)?.with_deleter(config.deleter()))
}

fn sheet_adapter(config: &Config) -> Result<SheetAdapter<GoogleSheetsBackend>> {
    let tabs: HashMap<_, _> = config
        .sheets
        .tabs
        .iter()
        .map(|(section, tab)| (*section, tab.clone()))
        .collect();
    let backend = config.sheet_backend()?;
    if !backend.is_configured() {
        tracing::info!("Sheet not configured; working from the store and cache only");
    }
    Ok(SheetAdapter::new(backend).with_tabs(tabs))
}

/// Assemble a session from configuration, the database and the cache.
fn open_session(globals: Globals<'_>) -> Result<(DeskSession, Config)> {
    let config = load_config()?;
    let storage = open_storage(globals.db, &config)?;
    let cache_path = resolve_cache_path(globals.cache.map(PathBuf::as_path))
        .ok_or_else(|| Error::Config("Could not determine the client cache path".into()))?;
    let cache = ClientCache::load(&cache_path)?;
    let actor = resolve_actor(globals.actor);

    let session = SyncSession::new(storage, sheet_adapter(&config)?, cache, &actor)
        .with_policy(config.merge_policy)
        .with_permissions(config.permissions());
    Ok((session, config))
}

/// Current-thread runtime for one command.
fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Other(format!("Failed to create async runtime: {e}")))
}
