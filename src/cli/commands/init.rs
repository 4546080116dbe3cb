//! Initialize Crowd Desk on this machine.
//!
//! Creates the ticket database (schema and migrations are applied on open)
//! and writes a default `config.json` if none exists. Running it again is
//! safe: an existing database is only migrated unless `--force` is given.

use crate::cli::commands::Globals;
use crate::config::{init_config, resolve_cache_path, resolve_db_path};
use crate::error::{Error, Result};
use crate::storage::SqliteStorage;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct InitOutput {
    database: PathBuf,
    created: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache: Option<PathBuf>,
}

/// Create (or with `force`, recreate) the database at `db_path`.
///
/// Returns whether a new database file was created.
fn init_database(db_path: &Path, force: bool) -> Result<bool> {
    let existed = db_path.exists();
    if existed && force {
        fs::remove_file(db_path)?;
    }
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    SqliteStorage::open(db_path)?;
    Ok(!existed || force)
}

/// Execute the init command.
///
/// # Errors
///
/// Returns an error if the database, cache directory or config cannot be
/// created.
pub fn execute(force: bool, globals: Globals<'_>) -> Result<()> {
    let db_path = resolve_db_path(globals.db.map(PathBuf::as_path))
        .ok_or_else(|| Error::Config("Could not determine the database path".into()))?;
    let created = init_database(&db_path, force)?;

    let cache = resolve_cache_path(globals.cache.map(PathBuf::as_path));
    if let Some(parent) = cache.as_deref().and_then(Path::parent) {
        fs::create_dir_all(parent)?;
    }

    let config = match init_config() {
        Ok((path, _)) => Some(path),
        Err(e) => {
            tracing::warn!(error = %e, "Could not write default config");
            None
        }
    };

    if globals.json {
        let output = InitOutput {
            database: db_path,
            created,
            config,
            cache,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        if created {
            println!("Initialized Crowd Desk");
        } else {
            println!("Crowd Desk already initialized (schema up to date)");
        }
        println!("  Database: {}", db_path.display());
        if let Some(cache) = cache {
            println!("  Cache:    {}", cache.display());
        }
        if let Some(config) = config {
            println!("  Config:   {}", config.display());
        }
        println!();
        println!("Next: set sheets.spreadsheetId and sheets.accessToken, then run 'crowd sync'.");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::TicketStore;
    use crate::model::Section;
    use tempfile::TempDir;

    #[test]
    fn test_init_creates_database_with_schema() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("data").join("tickets.db");

        assert!(init_database(&db_path, false).unwrap());
        assert!(db_path.exists());

        let storage = SqliteStorage::open(&db_path).unwrap();
        assert!(storage.list_tickets(Section::Ce).unwrap().is_empty());
    }

    #[test]
    fn test_init_is_idempotent_and_force_recreates() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("tickets.db");
        init_database(&db_path, false).unwrap();

        {
            let mut storage = SqliteStorage::open(&db_path).unwrap();
            storage
                .create_ticket(Section::Ce, None, &serde_json::json!({}), "Anati")
                .unwrap();
        }

        assert!(!init_database(&db_path, false).unwrap());
        let storage = SqliteStorage::open(&db_path).unwrap();
        assert_eq!(storage.list_tickets(Section::Ce).unwrap().len(), 1);
        drop(storage);

        assert!(init_database(&db_path, true).unwrap());
        let storage = SqliteStorage::open(&db_path).unwrap();
        assert!(storage.list_tickets(Section::Ce).unwrap().is_empty());
    }
}
