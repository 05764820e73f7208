//! Shared application state.
//!
//! Handlers and background tasks open a fresh SQLite connection per
//! operation from the stored path; single-statement conditional writes
//! carry the concurrency guarantees, so no connection is shared.

use std::path::PathBuf;

use rusqlite::Connection;

use crate::config::AppConfig;
use crate::db::{self, StoreError};

pub struct AppState {
    pub config: AppConfig,
    db_path: PathBuf,
}

impl AppState {
    /// Create the data directory, open the database once to run
    /// migrations, and fail fast on a broken environment.
    pub fn new(config: AppConfig) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&config.data_dir).map_err(|e| {
            StoreError::ConstraintViolation(format!(
                "cannot create data dir {}: {e}",
                config.data_dir.display()
            ))
        })?;
        let db_path = config.db_path();
        db::open_database(&db_path)?;
        tracing::info!(path = %db_path.display(), "Database ready");
        Ok(Self { config, db_path })
    }

    /// Open a connection for one operation.
    pub fn open_db(&self) -> Result<Connection, StoreError> {
        db::open_database(&self.db_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> (AppState, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = AppConfig::load();
        config.data_dir = tmp.path().to_path_buf();
        let state = AppState::new(config).unwrap();
        (state, tmp)
    }

    #[test]
    fn new_state_creates_database() {
        let (state, _tmp) = test_state();
        assert!(state.config.db_path().exists());
        let conn = state.open_db().unwrap();
        let tables = crate::db::count_tables(&conn).unwrap();
        assert_eq!(tables, 4);
    }

    #[test]
    fn reopening_is_idempotent() {
        let (state, _tmp) = test_state();
        let _first = state.open_db().unwrap();
        let _second = state.open_db().unwrap();
    }
}
