//! Application state shared by every request handler.
//!
//! `CoreState` holds configuration and the injected clock. It owns no
//! domain data: each request opens its own SQLite connection and the
//! database is the only shared mutable resource.

use std::path::Path;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::{BusinessHours, ServiceConfig};
use crate::db;

pub struct CoreState {
    config: ServiceConfig,
    clock: Arc<dyn Clock>,
}

impl CoreState {
    /// State backed by the wall clock.
    pub fn new(config: ServiceConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: ServiceConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn business_hours(&self) -> &BusinessHours {
        &self.config.business_hours
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn db_path(&self) -> &Path {
        &self.config.db_path
    }

    /// Create the database file if needed and bring its schema up to date.
    /// Called once at startup.
    pub fn initialize_storage(&self) -> Result<(), CoreError> {
        db::open_database(self.db_path())?;
        tracing::info!(path = %self.db_path().display(), "database ready");
        Ok(())
    }

    /// Open a connection for one request.
    pub fn open_db(&self) -> Result<rusqlite::Connection, CoreError> {
        db::connect(self.db_path()).map_err(CoreError::Database)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::{TimeZone, Utc};

    fn config_in(dir: &Path) -> ServiceConfig {
        ServiceConfig {
            db_path: dir.join("carebook.db"),
            ..ServiceConfig::default()
        }
    }

    #[test]
    fn injected_clock_is_used() {
        let instant = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let state = CoreState::with_clock(config_in(tmp.path()), Arc::new(FixedClock(instant)));
        assert_eq!(state.clock().now(), instant);
    }

    #[test]
    fn initialized_storage_accepts_connections() {
        let tmp = tempfile::tempdir().unwrap();
        let state = CoreState::new(config_in(tmp.path()));
        state.initialize_storage().unwrap();

        let conn = state.open_db().unwrap();
        assert_eq!(db::count_tables(&conn).unwrap(), 6);
    }

    #[test]
    fn business_hours_come_from_config() {
        let tmp = tempfile::tempdir().unwrap();
        let state = CoreState::new(config_in(tmp.path()));
        assert_eq!(state.business_hours(), &BusinessHours::default());
    }
}
