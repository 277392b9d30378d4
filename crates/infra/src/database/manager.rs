//! Database connection manager backed by an r2d2 SQLite pool.

use std::path::{Path, PathBuf};
use std::time::Duration;

use fieldlink_domain::config::DatabaseConfig;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use tracing::{debug, info, instrument};

use crate::errors::InfraError;

const SCHEMA_VERSION: i32 = 1;
const SCHEMA_SQL: &str = include_str!("schema.sql");
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);
const CONNECTION_PRAGMAS: &str = "PRAGMA journal_mode = WAL;
     PRAGMA synchronous = NORMAL;
     PRAGMA busy_timeout = 5000;
     PRAGMA foreign_keys = ON;";

/// Pooled SQLite connection
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Owns the connection pool for the queue database.
pub struct DbManager {
    pool: Pool<SqliteConnectionManager>,
    path: PathBuf,
}

impl DbManager {
    /// Open (creating if needed) the database at `db_path`.
    #[instrument(skip_all, fields(db_path = %db_path.as_ref().display(), pool_size = pool_size))]
    pub fn new<P: AsRef<Path>>(db_path: P, pool_size: u32) -> Result<Self, InfraError> {
        let path = db_path.as_ref().to_path_buf();
        let manager = SqliteConnectionManager::file(&path)
            .with_init(|conn| conn.execute_batch(CONNECTION_PRAGMAS));

        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .connection_timeout(CONNECTION_TIMEOUT)
            .build(manager)?;

        info!(max_connections = pool.max_size(), "sqlite pool initialised");
        Ok(Self { pool, path })
    }

    /// Open the configured database and bring its schema up to date.
    pub fn from_config(config: &DatabaseConfig) -> Result<Self, InfraError> {
        let manager = Self::new(&config.path, config.pool_size)?;
        manager.run_migrations()?;
        Ok(manager)
    }

    /// Acquire a connection from the pool.
    pub fn get_connection(&self) -> Result<DbConnection, InfraError> {
        Ok(self.pool.get()?)
    }

    /// Ensure the full schema exists on the current database.
    pub fn run_migrations(&self) -> Result<(), InfraError> {
        let conn = self.get_connection()?;
        conn.execute_batch(SCHEMA_SQL)?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at)
             VALUES (?1, CAST(strftime('%s','now') AS INTEGER))",
            params![SCHEMA_VERSION],
        )?;
        debug!(version = SCHEMA_VERSION, fresh = inserted > 0, "schema ready");
        Ok(())
    }

    /// Return the configured database path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire a connection and run a trivial query.
    pub fn health_check(&self) -> Result<(), InfraError> {
        let conn = self.get_connection()?;
        conn.query_row("SELECT 1", params![], |row| row.get::<_, i32>(0))?;
        Ok(())
    }
}
