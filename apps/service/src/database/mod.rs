/// Result store
///
/// Three append-only tables (health_checks, alerts, performance_metrics)
/// in a local LibSQL file, shared by every target task through a pool.

pub mod repository;
pub mod migrations;
pub mod models;

pub use repository::{CheckCounts, LibsqlStore, ResultStore};

use anyhow::Result;
use std::path::Path;

use crate::pool::open_pool;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}

/// Open the store at `path`, creating and migrating it when needed
pub async fn open_store(path: &Path) -> Result<LibsqlStore> {
    let pool = open_pool(path).await?;
    let conn = pool.get().await?;
    initialize_database(&conn).await?;
    drop(conn);

    Ok(LibsqlStore::new_from_pool(pool))
}

/// Fresh store in a temporary directory; keep the directory alive with the store
#[cfg(test)]
pub(crate) async fn test_store() -> Result<(LibsqlStore, tempfile::TempDir)> {
    let dir = tempfile::tempdir()?;
    let store = open_store(&dir.path().join("test.db")).await?;
    Ok((store, dir))
}
