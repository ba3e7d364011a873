//! Database module
//!
//! Handles SQLite connection and migrations.

pub mod connection;
pub mod migrations;

pub use connection::{Database, DbError, DbResult};

/// Open a migrated database in a temporary directory for tests
#[cfg(test)]
pub(crate) fn test_database() -> (tempfile::TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let database = Database::new(dir.path().join("test.db")).unwrap();
    database
        .with_conn(|conn| migrations::run_migrations(conn))
        .unwrap();
    (dir, database)
}
