#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `DuckDB` storage for geographic units.
//!
//! All six levels share one `geographic_units` table keyed by the natural
//! `code`. The opaque `id` comes from a sequence on first insert and is
//! never rewritten. Geometry and the source attribute bag are stored as
//! `GeoJSON`/JSON text.

pub mod paths;
pub mod units;

use std::path::Path;

use geo_hierarchy_models::Level;

pub use duckdb::Connection;

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `DuckDB` error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// Filesystem error while preparing the database location.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored JSON could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A unit violates the parent ownership rules for its level.
    #[error("Ownership violation for unit {code}: {message}")]
    Ownership {
        /// Code of the offending unit.
        code: String,
        /// Which rule was broken.
        message: String,
    },

    /// A code is already stored for a unit on a different level.
    #[error("Code {code} already belongs to a {existing} unit, refusing to store it as {incoming}")]
    LevelConflict {
        /// The contested code.
        code: String,
        /// Level of the stored unit.
        existing: Level,
        /// Level of the incoming unit.
        incoming: Level,
    },

    /// Data conversion error.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

/// Opens (or creates) the hierarchy `DuckDB` and ensures the schema exists.
///
/// # Errors
///
/// Returns [`DbError`] if the connection or schema creation fails.
pub fn open(path: &Path) -> Result<Connection, DbError> {
    if let Some(parent) = path.parent() {
        paths::ensure_dir(parent)?;
    }

    let conn = Connection::open(path)?;

    conn.execute_batch("SET threads = 4; SET memory_limit = '512MB';")?;

    create_schema(&conn)?;

    Ok(conn)
}

/// Opens the hierarchy DB at the configured default path.
///
/// # Errors
///
/// Returns [`DbError`] if the connection or schema creation fails.
pub fn open_default() -> Result<Connection, DbError> {
    open(&paths::hierarchy_db_path())
}

/// Opens a throwaway in-memory store with the schema applied.
///
/// # Errors
///
/// Returns [`DbError`] if the connection or schema creation fails.
pub fn open_in_memory() -> Result<Connection, DbError> {
    let conn = Connection::open_in_memory()?;
    create_schema(&conn)?;
    Ok(conn)
}

/// Creates the `geographic_units` table and its id sequence.
///
/// The CHECK constraint mirrors [`units::check_ownership`] for the
/// neighborhood-unit exclusive-or rule.
///
/// # Errors
///
/// Returns [`DbError`] if any DDL statement fails.
pub fn create_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE SEQUENCE IF NOT EXISTS geographic_units_id_seq START 1;

        CREATE TABLE IF NOT EXISTS geographic_units (
            code TEXT PRIMARY KEY,
            id BIGINT NOT NULL DEFAULT nextval('geographic_units_id_seq'),
            level TEXT NOT NULL,
            parent_id BIGINT,
            neighborhood_id BIGINT,
            name_local TEXT NOT NULL,
            name_foreign TEXT,
            geometry_geojson TEXT,
            properties_json TEXT NOT NULL DEFAULT '{}',
            source_id TEXT,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMP NOT NULL DEFAULT current_timestamp,
            updated_at TIMESTAMP NOT NULL DEFAULT current_timestamp,
            CHECK (
                level <> 'neighborhoodUnit'
                OR ((parent_id IS NULL) <> (neighborhood_id IS NULL))
            )
        );",
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent() {
        let conn = open_in_memory().unwrap();
        create_schema(&conn).unwrap();
        let count: i64 = conn
            .prepare("SELECT COUNT(*) FROM geographic_units")
            .unwrap()
            .query_row([], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn check_constraint_rejects_double_owned_neighborhood_unit() {
        let conn = open_in_memory().unwrap();
        let result = conn.execute_batch(
            "INSERT INTO geographic_units (code, level, parent_id, neighborhood_id, name_local)
             VALUES ('NU-1', 'neighborhoodUnit', 1, 2, 'x')",
        );
        assert!(result.is_err());
    }
}
