#![allow(clippy::module_name_repetitions)]
//! Canonical file paths for the hierarchy data directory.
//!
//! All defaults are relative to the project root's `data/` directory.
//! `GEO_HIERARCHY_DB` overrides the store location.

use std::path::{Path, PathBuf};

/// Environment variable that overrides [`hierarchy_db_path`].
pub const DB_PATH_ENV: &str = "GEO_HIERARCHY_DB";

/// Returns the workspace root directory.
///
/// Resolved at compile time from `CARGO_MANIFEST_DIR`.
///
/// # Panics
///
/// Panics if the project root cannot be resolved.
#[must_use]
pub fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .expect("Failed to find project root from CARGO_MANIFEST_DIR")
        .to_path_buf()
}

/// Returns the `data/` directory path.
#[must_use]
pub fn data_dir() -> PathBuf {
    project_root().join("data")
}

/// Returns the `data/input/` directory holding one feature collection per
/// level.
#[must_use]
pub fn input_dir() -> PathBuf {
    data_dir().join("input")
}

/// Returns the path of the hierarchy store, honoring [`DB_PATH_ENV`].
#[must_use]
pub fn hierarchy_db_path() -> PathBuf {
    std::env::var_os(DB_PATH_ENV).map_or_else(
        || data_dir().join("shared").join("hierarchy.duckdb"),
        PathBuf::from,
    )
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.as_os_str().is_empty() && !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
