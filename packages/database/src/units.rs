//! Geographic unit queries and idempotent upserts.
//!
//! Writes go through [`upsert_chunk`], which classifies each incoming
//! unit against the stored row with the same code and only touches rows
//! that are new or changed. A chunk is all-or-nothing: it runs in one
//! transaction and every unit's ownership is checked before any
//! statement executes.

use std::collections::{BTreeMap, BTreeSet};

use duckdb::Connection;
use geo_hierarchy_models::{GeographicUnit, Level, NewUnit, PropertyBag, UpsertOutcome};

use crate::DbError;

/// Number of columns bound per row in the upsert statement.
const UPSERT_COLUMNS: usize = 9;

const SELECT_COLUMNS: &str = "id, code, level, parent_id, neighborhood_id, name_local, \
     name_foreign, geometry_geojson, properties_json, source_id, is_active, \
     CAST(created_at AS TEXT), CAST(updated_at AS TEXT)";

/// Enforces the parent ownership rules for a unit's level.
///
/// - Regions own no parent reference of either kind.
/// - Neighborhood units have exactly one of a sector-line `parent_id`
///   or a neighborhood-line `neighborhood_id`.
/// - Every other level has a `parent_id` and no `neighborhood_id`.
///
/// # Errors
///
/// Returns [`DbError::Ownership`] describing the broken rule.
pub fn check_ownership(unit: &NewUnit) -> Result<(), DbError> {
    let violation = |message: &str| {
        Err(DbError::Ownership {
            code: unit.code.clone(),
            message: message.to_string(),
        })
    };

    match (unit.level, unit.parent_id, unit.neighborhood_id) {
        (Level::Region, None, None) => Ok(()),
        (Level::Region, _, _) => violation("a region cannot have a parent"),
        (Level::NeighborhoodUnit, Some(_), Some(_)) => {
            violation("a neighborhood unit cannot be owned by both a sector and a neighborhood")
        }
        (Level::NeighborhoodUnit, None, None) => {
            violation("a neighborhood unit must be owned by a sector or a neighborhood")
        }
        (Level::NeighborhoodUnit, _, _) => Ok(()),
        (_, _, Some(_)) => violation("only neighborhood units may reference a neighborhood"),
        (_, None, None) => violation("a parent is required below the region level"),
        (_, Some(_), None) => Ok(()),
    }
}

/// Loads the units of one level, optionally restricted to active rows,
/// ordered by id.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a row cannot be decoded.
pub fn load_units(
    conn: &Connection,
    level: Level,
    active_only: bool,
) -> Result<Vec<GeographicUnit>, DbError> {
    let sql = format!(
        "SELECT {SELECT_COLUMNS} FROM geographic_units WHERE level = ?{} ORDER BY id",
        if active_only { " AND is_active" } else { "" }
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([level.as_ref()])?;

    let mut units = Vec::new();
    while let Some(row) = rows.next()? {
        units.push(row_to_unit(row)?);
    }
    Ok(units)
}

/// Looks up a single unit by its natural code.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or the row cannot be decoded.
pub fn find_by_code(conn: &Connection, code: &str) -> Result<Option<GeographicUnit>, DbError> {
    let mut found = fetch_by_codes(conn, &[code])?;
    Ok(found.remove(code))
}

/// Returns the number of active units on `level`.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn count_active(conn: &Connection, level: Level) -> Result<u64, DbError> {
    let mut stmt =
        conn.prepare("SELECT COUNT(*) FROM geographic_units WHERE level = ? AND is_active")?;
    let count: i64 = stmt.query_row([level.as_ref()], |row| row.get(0))?;
    Ok(u64::try_from(count).unwrap_or(0))
}

/// Returns `(level, active, total)` counts for every level, in ladder
/// order. Levels with no rows are reported as zero.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn counts_by_level(conn: &Connection) -> Result<Vec<(Level, u64, u64)>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT level, COUNT(*) FILTER (WHERE is_active), COUNT(*)
         FROM geographic_units GROUP BY level",
    )?;
    let mut rows = stmt.query([])?;

    let mut by_level: BTreeMap<Level, (u64, u64)> = BTreeMap::new();
    while let Some(row) = rows.next()? {
        let level_name: String = row.get(0)?;
        let active: i64 = row.get(1)?;
        let total: i64 = row.get(2)?;
        let level = parse_level(&level_name)?;
        by_level.insert(
            level,
            (
                u64::try_from(active).unwrap_or(0),
                u64::try_from(total).unwrap_or(0),
            ),
        );
    }

    Ok(Level::ALL
        .iter()
        .map(|level| {
            let (active, total) = by_level.get(level).copied().unwrap_or((0, 0));
            (*level, active, total)
        })
        .collect())
}

/// Returns every stored code that belongs to a level other than `level`.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn codes_outside_level(conn: &Connection, level: Level) -> Result<BTreeSet<String>, DbError> {
    let mut stmt = conn.prepare("SELECT code FROM geographic_units WHERE level <> ?")?;
    let mut rows = stmt.query([level.as_ref()])?;

    let mut codes = BTreeSet::new();
    while let Some(row) = rows.next()? {
        codes.insert(row.get::<_, String>(0)?);
    }
    Ok(codes)
}

/// Counts active units on `level` whose parent reference does not point
/// at an active unit one level up, or whose neighborhood reference does
/// not point at an active unit.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn count_dangling_parents(conn: &Connection, level: Level) -> Result<u64, DbError> {
    let parent_level = level.parent().map(|p| p.to_string()).unwrap_or_default();
    let mut stmt = conn.prepare(
        "SELECT COUNT(*) FROM geographic_units c
         WHERE c.level = ? AND c.is_active AND (
             (c.parent_id IS NOT NULL AND NOT EXISTS (
                 SELECT 1 FROM geographic_units p
                 WHERE p.id = c.parent_id AND p.is_active AND p.level = ?
             ))
             OR (c.neighborhood_id IS NOT NULL AND NOT EXISTS (
                 SELECT 1 FROM geographic_units n
                 WHERE n.id = c.neighborhood_id AND n.is_active
             ))
         )",
    )?;
    let count: i64 = stmt.query_row([level.as_ref(), parent_level.as_str()], |row| row.get(0))?;
    Ok(u64::try_from(count).unwrap_or(0))
}

/// Sets the soft-delete flag on a unit. Returns whether a row matched.
///
/// # Errors
///
/// Returns [`DbError`] if the update fails.
pub fn set_active(conn: &Connection, code: &str, active: bool) -> Result<bool, DbError> {
    let rows = conn.execute(
        "UPDATE geographic_units SET is_active = ?, updated_at = now()
         WHERE code = ?",
        duckdb::params![active, code],
    )?;
    Ok(rows > 0)
}

/// Upserts one chunk of units in a single transaction, using `code` as
/// the conflict key.
///
/// Existing rows keep their `id`, `created_at` and `is_active`; their
/// parent references, names, geometry, properties and source id are
/// replaced. Rows whose stored content already matches are not written
/// and are reported as [`UpsertOutcome::Unchanged`]. Duplicate codes
/// within the chunk keep the last occurrence.
///
/// # Errors
///
/// Returns [`DbError::Ownership`] before anything is written if any unit
/// breaks the ownership rules, [`DbError::LevelConflict`] if a code is
/// stored on another level, or [`DbError`] if a statement fails. The
/// transaction is rolled back on every error.
pub fn upsert_chunk(
    conn: &Connection,
    units: &[NewUnit],
) -> Result<BTreeMap<String, UpsertOutcome>, DbError> {
    for unit in units {
        check_ownership(unit)?;
    }
    if units.is_empty() {
        return Ok(BTreeMap::new());
    }

    let mut last_seen: BTreeMap<&str, usize> = BTreeMap::new();
    for (i, unit) in units.iter().enumerate() {
        last_seen.insert(&unit.code, i);
    }
    let deduped: Vec<&NewUnit> = units
        .iter()
        .enumerate()
        .filter(|(i, unit)| last_seen.get(unit.code.as_str()) == Some(i))
        .map(|(_, unit)| unit)
        .collect();

    if deduped.len() < units.len() {
        log::warn!(
            "Deduplicated upsert chunk: {} -> {} rows ({} duplicate codes)",
            units.len(),
            deduped.len(),
            units.len() - deduped.len(),
        );
    }

    in_transaction(conn, || write_chunk(conn, &deduped))
}

fn write_chunk(
    conn: &Connection,
    units: &[&NewUnit],
) -> Result<BTreeMap<String, UpsertOutcome>, DbError> {
    let codes: Vec<&str> = units.iter().map(|u| u.code.as_str()).collect();
    let existing = fetch_by_codes(conn, &codes)?;

    let mut outcomes = BTreeMap::new();
    let mut to_write: Vec<(&NewUnit, String)> = Vec::new();

    for unit in units {
        let properties_json = serde_json::to_string(&unit.properties)?;
        let outcome = match existing.get(&unit.code) {
            None => UpsertOutcome::Inserted,
            Some(stored) if stored.level != unit.level => {
                return Err(DbError::LevelConflict {
                    code: unit.code.clone(),
                    existing: stored.level,
                    incoming: unit.level,
                });
            }
            Some(stored) if is_unchanged(stored, unit) => UpsertOutcome::Unchanged,
            Some(_) => UpsertOutcome::Updated,
        };

        if outcome != UpsertOutcome::Unchanged {
            to_write.push((unit, properties_json));
        }
        outcomes.insert(unit.code.clone(), outcome);
    }

    if to_write.is_empty() {
        return Ok(outcomes);
    }

    let mut sql = String::from(
        "INSERT INTO geographic_units (
            code, level, parent_id, neighborhood_id, name_local, name_foreign,
            geometry_geojson, properties_json, source_id
        ) VALUES ",
    );
    for i in 0..to_write.len() {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push_str("(?, ?, ?, ?, ?, ?, ?, ?, ?)");
    }
    sql.push_str(
        " ON CONFLICT (code) DO UPDATE SET
            parent_id = EXCLUDED.parent_id,
            neighborhood_id = EXCLUDED.neighborhood_id,
            name_local = EXCLUDED.name_local,
            name_foreign = EXCLUDED.name_foreign,
            geometry_geojson = EXCLUDED.geometry_geojson,
            properties_json = EXCLUDED.properties_json,
            source_id = EXCLUDED.source_id,
            updated_at = now()",
    );

    let mut stmt = conn.prepare(&sql)?;
    let mut param_idx = 1usize;

    for (unit, properties_json) in &to_write {
        stmt.raw_bind_parameter(param_idx, &unit.code)?;
        stmt.raw_bind_parameter(param_idx + 1, unit.level.as_ref())?;
        stmt.raw_bind_parameter(param_idx + 2, unit.parent_id)?;
        stmt.raw_bind_parameter(param_idx + 3, unit.neighborhood_id)?;
        stmt.raw_bind_parameter(param_idx + 4, &unit.name_local)?;
        stmt.raw_bind_parameter(param_idx + 5, unit.name_foreign.as_deref())?;
        stmt.raw_bind_parameter(param_idx + 6, &unit.geometry)?;
        stmt.raw_bind_parameter(param_idx + 7, properties_json)?;
        stmt.raw_bind_parameter(param_idx + 8, unit.source_id.as_deref())?;
        param_idx += UPSERT_COLUMNS;
    }

    stmt.raw_execute()?;

    Ok(outcomes)
}

fn is_unchanged(stored: &GeographicUnit, unit: &NewUnit) -> bool {
    stored.parent_id == unit.parent_id
        && stored.neighborhood_id == unit.neighborhood_id
        && stored.name_local == unit.name_local
        && stored.name_foreign == unit.name_foreign
        && stored.geometry.as_deref() == Some(unit.geometry.as_str())
        && stored.properties == unit.properties
        && stored.source_id == unit.source_id
}

fn in_transaction<T>(
    conn: &Connection,
    body: impl FnOnce() -> Result<T, DbError>,
) -> Result<T, DbError> {
    conn.execute_batch("BEGIN TRANSACTION;")?;
    match body() {
        Ok(value) => {
            conn.execute_batch("COMMIT;")?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = conn.execute_batch("ROLLBACK;") {
                log::error!("Rollback failed after {e}: {rollback}");
            }
            Err(e)
        }
    }
}

fn fetch_by_codes(
    conn: &Connection,
    codes: &[&str],
) -> Result<BTreeMap<String, GeographicUnit>, DbError> {
    if codes.is_empty() {
        return Ok(BTreeMap::new());
    }

    let placeholders = codes.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
    let sql = format!("SELECT {SELECT_COLUMNS} FROM geographic_units WHERE code IN ({placeholders})");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(duckdb::params_from_iter(codes.iter()))?;

    let mut found = BTreeMap::new();
    while let Some(row) = rows.next()? {
        let unit = row_to_unit(row)?;
        found.insert(unit.code.clone(), unit);
    }
    Ok(found)
}

fn row_to_unit(row: &duckdb::Row<'_>) -> Result<GeographicUnit, DbError> {
    let level_name: String = row.get(2)?;
    let properties_json: String = row.get(8)?;
    let properties: PropertyBag = serde_json::from_str(&properties_json)?;
    let created_at: Option<String> = row.get(11)?;
    let updated_at: Option<String> = row.get(12)?;

    Ok(GeographicUnit {
        id: row.get(0)?,
        code: row.get(1)?,
        level: parse_level(&level_name)?,
        parent_id: row.get(3)?,
        neighborhood_id: row.get(4)?,
        name_local: row.get(5)?,
        name_foreign: row.get(6)?,
        geometry: row.get(7)?,
        properties,
        source_id: row.get(9)?,
        is_active: row.get(10)?,
        created_at: created_at.as_deref().and_then(parse_timestamp),
        updated_at: updated_at.as_deref().and_then(parse_timestamp),
    })
}

fn parse_level(name: &str) -> Result<Level, DbError> {
    name.parse().map_err(|_| DbError::Conversion {
        message: format!("Unknown level stored in database: {name:?}"),
    })
}

/// Parses `DuckDB`'s `TIMESTAMP::TEXT` output (with or without fractional
/// seconds) as UTC.
fn parse_timestamp(s: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    use chrono::{DateTime, NaiveDateTime, Utc};

    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
        .or_else(|| {
            log::warn!("Failed to parse timestamp: {s:?}");
            None
        })
}
