//! Per-level staging and upsert.
//!
//! One call to [`ingest_level`] takes a level's raw features through key
//! resolution, geometry validation, tiered matching against the active
//! parent level, code assignment, and chunked idempotent writes.

use std::collections::BTreeMap;

use geo::{Area, Centroid, MultiPolygon};
use geo_hierarchy_database::{Connection, units};
use geo_hierarchy_models::{
    Level, LevelDefinition, NewUnit, PropertyBag, Tier, progress::ProgressCallback,
};
use geo_hierarchy_spatial::{SpatialIndex, match_parent, parse_multipolygon, validate};

use crate::codes::{self, ChildDraft, CodeContext};
use crate::report::{RunEvent, RunStats, RunSummary};
use crate::{IngestError, IngestOptions, RawFeature, fields};

/// Fallback root prefix when a parentless level has none configured.
const DEFAULT_ROOT_PREFIX: &str = "ROOT";

/// Active parents of one level, indexed for matching.
struct ParentSet {
    index: SpatialIndex,
    codes: BTreeMap<i64, String>,
}

/// A feature that cleared key resolution, validation and matching.
struct StagedFeature {
    properties: PropertyBag,
    geometry_json: String,
    name_local: String,
    name_foreign: Option<String>,
    tier: Option<Tier>,
}

/// Ingests one level's features and returns its run summary.
///
/// Per-feature failures are recorded in the summary and never abort the
/// pass. A failed write chunk is rolled back, counted, and skipped.
///
/// # Errors
///
/// Every error is returned as [`IngestError::Halted`], carrying the
/// summary accumulated up to the halt. Its cause is one of:
///
/// * [`IngestError::PrerequisiteMissing`] if the parent level has no
///   active units with usable geometry. Raised before any matching, so
///   the summary counts nothing.
/// * [`IngestError::DanglingParents`] if, after writing, an active unit of
///   this level references a missing or inactive parent. The level's
///   batches are already committed and counted.
/// * [`IngestError::Database`] or [`IngestError::Json`] if the store
///   cannot be read or a geometry cannot be re-serialized.
pub fn ingest_level(
    conn: &Connection,
    def: &LevelDefinition,
    features: Vec<RawFeature>,
    options: &IngestOptions,
    progress: &dyn ProgressCallback,
) -> Result<RunSummary, IngestError> {
    let level = def.level;
    let mut stats = RunStats::new(level);

    match stage_and_write(conn, def, features, options, progress, &mut stats) {
        Ok(()) => {
            let summary = stats.summary();
            if options.dry_run {
                progress.finish(format!("{level}: dry run, {} staged", summary.staged));
            } else {
                progress.finish(format!(
                    "{level}: {} inserted, {} updated, {} unchanged",
                    summary.inserted, summary.updated, summary.unchanged
                ));
            }
            Ok(summary)
        }
        Err(source) => {
            progress.finish(format!("{level}: halted"));
            Err(IngestError::Halted {
                summary: Box::new(stats.summary()),
                source: Box::new(source),
            })
        }
    }
}

fn stage_and_write(
    conn: &Connection,
    def: &LevelDefinition,
    features: Vec<RawFeature>,
    options: &IngestOptions,
    progress: &dyn ProgressCallback,
    stats: &mut RunStats,
) -> Result<(), IngestError> {
    let level = def.level;
    log::info!("Ingesting {level}: {} features", features.len());

    let parents = match level.parent() {
        Some(parent_level) => Some(load_parents(conn, level, parent_level)?),
        None => None,
    };

    progress.set_total(features.len() as u64);
    progress.set_message(format!("Matching {level}"));

    let mut staged: Vec<StagedFeature> = Vec::with_capacity(features.len());
    let mut drafts: Vec<ChildDraft> = Vec::with_capacity(features.len());

    for (position, feature) in features.into_iter().enumerate() {
        progress.inc(1);

        let Some(name_local) = fields::resolve(&feature.properties, &def.fields.name_local) else {
            log::warn!("{level} feature {position}: no usable name_local property");
            stats.record(RunEvent::MissingRequiredKey);
            continue;
        };

        let geometry = match validate(feature.geometry.as_ref()) {
            Ok(geometry) => geometry,
            Err(invalid) => {
                log::warn!("{level} feature {position} ({name_local}): {invalid}");
                stats.record(RunEvent::InvalidGeometry {
                    reason: invalid.reason,
                });
                continue;
            }
        };

        let (parent_id, tier) = match &parents {
            None => (None, None),
            Some(parents) => {
                let Some(found) = match_parent(&geometry, &parents.index) else {
                    log::warn!("{level} feature {position} ({name_local}): no parent matched");
                    stats.record(RunEvent::Unmatched);
                    continue;
                };
                log::debug!(
                    "{level} feature {position} ({name_local}) -> parent {} via {} (score {})",
                    found.parent_id,
                    found.tier,
                    found.score
                );
                (Some(found.parent_id), Some(found.tier))
            }
        };

        let Some(centroid) = geometry.centroid() else {
            stats.record(RunEvent::InvalidGeometry {
                reason: "geometry has no centroid".to_string(),
            });
            continue;
        };

        let stored_geometry = geometry_json(feature.geometry.as_ref(), &geometry)?;
        drafts.push(ChildDraft {
            position: staged.len(),
            parent_id,
            source_code: fields::resolve(&feature.properties, &def.fields.code),
            source_id: fields::resolve(&feature.properties, &def.fields.source_id),
            geometry: stored_geometry.clone(),
            centroid,
            area: geometry.unsigned_area(),
            code: None,
        });
        staged.push(StagedFeature {
            name_foreign: fields::resolve(&feature.properties, &def.fields.name_foreign),
            geometry_json: stored_geometry,
            properties: feature.properties,
            name_local,
            tier,
        });
    }

    let existing = units::load_units(conn, level, false)?;
    let outside = units::codes_outside_level(conn, level)?;
    let empty_codes = BTreeMap::new();
    codes::assign_level(
        &mut drafts,
        &CodeContext {
            codes_outside_level: &outside,
            existing: &existing,
            parent_codes: parents.as_ref().map_or(&empty_codes, |p| &p.codes),
            root_code_prefix: def
                .root_code_prefix
                .as_deref()
                .unwrap_or(DEFAULT_ROOT_PREFIX),
        },
    );

    let rows = build_rows(level, drafts, staged, stats);

    if options.dry_run {
        for (_, tier) in &rows {
            stats.record(RunEvent::Staged { tier: *tier });
        }
        return Ok(());
    }

    progress.set_message(format!("Writing {level}"));
    write_rows(conn, level, &rows, options.batch_size, stats);

    let dangling = units::count_dangling_parents(conn, level)?;
    if dangling > 0 {
        log::error!("{level}: {dangling} active units reference a missing or inactive parent");
        return Err(IngestError::DanglingParents {
            level,
            count: dangling,
        });
    }

    Ok(())
}

fn load_parents(
    conn: &Connection,
    level: Level,
    parent_level: Level,
) -> Result<ParentSet, IngestError> {
    let parents = units::load_units(conn, parent_level, true)?;

    let mut parent_codes = BTreeMap::new();
    let mut candidates = Vec::with_capacity(parents.len());
    for parent in parents {
        let Some(text) = parent.geometry.as_deref() else {
            log::warn!("Parent {} has no geometry; skipping", parent.code);
            continue;
        };
        match parse_multipolygon(text) {
            Ok(geometry) => {
                candidates.push((parent.id, geometry));
                parent_codes.insert(parent.id, parent.code);
            }
            Err(e) => log::warn!("Parent {} has unusable geometry ({e}); skipping", parent.code),
        }
    }

    if candidates.is_empty() {
        log::error!("Cannot ingest {level}: no active {parent_level} units");
        return Err(IngestError::PrerequisiteMissing {
            level,
            parent: parent_level,
        });
    }

    log::info!("Indexed {} active {parent_level} parents", candidates.len());
    Ok(ParentSet {
        index: SpatialIndex::build(candidates),
        codes: parent_codes,
    })
}

/// Serializes the source geometry object verbatim, or the validated
/// geometry if the source is somehow absent.
fn geometry_json(
    source: Option<&serde_json::Value>,
    validated: &MultiPolygon<f64>,
) -> Result<String, IngestError> {
    match source {
        Some(value) => Ok(serde_json::to_string(value)?),
        None => {
            let value = geojson::Value::from(validated);
            Ok(serde_json::to_string(&geojson::Geometry::new(value))?)
        }
    }
}

/// Pairs each draft with its staged feature. A draft left without a code
/// cannot be written and is recorded as a write failure.
fn build_rows(
    level: Level,
    drafts: Vec<ChildDraft>,
    staged: Vec<StagedFeature>,
    stats: &mut RunStats,
) -> Vec<(NewUnit, Option<Tier>)> {
    let mut rows = Vec::with_capacity(drafts.len());

    for (draft, feature) in drafts.into_iter().zip(staged) {
        let Some(code) = draft.code else {
            log::error!(
                "{level} feature {} ({}) was not assigned a code; skipping",
                draft.position,
                feature.name_local
            );
            stats.record(RunEvent::WriteFailed { tier: feature.tier });
            continue;
        };
        let name_foreign = feature
            .name_foreign
            .unwrap_or_else(|| format!("{} {code}", level.label()));
        rows.push((
            NewUnit {
                code,
                level,
                parent_id: draft.parent_id,
                neighborhood_id: None,
                name_local: feature.name_local,
                name_foreign: Some(name_foreign),
                geometry: feature.geometry_json,
                properties: feature.properties,
                source_id: draft.source_id,
            },
            feature.tier,
        ));
    }

    rows
}

fn write_rows(
    conn: &Connection,
    level: Level,
    rows: &[(NewUnit, Option<Tier>)],
    batch_size: usize,
    stats: &mut RunStats,
) {
    let chunk_count = rows.len().div_ceil(batch_size.max(1));

    for (chunk_idx, chunk) in rows.chunks(batch_size.max(1)).enumerate() {
        let units: Vec<NewUnit> = chunk.iter().map(|(unit, _)| unit.clone()).collect();

        match units::upsert_chunk(conn, &units) {
            Ok(outcomes) => {
                for (unit, tier) in chunk {
                    if let Some(outcome) = outcomes.get(&unit.code) {
                        stats.record(RunEvent::Persisted {
                            tier: *tier,
                            outcome: *outcome,
                        });
                    }
                }
                log::info!(
                    "  {level}: batch {}/{chunk_count} written ({} rows)",
                    chunk_idx + 1,
                    chunk.len()
                );
            }
            Err(e) => {
                log::warn!(
                    "  {level}: batch {}/{chunk_count} failed, skipping {} rows: {e}",
                    chunk_idx + 1,
                    chunk.len()
                );
                stats.record(RunEvent::BatchFailed);
                for (_, tier) in chunk {
                    stats.record(RunEvent::WriteFailed { tier: *tier });
                }
            }
        }
    }
}
