#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Reconciles per-level boundary datasets into the geographic unit store.
//!
//! Levels are processed top-down. Each level's features are matched
//! against the already-persisted, active units one rung up, given stable
//! codes, and upserted by code so that re-running with the same input
//! changes nothing.

pub mod codes;
pub mod fields;
pub mod pipeline;
pub mod registry;
pub mod report;

use std::path::Path;
use std::sync::Arc;

use geo_hierarchy_database::{Connection, DbError};
use geo_hierarchy_models::{Level, LevelDefinition, PropertyBag, progress::ProgressCallback};

pub use pipeline::ingest_level;
pub use report::{RunEvent, RunStats, RunSummary, TierCounts};

/// Rows per write transaction.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Errors that abort a level (or the whole run).
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Store error.
    #[error(transparent)]
    Database(#[from] DbError),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Input or output JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The input is JSON but not a feature collection.
    #[error("Invalid feature collection: {message}")]
    InvalidCollection {
        /// What was wrong with it.
        message: String,
    },

    /// A level definition failed to parse.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// The parent level has no active units to match against.
    #[error("Cannot ingest {level}: parent level {parent} has no active units")]
    PrerequisiteMissing {
        /// Level being ingested.
        level: Level,
        /// Its empty parent level.
        parent: Level,
    },

    /// Active units reference a missing or inactive parent after writing.
    #[error("{count} active {level} units reference a missing or inactive parent")]
    DanglingParents {
        /// Level that failed the check.
        level: Level,
        /// Number of offending units.
        count: u64,
    },

    /// A level's success rate fell below its threshold.
    #[error("{level} success rate {rate:.3} is below the required {threshold:.3}")]
    LowSuccessRate {
        /// Level that fell short.
        level: Level,
        /// Achieved rate.
        rate: f64,
        /// Required rate.
        threshold: f64,
    },

    /// A level name did not match any configured level.
    #[error("Unknown level: {name}")]
    UnknownLevel {
        /// The name given.
        name: String,
    },

    /// A level pass stopped early. Carries what it had counted so far.
    #[error("{source}")]
    Halted {
        /// The level's summary at the point it stopped.
        summary: Box<RunSummary>,
        /// Why it stopped.
        source: Box<IngestError>,
    },
}

impl IngestError {
    /// The summary a halted level produced before stopping.
    #[must_use]
    pub fn summary(&self) -> Option<&RunSummary> {
        match self {
            Self::Halted { summary, .. } => Some(&**summary),
            _ => None,
        }
    }

    /// The underlying error, looking through [`IngestError::Halted`].
    #[must_use]
    pub fn cause(&self) -> &Self {
        match self {
            Self::Halted { source, .. } => source.cause(),
            other => other,
        }
    }
}

/// Tunables for a run.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Rows per write transaction.
    pub batch_size: usize,
    /// Overrides every level's `min_success_rate` when set.
    pub min_success_rate: Option<f64>,
    /// Match and assign codes without writing.
    pub dry_run: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            min_success_rate: None,
            dry_run: false,
        }
    }
}

/// One source feature, kept loose so malformed geometry is reported per
/// feature instead of failing the whole file.
#[derive(Debug, Clone, Default)]
pub struct RawFeature {
    /// The `geometry` member as found, if any.
    pub geometry: Option<serde_json::Value>,
    /// The `properties` member, in source order.
    pub properties: PropertyBag,
}

/// Parses a `GeoJSON` feature collection into raw features.
///
/// # Errors
///
/// Returns [`IngestError::Json`] if the text is not JSON, or
/// [`IngestError::InvalidCollection`] if it has no `features` array.
pub fn parse_feature_collection(text: &str) -> Result<Vec<RawFeature>, IngestError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let features = value
        .get("features")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| IngestError::InvalidCollection {
            message: "missing \"features\" array".to_string(),
        })?;

    Ok(features
        .iter()
        .map(|feature| RawFeature {
            geometry: feature.get("geometry").cloned(),
            properties: feature
                .get("properties")
                .and_then(serde_json::Value::as_object)
                .cloned()
                .unwrap_or_default(),
        })
        .collect())
}

/// Reads and parses a feature collection file.
///
/// # Errors
///
/// Returns [`IngestError`] if the file cannot be read or parsed.
pub fn read_feature_collection(path: &Path) -> Result<Vec<RawFeature>, IngestError> {
    let text = std::fs::read_to_string(path)?;
    parse_feature_collection(&text)
}

/// Resolves a CLI target (`all` or a level name) to level definitions in
/// ladder order.
///
/// # Errors
///
/// Returns [`IngestError::UnknownLevel`] if the name matches no level.
pub fn resolve_levels(target: &str) -> Result<Vec<LevelDefinition>, IngestError> {
    if target.eq_ignore_ascii_case("all") {
        return Ok(registry::all_levels());
    }

    let level: Level = target.parse().map_err(|_| IngestError::UnknownLevel {
        name: target.to_string(),
    })?;

    registry::level_definition(level)
        .map(|def| vec![def])
        .ok_or_else(|| IngestError::UnknownLevel {
            name: target.to_string(),
        })
}

/// Fails if `summary` falls below `threshold`.
///
/// # Errors
///
/// Returns [`IngestError::LowSuccessRate`].
pub fn check_success_rate(summary: &RunSummary, threshold: f64) -> Result<(), IngestError> {
    if summary.success_rate < threshold {
        log::error!(
            "{} success rate {:.3} is below {threshold:.3}; halting",
            summary.level,
            summary.success_rate
        );
        return Err(IngestError::LowSuccessRate {
            level: summary.level,
            rate: summary.success_rate,
            threshold,
        });
    }
    Ok(())
}

/// Ingests `defs` in order, reading each level's `file_name` from
/// `input_dir`.
///
/// `on_summary` sees every level's summary as soon as it is produced,
/// including the one from a level that halts. The run stops at the first
/// level that errors or falls below its threshold, so no dependent level
/// is built on incomplete data.
///
/// # Errors
///
/// Returns the first [`IngestError`] raised by a level.
pub fn run_levels<P, S>(
    conn: &Connection,
    defs: &[LevelDefinition],
    input_dir: &Path,
    options: &IngestOptions,
    progress_for: P,
    mut on_summary: S,
) -> Result<Vec<RunSummary>, IngestError>
where
    P: Fn(Level) -> Arc<dyn ProgressCallback>,
    S: FnMut(&RunSummary),
{
    let mut defs: Vec<&LevelDefinition> = defs.iter().collect();
    defs.sort_by_key(|def| def.level);

    let mut summaries = Vec::with_capacity(defs.len());

    for def in defs {
        let path = input_dir.join(&def.file_name);
        log::info!("Reading {} from {}", def.level, path.display());
        let features = read_feature_collection(&path)?;

        let progress = progress_for(def.level);
        let summary = match ingest_level(conn, def, features, options, progress.as_ref()) {
            Ok(summary) => summary,
            Err(IngestError::Halted { summary, source }) => {
                log_summary(&summary);
                on_summary(&summary);
                return Err(*source);
            }
            Err(e) => return Err(e),
        };
        log_summary(&summary);
        on_summary(&summary);

        let threshold = options.min_success_rate.unwrap_or(def.min_success_rate);
        check_success_rate(&summary, threshold)?;
        summaries.push(summary);
    }

    Ok(summaries)
}

fn log_summary(summary: &RunSummary) {
    log::info!(
        "{}: {} processed | tiers: {} intersection, {} centroid, {} nearest | \
         {} invalid geometry, {} unmatched, {} missing key | \
         {} inserted, {} updated, {} unchanged, {} write-failed ({} batches) | \
         success rate {:.3}",
        summary.level,
        summary.total_processed,
        summary.by_tier.intersection,
        summary.by_tier.centroid,
        summary.by_tier.nearest,
        summary.invalid_geometry,
        summary.unmatched,
        summary.missing_required_key,
        summary.inserted,
        summary.updated,
        summary.unchanged,
        summary.write_failed,
        summary.batch_failures,
        summary.success_rate,
    );
    for reason in &summary.invalid_reasons {
        log::info!("  invalid geometry: {reason}");
    }
}

#[cfg(test)]
mod tests {
    use geo_hierarchy_database::{open_in_memory, units};
    use geo_hierarchy_models::progress::{NullProgress, null_progress};
    use serde_json::json;

    use super::*;

    fn rect_feature(props: serde_json::Value, min: (f64, f64), max: (f64, f64)) -> RawFeature {
        RawFeature {
            geometry: Some(json!({
                "type": "Polygon",
                "coordinates": [[
                    [min.0, min.1], [max.0, min.1], [max.0, max.1], [min.0, max.1], [min.0, min.1]
                ]],
            })),
            properties: props.as_object().cloned().unwrap_or_default(),
        }
    }

    fn ingest(
        conn: &Connection,
        level: Level,
        features: Vec<RawFeature>,
    ) -> Result<RunSummary, IngestError> {
        let def = registry::level_definition(level).unwrap();
        ingest_level(conn, &def, features, &IngestOptions::default(), &NullProgress)
    }

    fn id_of(conn: &Connection, code: &str) -> i64 {
        units::find_by_code(conn, code).unwrap().unwrap().id
    }

    fn parent_of(conn: &Connection, code: &str) -> Option<i64> {
        units::find_by_code(conn, code).unwrap().unwrap().parent_id
    }

    /// One region over `0..30 x 0..10` and three adjacent districts.
    fn seed_districts(conn: &Connection) {
        ingest(
            conn,
            Level::Region,
            vec![rect_feature(
                json!({"REGION_CODE": "R1", "NAME_AR": "region"}),
                (0.0, 0.0),
                (30.0, 10.0),
            )],
        )
        .unwrap();
        ingest(
            conn,
            Level::District,
            vec![
                rect_feature(json!({"DISTRICT_CODE": "P1", "NAME_AR": "p1"}), (0.0, 0.0), (10.0, 10.0)),
                rect_feature(json!({"DISTRICT_CODE": "P2", "NAME_AR": "p2"}), (10.0, 0.0), (20.0, 10.0)),
                rect_feature(json!({"DISTRICT_CODE": "P3", "NAME_AR": "p3"}), (20.0, 0.0), (30.0, 10.0)),
            ],
        )
        .unwrap();
    }

    #[test]
    fn straddling_and_outlying_children_resolve_by_tier() {
        let conn = open_in_memory().unwrap();
        seed_districts(&conn);

        let summary = ingest(
            &conn,
            Level::SubDistrict,
            vec![
                rect_feature(json!({"SD_CODE": "A", "NAME_AR": "a"}), (4.0, 2.0), (14.0, 8.0)),
                rect_feature(json!({"SD_CODE": "B", "NAME_AR": "b"}), (32.0, 20.0), (34.0, 22.0)),
            ],
        )
        .unwrap();

        assert_eq!(parent_of(&conn, "A"), Some(id_of(&conn, "P1")));
        assert_eq!(parent_of(&conn, "B"), Some(id_of(&conn, "P3")));
        assert_eq!(summary.by_tier.intersection, 1);
        assert_eq!(summary.by_tier.nearest, 1);
        assert_eq!(summary.inserted, 2);
        assert!((summary.success_rate - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn second_identical_run_changes_nothing() {
        let conn = open_in_memory().unwrap();
        seed_districts(&conn);
        let features = || {
            vec![
                rect_feature(json!({"NAME_AR": "x"}), (1.0, 1.0), (3.0, 3.0)),
                rect_feature(json!({"NAME_AR": "y"}), (1.0, 5.0), (3.0, 7.0)),
                rect_feature(json!({"SD_CODE": "Z", "NAME_AR": "z"}), (12.0, 1.0), (14.0, 3.0)),
            ]
        };

        let first = ingest(&conn, Level::SubDistrict, features()).unwrap();
        assert_eq!(first.inserted, 3);
        let ids_before: Vec<(String, i64)> = units::load_units(&conn, Level::SubDistrict, false)
            .unwrap()
            .into_iter()
            .map(|u| (u.code, u.id))
            .collect();

        let second = ingest(&conn, Level::SubDistrict, features()).unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.updated, 0);
        assert_eq!(second.unchanged, 3);

        let ids_after: Vec<(String, i64)> = units::load_units(&conn, Level::SubDistrict, false)
            .unwrap()
            .into_iter()
            .map(|u| (u.code, u.id))
            .collect();
        assert_eq!(ids_before, ids_after);
        assert!(ids_after.iter().any(|(code, _)| code == "P1-001"));
        assert!(ids_after.iter().any(|(code, _)| code == "P1-002"));
    }

    #[test]
    fn equal_overlap_goes_to_lower_parent_id() {
        let conn = open_in_memory().unwrap();
        seed_districts(&conn);
        let lower = id_of(&conn, "P1").min(id_of(&conn, "P2"));

        for _ in 0..3 {
            ingest(
                &conn,
                Level::SubDistrict,
                vec![rect_feature(json!({"SD_CODE": "T", "NAME_AR": "t"}), (9.0, 0.0), (11.0, 2.0))],
            )
            .unwrap();
            assert_eq!(parent_of(&conn, "T"), Some(lower));
        }
    }

    #[test]
    fn geometry_edit_keeps_sibling_codes() {
        let conn = open_in_memory().unwrap();
        seed_districts(&conn);
        let run = |north_y: f64| {
            ingest(
                &conn,
                Level::SubDistrict,
                vec![
                    rect_feature(json!({"SUBDISTRICT_ID": "south", "NAME_AR": "s"}), (1.0, 1.0), (2.0, 2.0)),
                    rect_feature(
                        json!({"SUBDISTRICT_ID": "north", "NAME_AR": "n"}),
                        (4.0, north_y),
                        (5.0, north_y + 1.0),
                    ),
                    rect_feature(json!({"SUBDISTRICT_ID": "east", "NAME_AR": "e"}), (7.0, 8.0), (8.0, 9.0)),
                ],
            )
            .unwrap()
        };

        run(5.0);
        let before: Vec<(Option<String>, String)> = units::load_units(&conn, Level::SubDistrict, false)
            .unwrap()
            .into_iter()
            .map(|u| (u.source_id, u.code))
            .collect();

        // Moving "north" below "south" would renumber without source-id reuse.
        let second = run(0.0);
        assert_eq!(second.updated, 1);
        assert_eq!(second.unchanged, 2);

        let after: Vec<(Option<String>, String)> = units::load_units(&conn, Level::SubDistrict, false)
            .unwrap()
            .into_iter()
            .map(|u| (u.source_id, u.code))
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn unchanged_children_keep_codes_without_source_ids() {
        let conn = open_in_memory().unwrap();
        seed_districts(&conn);
        let run = |north_y: f64| {
            ingest(
                &conn,
                Level::SubDistrict,
                vec![
                    rect_feature(json!({"NAME_AR": "south"}), (1.0, 1.0), (2.0, 2.0)),
                    rect_feature(json!({"NAME_AR": "north"}), (4.0, north_y), (5.0, north_y + 1.0)),
                    rect_feature(json!({"NAME_AR": "east"}), (7.0, 8.0), (8.0, 9.0)),
                ],
            )
            .unwrap()
        };
        let codes_by_name = || {
            units::load_units(&conn, Level::SubDistrict, false)
                .unwrap()
                .into_iter()
                .map(|u| (u.name_local, u.code))
                .collect::<std::collections::BTreeMap<_, _>>()
        };

        run(5.0);
        let before = codes_by_name();
        assert_eq!(before["south"], "P1-001");
        assert_eq!(before["north"], "P1-002");
        assert_eq!(before["east"], "P1-003");

        let second = run(0.0);
        assert_eq!(second.inserted, 0);
        assert_eq!(second.updated, 1);
        assert_eq!(second.unchanged, 2);
        assert_eq!(codes_by_name(), before);
    }

    fn write_collection(dir: &Path, def: &LevelDefinition, features: &[RawFeature]) {
        let features: Vec<serde_json::Value> = features
            .iter()
            .map(|f| json!({"type": "Feature", "geometry": f.geometry, "properties": f.properties}))
            .collect();
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(
            dir.join(&def.file_name),
            json!({"type": "FeatureCollection", "features": features}).to_string(),
        )
        .unwrap();
    }

    #[test]
    fn halted_levels_still_report_their_summary() {
        let tmp = std::env::temp_dir().join("geo_hierarchy_halted_summary_test");
        let _ = std::fs::remove_dir_all(&tmp);
        let progress = |_| null_progress();

        // Parent level empty: a zero-count summary is still reported.
        let conn = open_in_memory().unwrap();
        let district = registry::level_definition(Level::District).unwrap();
        write_collection(
            &tmp,
            &district,
            &[rect_feature(json!({"NAME_AR": "d"}), (0.0, 0.0), (1.0, 1.0))],
        );
        let mut seen = Vec::new();
        let result = run_levels(
            &conn,
            std::slice::from_ref(&district),
            &tmp,
            &IngestOptions::default(),
            progress,
            |summary| seen.push(summary.clone()),
        );
        assert!(matches!(result, Err(IngestError::PrerequisiteMissing { .. })));
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].level, Level::District);
        assert_eq!(seen[0].total_processed, 0);

        // Dangling parent after writing: the committed batch is reported.
        let conn = open_in_memory().unwrap();
        seed_districts(&conn);
        ingest(
            &conn,
            Level::SubDistrict,
            vec![rect_feature(json!({"SD_CODE": "OLD", "NAME_AR": "old"}), (1.0, 1.0), (3.0, 3.0))],
        )
        .unwrap();
        assert!(units::set_active(&conn, "P1", false).unwrap());

        let sub_district = registry::level_definition(Level::SubDistrict).unwrap();
        write_collection(
            &tmp,
            &sub_district,
            &[rect_feature(json!({"SD_CODE": "NEW", "NAME_AR": "new"}), (12.0, 1.0), (14.0, 3.0))],
        );
        let mut seen = Vec::new();
        let result = run_levels(
            &conn,
            std::slice::from_ref(&sub_district),
            &tmp,
            &IngestOptions::default(),
            progress,
            |summary| seen.push(summary.clone()),
        );
        assert!(matches!(
            result,
            Err(IngestError::DanglingParents {
                level: Level::SubDistrict,
                count: 1,
            })
        ));
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].inserted, 1);
        assert!(units::find_by_code(&conn, "NEW").unwrap().is_some());

        std::fs::remove_dir_all(&tmp).unwrap();
    }

    #[test]
    fn empty_parent_level_halts_before_matching() {
        let conn = open_in_memory().unwrap();
        let result = ingest(
            &conn,
            Level::District,
            vec![rect_feature(json!({"NAME_AR": "d"}), (0.0, 0.0), (1.0, 1.0))],
        );
        let err = result.unwrap_err();
        assert!(matches!(
            err.cause(),
            IngestError::PrerequisiteMissing {
                level: Level::District,
                parent: Level::Region,
            }
        ));
        let summary = err.summary().unwrap();
        assert_eq!(summary.level, Level::District);
        assert_eq!(summary.total_processed, 0);
        assert!(units::load_units(&conn, Level::District, false).unwrap().is_empty());
    }

    #[test]
    fn feature_failures_are_bucketed_separately() {
        let conn = open_in_memory().unwrap();
        seed_districts(&conn);

        let mut missing_geometry = rect_feature(json!({"NAME_AR": "g"}), (0.0, 0.0), (1.0, 1.0));
        missing_geometry.geometry = None;
        let bowtie = RawFeature {
            geometry: Some(json!({
                "type": "Polygon",
                "coordinates": [[[0, 0], [4, 4], [4, 0], [0, 2], [0, 0]]],
            })),
            properties: json!({"NAME_AR": "bowtie"}).as_object().cloned().unwrap(),
        };

        let summary = ingest(
            &conn,
            Level::SubDistrict,
            vec![
                rect_feature(json!({"NAME_AR": "ok"}), (1.0, 1.0), (2.0, 2.0)),
                rect_feature(json!({"OTHER": "no name"}), (1.0, 1.0), (2.0, 2.0)),
                missing_geometry,
                bowtie,
            ],
        )
        .unwrap();

        assert_eq!(summary.total_processed, 4);
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.missing_required_key, 1);
        assert_eq!(summary.invalid_geometry, 2);
        assert_eq!(summary.unmatched, 0);
        assert!((summary.success_rate - 0.25).abs() < f64::EPSILON);
        assert_eq!(summary.invalid_reasons[0], "missing geometry");
        assert!(summary.invalid_reasons[1].starts_with("invalid topology"));

        assert!(check_success_rate(&summary, 0.9).is_err());
        assert!(check_success_rate(&summary, 0.2).is_ok());
    }

    #[test]
    fn inactive_parents_are_not_matched() {
        let conn = open_in_memory().unwrap();
        seed_districts(&conn);
        assert!(units::set_active(&conn, "P1", false).unwrap());

        ingest(
            &conn,
            Level::SubDistrict,
            vec![rect_feature(json!({"SD_CODE": "C", "NAME_AR": "c"}), (1.0, 1.0), (3.0, 3.0))],
        )
        .unwrap();

        assert_eq!(parent_of(&conn, "C"), Some(id_of(&conn, "P2")));
    }

    #[test]
    fn dry_run_writes_nothing() {
        let conn = open_in_memory().unwrap();
        seed_districts(&conn);
        let def = registry::level_definition(Level::SubDistrict).unwrap();
        let options = IngestOptions {
            dry_run: true,
            ..IngestOptions::default()
        };

        let summary = ingest_level(
            &conn,
            &def,
            vec![rect_feature(json!({"NAME_AR": "x"}), (1.0, 1.0), (2.0, 2.0))],
            &options,
            &NullProgress,
        )
        .unwrap();

        assert_eq!(summary.staged, 1);
        assert_eq!(summary.by_tier.intersection, 1);
        assert_eq!(summary.inserted, 0);
        assert!(units::load_units(&conn, Level::SubDistrict, false).unwrap().is_empty());
    }

    #[test]
    fn full_ladder_links_every_level() {
        let conn = open_in_memory().unwrap();
        for def in registry::all_levels() {
            let summary = ingest_level(
                &conn,
                &def,
                vec![rect_feature(json!({"NAME_AR": def.level.label()}), (0.0, 0.0), (10.0, 10.0))],
                &IngestOptions::default(),
                &NullProgress,
            )
            .unwrap();
            assert_eq!(summary.inserted, 1, "{}", def.level);
        }

        let sector = &units::load_units(&conn, Level::Sector, true).unwrap()[0];
        let unit = &units::load_units(&conn, Level::NeighborhoodUnit, true).unwrap()[0];
        assert_eq!(unit.parent_id, Some(sector.id));
        assert_eq!(unit.neighborhood_id, None);

        let block = &units::load_units(&conn, Level::Block, true).unwrap()[0];
        assert_eq!(block.code, format!("{}-001", unit.code));
        assert_eq!(block.name_foreign, Some(format!("Block {}", block.code)));

        let region = &units::load_units(&conn, Level::Region, true).unwrap()[0];
        assert_eq!(region.code, "RG-001");
        assert_eq!(region.parent_id, None);
    }

    #[test]
    fn parses_loose_feature_collections() {
        let features = parse_feature_collection(
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","geometry":null,"properties":{"b":1,"a":2}},
                {"type":"Feature","properties":null},
                "garbage"
            ]}"#,
        )
        .unwrap();

        assert_eq!(features.len(), 3);
        assert_eq!(features[0].geometry, Some(serde_json::Value::Null));
        let keys: Vec<&String> = features[0].properties.keys().collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert!(features[1].geometry.is_none());
        assert!(features[2].properties.is_empty());

        assert!(matches!(
            parse_feature_collection(r#"{"type":"Feature"}"#),
            Err(IngestError::InvalidCollection { .. })
        ));
    }

    #[test]
    fn resolves_cli_targets() {
        assert_eq!(resolve_levels("all").unwrap().len(), Level::ALL.len());
        let single = resolve_levels("subDistrict").unwrap();
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].level, Level::SubDistrict);
        assert!(matches!(
            resolve_levels("county"),
            Err(IngestError::UnknownLevel { .. })
        ));
    }
}
