//! Per-level run accounting.
//!
//! A [`RunStats`] value is created for each level pass and every feature
//! records exactly one terminal [`RunEvent`] into it. Nothing here is
//! global; callers own the value and read it back through
//! [`RunStats::summary`].

use geo_hierarchy_models::{Level, Tier, UpsertOutcome};
use serde::{Deserialize, Serialize};

/// Maximum number of invalid-geometry reasons kept for the summary.
const MAX_REASON_SAMPLES: usize = 10;

/// Terminal state of one feature.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// No fallback candidate produced a required field.
    MissingRequiredKey,
    /// The geometry validator rejected the feature.
    InvalidGeometry {
        /// Validator reason.
        reason: String,
    },
    /// Every matching tier was exhausted.
    Unmatched,
    /// Matched and staged, but not written (dry run).
    Staged {
        /// Resolving tier, `None` for parentless levels.
        tier: Option<Tier>,
    },
    /// Written (or confirmed unchanged) in the store.
    Persisted {
        /// Resolving tier, `None` for parentless levels.
        tier: Option<Tier>,
        /// What the upsert did.
        outcome: UpsertOutcome,
    },
    /// Matched, but not written: its batch failed, or it was left
    /// without a code.
    WriteFailed {
        /// Resolving tier, `None` for parentless levels.
        tier: Option<Tier>,
    },
    /// A whole batch was rolled back. Recorded once per batch, in
    /// addition to a [`RunEvent::WriteFailed`] per row.
    BatchFailed,
}

/// Matched-feature counts per tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierCounts {
    pub intersection: u64,
    pub centroid: u64,
    pub nearest: u64,
}

impl TierCounts {
    const fn bump(&mut self, tier: Tier) {
        match tier {
            Tier::Intersection => self.intersection += 1,
            Tier::Centroid => self.centroid += 1,
            Tier::Nearest => self.nearest += 1,
        }
    }
}

/// Structured per-level summary, always emitted regardless of outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub level: Level,
    pub by_tier: TierCounts,
    pub invalid_geometry: u64,
    pub unmatched: u64,
    pub missing_required_key: u64,
    pub staged: u64,
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub write_failed: u64,
    pub batch_failures: u64,
    pub total_processed: u64,
    /// Share of processed features that cleared key resolution,
    /// validation and matching. `1.0` for an empty level.
    pub success_rate: f64,
    /// First few invalid-geometry reasons, in input order.
    pub invalid_reasons: Vec<String>,
}

impl RunSummary {
    /// Number of features that reached a terminal failure before writing.
    #[must_use]
    pub const fn feature_failures(&self) -> u64 {
        self.invalid_geometry + self.unmatched + self.missing_required_key
    }
}

/// Accumulates [`RunEvent`]s for one level pass.
#[derive(Debug, Clone)]
pub struct RunStats {
    level: Level,
    by_tier: TierCounts,
    invalid_geometry: u64,
    unmatched: u64,
    missing_required_key: u64,
    staged: u64,
    inserted: u64,
    updated: u64,
    unchanged: u64,
    write_failed: u64,
    batch_failures: u64,
    total_processed: u64,
    invalid_reasons: Vec<String>,
}

impl RunStats {
    #[must_use]
    pub const fn new(level: Level) -> Self {
        Self {
            level,
            by_tier: TierCounts {
                intersection: 0,
                centroid: 0,
                nearest: 0,
            },
            invalid_geometry: 0,
            unmatched: 0,
            missing_required_key: 0,
            staged: 0,
            inserted: 0,
            updated: 0,
            unchanged: 0,
            write_failed: 0,
            batch_failures: 0,
            total_processed: 0,
            invalid_reasons: Vec::new(),
        }
    }

    /// Records one event. Every event except [`RunEvent::BatchFailed`]
    /// counts as one processed feature.
    pub fn record(&mut self, event: RunEvent) {
        if event != RunEvent::BatchFailed {
            self.total_processed += 1;
        }

        match event {
            RunEvent::MissingRequiredKey => self.missing_required_key += 1,
            RunEvent::InvalidGeometry { reason } => {
                self.invalid_geometry += 1;
                if self.invalid_reasons.len() < MAX_REASON_SAMPLES {
                    self.invalid_reasons.push(reason);
                }
            }
            RunEvent::Unmatched => self.unmatched += 1,
            RunEvent::Staged { tier } => {
                self.staged += 1;
                self.bump_tier(tier);
            }
            RunEvent::Persisted { tier, outcome } => {
                match outcome {
                    UpsertOutcome::Inserted => self.inserted += 1,
                    UpsertOutcome::Updated => self.updated += 1,
                    UpsertOutcome::Unchanged => self.unchanged += 1,
                }
                self.bump_tier(tier);
            }
            RunEvent::WriteFailed { tier } => {
                self.write_failed += 1;
                self.bump_tier(tier);
            }
            RunEvent::BatchFailed => self.batch_failures += 1,
        }
    }

    fn bump_tier(&mut self, tier: Option<Tier>) {
        if let Some(tier) = tier {
            self.by_tier.bump(tier);
        }
    }

    /// Snapshot of the counters with the derived success rate.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn summary(&self) -> RunSummary {
        let failures = self.invalid_geometry + self.unmatched + self.missing_required_key;
        let success_rate = if self.total_processed == 0 {
            1.0
        } else {
            (self.total_processed - failures) as f64 / self.total_processed as f64
        };

        RunSummary {
            level: self.level,
            by_tier: self.by_tier,
            invalid_geometry: self.invalid_geometry,
            unmatched: self.unmatched,
            missing_required_key: self.missing_required_key,
            staged: self.staged,
            inserted: self.inserted,
            updated: self.updated,
            unchanged: self.unchanged,
            write_failed: self.write_failed,
            batch_failures: self.batch_failures,
            total_processed: self.total_processed,
            success_rate,
            invalid_reasons: self.invalid_reasons.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_level_has_full_success() {
        let summary = RunStats::new(Level::Block).summary();
        assert_eq!(summary.total_processed, 0);
        assert!((summary.success_rate - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn success_rate_excludes_feature_failures() {
        let mut stats = RunStats::new(Level::District);
        stats.record(RunEvent::Persisted {
            tier: Some(Tier::Intersection),
            outcome: UpsertOutcome::Inserted,
        });
        stats.record(RunEvent::Persisted {
            tier: Some(Tier::Nearest),
            outcome: UpsertOutcome::Unchanged,
        });
        stats.record(RunEvent::InvalidGeometry {
            reason: "zero-area geometry".to_string(),
        });
        stats.record(RunEvent::Unmatched);

        let summary = stats.summary();
        assert_eq!(summary.total_processed, 4);
        assert_eq!(summary.by_tier.intersection, 1);
        assert_eq!(summary.by_tier.nearest, 1);
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.unchanged, 1);
        assert_eq!(summary.feature_failures(), 2);
        assert!((summary.success_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(summary.invalid_reasons, vec!["zero-area geometry"]);
    }

    #[test]
    fn batch_failure_is_not_a_feature() {
        let mut stats = RunStats::new(Level::Sector);
        stats.record(RunEvent::BatchFailed);
        stats.record(RunEvent::WriteFailed {
            tier: Some(Tier::Centroid),
        });

        let summary = stats.summary();
        assert_eq!(summary.total_processed, 1);
        assert_eq!(summary.batch_failures, 1);
        assert_eq!(summary.write_failed, 1);
        assert_eq!(summary.by_tier.centroid, 1);
    }

    #[test]
    fn reason_samples_are_capped() {
        let mut stats = RunStats::new(Level::Block);
        for i in 0..25 {
            stats.record(RunEvent::InvalidGeometry {
                reason: format!("reason {i}"),
            });
        }
        let summary = stats.summary();
        assert_eq!(summary.invalid_geometry, 25);
        assert_eq!(summary.invalid_reasons.len(), MAX_REASON_SAMPLES);
        assert_eq!(summary.invalid_reasons[0], "reason 0");
    }

    #[test]
    fn summary_serializes_camel_case() {
        let json = serde_json::to_value(RunStats::new(Level::SubDistrict).summary()).unwrap();
        assert_eq!(json["level"], "subDistrict");
        assert!(json.get("byTier").is_some());
        assert!(json.get("successRate").is_some());
        assert!(json.get("missingRequiredKey").is_some());
    }
}
