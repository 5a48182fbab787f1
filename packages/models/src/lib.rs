#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geographic hierarchy types.
//!
//! Defines the fixed six-rung administrative ladder, the matching tiers,
//! the persisted [`GeographicUnit`] row and its write-side counterpart
//! [`NewUnit`], and the TOML schema that describes how each level's
//! source dataset is keyed.

pub mod progress;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Opaque, order-preserving attribute bag copied verbatim from a source
/// feature.
pub type PropertyBag = serde_json::Map<String, serde_json::Value>;

/// One rung of the administrative/planning ladder.
///
/// Variants are declared top-down, so the derived [`Ord`] is the
/// dependency order levels must be processed in.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    AsRefStr,
    Display,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase", ascii_case_insensitive)]
pub enum Level {
    /// Top of the ladder. Has no parent.
    Region,
    /// Child of [`Level::Region`].
    District,
    /// Child of [`Level::District`].
    SubDistrict,
    /// Child of [`Level::SubDistrict`].
    Sector,
    /// Child of [`Level::Sector`] (or of a neighborhood-line ancestor).
    NeighborhoodUnit,
    /// Child of [`Level::NeighborhoodUnit`].
    Block,
}

impl Level {
    /// All levels in dependency order.
    pub const ALL: [Self; 6] = [
        Self::Region,
        Self::District,
        Self::SubDistrict,
        Self::Sector,
        Self::NeighborhoodUnit,
        Self::Block,
    ];

    /// The level one rung up, or `None` for [`Level::Region`].
    #[must_use]
    pub const fn parent(self) -> Option<Self> {
        match self {
            Self::Region => None,
            Self::District => Some(Self::Region),
            Self::SubDistrict => Some(Self::District),
            Self::Sector => Some(Self::SubDistrict),
            Self::NeighborhoodUnit => Some(Self::Sector),
            Self::Block => Some(Self::NeighborhoodUnit),
        }
    }

    /// Human-readable label, also used for synthesized foreign names.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Region => "Region",
            Self::District => "District",
            Self::SubDistrict => "Sub-district",
            Self::Sector => "Sector",
            Self::NeighborhoodUnit => "Neighborhood unit",
            Self::Block => "Block",
        }
    }

    /// Whether this level is the top of the ladder.
    #[must_use]
    pub const fn is_root(self) -> bool {
        matches!(self, Self::Region)
    }
}

/// The matching strategy that resolved a child's parent.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum Tier {
    /// Largest exact intersection area.
    Intersection,
    /// Parent containing the child's centroid.
    Centroid,
    /// Parent geometry closest to the child's centroid.
    Nearest,
}

impl Tier {
    /// All tiers in the order they are attempted.
    pub const ALL: [Self; 3] = [Self::Intersection, Self::Centroid, Self::Nearest];
}

/// A geographic unit as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeographicUnit {
    /// Opaque identifier assigned on first insert. Never changes.
    pub id: i64,
    /// Natural key, unique across the whole store.
    pub code: String,
    /// Ladder rung.
    pub level: Level,
    /// Owning unit one level up (sector line for neighborhood units).
    pub parent_id: Option<i64>,
    /// Neighborhood-line owner. Only ever set on neighborhood units.
    pub neighborhood_id: Option<i64>,
    /// Local display name.
    pub name_local: String,
    /// Foreign display name.
    pub name_foreign: Option<String>,
    /// Boundary as a `GeoJSON` geometry string.
    pub geometry: Option<String>,
    /// Source attribute bag, passed through untouched.
    pub properties: PropertyBag,
    /// Stable source-side identifier, if the dataset carries one.
    pub source_id: Option<String>,
    /// Soft-delete flag. Inactive units are never matched against.
    pub is_active: bool,
    /// First insert time.
    pub created_at: Option<DateTime<Utc>>,
    /// Last change time.
    pub updated_at: Option<DateTime<Utc>>,
}

/// A unit ready to be written. The store assigns `id` and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUnit {
    /// Natural key and upsert conflict key.
    pub code: String,
    /// Ladder rung.
    pub level: Level,
    /// Owning unit one level up.
    pub parent_id: Option<i64>,
    /// Neighborhood-line owner (neighborhood units only).
    pub neighborhood_id: Option<i64>,
    /// Local display name.
    pub name_local: String,
    /// Foreign display name.
    pub name_foreign: Option<String>,
    /// Boundary as a `GeoJSON` geometry string.
    pub geometry: String,
    /// Source attribute bag.
    pub properties: PropertyBag,
    /// Stable source-side identifier.
    pub source_id: Option<String>,
}

/// What an upsert did to a single row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum UpsertOutcome {
    /// No row with the code existed.
    Inserted,
    /// A row existed and at least one mutable field changed.
    Updated,
    /// A row existed with identical content; nothing was written.
    Unchanged,
}

/// Describes how one level's source dataset is keyed, deserialized from
/// TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelDefinition {
    /// The ladder rung this definition configures.
    pub level: Level,
    /// Default input file name inside the input directory.
    pub file_name: String,
    /// Ordered property-name candidates for each logical field.
    pub fields: FieldCandidates,
    /// A level whose success rate falls below this halts the run.
    #[serde(default = "default_min_success_rate")]
    pub min_success_rate: f64,
    /// Prefix for synthesized codes on parentless units.
    pub root_code_prefix: Option<String>,
}

/// Ordered fallback property names per logical field. The first key
/// present with a non-empty value wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldCandidates {
    /// Natural code candidates.
    #[serde(default)]
    pub code: Vec<String>,
    /// Local name candidates. Required field.
    pub name_local: Vec<String>,
    /// Foreign name candidates.
    #[serde(default)]
    pub name_foreign: Vec<String>,
    /// Source identifier candidates (numeric ids sort first).
    #[serde(default)]
    pub source_id: Vec<String>,
}

const fn default_min_success_rate() -> f64 {
    0.9
}
