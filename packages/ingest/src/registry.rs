//! Compile-time registry of level definitions.
//!
//! Each entry is a `(name, toml_content)` pair embedded via `include_str!`.
//! Changing how a level's dataset is keyed means editing its TOML file in
//! `levels/`, never the pipeline.

use geo_hierarchy_models::{Level, LevelDefinition};

use crate::IngestError;

/// Embedded TOML level definitions, in ladder order.
const LEVEL_TOMLS: &[(&str, &str)] = &[
    ("region", include_str!("../levels/region.toml")),
    ("district", include_str!("../levels/district.toml")),
    ("sub_district", include_str!("../levels/sub_district.toml")),
    ("sector", include_str!("../levels/sector.toml")),
    (
        "neighborhood_unit",
        include_str!("../levels/neighborhood_unit.toml"),
    ),
    ("block", include_str!("../levels/block.toml")),
];

/// Returns every registered level definition, sorted into ladder order.
///
/// # Panics
///
/// Panics if any embedded TOML file fails to parse. Since these are
/// compile-time constants, parse failures indicate a development error
/// and are caught by the tests below.
#[must_use]
pub fn all_levels() -> Vec<LevelDefinition> {
    let mut levels: Vec<LevelDefinition> = LEVEL_TOMLS
        .iter()
        .map(|(name, toml_str)| {
            parse_level_definition(toml_str)
                .unwrap_or_else(|e| panic!("Failed to parse level definition '{name}': {e}"))
        })
        .collect();
    levels.sort_by_key(|def| def.level);
    levels
}

/// Returns the registered definition for `level`.
#[must_use]
pub fn level_definition(level: Level) -> Option<LevelDefinition> {
    all_levels().into_iter().find(|def| def.level == level)
}

/// Parses a level definition, e.g. an operator-supplied override file.
///
/// # Errors
///
/// Returns [`IngestError::Toml`] if the text is not a valid definition.
pub fn parse_level_definition(toml_str: &str) -> Result<LevelDefinition, IngestError> {
    Ok(toml::de::from_str(toml_str)?)
}
