//! Deterministic code assignment.
//!
//! Children that carry a usable source code keep it. A child that was
//! stored before, recognized by its source id or by an identical
//! geometry under the same parent, keeps its stored code. The rest get
//! `{parent code}-{sequence:03}` numbered per parent in a fixed sort
//! order, so an unchanged dataset always produces the same codes.
//!
//! Sort key, applied both to decide which child claims a contested
//! source code and to number children per parent:
//!
//! 1. numeric source id ascending (children without one sort last)
//! 2. centroid latitude ascending
//! 3. centroid longitude ascending
//! 4. area descending
//! 5. input position

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use geo::Point;
use geo_hierarchy_models::GeographicUnit;

/// A matched child waiting for its final code.
#[derive(Debug, Clone)]
pub struct ChildDraft {
    /// Position in the input dataset.
    pub position: usize,
    /// Owning parent, `None` for the top level.
    pub parent_id: Option<i64>,
    /// Code read from the source properties, if any.
    pub source_code: Option<String>,
    /// Source-side identifier, if any.
    pub source_id: Option<String>,
    /// Serialized source geometry, as it would be stored.
    pub geometry: String,
    pub centroid: Point<f64>,
    pub area: f64,
    /// Final code once assigned.
    pub code: Option<String>,
}

impl ChildDraft {
    fn numeric_source_id(&self) -> Option<i64> {
        self.source_id.as_deref().and_then(|id| id.trim().parse().ok())
    }
}

/// Total order used for claiming and numbering.
fn sort_key(a: &ChildDraft, b: &ChildDraft) -> Ordering {
    let by_source_id = match (a.numeric_source_id(), b.numeric_source_id()) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };

    by_source_id
        .then_with(|| a.centroid.y().total_cmp(&b.centroid.y()))
        .then_with(|| a.centroid.x().total_cmp(&b.centroid.x()))
        .then_with(|| b.area.total_cmp(&a.area))
        .then_with(|| a.position.cmp(&b.position))
}

/// Store state the assigner must respect.
pub struct CodeContext<'a> {
    /// Codes stored for units of any other level.
    pub codes_outside_level: &'a BTreeSet<String>,
    /// Units already stored at this level (active or not).
    pub existing: &'a [GeographicUnit],
    /// Code of each candidate parent, by id.
    pub parent_codes: &'a BTreeMap<i64, String>,
    /// Prefix for children without a parent.
    pub root_code_prefix: &'a str,
}

/// Assigns a code to every draft in a level.
///
/// Source codes are claimed first-come in sort order. Drafts left
/// without one reuse the stored code of a same-level unit under the same
/// parent with the same source id or, failing that, the same stored
/// geometry. The remainder are numbered per parent via [`assign`].
pub fn assign_level(drafts: &mut [ChildDraft], ctx: &CodeContext<'_>) {
    let mut order: Vec<usize> = (0..drafts.len()).collect();
    order.sort_by(|&a, &b| sort_key(&drafts[a], &drafts[b]));

    let mut taken: BTreeSet<String> = ctx.codes_outside_level.clone();

    for &i in &order {
        let draft = &mut drafts[i];
        let Some(code) = draft.source_code.as_deref().map(str::trim) else {
            continue;
        };
        if code.is_empty() || taken.contains(code) {
            if !code.is_empty() {
                log::debug!(
                    "Source code {code} at position {} is already taken; synthesizing",
                    draft.position
                );
            }
            continue;
        }
        taken.insert(code.to_string());
        draft.code = Some(code.to_string());
    }

    let by_source_id: BTreeMap<(&str, Option<i64>), &str> = ctx
        .existing
        .iter()
        .filter_map(|unit| {
            unit.source_id
                .as_deref()
                .map(|sid| ((sid, unit.parent_id), unit.code.as_str()))
        })
        .collect();
    let by_geometry: BTreeMap<(&str, Option<i64>), &str> = ctx
        .existing
        .iter()
        .filter_map(|unit| {
            unit.geometry
                .as_deref()
                .map(|geometry| ((geometry, unit.parent_id), unit.code.as_str()))
        })
        .collect();

    for &i in &order {
        let draft = &mut drafts[i];
        if draft.code.is_some() {
            continue;
        }
        let stored = draft
            .source_id
            .as_deref()
            .and_then(|sid| by_source_id.get(&(sid, draft.parent_id)))
            .or_else(|| by_geometry.get(&(draft.geometry.as_str(), draft.parent_id)));
        if let Some(&code) = stored
            && !taken.contains(code)
        {
            taken.insert(code.to_string());
            draft.code = Some(code.to_string());
        }
    }

    let slots: BTreeMap<usize, usize> = drafts
        .iter()
        .enumerate()
        .map(|(i, d)| (d.position, i))
        .collect();
    let mut by_parent: BTreeMap<Option<i64>, Vec<ChildDraft>> = BTreeMap::new();
    for draft in drafts.iter().filter(|d| d.code.is_none()) {
        by_parent.entry(draft.parent_id).or_default().push(draft.clone());
    }

    for (parent_id, mut children) in by_parent {
        let prefix = parent_id
            .and_then(|id| ctx.parent_codes.get(&id).map(String::as_str))
            .unwrap_or(ctx.root_code_prefix);
        assign(prefix, &mut children, &mut taken);
        for child in children {
            if let Some(&slot) = slots.get(&child.position) {
                drafts[slot].code = child.code;
            }
        }
    }
}

/// Numbers the children of one parent that still lack a code.
///
/// Children are sorted by the fixed key and given
/// `{parent_code}-{sequence:03}`, skipping any sequence whose code is in
/// `taken`. Every assigned code is added to `taken`.
pub fn assign(parent_code: &str, children: &mut [ChildDraft], taken: &mut BTreeSet<String>) {
    children.sort_by(sort_key);

    let mut sequence = 1u32;
    for child in children.iter_mut().filter(|c| c.code.is_none()) {
        let code = loop {
            let candidate = format!("{parent_code}-{sequence:03}");
            sequence += 1;
            if !taken.contains(&candidate) {
                break candidate;
            }
        };
        taken.insert(code.clone());
        child.code = Some(code);
    }
}
