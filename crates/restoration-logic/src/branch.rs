//! Branch catalog — the narrative timelines a player restores.
//!
//! Each branch belongs to one value dimension, caps the VRI it can hold at
//! `maxVRI`, and is gated behind an unlock threshold on the player's total
//! VRI (unless it is statically unlocked). The catalog is reference data:
//! loaded once, validated once, never mutated.

use std::{collections::HashMap, fs, path::Path, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::catalog::BUILTIN_BRANCHES;
use crate::error::{CatalogError, EntityKind};

// ============================================================================
// VALUE DIMENSIONS
// ============================================================================

/// The three values VRI is partitioned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueDimension {
    Trust,
    Empathy,
    Love,
}

impl ValueDimension {
    pub fn all() -> &'static [ValueDimension] {
        &[Self::Trust, Self::Empathy, Self::Love]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trust => "trust",
            Self::Empathy => "empathy",
            Self::Love => "love",
        }
    }
}

/// Difficulty tier shared by branches and missions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Normal,
    Hard,
    Extreme,
}

// ============================================================================
// BRANCH
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub year: u16,
    pub value_dimension: ValueDimension,
    pub difficulty: Difficulty,
    #[serde(rename = "maxVRI")]
    pub max_vri: u32,
    #[serde(default)]
    pub unlock_threshold: Option<u32>,
    #[serde(default)]
    pub is_statically_unlocked: bool,
}

impl Branch {
    /// Whether a player holding `total_vri` may enter this branch.
    ///
    /// A branch with neither a static unlock nor a threshold is never open.
    pub fn is_unlocked_at(&self, total_vri: u32) -> bool {
        self.is_statically_unlocked
            || self
                .unlock_threshold
                .is_some_and(|threshold| total_vri >= threshold)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct BranchCatalogData {
    branches: Vec<Branch>,
}

// ============================================================================
// CATALOG
// ============================================================================

#[derive(Debug, Clone)]
pub struct BranchCatalog {
    branches: Vec<Branch>,
    index: HashMap<String, usize>,
}

impl BranchCatalog {
    /// Catalog built from the embedded `data/branches.json`.
    pub fn builtin() -> Arc<Self> {
        Self::from_json_str(BUILTIN_BRANCHES)
            .map(Arc::new)
            .expect("builtin branch catalog should parse")
    }

    pub fn from_json_str(input: &str) -> Result<Self, CatalogError> {
        let data: BranchCatalogData = serde_json::from_str(input)?;
        Self::new(data.branches)
    }

    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let contents = fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    /// Validate and index a list of branches. Order is preserved and
    /// Σ maxVRI must fit in a `u32`.
    pub fn new(branches: Vec<Branch>) -> Result<Self, CatalogError> {
        if branches.is_empty() {
            return Err(CatalogError::Empty("branches"));
        }
        let mut index = HashMap::with_capacity(branches.len());
        let mut total: u32 = 0;
        for (idx, branch) in branches.iter().enumerate() {
            if branch.max_vri == 0 {
                return Err(CatalogError::InvalidMaxVri(branch.id.clone()));
            }
            total = total
                .checked_add(branch.max_vri)
                .ok_or(CatalogError::VriOverflow("branches"))?;
            if index.insert(branch.id.clone(), idx).is_some() {
                return Err(CatalogError::DuplicateId {
                    kind: EntityKind::Branch,
                    id: branch.id.clone(),
                });
            }
        }
        Ok(Self { branches, index })
    }

    pub fn list_all(&self) -> &[Branch] {
        &self.branches
    }

    pub fn list_unlocked(&self, total_vri: u32) -> Vec<&Branch> {
        self.branches
            .iter()
            .filter(|b| b.is_unlocked_at(total_vri))
            .collect()
    }

    pub fn by_id(&self, id: &str) -> Option<&Branch> {
        self.index.get(id).and_then(|idx| self.branches.get(*idx))
    }

    /// The locked branch closest to opening: smallest threshold above
    /// `total_vri`, first in catalog order on ties.
    pub fn next_locked(&self, total_vri: u32) -> Option<&Branch> {
        self.branches
            .iter()
            .filter(|b| !b.is_unlocked_at(total_vri))
            .filter_map(|b| match b.unlock_threshold {
                Some(threshold) if threshold > total_vri => Some((threshold, b)),
                _ => None,
            })
            .min_by_key(|(threshold, _)| *threshold)
            .map(|(_, b)| b)
    }

    pub fn dimension_of(&self, id: &str) -> Option<ValueDimension> {
        self.by_id(id).map(|b| b.value_dimension)
    }

    /// Σ maxVRI over the whole catalog.
    pub fn total_max_vri(&self) -> u32 {
        self.branches.iter().map(|b| b.max_vri).sum()
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn branch(id: &str, threshold: Option<u32>, is_static: bool) -> Branch {
        Branch {
            id: id.into(),
            title: String::new(),
            year: 2020,
            value_dimension: ValueDimension::Trust,
            difficulty: Difficulty::Normal,
            max_vri: 100,
            unlock_threshold: threshold,
            is_statically_unlocked: is_static,
        }
    }

    fn gated_catalog() -> BranchCatalog {
        BranchCatalog::new(vec![
            branch("open", None, true),
            branch("b-500", Some(500), false),
            branch("b-200", Some(200), false),
            branch("b-200-late", Some(200), false),
            branch("sealed", None, false),
        ])
        .unwrap()
    }

    #[test]
    fn test_builtin_catalog_loads() {
        let catalog = BranchCatalog::builtin();
        assert!(!catalog.is_empty());
        assert!(catalog.by_id("trust-2017").is_some());
        assert!(catalog.list_all().iter().all(|b| b.max_vri > 0));
    }

    #[test]
    fn test_list_all_keeps_order() {
        let catalog = gated_catalog();
        let ids: Vec<_> = catalog.list_all().iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, ["open", "b-500", "b-200", "b-200-late", "sealed"]);
    }

    #[test]
    fn test_list_unlocked_by_threshold() {
        let catalog = gated_catalog();
        let ids = |total| {
            catalog
                .list_unlocked(total)
                .iter()
                .map(|b| b.id.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(0), ["open"]);
        assert_eq!(ids(199), ["open"]);
        assert_eq!(ids(200), ["open", "b-200", "b-200-late"]);
        assert_eq!(ids(10_000), ["open", "b-500", "b-200", "b-200-late"]);
    }

    #[test]
    fn test_next_locked_smallest_threshold_first_on_tie() {
        let catalog = gated_catalog();
        assert_eq!(catalog.next_locked(0).unwrap().id, "b-200");
        assert_eq!(catalog.next_locked(200).unwrap().id, "b-500");
        assert!(catalog.next_locked(500).is_none());
    }

    #[test]
    fn test_by_id_missing_is_none() {
        assert!(gated_catalog().by_id("missing").is_none());
    }

    #[test]
    fn test_rejects_zero_max_vri() {
        let mut bad = branch("zero", None, true);
        bad.max_vri = 0;
        let err = BranchCatalog::new(vec![bad]).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidMaxVri(id) if id == "zero"));
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let err = BranchCatalog::new(vec![branch("a", None, true), branch("a", None, true)])
            .unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateId { .. }));
    }

    #[test]
    fn test_rejects_max_vri_total_past_u32() {
        let mut a = branch("a", None, true);
        let mut b = branch("b", Some(10), false);
        a.max_vri = 3_000_000_000;
        b.max_vri = 3_000_000_000;
        let err = BranchCatalog::new(vec![a.clone(), b]).unwrap_err();
        assert!(matches!(err, CatalogError::VriOverflow("branches")));

        // A single huge branch still fits.
        let catalog = BranchCatalog::new(vec![a]).unwrap();
        assert_eq!(catalog.total_max_vri(), 3_000_000_000);
    }

    #[test]
    fn test_rejects_empty() {
        assert!(matches!(
            BranchCatalog::new(Vec::new()),
            Err(CatalogError::Empty(_))
        ));
    }

    #[test]
    fn test_parses_wire_names() {
        let json = r#"{"branches":[{"id":"x","year":2017,"valueDimension":"empathy",
            "difficulty":"hard","maxVRI":300,"unlockThreshold":50}]}"#;
        let catalog = BranchCatalog::from_json_str(json).unwrap();
        let b = catalog.by_id("x").unwrap();
        assert_eq!(b.value_dimension, ValueDimension::Empathy);
        assert_eq!(b.max_vri, 300);
        assert_eq!(b.unlock_threshold, Some(50));
        assert!(!b.is_statically_unlocked);
        assert_eq!(catalog.dimension_of("x"), Some(ValueDimension::Empathy));
    }
}
