//! Mission catalog — the completable units of work inside each branch.
//!
//! A mission grants a fixed VRI reward to its branch and may carry a
//! hope-shard template describing the reward artifact minted on completion.

use std::{collections::HashMap, fs, path::Path, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::branch::{BranchCatalog, Difficulty, ValueDimension};
use crate::catalog::BUILTIN_MISSIONS;
use crate::error::{CatalogError, EntityKind};

/// Hope-shard rarity tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Rarity {
    #[serde(rename = "N")]
    Normal,
    #[serde(rename = "R")]
    Rare,
    #[serde(rename = "SR")]
    SuperRare,
    #[serde(rename = "SSR")]
    SuperSuperRare,
}

impl Rarity {
    pub fn all() -> &'static [Rarity] {
        &[
            Self::Normal,
            Self::Rare,
            Self::SuperRare,
            Self::SuperSuperRare,
        ]
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Normal => "N",
            Self::Rare => "R",
            Self::SuperRare => "SR",
            Self::SuperSuperRare => "SSR",
        }
    }
}

/// Fields copied onto every shard minted from a mission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HopeShardTemplate {
    pub branch_year: u16,
    pub value_dimension: ValueDimension,
    pub vri_value: u32,
    pub rarity: Rarity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mission {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub branch_id: String,
    pub value_dimension: ValueDimension,
    pub vri_reward: u32,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub hope_shard_template: Option<HopeShardTemplate>,
}

#[derive(Debug, Clone, Deserialize)]
struct MissionCatalogData {
    missions: Vec<Mission>,
}

#[derive(Debug, Clone)]
pub struct MissionCatalog {
    missions: Vec<Mission>,
    index: HashMap<String, usize>,
    by_branch: HashMap<String, Vec<usize>>,
}

impl MissionCatalog {
    /// Catalog built from the embedded `data/missions.json`, validated
    /// against `branches`.
    pub fn builtin(branches: &BranchCatalog) -> Arc<Self> {
        Self::from_json_str(BUILTIN_MISSIONS, branches)
            .map(Arc::new)
            .expect("builtin mission catalog should parse")
    }

    pub fn from_json_str(input: &str, branches: &BranchCatalog) -> Result<Self, CatalogError> {
        let data: MissionCatalogData = serde_json::from_str(input)?;
        Self::new(data.missions, branches)
    }

    pub fn from_file(path: &Path, branches: &BranchCatalog) -> Result<Self, CatalogError> {
        let contents = fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents, branches)
    }

    /// Validate missions against the branch catalog and index them.
    ///
    /// Every mission must reference a known branch, grant a positive reward
    /// and agree with its branch on dimension (and year, for templates). The
    /// rewards of the whole catalog must sum within `u32`.
    pub fn new(missions: Vec<Mission>, branches: &BranchCatalog) -> Result<Self, CatalogError> {
        if missions.is_empty() {
            return Err(CatalogError::Empty("missions"));
        }
        let mut index = HashMap::with_capacity(missions.len());
        let mut by_branch: HashMap<String, Vec<usize>> = HashMap::new();
        let mut total: u32 = 0;

        for (idx, mission) in missions.iter().enumerate() {
            let branch =
                branches
                    .by_id(&mission.branch_id)
                    .ok_or_else(|| CatalogError::UnknownBranch {
                        mission_id: mission.id.clone(),
                        branch_id: mission.branch_id.clone(),
                    })?;
            if mission.vri_reward == 0 {
                return Err(CatalogError::InvalidReward(mission.id.clone()));
            }
            total = total
                .checked_add(mission.vri_reward)
                .ok_or(CatalogError::VriOverflow("missions"))?;
            if mission.value_dimension != branch.value_dimension {
                return Err(CatalogError::TemplateMismatch {
                    mission_id: mission.id.clone(),
                    detail: format!(
                        "mission dimension {} vs branch dimension {}",
                        mission.value_dimension.as_str(),
                        branch.value_dimension.as_str()
                    ),
                });
            }
            if let Some(template) = &mission.hope_shard_template {
                if template.value_dimension != branch.value_dimension
                    || template.branch_year != branch.year
                {
                    return Err(CatalogError::TemplateMismatch {
                        mission_id: mission.id.clone(),
                        detail: format!(
                            "shard template {}/{} vs branch {}/{}",
                            template.value_dimension.as_str(),
                            template.branch_year,
                            branch.value_dimension.as_str(),
                            branch.year
                        ),
                    });
                }
            }
            if index.insert(mission.id.clone(), idx).is_some() {
                return Err(CatalogError::DuplicateId {
                    kind: EntityKind::Mission,
                    id: mission.id.clone(),
                });
            }
            by_branch
                .entry(mission.branch_id.clone())
                .or_default()
                .push(idx);
        }

        Ok(Self {
            missions,
            index,
            by_branch,
        })
    }

    pub fn list_all(&self) -> &[Mission] {
        &self.missions
    }

    /// Missions of one branch in catalog order; empty for unknown branches.
    pub fn by_branch(&self, branch_id: &str) -> Vec<&Mission> {
        self.by_branch
            .get(branch_id)
            .map(|idxs| idxs.iter().filter_map(|i| self.missions.get(*i)).collect())
            .unwrap_or_default()
    }

    pub fn by_id(&self, id: &str) -> Option<&Mission> {
        self.index.get(id).and_then(|idx| self.missions.get(*idx))
    }

    /// Sum of all rewards in a branch. Used for data sanity checks.
    pub fn total_possible_vri(&self, branch_id: &str) -> u32 {
        self.by_branch(branch_id).iter().map(|m| m.vri_reward).sum()
    }

    pub fn len(&self) -> usize {
        self.missions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.missions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::Branch;

    fn branches() -> BranchCatalog {
        BranchCatalog::new(vec![Branch {
            id: "trust-2017".into(),
            title: String::new(),
            year: 2017,
            value_dimension: ValueDimension::Trust,
            difficulty: Difficulty::Easy,
            max_vri: 500,
            unlock_threshold: None,
            is_statically_unlocked: true,
        }])
        .unwrap()
    }

    fn mission(id: &str, reward: u32) -> Mission {
        Mission {
            id: id.into(),
            title: String::new(),
            branch_id: "trust-2017".into(),
            value_dimension: ValueDimension::Trust,
            vri_reward: reward,
            difficulty: Difficulty::Easy,
            hope_shard_template: None,
        }
    }

    #[test]
    fn test_builtin_missions_reference_builtin_branches() {
        let branches = BranchCatalog::builtin();
        let missions = MissionCatalog::builtin(&branches);
        assert!(!missions.is_empty());
        for m in missions.list_all() {
            assert!(branches.by_id(&m.branch_id).is_some(), "{}", m.id);
        }
    }

    #[test]
    fn test_by_branch_and_total() {
        let catalog = MissionCatalog::new(
            vec![mission("m1", 150), mission("m2", 200), mission("m3", 150)],
            &branches(),
        )
        .unwrap();
        let ids: Vec<_> = catalog
            .by_branch("trust-2017")
            .iter()
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(ids, ["m1", "m2", "m3"]);
        assert_eq!(catalog.total_possible_vri("trust-2017"), 500);
        assert_eq!(catalog.total_possible_vri("unknown"), 0);
        assert!(catalog.by_branch("unknown").is_empty());
        assert_eq!(catalog.by_id("m2").unwrap().vri_reward, 200);
        assert!(catalog.by_id("m4").is_none());
    }

    #[test]
    fn test_rejects_unknown_branch() {
        let mut m = mission("m1", 100);
        m.branch_id = "love-1999".into();
        let err = MissionCatalog::new(vec![m], &branches()).unwrap_err();
        assert!(matches!(err, CatalogError::UnknownBranch { .. }));
    }

    #[test]
    fn test_rejects_zero_reward() {
        let err = MissionCatalog::new(vec![mission("m1", 0)], &branches()).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidReward(_)));
    }

    #[test]
    fn test_rejects_reward_total_past_u32() {
        let err = MissionCatalog::new(
            vec![mission("m1", u32::MAX), mission("m2", 1)],
            &branches(),
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::VriOverflow("missions")));
    }

    #[test]
    fn test_rejects_template_from_other_year() {
        let mut m = mission("m1", 100);
        m.hope_shard_template = Some(HopeShardTemplate {
            branch_year: 2019,
            value_dimension: ValueDimension::Trust,
            vri_value: 100,
            rarity: Rarity::Rare,
        });
        let err = MissionCatalog::new(vec![m], &branches()).unwrap_err();
        assert!(matches!(err, CatalogError::TemplateMismatch { .. }));
    }

    #[test]
    fn test_rarity_wire_codes() {
        assert_eq!(serde_json::to_string(&Rarity::SuperSuperRare).unwrap(), "\"SSR\"");
        let r: Rarity = serde_json::from_str("\"SR\"").unwrap();
        assert_eq!(r, Rarity::SuperRare);
        assert_eq!(r.code(), "SR");
    }
}
