//! Player-side data model: branch progress, VRI aggregate, hope shards and
//! the salvation portfolio that holds them.
//!
//! These are the documents the persistence layer stores. All timestamps
//! serialize as RFC 3339 UTC strings; field names are camelCase.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::branch::ValueDimension;
use crate::mission::Rarity;

/// Reward artifact minted once per completed mission that has a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HopeShard {
    pub id: String,
    pub branch_id: String,
    pub branch_year: u16,
    pub value_dimension: ValueDimension,
    pub vri_value: u32,
    pub rarity: Rarity,
    pub mission_id: String,
    pub earned_at: DateTime<Utc>,
}

/// One player's progress through one branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchProgress {
    pub branch_id: String,
    #[serde(rename = "currentVRI")]
    pub current_vri: u32,
    #[serde(rename = "maxVRI")]
    pub max_vri: u32,
    /// Completed mission ids, in completion order, without duplicates.
    pub completed_missions: Vec<String>,
    pub is_cleared: bool,
    #[serde(default)]
    pub first_cleared_at: Option<DateTime<Utc>>,
    pub last_played_at: DateTime<Utc>,
}

impl BranchProgress {
    pub fn new(branch_id: impl Into<String>, max_vri: u32, now: DateTime<Utc>) -> Self {
        Self {
            branch_id: branch_id.into(),
            current_vri: 0,
            max_vri,
            completed_missions: Vec::new(),
            is_cleared: false,
            first_cleared_at: None,
            last_played_at: now,
        }
    }

    pub fn has_completed(&self, mission_id: &str) -> bool {
        self.completed_missions.iter().any(|m| m == mission_id)
    }
}

/// Value Restoration Index, in aggregate and per dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vri {
    pub total: u32,
    pub trust: u32,
    pub empathy: u32,
    pub love: u32,
    pub last_updated: DateTime<Utc>,
}

impl Vri {
    pub fn zero(now: DateTime<Utc>) -> Self {
        Self {
            total: 0,
            trust: 0,
            empathy: 0,
            love: 0,
            last_updated: now,
        }
    }

    pub fn dimension(&self, dimension: ValueDimension) -> u32 {
        match dimension {
            ValueDimension::Trust => self.trust,
            ValueDimension::Empathy => self.empathy,
            ValueDimension::Love => self.love,
        }
    }

    pub(crate) fn add(&mut self, dimension: ValueDimension, amount: u32) {
        match dimension {
            ValueDimension::Trust => self.trust = self.trust.saturating_add(amount),
            ValueDimension::Empathy => self.empathy = self.empathy.saturating_add(amount),
            ValueDimension::Love => self.love = self.love.saturating_add(amount),
        }
        self.total = self.trust.saturating_add(self.empathy).saturating_add(self.love);
    }
}

/// The per-player aggregate root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalvationPortfolio {
    pub user_id: String,
    pub vri: Vri,
    pub branches: Vec<BranchProgress>,
    pub hope_shards: Vec<HopeShard>,
    /// Percentage of total obtainable VRI, 0–100.
    pub completion_rate: u8,
    pub can_save: bool,
}

impl SalvationPortfolio {
    pub fn branch(&self, branch_id: &str) -> Option<&BranchProgress> {
        self.branches.iter().find(|b| b.branch_id == branch_id)
    }

    pub fn branch_mut(&mut self, branch_id: &str) -> Option<&mut BranchProgress> {
        self.branches.iter_mut().find(|b| b.branch_id == branch_id)
    }

    pub fn has_completed(&self, mission_id: &str) -> bool {
        self.branches.iter().any(|b| b.has_completed(mission_id))
    }

    pub fn all_branches_cleared(&self) -> bool {
        !self.branches.is_empty() && self.branches.iter().all(|b| b.is_cleared)
    }

    /// Σ maxVRI over this portfolio's branches.
    pub fn max_possible_vri(&self) -> u32 {
        self.branches
            .iter()
            .fold(0u32, |acc, b| acc.saturating_add(b.max_vri))
    }

    /// Number of hope shards held per rarity. Every rarity is present.
    pub fn shard_counts(&self) -> BTreeMap<Rarity, usize> {
        let mut counts: BTreeMap<Rarity, usize> = Rarity::all().iter().map(|r| (*r, 0)).collect();
        for shard in &self.hope_shards {
            *counts.entry(shard.rarity).or_insert(0) += 1;
        }
        counts
    }
}

/// Countdown framing derived from total VRI. Not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecayStatus {
    pub days_until_target: u32,
    pub decay_level: u8,
}

/// Where a player stands on one branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BranchStatus {
    Locked,
    Unlocked,
    InProgress,
    Cleared,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_branch_progress_wire_names() {
        let progress = BranchProgress::new("trust-2017", 500, t0());
        let json = serde_json::to_value(&progress).unwrap();
        assert_eq!(json["branchId"], "trust-2017");
        assert_eq!(json["currentVRI"], 0);
        assert_eq!(json["maxVRI"], 500);
        assert_eq!(json["isCleared"], false);
        assert!(json["firstClearedAt"].is_null());
        assert_eq!(json["lastPlayedAt"], "2025-03-01T12:00:00Z");
    }

    #[test]
    fn test_vri_dimension_accessors() {
        let mut vri = Vri::zero(t0());
        vri.add(ValueDimension::Love, 40);
        vri.add(ValueDimension::Trust, 10);
        assert_eq!(vri.dimension(ValueDimension::Love), 40);
        assert_eq!(vri.dimension(ValueDimension::Trust), 10);
        assert_eq!(vri.dimension(ValueDimension::Empathy), 0);
        assert_eq!(vri.total, 50);
    }

    #[test]
    fn test_vri_add_saturates() {
        let mut vri = Vri::zero(t0());
        vri.add(ValueDimension::Trust, u32::MAX - 5);
        vri.add(ValueDimension::Love, 10);
        vri.add(ValueDimension::Trust, 10);
        assert_eq!(vri.trust, u32::MAX);
        assert_eq!(vri.love, 10);
        assert_eq!(vri.total, u32::MAX);
    }

    #[test]
    fn test_empty_portfolio_cannot_save() {
        let portfolio = SalvationPortfolio {
            user_id: "u".into(),
            vri: Vri::zero(t0()),
            branches: Vec::new(),
            hope_shards: Vec::new(),
            completion_rate: 0,
            can_save: false,
        };
        assert!(!portfolio.all_branches_cleared());
        assert_eq!(portfolio.max_possible_vri(), 0);
        assert_eq!(portfolio.shard_counts().len(), Rarity::all().len());
    }

    #[test]
    fn test_branch_status_serializes_camel_case() {
        let json = serde_json::to_string(&BranchStatus::InProgress).unwrap();
        assert_eq!(json, "\"inProgress\"");
    }
}
