//! Progression engine — mission completion, VRI aggregation, gating.
//!
//! The engine holds only the immutable catalogs. Every operation takes the
//! player's [`SalvationPortfolio`] explicitly, performs no I/O, and is
//! deterministic given its inputs: the `*_at` / `*_with` variants take the
//! current time (and a random source for shard ids) so callers and tests
//! control both.
//!
//! State transitions are one-way. A mission, once completed, stays completed
//! and re-completing it is a silent no-op; a cleared branch stays cleared;
//! `can_save` never returns to `false`.

use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};

use crate::branch::{Branch, BranchCatalog};
use crate::catalog::CatalogSet;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::metrics;
use crate::mission::{HopeShardTemplate, Mission, MissionCatalog};
use crate::model::{
    BranchProgress, BranchStatus, DecayStatus, HopeShard, SalvationPortfolio, Vri,
};

const SHARD_SUFFIX_LEN: usize = 9;

/// What a single `complete_mission` call did.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOutcome {
    /// The shard minted by this completion, if the mission has a template.
    pub hope_shard: Option<HopeShard>,
    /// The mission was already completed; the portfolio is untouched.
    pub already_completed: bool,
    /// This completion moved its branch into the cleared state.
    pub branch_cleared: bool,
    /// This completion made the portfolio saveable.
    pub save_unlocked: bool,
}

impl CompletionOutcome {
    fn replay() -> Self {
        Self {
            hope_shard: None,
            already_completed: true,
            branch_cleared: false,
            save_unlocked: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressionEngine {
    branches: Arc<BranchCatalog>,
    missions: Arc<MissionCatalog>,
}

impl ProgressionEngine {
    pub fn new(branches: Arc<BranchCatalog>, missions: Arc<MissionCatalog>) -> Self {
        Self { branches, missions }
    }

    pub fn from_catalogs(catalogs: &CatalogSet) -> Self {
        Self::new(catalogs.branches.clone(), catalogs.missions.clone())
    }

    pub fn builtin() -> Self {
        Self::from_catalogs(&CatalogSet::builtin())
    }

    pub fn branches(&self) -> &BranchCatalog {
        &self.branches
    }

    pub fn missions(&self) -> &MissionCatalog {
        &self.missions
    }

    /// Σ maxVRI over the branch catalog.
    pub fn max_possible_vri(&self) -> u32 {
        self.branches.total_max_vri()
    }

    // ── Aggregation ─────────────────────────────────────────────────────

    /// Recompute one branch's progress from scratch.
    ///
    /// Ids that are not missions of this branch are ignored. The result is a
    /// fresh snapshot stamped with `now`; no portfolio is touched.
    pub fn calculate_branch_progress_at<S: AsRef<str>>(
        &self,
        branch_id: &str,
        completed_mission_ids: &[S],
        now: DateTime<Utc>,
    ) -> Result<BranchProgress, EngineError> {
        let branch = self
            .branches
            .by_id(branch_id)
            .ok_or_else(|| EngineError::branch_not_found(branch_id))?;

        let done: Vec<&Mission> = self
            .missions
            .by_branch(branch_id)
            .into_iter()
            .filter(|m| completed_mission_ids.iter().any(|id| id.as_ref() == m.id))
            .collect();
        let current_vri = done.iter().map(|m| m.vri_reward).sum();
        let is_cleared = current_vri >= branch.max_vri;

        Ok(BranchProgress {
            branch_id: branch.id.clone(),
            current_vri,
            max_vri: branch.max_vri,
            completed_missions: done.iter().map(|m| m.id.clone()).collect(),
            is_cleared,
            first_cleared_at: is_cleared.then_some(now),
            last_played_at: now,
        })
    }

    pub fn calculate_branch_progress<S: AsRef<str>>(
        &self,
        branch_id: &str,
        completed_mission_ids: &[S],
    ) -> Result<BranchProgress, EngineError> {
        self.calculate_branch_progress_at(branch_id, completed_mission_ids, Utc::now())
    }

    /// Sum branch VRI, partitioned by each branch's catalog dimension.
    pub fn calculate_total_vri_at(
        &self,
        branch_progresses: &[BranchProgress],
        now: DateTime<Utc>,
    ) -> Result<Vri, EngineError> {
        let mut vri = Vri::zero(now);
        for progress in branch_progresses {
            let dimension = self
                .branches
                .dimension_of(&progress.branch_id)
                .ok_or_else(|| EngineError::branch_not_found(&progress.branch_id))?;
            vri.add(dimension, progress.current_vri);
        }
        Ok(vri)
    }

    pub fn calculate_total_vri(
        &self,
        branch_progresses: &[BranchProgress],
    ) -> Result<Vri, EngineError> {
        self.calculate_total_vri_at(branch_progresses, Utc::now())
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// A zeroed portfolio with one progress entry per catalog branch.
    pub fn initialize_salvation_portfolio_at(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> SalvationPortfolio {
        let branches = self
            .branches
            .list_all()
            .iter()
            .map(|b| BranchProgress::new(b.id.clone(), b.max_vri, now))
            .collect();
        log::info!(
            "Salvation portfolio initialized for {} with {} branches",
            user_id,
            self.branches.len()
        );
        SalvationPortfolio {
            user_id: user_id.to_string(),
            vri: Vri::zero(now),
            branches,
            hope_shards: Vec::new(),
            completion_rate: 0,
            can_save: false,
        }
    }

    pub fn initialize_salvation_portfolio(&self, user_id: &str) -> SalvationPortfolio {
        self.initialize_salvation_portfolio_at(user_id, Utc::now())
    }

    /// Record a mission as completed.
    ///
    /// Errors leave the portfolio untouched. Re-completing a mission returns
    /// [`CompletionOutcome::already_completed`] and changes nothing.
    pub fn complete_mission_with<R: Rng>(
        &self,
        portfolio: &mut SalvationPortfolio,
        mission_id: &str,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<CompletionOutcome, EngineError> {
        let mission = self
            .missions
            .by_id(mission_id)
            .ok_or_else(|| EngineError::mission_not_found(mission_id))?;
        let branch = self
            .branches
            .by_id(&mission.branch_id)
            .ok_or_else(|| EngineError::branch_not_found(&mission.branch_id))?;

        let idx = portfolio
            .branches
            .iter()
            .position(|b| b.branch_id == mission.branch_id)
            .ok_or_else(|| {
                EngineError::invariant(format!(
                    "portfolio `{}` has no progress entry for branch `{}`",
                    portfolio.user_id, mission.branch_id
                ))
            })?;

        if portfolio.branches[idx].has_completed(mission_id) {
            log::debug!(
                "Mission {} already completed by {}; ignoring replay",
                mission_id,
                portfolio.user_id
            );
            return Ok(CompletionOutcome::replay());
        }

        // Everything below must succeed once mutation starts.
        self.check_branch_entries(portfolio)?;
        self.check_branch_caps(portfolio)?;

        let progress = &mut portfolio.branches[idx];
        progress.completed_missions.push(mission.id.clone());
        progress.current_vri = progress.current_vri.saturating_add(mission.vri_reward);
        progress.last_played_at = now;

        let mut branch_cleared = false;
        if progress.current_vri >= branch.max_vri && !progress.is_cleared {
            progress.is_cleared = true;
            if progress.first_cleared_at.is_none() {
                progress.first_cleared_at = Some(now);
            }
            branch_cleared = true;
            log::info!(
                "Branch {} cleared by {} at {} VRI",
                progress.branch_id,
                portfolio.user_id,
                progress.current_vri
            );
        }

        portfolio.vri = self.calculate_total_vri_at(&portfolio.branches, now)?;

        let hope_shard = mission
            .hope_shard_template
            .as_ref()
            .map(|template| mint_hope_shard(&portfolio.hope_shards, mission, template, now, rng));
        if let Some(shard) = &hope_shard {
            portfolio.hope_shards.push(shard.clone());
        }

        portfolio.completion_rate = self.calculate_completion_rate(portfolio);

        let was_saveable = portfolio.can_save;
        portfolio.can_save = was_saveable || portfolio.all_branches_cleared();
        let save_unlocked = !was_saveable && portfolio.can_save;
        if save_unlocked {
            log::info!("All branches cleared; {} can now save", portfolio.user_id);
        }

        log::info!(
            "Mission {} completed by {}: +{} VRI (total {}, {}%)",
            mission.id,
            portfolio.user_id,
            mission.vri_reward,
            portfolio.vri.total,
            portfolio.completion_rate
        );

        Ok(CompletionOutcome {
            hope_shard,
            already_completed: false,
            branch_cleared,
            save_unlocked,
        })
    }

    pub fn complete_mission(
        &self,
        portfolio: &mut SalvationPortfolio,
        mission_id: &str,
    ) -> Result<CompletionOutcome, EngineError> {
        self.complete_mission_with(portfolio, mission_id, Utc::now(), &mut rand::thread_rng())
    }

    /// Rebuild every branch from its completed mission ids, then the
    /// aggregates. For portfolios assembled outside `complete_mission`
    /// (bulk imports, catalog reward changes).
    ///
    /// Unknown or duplicate ids are dropped. Existing timestamps are kept.
    /// Clears and `can_save` are terminal: a rebuild that would leave a
    /// cleared branch below its cap, or a saveable portfolio with an
    /// uncleared branch, fails with `InvariantViolation` and the portfolio
    /// is untouched.
    pub fn recalculate_portfolio_at(
        &self,
        portfolio: &mut SalvationPortfolio,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        self.check_branch_entries(portfolio)?;

        let mut rebuilt = Vec::with_capacity(portfolio.branches.len());
        for entry in &portfolio.branches {
            let fresh =
                self.calculate_branch_progress_at(&entry.branch_id, &entry.completed_missions, now)?;
            let mut next = entry.clone();
            next.current_vri = fresh.current_vri;
            next.max_vri = fresh.max_vri;
            next.completed_missions.clear();
            for id in &entry.completed_missions {
                if fresh.completed_missions.contains(id) && !next.completed_missions.contains(id) {
                    next.completed_missions.push(id.clone());
                }
            }
            if fresh.is_cleared {
                if !next.is_cleared {
                    next.is_cleared = true;
                    next.first_cleared_at.get_or_insert(now);
                }
            } else if next.is_cleared {
                log::warn!(
                    "Branch {} for {} is cleared but rebuilds to {}/{} VRI",
                    next.branch_id,
                    portfolio.user_id,
                    next.current_vri,
                    next.max_vri
                );
                return Err(EngineError::invariant(format!(
                    "cleared branch `{}` rebuilds to {}/{} VRI",
                    next.branch_id, next.current_vri, next.max_vri
                )));
            }
            rebuilt.push(next);
        }

        let all_cleared = rebuilt.iter().all(|b| b.is_cleared);
        if portfolio.can_save && !all_cleared {
            return Err(EngineError::invariant(format!(
                "portfolio `{}` is saveable but not every branch is cleared",
                portfolio.user_id
            )));
        }

        portfolio.vri = self.calculate_total_vri_at(&rebuilt, now)?;
        portfolio.branches = rebuilt;
        portfolio.completion_rate = self.calculate_completion_rate(portfolio);
        portfolio.can_save = portfolio.all_branches_cleared();
        Ok(())
    }

    pub fn recalculate_portfolio(
        &self,
        portfolio: &mut SalvationPortfolio,
    ) -> Result<(), EngineError> {
        self.recalculate_portfolio_at(portfolio, Utc::now())
    }

    // ── Derived metrics ─────────────────────────────────────────────────

    /// `vri.total` as a rounded percentage of the catalog's Σ maxVRI.
    pub fn calculate_completion_rate(&self, portfolio: &SalvationPortfolio) -> u8 {
        metrics::completion_rate(portfolio.vri.total, self.max_possible_vri())
    }

    /// Whole days left before `target_date`, rounded up; 0 once it has passed.
    pub fn days_until_target(&self, target_date: DateTime<Utc>) -> u32 {
        metrics::days_until_target(target_date)
    }

    /// `100 - completion`, clamped to 0..=100; 100 when nothing is obtainable.
    pub fn calculate_decay_level(&self, total_vri: u32, max_possible_vri: u32) -> u8 {
        metrics::decay_level(total_vri, max_possible_vri)
    }

    pub fn decay_status_at(
        &self,
        portfolio: &SalvationPortfolio,
        config: &EngineConfig,
        now: DateTime<Utc>,
    ) -> DecayStatus {
        DecayStatus {
            days_until_target: metrics::days_until_target_at(config.target_date, now),
            decay_level: metrics::decay_level(portfolio.vri.total, self.max_possible_vri()),
        }
    }

    pub fn decay_status(&self, portfolio: &SalvationPortfolio, config: &EngineConfig) -> DecayStatus {
        self.decay_status_at(portfolio, config, Utc::now())
    }

    // ── Gating ──────────────────────────────────────────────────────────

    /// The locked branch that opens soonest as `total_vri` grows.
    pub fn next_locked_branch(&self, total_vri: u32) -> Option<&Branch> {
        self.branches.next_locked(total_vri)
    }

    /// Branches open at the portfolio's current total VRI.
    pub fn unlocked_branches(&self, portfolio: &SalvationPortfolio) -> Vec<&Branch> {
        self.branches.list_unlocked(portfolio.vri.total)
    }

    pub fn branch_status(
        &self,
        portfolio: &SalvationPortfolio,
        branch_id: &str,
    ) -> Result<BranchStatus, EngineError> {
        let branch = self
            .branches
            .by_id(branch_id)
            .ok_or_else(|| EngineError::branch_not_found(branch_id))?;
        let progress = portfolio.branch(branch_id).ok_or_else(|| {
            EngineError::invariant(format!(
                "portfolio `{}` has no progress entry for branch `{}`",
                portfolio.user_id, branch_id
            ))
        })?;

        let status = if progress.is_cleared {
            BranchStatus::Cleared
        } else if progress.current_vri > 0 {
            BranchStatus::InProgress
        } else if branch.is_unlocked_at(portfolio.vri.total) {
            BranchStatus::Unlocked
        } else {
            BranchStatus::Locked
        };
        Ok(status)
    }

    // ── Invariant guards ────────────────────────────────────────────────

    /// Exactly one entry per catalog branch and nothing else.
    fn check_branch_entries(&self, portfolio: &SalvationPortfolio) -> Result<(), EngineError> {
        for entry in &portfolio.branches {
            if self.branches.by_id(&entry.branch_id).is_none() {
                return Err(EngineError::invariant(format!(
                    "portfolio `{}` tracks unknown branch `{}`",
                    portfolio.user_id, entry.branch_id
                )));
            }
        }
        for branch in self.branches.list_all() {
            let count = portfolio
                .branches
                .iter()
                .filter(|b| b.branch_id == branch.id)
                .count();
            if count != 1 {
                return Err(EngineError::invariant(format!(
                    "portfolio `{}` has {} progress entries for branch `{}`",
                    portfolio.user_id, count, branch.id
                )));
            }
        }
        Ok(())
    }

    /// Every entry carries its catalog branch's current maxVRI.
    fn check_branch_caps(&self, portfolio: &SalvationPortfolio) -> Result<(), EngineError> {
        for entry in &portfolio.branches {
            let branch = self
                .branches
                .by_id(&entry.branch_id)
                .ok_or_else(|| EngineError::branch_not_found(&entry.branch_id))?;
            if entry.max_vri != branch.max_vri {
                return Err(EngineError::invariant(format!(
                    "branch `{}` maxVRI {} differs from catalog {}",
                    entry.branch_id, entry.max_vri, branch.max_vri
                )));
            }
        }
        Ok(())
    }

    /// Audit a portfolio against the catalogs and every aggregate invariant.
    pub fn verify_portfolio(&self, portfolio: &SalvationPortfolio) -> Result<(), EngineError> {
        self.check_branch_entries(portfolio)?;
        self.check_branch_caps(portfolio)?;
        let fail = |msg: String| Err(EngineError::invariant(msg));

        let mut seen = HashSet::new();
        for entry in &portfolio.branches {

            let mut sum = 0u32;
            for id in &entry.completed_missions {
                let Some(mission) = self.missions.by_id(id) else {
                    return fail(format!("branch `{}` lists unknown mission `{}`", entry.branch_id, id));
                };
                if mission.branch_id != entry.branch_id {
                    return fail(format!(
                        "mission `{}` recorded under branch `{}`",
                        id, entry.branch_id
                    ));
                }
                if !seen.insert(id.as_str()) {
                    return fail(format!("mission `{}` recorded twice", id));
                }
                sum = sum.saturating_add(mission.vri_reward);
            }
            if sum != entry.current_vri {
                return fail(format!(
                    "branch `{}` currentVRI {} but completed missions sum to {}",
                    entry.branch_id, entry.current_vri, sum
                ));
            }
            if entry.is_cleared != (entry.current_vri >= entry.max_vri) {
                return fail(format!(
                    "branch `{}` isCleared={} at {}/{} VRI",
                    entry.branch_id, entry.is_cleared, entry.current_vri, entry.max_vri
                ));
            }
            if entry.is_cleared && entry.first_cleared_at.is_none() {
                return fail(format!("branch `{}` cleared without firstClearedAt", entry.branch_id));
            }
        }

        let expected = self.calculate_total_vri_at(&portfolio.branches, portfolio.vri.last_updated)?;
        if expected != portfolio.vri {
            return fail(format!(
                "VRI {:?} does not match branch totals {:?}",
                portfolio.vri, expected
            ));
        }

        let rate = self.calculate_completion_rate(portfolio);
        if portfolio.completion_rate != rate || rate > 100 {
            return fail(format!(
                "completionRate {} should be {}",
                portfolio.completion_rate, rate
            ));
        }

        if portfolio.can_save != portfolio.all_branches_cleared() {
            return fail(format!("canSave={} disagrees with branch clears", portfolio.can_save));
        }

        let mut shard_ids = HashSet::new();
        for shard in &portfolio.hope_shards {
            if !shard_ids.insert(shard.id.as_str()) {
                return fail(format!("hope shard id `{}` reused", shard.id));
            }
            if !portfolio.has_completed(&shard.mission_id) {
                return fail(format!(
                    "hope shard `{}` minted for incomplete mission `{}`",
                    shard.id, shard.mission_id
                ));
            }
        }

        Ok(())
    }
}

// ── Minting ─────────────────────────────────────────────────────────────

fn mint_hope_shard<R: Rng>(
    existing: &[HopeShard],
    mission: &Mission,
    template: &HopeShardTemplate,
    now: DateTime<Utc>,
    rng: &mut R,
) -> HopeShard {
    let mut id = shard_id(now, rng);
    while existing.iter().any(|s| s.id == id) {
        id = shard_id(now, rng);
    }
    HopeShard {
        id,
        branch_id: mission.branch_id.clone(),
        branch_year: template.branch_year,
        value_dimension: template.value_dimension,
        vri_value: template.vri_value,
        rarity: template.rarity,
        mission_id: mission.id.clone(),
        earned_at: now,
    }
}

/// `hs-<epoch millis>-<9 random base36 chars>`
fn shard_id<R: Rng>(now: DateTime<Utc>, rng: &mut R) -> String {
    let suffix: String = (0..SHARD_SUFFIX_LEN)
        .map(|_| char::from(rng.sample(Alphanumeric)).to_ascii_lowercase())
        .collect();
    format!("hs-{}-{}", now.timestamp_millis(), suffix)
}
