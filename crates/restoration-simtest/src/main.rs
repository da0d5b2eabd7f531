//! Restoration Headless Progression Harness
//!
//! Validates catalog data and replays a complete playthrough against the
//! progression engine. Runs entirely in-process — no backend, no wallet, no UI.
//!
//! Usage:
//!   cargo run -p restoration-simtest
//!   cargo run -p restoration-simtest -- --verbose
//!
//! Catalog overrides are honored via RESTORATION_BRANCHES_PATH and
//! RESTORATION_MISSIONS_PATH; engine settings via RESTORATION_TARGET_DATE.

use chrono::{Duration, Utc};
use rand::{rngs::StdRng, SeedableRng};
use restoration_logic::catalog::{load_catalogs_from_env, CatalogSet};
use restoration_logic::config::EngineConfig;
use restoration_logic::mission::Rarity;
use restoration_logic::model::SalvationPortfolio;
use restoration_logic::store::{record_mission_completion, InMemoryPortfolioStore, PortfolioStore};
use restoration_logic::ProgressionEngine;

// ── Test harness ────────────────────────────────────────────────────────

struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

fn main() {
    let verbose = std::env::args().any(|a| a == "--verbose");
    let default_level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    println!("=== Restoration Progression Harness ===\n");

    let catalogs = load_catalogs_from_env();
    let config = EngineConfig::from_env();
    let engine = ProgressionEngine::from_catalogs(&catalogs);

    let mut results = Vec::new();

    // 1. Catalog data sanity
    results.extend(validate_catalogs(&catalogs, verbose));

    // 2. Unlock gating sweep
    results.extend(validate_gating(&engine, verbose));

    // 3. Full playthrough
    results.extend(validate_playthrough(&engine, &config, verbose));

    // 4. Replay and error semantics
    results.extend(validate_replays(&engine, verbose));

    // 5. Store round trip
    results.extend(validate_store(&engine, &config, verbose));

    // ── Summary ──
    println!();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.iter().filter(|r| !r.passed).count();
    let total = results.len();

    for r in &results {
        let icon = if r.passed { "✓" } else { "✗" };
        if !r.passed || verbose {
            println!("  {} {}: {}", icon, r.name, r.detail);
        }
    }

    println!(
        "\n=== RESULT: {}/{} passed, {} failed ===",
        passed, total, failed
    );

    if failed > 0 {
        std::process::exit(1);
    }
}

// ── 1. Catalogs ─────────────────────────────────────────────────────────

fn validate_catalogs(catalogs: &CatalogSet, verbose: bool) -> Vec<TestResult> {
    println!("--- Catalogs ---");
    let mut results = Vec::new();

    results.push(TestResult {
        name: "catalog_source".into(),
        passed: true,
        detail: format!(
            "{:?}: {} branches, {} missions",
            catalogs.source,
            catalogs.branches.len(),
            catalogs.missions.len()
        ),
    });

    // Every branch must be clearable with its own missions
    let unclearable: Vec<_> = catalogs
        .branches
        .list_all()
        .iter()
        .filter(|b| catalogs.missions.total_possible_vri(&b.id) < b.max_vri)
        .map(|b| b.id.as_str())
        .collect();
    results.push(TestResult {
        name: "catalog_branches_clearable".into(),
        passed: unclearable.is_empty(),
        detail: if unclearable.is_empty() {
            "every branch reaches its maxVRI".into()
        } else {
            format!("cannot clear: {}", unclearable.join(", "))
        },
    });

    // At least one branch open from the start
    let starters = catalogs.branches.list_unlocked(0).len();
    results.push(TestResult {
        name: "catalog_has_starting_branch".into(),
        passed: starters > 0,
        detail: format!("{} branches open at 0 VRI", starters),
    });

    // Every locked branch eventually opens below the full VRI total
    let max_vri = catalogs.branches.total_max_vri();
    let never_open: Vec<_> = catalogs
        .branches
        .list_all()
        .iter()
        .filter(|b| !b.is_unlocked_at(max_vri))
        .map(|b| b.id.as_str())
        .collect();
    results.push(TestResult {
        name: "catalog_thresholds_reachable".into(),
        passed: never_open.is_empty(),
        detail: if never_open.is_empty() {
            format!("all thresholds ≤ {} VRI", max_vri)
        } else {
            format!("never unlock: {}", never_open.join(", "))
        },
    });

    if verbose {
        println!("  Branches:");
        for b in catalogs.branches.list_all() {
            println!(
                "    {:14} {} {:8} max={:5} threshold={:?} missions={}",
                b.id,
                b.year,
                b.value_dimension.as_str(),
                b.max_vri,
                b.unlock_threshold,
                catalogs.missions.by_branch(&b.id).len()
            );
        }
    }

    results
}

// ── 2. Gating ───────────────────────────────────────────────────────────

fn validate_gating(engine: &ProgressionEngine, _verbose: bool) -> Vec<TestResult> {
    println!("--- Unlock Gating ---");
    let mut results = Vec::new();

    let max_vri = engine.max_possible_vri();
    let mut monotone = true;
    let mut next_consistent = true;
    let mut last_open = 0;
    for total in (0..=max_vri).step_by(50) {
        let open = engine.branches().list_unlocked(total).len();
        if open < last_open {
            monotone = false;
        }
        last_open = open;

        if let Some(next) = engine.next_locked_branch(total) {
            let threshold = next.unlock_threshold.unwrap_or(0);
            if threshold <= total || next.is_unlocked_at(total) {
                next_consistent = false;
            }
        }
    }

    results.push(TestResult {
        name: "gating_monotone".into(),
        passed: monotone,
        detail: format!("unlocked count never shrinks over 0–{} VRI", max_vri),
    });
    results.push(TestResult {
        name: "gating_next_locked".into(),
        passed: next_consistent,
        detail: "next locked branch always above current VRI".into(),
    });
    results.push(TestResult {
        name: "gating_all_open_at_max".into(),
        passed: engine.next_locked_branch(max_vri).is_none(),
        detail: format!("nothing locked at {} VRI", max_vri),
    });

    results
}

// ── 3. Playthrough ──────────────────────────────────────────────────────

fn validate_playthrough(
    engine: &ProgressionEngine,
    config: &EngineConfig,
    verbose: bool,
) -> Vec<TestResult> {
    println!("--- Playthrough ---");
    let mut results = Vec::new();

    let mut rng = StdRng::seed_from_u64(42);
    let mut now = Utc::now();
    let mut p = engine.initialize_salvation_portfolio_at("simtest", now);
    let mut audit_failures = Vec::new();
    let mut stuck = false;

    while !p.can_save {
        let open: Vec<String> = engine
            .unlocked_branches(&p)
            .iter()
            .filter(|b| p.branch(&b.id).is_some_and(|progress| !progress.is_cleared))
            .map(|b| b.id.clone())
            .collect();
        let before = p.vri.total;
        if open.is_empty() {
            stuck = true;
            break;
        }
        for branch_id in open {
            let missions: Vec<String> = engine
                .missions()
                .by_branch(&branch_id)
                .iter()
                .map(|m| m.id.clone())
                .collect();
            for mission_id in missions {
                now += Duration::minutes(15);
                match engine.complete_mission_with(&mut p, &mission_id, now, &mut rng) {
                    Ok(outcome) => {
                        if verbose {
                            if let Some(shard) = &outcome.hope_shard {
                                println!(
                                    "    {} → shard {} ({})",
                                    mission_id,
                                    shard.id,
                                    shard.rarity.code()
                                );
                            }
                        }
                    }
                    Err(err) => audit_failures.push(format!("{}: {}", mission_id, err)),
                }
                if let Err(err) = engine.verify_portfolio(&p) {
                    audit_failures.push(format!("after {}: {}", mission_id, err));
                }
            }
        }
        if p.vri.total == before {
            // Open branches exist but none can be cleared.
            stuck = true;
            break;
        }
    }

    results.push(TestResult {
        name: "playthrough_completes".into(),
        passed: !stuck && p.can_save,
        detail: format!(
            "{} VRI (trust {}, empathy {}, love {}), {}%",
            p.vri.total, p.vri.trust, p.vri.empathy, p.vri.love, p.completion_rate
        ),
    });

    results.push(TestResult {
        name: "playthrough_invariants".into(),
        passed: audit_failures.is_empty(),
        detail: if audit_failures.is_empty() {
            "portfolio audit clean after every completion".into()
        } else {
            audit_failures.join("; ")
        },
    });

    let decay = engine.decay_status_at(&p, config, now);
    results.push(TestResult {
        name: "playthrough_decay_zero".into(),
        passed: decay.decay_level == 0 && p.completion_rate == 100,
        detail: format!(
            "decay {} with {} days to {}",
            decay.decay_level,
            decay.days_until_target,
            config.target_date.format("%Y-%m-%d")
        ),
    });

    results.push(shard_summary(engine, &p));
    results
}

fn shard_summary(engine: &ProgressionEngine, p: &SalvationPortfolio) -> TestResult {
    let expected = engine
        .missions()
        .list_all()
        .iter()
        .filter(|m| m.hope_shard_template.is_some())
        .count();
    let counts = p.shard_counts();
    let breakdown: Vec<String> = Rarity::all()
        .iter()
        .map(|r| format!("{}={}", r.code(), counts.get(r).copied().unwrap_or(0)))
        .collect();
    TestResult {
        name: "playthrough_shards".into(),
        passed: p.hope_shards.len() == expected,
        detail: format!(
            "{} of {} shards minted ({})",
            p.hope_shards.len(),
            expected,
            breakdown.join(" ")
        ),
    }
}

// ── 4. Replays ──────────────────────────────────────────────────────────

fn validate_replays(engine: &ProgressionEngine, _verbose: bool) -> Vec<TestResult> {
    println!("--- Replays & Errors ---");
    let mut results = Vec::new();

    let mut rng = StdRng::seed_from_u64(7);
    let now = Utc::now();
    let mut p = engine.initialize_salvation_portfolio_at("simtest-replay", now);

    let Some(first) = engine.missions().list_all().first().map(|m| m.id.clone()) else {
        results.push(TestResult {
            name: "replay_setup".into(),
            passed: false,
            detail: "mission catalog is empty".into(),
        });
        return results;
    };

    let first_ok = engine
        .complete_mission_with(&mut p, &first, now, &mut rng)
        .is_ok();
    let snapshot = p.clone();
    let replay = engine.complete_mission_with(&mut p, &first, now + Duration::hours(1), &mut rng);
    let replay_ok = matches!(&replay, Ok(o) if o.already_completed && o.hope_shard.is_none());
    results.push(TestResult {
        name: "replay_idempotent".into(),
        passed: first_ok && replay_ok && p == snapshot,
        detail: format!("re-completing {} leaves the portfolio unchanged", first),
    });

    let unknown = engine.complete_mission_with(&mut p, "no-such-mission", now, &mut rng);
    results.push(TestResult {
        name: "replay_unknown_mission".into(),
        passed: unknown.is_err() && p == snapshot,
        detail: match unknown {
            Err(err) => err.to_string(),
            Ok(_) => "unknown mission accepted".into(),
        },
    });

    results
}

// ── 5. Store ────────────────────────────────────────────────────────────

fn validate_store(
    engine: &ProgressionEngine,
    config: &EngineConfig,
    _verbose: bool,
) -> Vec<TestResult> {
    println!("--- Store Round Trip ---");
    let mut results = Vec::new();

    let store = InMemoryPortfolioStore::new();
    let mission_ids: Vec<String> = engine
        .missions()
        .list_all()
        .iter()
        .map(|m| m.id.clone())
        .collect();

    let mut errors = Vec::new();
    for id in mission_ids.iter().chain(mission_ids.iter().take(3)) {
        if let Err(err) = record_mission_completion(&store, engine, "simtest-store", id, config) {
            errors.push(format!("{}: {}", id, err));
        }
    }

    let loaded = store.load("simtest-store");
    let (passed, detail) = match loaded {
        Ok(Some(stored)) => {
            let audit = engine.verify_portfolio(&stored.portfolio);
            (
                errors.is_empty()
                    && audit.is_ok()
                    && stored.version == mission_ids.len() as u64
                    && stored.portfolio.can_save,
                format!(
                    "version {} after {} completions + 3 replays, audit {:?}",
                    stored.version,
                    mission_ids.len(),
                    audit
                ),
            )
        }
        Ok(None) => (false, "nothing stored".into()),
        Err(err) => (false, err.to_string()),
    };
    results.push(TestResult {
        name: "store_round_trip".into(),
        passed,
        detail: if errors.is_empty() {
            detail
        } else {
            format!("{}; errors: {}", detail, errors.join("; "))
        },
    });

    // The persisted document keeps the wire shape the backend expects
    let document = store
        .document("simtest-store")
        .ok()
        .flatten()
        .and_then(|json| serde_json::from_str::<serde_json::Value>(&json).ok());
    let shape_ok = document.as_ref().is_some_and(|doc| {
        doc["userId"].is_string()
            && doc["vri"]["total"].is_u64()
            && doc["branches"][0]["currentVRI"].is_u64()
            && doc["branches"][0]["lastPlayedAt"].is_string()
            && doc["completionRate"].is_u64()
    });
    results.push(TestResult {
        name: "store_document_shape".into(),
        passed: shape_ok,
        detail: "camelCase JSON with RFC 3339 timestamps".into(),
    });

    results
}
