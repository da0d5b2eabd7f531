//! Pure progression logic for the VRI restoration game.
//!
//! This crate tracks a player's Value Restoration Index across independent
//! narrative branches: it gates branches by VRI threshold, records one-way
//! mission completion, mints hope shards and derives completion and decay
//! metrics. Functions take plain data and return results. Nothing here
//! performs network or database I/O; persistence is the caller's job behind
//! the [`store::PortfolioStore`] trait.
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`branch`] | Branch catalog, value dimensions, unlock gating |
//! | [`catalog`] | Embedded catalog data and file overrides |
//! | [`config`] | Countdown target date, save retry budget |
//! | [`engine`] | Mission completion, VRI aggregation, invariant audit |
//! | [`error`] | Engine, catalog, config and store errors |
//! | [`metrics`] | Completion rate, countdown days, decay level |
//! | [`mission`] | Mission catalog, hope-shard templates, rarity |
//! | [`model`] | Portfolio, branch progress, VRI, hope shards |
//! | [`store`] | Versioned persistence boundary and in-memory store |

pub mod branch;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod mission;
pub mod model;
pub mod store;

pub use engine::{CompletionOutcome, ProgressionEngine};
pub use error::{EngineError, EntityKind};
