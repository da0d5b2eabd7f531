//! Persistence boundary — versioned portfolio documents keyed by user.
//!
//! The engine never touches storage. Callers load a snapshot, run engine
//! operations on it and save it back with the version they loaded; a store
//! rejects the save with [`StoreError::VersionConflict`] if someone else
//! wrote in between. [`record_mission_completion`] is that loop.

use std::{collections::HashMap, sync::Mutex};

use crate::config::EngineConfig;
use crate::engine::{CompletionOutcome, ProgressionEngine};
use crate::error::StoreError;
use crate::model::SalvationPortfolio;

/// A portfolio together with the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPortfolio {
    pub version: u64,
    pub portfolio: SalvationPortfolio,
}

pub trait PortfolioStore {
    fn load(&self, user_id: &str) -> Result<Option<StoredPortfolio>, StoreError>;

    /// Write `portfolio` if the stored version still equals
    /// `expected_version` (`None` = must not exist yet). Returns the new
    /// version.
    fn save(
        &self,
        portfolio: &SalvationPortfolio,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError>;
}

/// In-process store holding serialized JSON documents.
#[derive(Debug, Default)]
pub struct InMemoryPortfolioStore {
    documents: Mutex<HashMap<String, (u64, String)>>,
}

impl InMemoryPortfolioStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw JSON document for a user, as it would sit in the backing store.
    pub fn document(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        let documents = self.lock()?;
        Ok(documents.get(user_id).map(|(_, json)| json.clone()))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, (u64, String)>>, StoreError> {
        self.documents
            .lock()
            .map_err(|_| StoreError::Unavailable("portfolio store lock poisoned".into()))
    }
}

impl PortfolioStore for InMemoryPortfolioStore {
    fn load(&self, user_id: &str) -> Result<Option<StoredPortfolio>, StoreError> {
        let documents = self.lock()?;
        match documents.get(user_id) {
            Some((version, json)) => Ok(Some(StoredPortfolio {
                version: *version,
                portfolio: serde_json::from_str(json)?,
            })),
            None => Ok(None),
        }
    }

    fn save(
        &self,
        portfolio: &SalvationPortfolio,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError> {
        let json = serde_json::to_string(portfolio)?;
        let mut documents = self.lock()?;
        let actual = documents.get(&portfolio.user_id).map(|(v, _)| *v);
        if actual != expected_version {
            return Err(StoreError::VersionConflict {
                user_id: portfolio.user_id.clone(),
                expected: expected_version,
                actual,
            });
        }
        let next = actual.map_or(1, |v| v + 1);
        documents.insert(portfolio.user_id.clone(), (next, json));
        Ok(next)
    }
}

/// Load (or create) a user's portfolio, complete a mission and save it,
/// retrying the whole read-modify-write on version conflicts up to
/// `config.max_save_attempts` times.
///
/// Replays of an already completed mission are not written back.
pub fn record_mission_completion<S: PortfolioStore + ?Sized>(
    store: &S,
    engine: &ProgressionEngine,
    user_id: &str,
    mission_id: &str,
    config: &EngineConfig,
) -> Result<CompletionOutcome, StoreError> {
    let max_attempts = config.max_save_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let (mut portfolio, expected_version) = match store.load(user_id)? {
            Some(stored) => (stored.portfolio, Some(stored.version)),
            None => (engine.initialize_salvation_portfolio(user_id), None),
        };

        let outcome = engine.complete_mission(&mut portfolio, mission_id)?;
        if outcome.already_completed {
            return Ok(outcome);
        }

        match store.save(&portfolio, expected_version) {
            Ok(version) => {
                log::debug!(
                    "Saved portfolio for {} at version {} (attempt {})",
                    user_id,
                    version,
                    attempt
                );
                return Ok(outcome);
            }
            Err(StoreError::VersionConflict { .. }) if attempt < max_attempts => {
                log::warn!(
                    "Version conflict saving {} for {} (attempt {}/{}); retrying",
                    mission_id,
                    user_id,
                    attempt,
                    max_attempts
                );
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use std::cell::Cell;

    /// Lets another writer slip in before the first `n` saves.
    struct ContendedStore {
        inner: InMemoryPortfolioStore,
        engine: ProgressionEngine,
        rival_missions: Vec<&'static str>,
        interruptions: Cell<usize>,
    }

    impl PortfolioStore for ContendedStore {
        fn load(&self, user_id: &str) -> Result<Option<StoredPortfolio>, StoreError> {
            self.inner.load(user_id)
        }

        fn save(
            &self,
            portfolio: &SalvationPortfolio,
            expected_version: Option<u64>,
        ) -> Result<u64, StoreError> {
            let n = self.interruptions.get();
            if let Some(rival) = self.rival_missions.get(n) {
                self.interruptions.set(n + 1);
                let current = self.inner.load(&portfolio.user_id)?;
                let (mut theirs, version) = match current {
                    Some(s) => (s.portfolio, Some(s.version)),
                    None => (
                        self.engine.initialize_salvation_portfolio(&portfolio.user_id),
                        None,
                    ),
                };
                self.engine.complete_mission(&mut theirs, rival)?;
                self.inner.save(&theirs, version)?;
            }
            self.inner.save(portfolio, expected_version)
        }
    }

    #[test]
    fn test_first_save_creates_version_one() {
        let store = InMemoryPortfolioStore::new();
        let engine = ProgressionEngine::builtin();
        let p = engine.initialize_salvation_portfolio("fan-1");
        assert_eq!(store.save(&p, None).unwrap(), 1);
        assert_eq!(store.save(&p, Some(1)).unwrap(), 2);
        let loaded = store.load("fan-1").unwrap().unwrap();
        assert_eq!(loaded.version, 2);
        assert_eq!(loaded.portfolio, p);
        assert!(store.load("fan-2").unwrap().is_none());
    }

    #[test]
    fn test_stale_save_conflicts() {
        let store = InMemoryPortfolioStore::new();
        let engine = ProgressionEngine::builtin();
        let p = engine.initialize_salvation_portfolio("fan-1");
        store.save(&p, None).unwrap();
        let err = store.save(&p, None).unwrap_err();
        assert!(matches!(
            err,
            StoreError::VersionConflict {
                expected: None,
                actual: Some(1),
                ..
            }
        ));
    }

    #[test]
    fn test_record_completion_persists() {
        let store = InMemoryPortfolioStore::new();
        let engine = ProgressionEngine::builtin();
        let config = EngineConfig::default();
        let outcome =
            record_mission_completion(&store, &engine, "fan-1", "trust-2017-m1", &config).unwrap();
        assert!(outcome.hope_shard.is_some());

        let stored = store.load("fan-1").unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.portfolio.vri.total, 150);
        assert_eq!(stored.portfolio.hope_shards.len(), 1);

        let replay =
            record_mission_completion(&store, &engine, "fan-1", "trust-2017-m1", &config).unwrap();
        assert!(replay.already_completed);
        assert_eq!(store.load("fan-1").unwrap().unwrap().version, 1);
    }

    #[test]
    fn test_record_completion_retries_after_concurrent_write() {
        let engine = ProgressionEngine::builtin();
        let store = ContendedStore {
            inner: InMemoryPortfolioStore::new(),
            engine: engine.clone(),
            rival_missions: vec!["trust-2017-m2"],
            interruptions: Cell::new(0),
        };
        let config = EngineConfig::default();
        record_mission_completion(&store, &engine, "fan-1", "trust-2017-m1", &config).unwrap();

        let stored = store.load("fan-1").unwrap().unwrap();
        let trust = stored.portfolio.branch("trust-2017").unwrap();
        assert!(trust.has_completed("trust-2017-m1"));
        assert!(trust.has_completed("trust-2017-m2"));
        assert_eq!(stored.portfolio.vri.total, 350);
        assert_eq!(stored.version, 2);
        engine.verify_portfolio(&stored.portfolio).unwrap();
    }

    #[test]
    fn test_record_completion_gives_up_after_budget() {
        let engine = ProgressionEngine::builtin();
        let store = ContendedStore {
            inner: InMemoryPortfolioStore::new(),
            engine: engine.clone(),
            rival_missions: vec!["trust-2017-m2", "trust-2017-m3"],
            interruptions: Cell::new(0),
        };
        let config = EngineConfig {
            max_save_attempts: 2,
            ..EngineConfig::default()
        };
        let err = record_mission_completion(&store, &engine, "fan-1", "trust-2017-m1", &config)
            .unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { .. }));
    }

    #[test]
    fn test_record_completion_unknown_mission() {
        let store = InMemoryPortfolioStore::new();
        let engine = ProgressionEngine::builtin();
        let err = record_mission_completion(
            &store,
            &engine,
            "fan-1",
            "missing",
            &EngineConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Engine(EngineError::NotFound { .. })
        ));
        assert!(store.load("fan-1").unwrap().is_none());
    }
}
