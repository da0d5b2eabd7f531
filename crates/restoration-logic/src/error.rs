//! Error types for catalog loading, progression, configuration and storage.
//!
//! The engine itself only ever fails with [`EngineError`]: an unknown id
//! ([`EngineError::NotFound`]) or a portfolio that does not match the catalog
//! ([`EngineError::InvariantViolation`]). Replays and empty lookups are normal
//! return values, never errors.

use std::{fmt, io, path::PathBuf};

use thiserror::Error;

/// Which kind of catalog entity a lookup failed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Branch,
    Mission,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Branch => f.write_str("Branch"),
            EntityKind::Mission => f.write_str("Mission"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("NotFound:{kind} `{id}`")]
    NotFound { kind: EntityKind, id: String },
    #[error("InvariantViolation: {0}")]
    InvariantViolation(String),
}

impl EngineError {
    pub fn branch_not_found(id: impl Into<String>) -> Self {
        EngineError::NotFound {
            kind: EntityKind::Branch,
            id: id.into(),
        }
    }

    pub fn mission_not_found(id: impl Into<String>) -> Self {
        EngineError::NotFound {
            kind: EntityKind::Mission,
            id: id.into(),
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        EngineError::InvariantViolation(message.into())
    }
}

/// Reference data that failed to load or failed validation.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read catalog from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("catalog `{0}` has no entries")]
    Empty(&'static str),
    #[error("duplicate {kind} id `{id}`")]
    DuplicateId { kind: EntityKind, id: String },
    #[error("mission `{mission_id}` references unknown branch `{branch_id}`")]
    UnknownBranch {
        mission_id: String,
        branch_id: String,
    },
    #[error("branch `{0}` must have maxVRI > 0")]
    InvalidMaxVri(String),
    #[error("mission `{0}` must have vriReward > 0")]
    InvalidReward(String),
    #[error("mission `{mission_id}` disagrees with its branch: {detail}")]
    TemplateMismatch { mission_id: String, detail: String },
    #[error("catalog `{0}` VRI total does not fit in 32 bits")]
    VriOverflow(&'static str),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse engine config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid value `{value}` for {key}")]
    InvalidValue { key: &'static str, value: String },
}

/// Failures at the persistence boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("portfolio for `{user_id}` changed concurrently (expected version {expected:?}, found {actual:?})")]
    VersionConflict {
        user_id: String,
        expected: Option<u64>,
        actual: Option<u64>,
    },
    #[error("portfolio document could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_names_kind() {
        let err = EngineError::mission_not_found("trust-2017-m9");
        assert_eq!(err.to_string(), "NotFound:Mission `trust-2017-m9`");
        let err = EngineError::branch_not_found("nowhere");
        assert_eq!(err.to_string(), "NotFound:Branch `nowhere`");
    }

    #[test]
    fn test_engine_error_converts_into_store_error() {
        let err: StoreError = EngineError::invariant("missing branch").into();
        assert!(matches!(
            err,
            StoreError::Engine(EngineError::InvariantViolation(_))
        ));
    }
}
