//! Catalog loading — embedded reference data with optional file overrides.
//!
//! Branches and missions ship inside the binary (`data/*.json`). A deployment
//! may point `RESTORATION_BRANCHES_PATH` / `RESTORATION_MISSIONS_PATH` at
//! replacement files; if those fail to load or validate, the built-in data is
//! used and a warning is logged. Catalogs are loaded once at startup and
//! shared behind `Arc`.

use std::{
    env,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::branch::BranchCatalog;
use crate::error::CatalogError;
use crate::mission::MissionCatalog;

pub const BUILTIN_BRANCHES: &str = include_str!("../../../data/branches.json");
pub const BUILTIN_MISSIONS: &str = include_str!("../../../data/missions.json");

pub const BRANCHES_PATH_ENV: &str = "RESTORATION_BRANCHES_PATH";
pub const MISSIONS_PATH_ENV: &str = "RESTORATION_MISSIONS_PATH";

/// Where the active catalogs came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogSource {
    Builtin,
    Files {
        branches: Option<PathBuf>,
        missions: Option<PathBuf>,
    },
}

/// A matched pair of branch and mission catalogs.
#[derive(Debug, Clone)]
pub struct CatalogSet {
    pub branches: Arc<BranchCatalog>,
    pub missions: Arc<MissionCatalog>,
    pub source: CatalogSource,
}

impl CatalogSet {
    pub fn builtin() -> Self {
        let branches = BranchCatalog::builtin();
        let missions = MissionCatalog::builtin(&branches);
        Self {
            branches,
            missions,
            source: CatalogSource::Builtin,
        }
    }

    /// Load catalogs, taking each from `path` when given and from the
    /// embedded data otherwise. Missions are always validated against the
    /// branches actually loaded.
    pub fn load(
        branches_path: Option<&Path>,
        missions_path: Option<&Path>,
    ) -> Result<Self, CatalogError> {
        let branches = match branches_path {
            Some(path) => BranchCatalog::from_file(path)?,
            None => BranchCatalog::from_json_str(BUILTIN_BRANCHES)?,
        };
        let missions = match missions_path {
            Some(path) => MissionCatalog::from_file(path, &branches)?,
            None => MissionCatalog::from_json_str(BUILTIN_MISSIONS, &branches)?,
        };
        let source = if branches_path.is_none() && missions_path.is_none() {
            CatalogSource::Builtin
        } else {
            CatalogSource::Files {
                branches: branches_path.map(Path::to_path_buf),
                missions: missions_path.map(Path::to_path_buf),
            }
        };
        Ok(Self {
            branches: Arc::new(branches),
            missions: Arc::new(missions),
            source,
        })
    }
}

pub fn load_catalogs_from_env() -> CatalogSet {
    load_catalogs_from_lookup(|key| env::var(key).ok())
}

/// Same as [`load_catalogs_from_env`], reading the override paths from
/// `lookup` instead of the process environment.
pub fn load_catalogs_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> CatalogSet {
    let branches_path = lookup(BRANCHES_PATH_ENV).map(PathBuf::from);
    let missions_path = lookup(MISSIONS_PATH_ENV).map(PathBuf::from);

    if branches_path.is_some() || missions_path.is_some() {
        match CatalogSet::load(branches_path.as_deref(), missions_path.as_deref()) {
            Ok(set) => {
                log::info!(
                    "catalogs loaded from files: {} branches, {} missions",
                    set.branches.len(),
                    set.missions.len()
                );
                return set;
            }
            Err(err) => {
                log::warn!(
                    "catalog override failed ({:?}, {:?}): {}; using builtin data",
                    branches_path,
                    missions_path,
                    err
                );
            }
        }
    }

    let set = CatalogSet::builtin();
    log::info!(
        "catalogs loaded from builtin data: {} branches, {} missions",
        set.branches.len(),
        set.missions.len()
    );
    set
}
