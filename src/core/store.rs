//! Store handle for a Quarterdeck reporting workspace.
//!
//! A Store is the root directory holding the reporting database, the broker
//! audit log, and the store config. All engine state is scoped to a store.

use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Store {
    /// Absolute or working-directory-relative path to the store root.
    pub root: PathBuf,
}

impl Store {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Resolve the store root: explicit `--dir`, then `QUARTERDECK_HOME`,
    /// then `./.quarterdeck/data`.
    pub fn resolve(dir: Option<PathBuf>) -> Self {
        let root = dir
            .or_else(|| env::var_os("QUARTERDECK_HOME").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(".quarterdeck").join("data"));
        Self { root }
    }
}
