//! Store-root configuration (`quarterdeck.toml`).
//!
//! Holds the reporting cadence used when opening new periods and optional
//! actor defaults for CLI use. A missing file means defaults.

use crate::core::error::QuarterdeckError;
use crate::engine::periods::PeriodType;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = "quarterdeck.toml";

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    /// Reporting cadence used by `period ensure` when no override is given.
    pub cadence: PeriodType,
    pub actor: ActorDefaults,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct ActorDefaults {
    pub user_id: Option<String>,
    pub role: Option<String>,
    pub agency_id: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cadence: PeriodType::Quarterly,
            actor: ActorDefaults::default(),
        }
    }
}

pub fn load(root: &Path) -> Result<Config, QuarterdeckError> {
    let path = root.join(CONFIG_FILE_NAME);
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = fs::read_to_string(&path)?;
    toml::from_str(&raw).map_err(|e| QuarterdeckError::Config(format!("{}: {e}", path.display())))
}

/// Writes a default config scaffold if none exists yet.
pub fn write_default(root: &Path) -> Result<(), QuarterdeckError> {
    fs::create_dir_all(root)?;
    let path = root.join(CONFIG_FILE_NAME);
    if path.exists() {
        return Ok(());
    }
    let rendered = toml::to_string_pretty(&Config::default())
        .map_err(|e| QuarterdeckError::Config(e.to_string()))?;
    fs::write(&path, rendered)?;
    Ok(())
}
