use std::{
    fs::File,
    path::{Path, PathBuf},
};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    RacecraftError,
    corners::CornerDetectionConfig,
    fuel::FuelStrategyConfig,
    telemetry::InputScale,
    tires::{CompoundKind, TireAnalysisConfig, TireCompound},
};

const CONFIG_DIR_NAME: &str = "racecraft";
const CONFIG_FILE_NAME: &str = "config.json";

/// Thresholds and tables used by a session analysis.
///
/// Every section falls back to its defaults when missing from the file, so a
/// config only needs the values it changes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub input_scale: InputScale,
    pub tires: TireAnalysisConfig,
    pub fuel: FuelStrategyConfig,
    pub corners: CornerDetectionConfig,
    /// Replace the built-in characteristics of these compounds
    pub compounds: Vec<TireCompound>,
}

impl AnalysisConfig {
    /// Default location of the config file, `None` when the platform has no
    /// config directory.
    pub fn default_path() -> Option<PathBuf> {
        Some(
            dirs::config_dir()?
                .join(CONFIG_DIR_NAME)
                .join(CONFIG_FILE_NAME),
        )
    }

    /// Load the config from the user's config directory if one was saved.
    pub fn from_local_file() -> Result<Option<Self>, RacecraftError> {
        let config_path = Self::default_path().ok_or(RacecraftError::NoConfigDir)?;
        if !config_path.exists() {
            debug!("No config file at {}", config_path.display());
            return Ok(None);
        }
        Self::from_path(&config_path).map(Some)
    }

    pub fn from_path(path: &Path) -> Result<Self, RacecraftError> {
        info!("Loading analysis config from {}", path.display());
        let file = File::open(path).map_err(|e| RacecraftError::ConfigIOError { source: e })?;
        let config: Self = serde_json::from_reader(file)
            .map_err(|e| RacecraftError::ConfigSerializeError { source: e })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the analysis would divide by or project with.
    pub fn validate(&self) -> Result<(), RacecraftError> {
        if !(0. ..1.).contains(&self.tires.minimum_usable_wear) {
            return Err(RacecraftError::InvalidConfig {
                field: "tires.minimum_usable_wear".to_string(),
                reason: "must be at least 0 and below 1".to_string(),
            });
        }
        self.fuel.validate()
    }

    pub fn save(&self) -> Result<(), RacecraftError> {
        let config_path = Self::default_path().ok_or(RacecraftError::NoConfigDir)?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), RacecraftError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RacecraftError::ConfigIOError { source: e })?;
        }
        let file = File::create(path).map_err(|e| RacecraftError::ConfigIOError { source: e })?;
        serde_json::to_writer_pretty(file, self)
            .map_err(|e| RacecraftError::ConfigSerializeError { source: e })
    }

    /// Compound characteristics, preferring a configured override.
    pub fn compound(&self, kind: CompoundKind) -> TireCompound {
        self.compounds
            .iter()
            .find(|c| c.kind == kind)
            .cloned()
            .unwrap_or_else(|| TireCompound::builtin(kind))
    }
}
