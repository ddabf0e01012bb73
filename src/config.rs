// SPDX-License-Identifier: GPL-3.0-only

//! Engine configuration

use crate::constants::{CONFIG_DIR_NAME, CONFIG_FILE_NAME};
use crate::errors::{EffectError, EffectResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Which processing path a pipeline should run on
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PathPreference {
    /// GPU when the whole chain supports it and an adapter exists, else CPU
    #[default]
    Auto,
    /// Always run the CPU algorithms
    Cpu,
    /// Always run the GPU algorithms
    Gpu,
}

impl std::str::FromStr for PathPreference {
    type Err = EffectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "gpu" => Ok(Self::Gpu),
            other => Err(EffectError::Config(format!("unknown processing path: {other}"))),
        }
    }
}

/// GPU adapter selection
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PowerPreference {
    LowPower,
    #[default]
    HighPerformance,
}

impl From<PowerPreference> for wgpu::PowerPreference {
    fn from(value: PowerPreference) -> Self {
        match value {
            PowerPreference::LowPower => wgpu::PowerPreference::LowPower,
            PowerPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Processing path for pipeline runs
    pub processing_path: PathPreference,
    /// Adapter preference when the GPU path is used
    pub power_preference: PowerPreference,
    /// Reuse an output allocation when its storage kind already matches
    pub reuse_allocations: bool,
    /// Fallback tracing filter when RUST_LOG is unset
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            processing_path: PathPreference::default(),
            power_preference: PowerPreference::default(),
            reuse_allocations: true,
            log_filter: "warn".to_string(),
        }
    }
}

impl EngineConfig {
    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load from the default location, falling back to defaults when absent
    pub fn load() -> EffectResult<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => {
                debug!("No config directory available, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from(path: &Path) -> EffectResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json(&text)?;
        info!(path = %path.display(), ?config, "Loaded engine config");
        Ok(config)
    }

    pub fn from_json(text: &str) -> EffectResult<Self> {
        serde_json::from_str(text).map_err(EffectError::from)
    }

    pub fn save(&self, path: &Path) -> EffectResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = EngineConfig::from_json(r#"{"processing_path": "cpu"}"#).unwrap();
        assert_eq!(config.processing_path, PathPreference::Cpu);
        assert!(config.reuse_allocations);
        assert_eq!(config.log_filter, "warn");
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        let err = EngineConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, EffectError::Config(_)));
    }

    #[test]
    fn test_path_preference_parse() {
        assert_eq!("GPU".parse::<PathPreference>().unwrap(), PathPreference::Gpu);
        assert!("vulkan".parse::<PathPreference>().is_err());
    }
}
