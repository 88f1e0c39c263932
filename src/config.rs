//! Runtime configuration for the compute context and the extraction stages

use crate::compute::QueuePolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {error}")]
    Io { path: String, error: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

/// Adapter power preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerPreference {
    High,
    Low,
}

impl From<PowerPreference> for wgpu::PowerPreference {
    fn from(preference: PowerPreference) -> Self {
        match preference {
            PowerPreference::High => wgpu::PowerPreference::HighPerformance,
            PowerPreference::Low => wgpu::PowerPreference::LowPower,
        }
    }
}

/// Device and kernel loading settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputeConfig {
    pub power_preference: PowerPreference,
    pub force_fallback_adapter: bool,
    /// Number of command-queue lanes work can be split across
    pub queue_lanes: usize,
    /// Load kernel sources from this directory instead of the built-in copies
    pub kernel_dir: Option<PathBuf>,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            power_preference: PowerPreference::High,
            force_fallback_adapter: false,
            queue_lanes: 1,
            kernel_dir: None,
        }
    }
}

/// Isosurface extraction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub iso_value: f32,
    /// Blobs uploaded per kernel launch, capped by the device capacity
    pub blobs_per_chunk: Option<u32>,
    pub blob_policy: QueuePolicy,
    pub classify_policy: QueuePolicy,
    pub compact_policy: QueuePolicy,
    pub generate_policy: QueuePolicy,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            iso_value: 1.0,
            blobs_per_chunk: None,
            blob_policy: QueuePolicy::Single,
            classify_policy: QueuePolicy::Single,
            compact_policy: QueuePolicy::Single,
            generate_policy: QueuePolicy::Single,
        }
    }
}

/// Complete configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KarstConfig {
    pub compute: ComputeConfig,
    pub extraction: ExtractionConfig,
}

impl KarstConfig {
    /// Load and validate a TOML configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        let config = Self::from_toml_str(&raw)?;
        log::debug!("[KarstConfig] Loaded {}", path.display());
        Ok(config)
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: KarstConfig =
            toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.compute.queue_lanes == 0 {
            return Err(ConfigError::Invalid {
                field: "compute.queue_lanes".to_string(),
                reason: "at least one lane is required".to_string(),
            });
        }
        if self.extraction.blobs_per_chunk == Some(0) {
            return Err(ConfigError::Invalid {
                field: "extraction.blobs_per_chunk".to_string(),
                reason: "chunks must hold at least one blob".to_string(),
            });
        }
        if !self.extraction.iso_value.is_finite() {
            return Err(ConfigError::Invalid {
                field: "extraction.iso_value".to_string(),
                reason: "must be a finite number".to_string(),
            });
        }
        Ok(())
    }
}
