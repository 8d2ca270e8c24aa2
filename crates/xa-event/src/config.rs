//! Service Configuration: JSON settings for `AudioService`

use std::path::Path;

use serde::{Deserialize, Serialize};
use xa_core::{XactError, XactResult};

/// Audio service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Maximum number of loaded clips (0 = unlimited)
    #[serde(default)]
    pub max_clips: usize,

    /// Seed for variation RNGs. Unset means OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Largest tick delta passed to clips, in seconds
    #[serde(default = "default_max_step_secs")]
    pub max_step_secs: Option<f32>,
}

fn default_max_step_secs() -> Option<f32> {
    Some(0.25)
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_clips: 0,
            seed: None,
            max_step_secs: default_max_step_secs(),
        }
    }
}

impl ServiceConfig {
    pub fn from_json(json: &str) -> XactResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| XactError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> XactResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| XactError::Config(e.to_string()))
    }

    /// Load from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> XactResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    fn validate(&self) -> XactResult<()> {
        if let Some(step) = self.max_step_secs {
            if step.is_nan() || step <= 0.0 {
                return Err(XactError::Config(format!("max_step_secs must be positive, got {}", step)));
            }
        }
        Ok(())
    }

    /// Clamp a tick delta to `max_step_secs`
    #[inline]
    pub fn clamp_step(&self, dt: f32) -> f32 {
        match self.max_step_secs {
            Some(max) => dt.min(max),
            None => dt,
        }
    }

    /// Whether another clip fits next to `loaded`
    #[inline]
    pub fn has_room(&self, loaded: usize) -> bool {
        self.max_clips == 0 || loaded < self.max_clips
    }
}
