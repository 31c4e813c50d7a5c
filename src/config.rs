//! Configuration management for Floodgate.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{FloodgateError, Result};
use crate::throttle::ThrottlePolicy;

/// Main configuration for a throttle store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloodgateConfig {
    /// Policy applied when a route has no override
    #[serde(default)]
    pub default_policy: ThrottlePolicy,

    /// Background sweep interval in milliseconds
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Per-route policy overrides, keyed by route name
    #[serde(default)]
    pub routes: HashMap<String, ThrottlePolicy>,
}

impl Default for FloodgateConfig {
    fn default() -> Self {
        Self {
            default_policy: ThrottlePolicy::default(),
            sweep_interval_ms: default_sweep_interval_ms(),
            routes: HashMap::new(),
        }
    }
}

fn default_sweep_interval_ms() -> u64 {
    60_000
}

impl FloodgateConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading throttle configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: FloodgateConfig = serde_yaml::from_str(yaml)
            .map_err(|e| FloodgateError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every policy and tunable in the configuration.
    pub fn validate(&self) -> Result<()> {
        self.default_policy.validate()?;
        for (route, policy) in &self.routes {
            policy.validate().map_err(|e| {
                FloodgateError::Config(format!("Invalid policy for route '{}': {}", route, e))
            })?;
        }
        if self.sweep_interval_ms < 1 {
            return Err(FloodgateError::Config(
                "sweep_interval_ms must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The policy for a route, falling back to the default.
    pub fn policy_for(&self, route: &str) -> ThrottlePolicy {
        self.routes
            .get(route)
            .copied()
            .unwrap_or(self.default_policy)
    }

    /// The sweep interval as a [`Duration`].
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}
