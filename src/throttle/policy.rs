//! Throttle policy definition and validation.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{FloodgateError, Result};

/// Default maximum requests per window when no policy is configured.
pub const DEFAULT_MAX_REQUESTS: u32 = 100;
/// Default window length when no policy is configured.
pub const DEFAULT_WINDOW_MS: u64 = 60_000;

/// A fixed-window throttle policy.
///
/// A policy is supplied by the caller per check; it is not part of an entry's
/// identity. A given key must not be checked against two different policies
/// unless the caller namespaces the key by call site (see
/// [`ThrottleStore::check_route`](super::ThrottleStore::check_route)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottlePolicy {
    /// Maximum requests allowed in one window
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Window length in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_ms: default_window_ms(),
        }
    }
}

fn default_max_requests() -> u32 {
    DEFAULT_MAX_REQUESTS
}

fn default_window_ms() -> u64 {
    DEFAULT_WINDOW_MS
}

impl ThrottlePolicy {
    /// Create a new policy.
    pub fn new(max_requests: u32, window_ms: u64) -> Self {
        Self {
            max_requests,
            window_ms,
        }
    }

    /// Validate the policy bounds.
    ///
    /// Both `max_requests` and `window_ms` must be at least 1; anything else
    /// would produce nonsensical remaining counts or zero-length windows.
    pub fn validate(&self) -> Result<()> {
        if self.max_requests < 1 {
            return Err(FloodgateError::Policy(format!(
                "max_requests must be >= 1, got {}",
                self.max_requests
            )));
        }
        if self.window_ms < 1 {
            return Err(FloodgateError::Policy(format!(
                "window_ms must be >= 1, got {}",
                self.window_ms
            )));
        }
        Ok(())
    }

    /// The window length as a [`Duration`].
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}
