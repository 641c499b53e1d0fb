//! Declarative wheel geometry.
//!
//! A [`WheelConfig`] is the TOML-deserializable counterpart to the
//! programmatic [`crate::timing::TimingWheel::new`] constructor: both
//! paths run the same validation, so a host can load geometry from a
//! config file without changing any core semantics.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::scheduler::Scheduler;
use crate::timing::TimingWheel;

fn default_request_capacity() -> usize {
    1024
}

fn default_interval_ms() -> u64 {
    10
}

fn default_level_sizes() -> Vec<usize> {
    vec![64, 64, 64, 64]
}

/// Wheel geometry, as loaded from TOML or built programmatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WheelConfig {
    /// Tick period, in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Slot count of each level, lowest (finest) first. Every entry must
    /// be a power of two.
    #[serde(default = "default_level_sizes")]
    pub level_sizes: Vec<usize>,
    /// Bound on the enrolment/cancellation request channel.
    #[serde(default = "default_request_capacity")]
    pub request_capacity: usize,
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            level_sizes: default_level_sizes(),
            request_capacity: default_request_capacity(),
        }
    }
}

impl WheelConfig {
    /// Parse a config from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::config(format!("invalid wheel config: {e}")))
    }

    /// Validate geometry, raising the same three conditions the
    /// constructor itself checks.
    pub fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            return Err(Error::config("interval_ms must be positive"));
        }
        if self.request_capacity == 0 {
            return Err(Error::config("request_capacity must be positive"));
        }
        if self.level_sizes.is_empty() || !self.level_sizes.len().is_power_of_two() {
            return Err(Error::config(format!(
                "level count {} is not a power of two",
                self.level_sizes.len()
            )));
        }
        for &size in &self.level_sizes {
            if size == 0 || !size.is_power_of_two() {
                return Err(Error::config(format!(
                    "wheel level size {size} is not a power of two"
                )));
            }
        }
        Ok(())
    }

    /// This config's tick period as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Validate this config, then build a [`TimingWheel`] from it over
    /// `scheduler`. Performs the identical validation
    /// [`TimingWheel::new`] runs on a programmatically constructed
    /// geometry — there is exactly one validation path, not two.
    pub fn build(&self, scheduler: Arc<dyn Scheduler>) -> Result<TimingWheel> {
        self.validate()?;
        TimingWheel::new(scheduler, self.request_capacity, self.interval(), &self.level_sizes)
    }
}
