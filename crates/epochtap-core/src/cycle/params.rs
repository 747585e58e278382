use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Deployment-wide cycle constants.
///
/// Loaded once from the `[cycle]` config section; every record in a store is
/// evaluated against the same values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleParams {
    /// Length of one epoch in seconds.
    #[serde(default = "default_epoch_seconds")]
    pub epoch_seconds: u64,
    /// Epochs per cycle.
    #[serde(default = "default_total_epochs")]
    pub total_epochs: u32,
    /// Taps assumed to be spent in one tapped epoch.
    #[serde(default = "default_taps_per_epoch")]
    pub taps_per_epoch: u32,
    /// Tap allowance for a whole cycle.
    #[serde(default = "default_max_taps")]
    pub max_taps: u64,
}

fn default_epoch_seconds() -> u64 {
    300
}
fn default_total_epochs() -> u32 {
    288
}
fn default_taps_per_epoch() -> u32 {
    70
}
fn default_max_taps() -> u64 {
    12_000
}

impl Default for CycleParams {
    fn default() -> Self {
        Self {
            epoch_seconds: default_epoch_seconds(),
            total_epochs: default_total_epochs(),
            taps_per_epoch: default_taps_per_epoch(),
            max_taps: default_max_taps(),
        }
    }
}

impl CycleParams {
    /// Full cycle duration in seconds.
    pub fn cycle_seconds(&self) -> u64 {
        self.epoch_seconds.saturating_mul(self.total_epochs as u64)
    }

    /// # Errors
    ///
    /// Returns an error if either the epoch length or the epoch count is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.epoch_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                key: "cycle.epoch_seconds".into(),
                message: "must be greater than zero".into(),
            });
        }
        if self.total_epochs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "cycle.total_epochs".into(),
                message: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}
