use serde::{Deserialize, Serialize};
use std::time::Duration;

#[cfg(feature = "cli")]
use clap::{Args, ValueEnum};

use crate::error::PolicyError;
use crate::policy::CompletionPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "cli", derive(ValueEnum))]
pub enum CompletionMode {
    /// Ship only when every fragment arrived
    Exact,
    /// Ship once the configured fraction of fragments arrived (lossy)
    Threshold,
}

/// Assembly table tuning, read from the `[assembly]` section of the relay config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyConfig {
    #[serde(default = "default_completion")]
    pub completion: CompletionMode,
    /// Fraction of fragments required in threshold mode, in (0, 1].
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Staleness window: buffers idle longer than this are purged.
    #[serde(default = "default_max_age_ms")]
    pub max_age_ms: u64,
    /// Hard ceiling on buffers held at once.
    #[serde(default = "default_max_buffers")]
    pub max_buffers: usize,
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

fn default_completion() -> CompletionMode {
    CompletionMode::Exact
}
fn default_threshold() -> f64 {
    0.9
}
fn default_max_age_ms() -> u64 {
    200
}
fn default_max_buffers() -> usize {
    30
}
fn default_sweep_interval_ms() -> u64 {
    50
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            completion: default_completion(),
            threshold: default_threshold(),
            max_age_ms: default_max_age_ms(),
            max_buffers: default_max_buffers(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

impl AssemblyConfig {
    /// Resolve the completion policy. The threshold is validated in both modes.
    pub fn policy(&self) -> Result<CompletionPolicy, PolicyError> {
        let threshold = CompletionPolicy::threshold(self.threshold)?;
        Ok(match self.completion {
            CompletionMode::Exact => CompletionPolicy::Exact,
            CompletionMode::Threshold => threshold,
        })
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_millis(self.max_age_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }
}

/// Command-line overrides for [`AssemblyConfig`]. Unset fields keep the
/// configured value.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "cli", derive(Args))]
pub struct AssemblyOverrides {
    #[cfg_attr(feature = "cli", arg(long, value_enum))]
    pub completion: Option<CompletionMode>,
    #[cfg_attr(feature = "cli", arg(long))]
    pub threshold: Option<f64>,
    #[cfg_attr(feature = "cli", arg(long))]
    pub max_age_ms: Option<u64>,
    #[cfg_attr(feature = "cli", arg(long))]
    pub max_buffers: Option<usize>,
}

impl AssemblyOverrides {
    pub fn apply(&self, config: &mut AssemblyConfig) {
        if let Some(completion) = self.completion {
            config.completion = completion;
        }
        if let Some(threshold) = self.threshold {
            config.threshold = threshold;
        }
        if let Some(max_age_ms) = self.max_age_ms {
            config.max_age_ms = max_age_ms;
        }
        if let Some(max_buffers) = self.max_buffers {
            config.max_buffers = max_buffers;
        }
    }
}
