//! Engine configuration

use crate::reward::RewardWeights;
use crate::scorer::ScoringMode;
use crate::selector::SelectorConfig;
use flowsteer_common::{SimTime, TeError, TeResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Decision loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum fraction of known flows rerouted per decision
    pub max_reroute_ratio: f64,
    /// Minimum simulation time between decisions; `null` disables gating
    pub update_interval: Option<SimTime>,
    /// Caller cap on reroutes per step
    pub k: usize,
    /// Trailing window for flow latency reads
    pub latency_window: f64,
    /// Trailing window for link utilization reads
    pub utilization_window: f64,
    /// Scoring strategy
    pub scoring: ScoringMode,
    /// Reward shaping
    pub reward: RewardWeights,
    /// Time a rerouted flow stays ineligible; `null` disables
    pub reroute_cooldown: Option<SimTime>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_reroute_ratio: 0.15,
            update_interval: Some(1.0),
            k: 10,
            latency_window: 5.0,
            utilization_window: 5.0,
            scoring: ScoringMode::LatencyRatio,
            reward: RewardWeights::default(),
            reroute_cooldown: None,
        }
    }
}

impl EngineConfig {
    /// Load from file
    pub fn load(path: impl AsRef<Path>) -> TeResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save to file
    pub fn save(&self, path: impl AsRef<Path>) -> TeResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the loop cannot run with
    pub fn validate(&self) -> TeResult<()> {
        if !(self.max_reroute_ratio > 0.0 && self.max_reroute_ratio <= 1.0) {
            return Err(TeError::Config(format!(
                "max_reroute_ratio must be in (0, 1], got {}",
                self.max_reroute_ratio
            )));
        }
        let non_negative = [
            ("update_interval", self.update_interval.unwrap_or(0.0)),
            ("reroute_cooldown", self.reroute_cooldown.unwrap_or(0.0)),
            ("latency_window", self.latency_window),
            ("utilization_window", self.utilization_window),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(TeError::Config(format!("{} must be finite and >= 0, got {}", name, value)));
            }
        }
        let RewardWeights { latency, congestion, clip } = self.reward;
        if ![latency, congestion, clip].iter().all(|w| w.is_finite()) || clip < 0.0 {
            return Err(TeError::Config("reward weights must be finite with clip >= 0".into()));
        }
        Ok(())
    }

    /// Selection policy part of the configuration
    pub fn selector(&self) -> SelectorConfig {
        SelectorConfig {
            max_reroute_ratio: self.max_reroute_ratio,
            update_interval: self.update_interval,
            reroute_cooldown: self.reroute_cooldown,
        }
    }
}
