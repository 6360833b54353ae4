//! Reward shaping from before/after snapshots

use crate::snapshot::NetworkStateSnapshot;
use flowsteer_common::finite_or_zero;
use serde::{Deserialize, Serialize};

/// Reward weights and clip bound
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardWeights {
    /// Weight of mean-latency improvement
    pub latency: f64,
    /// Weight of peak-utilization reduction
    pub congestion: f64,
    /// Total is clamped to [-clip, clip]
    pub clip: f64,
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self {
            latency: 0.7,
            congestion: 0.3,
            clip: 100.0,
        }
    }
}

/// Reward breakdown for one step
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardComponents {
    /// `mean(prev latency) − mean(curr latency)`
    pub latency_reward: f64,
    /// `max(prev utilization) − max(curr utilization)`
    pub congestion_reward: f64,
    /// Weighted, clipped total
    pub total: f64,
}

/// Computes a bounded reward from two snapshots of the same step
#[derive(Debug, Clone, Default)]
pub struct RewardEvaluator {
    weights: RewardWeights,
}

impl RewardEvaluator {
    /// Create evaluator
    pub fn new(weights: RewardWeights) -> Self {
        Self { weights }
    }

    /// Weights in use
    pub fn weights(&self) -> &RewardWeights {
        &self.weights
    }

    /// Reward for moving from `prev` to `curr`; always finite and within the clip
    pub fn evaluate(&self, prev: &NetworkStateSnapshot, curr: &NetworkStateSnapshot) -> RewardComponents {
        let latency_reward = match (prev.mean_latency(), curr.mean_latency()) {
            (Some(p), Some(c)) => finite_or_zero(p - c),
            _ => 0.0,
        };
        let congestion_reward = match (prev.max_utilization(), curr.max_utilization()) {
            (Some(p), Some(c)) => finite_or_zero(p - c),
            (Some(p), None) => finite_or_zero(p),
            (None, Some(c)) => finite_or_zero(-c),
            (None, None) => 0.0,
        };

        let clip = finite_or_zero(self.weights.clip).abs();
        let raw = self.weights.latency * latency_reward + self.weights.congestion * congestion_reward;
        let total = finite_or_zero(raw).clamp(-clip, clip);

        RewardComponents {
            latency_reward,
            congestion_reward,
            total,
        }
    }
}
