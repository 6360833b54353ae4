//! Episode drivers and per-episode accounting

use crate::decision::{DecisionLoop, StepOutcome};
use crate::telemetry::TelemetryPort;
use flowsteer_common::{SimTime, TeResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Running totals over one episode
#[derive(Debug, Clone, Default)]
pub struct EpisodeMetrics {
    steps: u64,
    reward_sum: f64,
    max_utilization: f64,
    mean_latency: f64,
    time: SimTime,
    reroutes_requested: u64,
    reroutes_succeeded: u64,
}

/// Summary of a finished episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    /// Steps that read the network, gated ones included
    pub steps: u64,
    /// Mean per-step reward
    pub mean_reward: f64,
    /// Peak utilization after the last step
    pub final_max_utilization: f64,
    /// Mean latency after the last step
    pub final_mean_latency: f64,
    /// Simulation time of the last step
    pub final_time: SimTime,
    /// Reroute requests issued
    pub reroutes_requested: u64,
    /// Reroute requests the source accepted
    pub reroutes_succeeded: u64,
}

impl EpisodeMetrics {
    /// Create empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one step
    pub fn add_step(&mut self, outcome: &StepOutcome) {
        self.steps += 1;
        self.reward_sum += outcome.reward;
        self.max_utilization = outcome.info.max_utilization;
        self.mean_latency = outcome.info.mean_latency;
        self.time = outcome.info.time;
        self.reroutes_requested += outcome.info.reroutes.len() as u64;
        self.reroutes_succeeded += outcome.info.reroutes.iter().filter(|r| r.rerouted).count() as u64;
    }

    /// Steps counted so far
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Summarize
    pub fn summary(&self) -> EpisodeSummary {
        let mean_reward = if self.steps == 0 {
            0.0
        } else {
            self.reward_sum / self.steps as f64
        };
        EpisodeSummary {
            steps: self.steps,
            mean_reward,
            final_max_utilization: self.max_utilization,
            final_mean_latency: self.mean_latency,
            final_time: self.time,
            reroutes_requested: self.reroutes_requested,
            reroutes_succeeded: self.reroutes_succeeded,
        }
    }
}

/// Tracks progress between steps; returns `true` when the episode is over
fn record(metrics: &mut EpisodeMetrics, last_time: &mut Option<SimTime>, outcome: &StepOutcome) -> bool {
    if outcome.info.early_exit {
        return true;
    }
    if let Some(prev) = *last_time {
        if outcome.info.time <= prev {
            warn!(time = outcome.info.time, prev, "simulation time did not advance");
        }
    }
    *last_time = Some(outcome.info.time);
    metrics.add_step(outcome);
    outcome.done
}

/// Step until the source stops or `max_steps` steps have run
pub fn run_episode<P: TelemetryPort>(decision: &mut DecisionLoop<P>, max_steps: u64) -> TeResult<EpisodeSummary> {
    let mut metrics = EpisodeMetrics::new();
    let mut last_time = None;

    for _ in 0..max_steps {
        let outcome = decision.step()?;
        if record(&mut metrics, &mut last_time, &outcome) {
            break;
        }
    }

    let summary = metrics.summary();
    info!(
        steps = summary.steps,
        mean_reward = summary.mean_reward,
        final_max_utilization = summary.final_max_utilization,
        final_mean_latency = summary.final_mean_latency,
        "episode finished"
    );
    Ok(summary)
}

/// Like [`run_episode`], but paces steps on a wall-clock `period`
pub async fn run_periodic<P: TelemetryPort>(
    decision: &mut DecisionLoop<P>,
    period: Duration,
    max_steps: u64,
) -> TeResult<EpisodeSummary> {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut metrics = EpisodeMetrics::new();
    let mut last_time = None;

    for _ in 0..max_steps {
        interval.tick().await;
        let outcome = decision.step()?;
        if record(&mut metrics, &mut last_time, &outcome) {
            break;
        }
    }

    let summary = metrics.summary();
    info!(steps = summary.steps, mean_reward = summary.mean_reward, "periodic episode finished");
    Ok(summary)
}
