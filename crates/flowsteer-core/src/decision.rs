//! One control step: capture, select, act, capture, reward, encode
//!
//! Steps are strictly sequential and every telemetry call blocks. Per-item
//! telemetry faults and failed reroutes degrade the decision but never end
//! it; only an unreachable source makes `step` return an error.

use crate::config::EngineConfig;
use crate::metrics::LoopMetrics;
use crate::registry::{SharedRegistry, StatRegistry};
use crate::reward::{RewardComponents, RewardEvaluator};
use crate::scorer::{CongestionScorer, ScoreBatch, ScoringMode};
use crate::selector::CriticalFlowSelector;
use crate::snapshot::{Observation, ObservationLayout, StateEncoder};
use crate::telemetry::{list_or_empty, TelemetryPort};
use flowsteer_common::{FlowId, SimTime, TeResult};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Phases of a single step, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPhase {
    /// Snapshot before acting
    CapturePre,
    /// Scoring and selection
    Select,
    /// Reroute requests
    Act,
    /// Snapshot after acting
    CapturePost,
    /// Reward evaluation
    ScoreReward,
    /// Observation encoding
    Encode,
    /// Idle between steps
    Done,
}

/// Outcome of one reroute request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RerouteResult {
    /// Flow the request was issued for
    pub flow_id: FlowId,
    /// Whether the source accepted it
    pub rerouted: bool,
}

/// Side information returned with every step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepInfo {
    /// Simulation time of the step
    pub time: SimTime,
    /// One entry per reroute request, in request order
    pub reroutes: Vec<RerouteResult>,
    /// Mean positive latency after acting (0.0 if none)
    pub mean_latency: f64,
    /// Peak utilization after acting (0.0 if none)
    pub max_utilization: f64,
    /// Reward breakdown
    pub reward: RewardComponents,
    /// Whether the update interval suppressed selection
    pub gated: bool,
    /// Number of flows scored this step
    pub scored_flows: usize,
    /// Per-item faults neutralized this step
    pub neutralized_faults: usize,
    /// Why the episode ended, if it did
    pub termination_reason: Option<String>,
    /// The source had already stopped; nothing was read or requested
    pub early_exit: bool,
}

/// Result of one step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepOutcome {
    /// Post-action observation in the fixed layout
    pub observation: Observation,
    /// Clipped total reward
    pub reward: f64,
    /// The source reports the episode is over
    pub done: bool,
    /// Side information
    pub info: StepInfo,
}

/// Traffic-engineering control loop over a telemetry port
pub struct DecisionLoop<P> {
    port: P,
    /// Push-fed statistics for path-impact scoring
    registry: Option<Arc<SharedRegistry>>,
    scorer: CongestionScorer,
    selector: CriticalFlowSelector,
    encoder: StateEncoder,
    reward: RewardEvaluator,
    k: usize,
    latency_window: f64,
    utilization_window: f64,
    phase: StepPhase,
    last_time: Option<SimTime>,
    last_observation: Observation,
    metrics: Arc<LoopMetrics>,
}

impl<P: TelemetryPort> DecisionLoop<P> {
    /// Build the loop; the observation layout is fixed from the port's
    /// current link and flow lists
    pub fn new(port: P, config: &EngineConfig) -> TeResult<Self> {
        config.validate()?;
        let layout = ObservationLayout::from_port(&port)?;
        info!(
            links = layout.links().len(),
            flows = layout.flows().len(),
            scoring = ?config.scoring,
            "decision loop ready"
        );

        Ok(Self {
            port,
            registry: None,
            scorer: CongestionScorer::new(config.scoring, config.latency_window),
            selector: CriticalFlowSelector::new(config.selector()),
            last_observation: Observation::zeros(&layout),
            encoder: StateEncoder::new(layout, config.utilization_window, config.latency_window),
            reward: RewardEvaluator::new(config.reward),
            k: config.k,
            latency_window: config.latency_window,
            utilization_window: config.utilization_window,
            phase: StepPhase::Done,
            last_time: None,
            metrics: Arc::new(LoopMetrics::new()),
        })
    }

    /// Score from a push-fed registry instead of the port (path-impact mode)
    pub fn with_registry(mut self, registry: Arc<SharedRegistry>) -> Self {
        self.scorer = CongestionScorer::new(ScoringMode::PathImpact, self.latency_window);
        self.registry = Some(registry);
        self
    }

    /// Telemetry port
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Fixed observation layout
    pub fn layout(&self) -> &ObservationLayout {
        self.encoder.layout()
    }

    /// Observation length
    pub fn observation_dim(&self) -> usize {
        self.encoder.dimension()
    }

    /// Active scoring mode
    pub fn scoring_mode(&self) -> ScoringMode {
        self.scorer.mode()
    }

    /// Phase the last step ended in
    pub fn phase(&self) -> StepPhase {
        self.phase
    }

    /// Shared counters
    pub fn metrics(&self) -> Arc<LoopMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Forget decision history and return the current observation
    pub fn reset(&mut self) -> TeResult<Observation> {
        self.selector.reset();
        self.last_time = None;
        let now = self.read_time()?;
        let snapshot = self.encoder.capture(&self.port, now)?;
        self.last_observation = self.encoder.encode(&snapshot);
        self.phase = StepPhase::Done;
        Ok(self.last_observation.clone())
    }

    /// Run one control step
    pub fn step(&mut self) -> TeResult<StepOutcome> {
        let started = Instant::now();

        if !self.read_running()? {
            self.enter(StepPhase::Done);
            info!("telemetry source stopped, episode done");
            return Ok(self.stopped_outcome());
        }

        self.enter(StepPhase::CapturePre);
        let now = self.read_time()?;
        let pre = self.encoder.capture(&self.port, now)?;

        self.enter(StepPhase::Select);
        let gated = self.selector.is_gated(now);
        let (selected, batch) = if gated {
            (Vec::new(), ScoreBatch::default())
        } else {
            let batch = self.score()?;
            let selected = self.selector.select(
                &batch.scores,
                self.k,
                now,
                self.scorer.mode().drops_non_positive(),
            );
            (selected, batch)
        };

        self.enter(StepPhase::Act);
        let reroutes = self.act(&selected, now);

        self.enter(StepPhase::CapturePost);
        let post = self.encoder.capture(&self.port, now)?;

        self.enter(StepPhase::ScoreReward);
        let reward = self.reward.evaluate(&pre, &post);

        self.enter(StepPhase::Encode);
        let observation = self.encoder.encode(&post);
        debug_assert!(observation.validate(self.observation_dim()).is_ok());
        self.last_observation = observation.clone();

        let still_running = self.read_running()?;
        self.enter(StepPhase::Done);

        let neutralized = pre.neutralized() + post.neutralized() + batch.faults.len();
        self.metrics.record_neutralized(neutralized);
        self.metrics.record_step(started.elapsed(), gated);

        debug!(
            time = now,
            selected = selected.len(),
            reward = reward.total,
            neutralized,
            "step complete"
        );

        Ok(StepOutcome {
            observation,
            reward: reward.total,
            done: !still_running,
            info: StepInfo {
                time: now,
                reroutes,
                mean_latency: post.mean_latency().unwrap_or(0.0),
                max_utilization: post.max_utilization().unwrap_or(0.0),
                reward,
                gated,
                scored_flows: batch.len(),
                neutralized_faults: neutralized,
                termination_reason: (!still_running).then(|| "telemetry source stopped".to_string()),
                early_exit: false,
            },
        })
    }

    fn enter(&mut self, phase: StepPhase) {
        debug!(?phase, "step phase");
        self.phase = phase;
    }

    fn score(&self) -> TeResult<ScoreBatch> {
        let batch = match self.scorer.mode() {
            ScoringMode::LatencyRatio => {
                let flow_ids = list_or_empty(self.port.flow_ids(), "flow ids")?;
                self.scorer.score_port(&self.port, &flow_ids)?
            }
            ScoringMode::PathImpact => match &self.registry {
                Some(shared) => self.scorer.score_registry(&shared.snapshot()),
                None => {
                    let registry = StatRegistry::fetch(
                        &self.port,
                        self.layout().links(),
                        self.utilization_window,
                        self.latency_window,
                    )?;
                    self.scorer.score_registry(&registry)
                }
            },
        };
        Ok(batch)
    }

    fn act(&mut self, selected: &[FlowId], now: SimTime) -> Vec<RerouteResult> {
        selected
            .iter()
            .map(|flow_id| {
                let rerouted = match self.port.reroute_flow(flow_id) {
                    Ok(true) => true,
                    Ok(false) => {
                        warn!(flow = %flow_id, "reroute refused");
                        false
                    }
                    Err(e) => {
                        warn!(flow = %flow_id, error = %e, "reroute failed");
                        false
                    }
                };
                if rerouted {
                    self.selector.mark_rerouted(flow_id, now);
                }
                self.metrics.record_reroute(rerouted);
                RerouteResult {
                    flow_id: flow_id.clone(),
                    rerouted,
                }
            })
            .collect()
    }

    fn read_running(&self) -> TeResult<bool> {
        match self.port.is_running() {
            Ok(running) => Ok(running),
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) => {
                warn!(error = %e, "liveness unknown, assuming running");
                Ok(true)
            }
        }
    }

    fn read_time(&mut self) -> TeResult<SimTime> {
        let now = match self.port.current_time() {
            Ok(t) if t.is_finite() => t,
            Ok(t) => {
                warn!(time = t, "non-finite simulation time, keeping previous");
                self.last_time.unwrap_or(0.0)
            }
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                warn!(error = %e, "simulation time unavailable, keeping previous");
                self.last_time.unwrap_or(0.0)
            }
        };
        if let Some(last) = self.last_time {
            if now < last {
                warn!(now, last, "simulation time went backwards");
            }
        }
        self.last_time = Some(now);
        Ok(now)
    }

    fn stopped_outcome(&self) -> StepOutcome {
        let time = self.last_time.unwrap_or(0.0);
        StepOutcome {
            observation: self.last_observation.clone(),
            reward: 0.0,
            done: true,
            info: StepInfo {
                time,
                reroutes: Vec::new(),
                mean_latency: 0.0,
                max_utilization: 0.0,
                reward: RewardComponents::default(),
                gated: false,
                scored_flows: 0,
                neutralized_faults: 0,
                termination_reason: Some("telemetry source stopped".to_string()),
                early_exit: true,
            },
        }
    }
}
