//! Traffic-engineering decision loop
//!
//! Observes an SDN network through a [`TelemetryPort`], scores flows by how
//! much they contribute to congestion, reroutes a bounded set of the worst
//! offenders and reports a fixed-layout observation plus a shaped reward.
//!
//! # Pipeline
//!
//! - Capture a normalized snapshot of link utilization and flow latency
//! - Score flows (path impact or latency ratio) and pick the top-K under a
//!   reroute budget, at most once per update interval
//! - Request reroutes, capture again, compute the before/after reward
//! - Encode the post-action snapshot in the layout fixed at construction

#![warn(missing_docs)]

pub mod config;
pub mod decision;
pub mod episode;
pub mod metrics;
pub mod registry;
pub mod reward;
pub mod scorer;
pub mod selector;
pub mod snapshot;
pub mod telemetry;

pub use config::EngineConfig;
pub use decision::{DecisionLoop, RerouteResult, StepInfo, StepOutcome, StepPhase};
pub use episode::{run_episode, run_periodic, EpisodeMetrics, EpisodeSummary};
pub use metrics::{LoopMetrics, LoopMetricsSnapshot};
pub use registry::{AggregateState, SharedRegistry, StatRegistry};
pub use reward::{RewardComponents, RewardEvaluator, RewardWeights};
pub use scorer::{CongestionScorer, ScoreBatch, ScoredFlow, ScoringMode};
pub use selector::{CriticalFlowSelector, SelectorConfig};
pub use snapshot::{NetworkStateSnapshot, Observation, ObservationLayout, StateEncoder};
pub use telemetry::{MemoryTelemetry, Scenario, TelemetryPort};

pub use flowsteer_common::{FlowId, LinkId, NodeId, SimTime, TeError, TeResult, TelemetryError};
