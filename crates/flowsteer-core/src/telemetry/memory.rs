//! In-memory telemetry port
//!
//! Serves a scripted network: fixed link table, per-flow latency/baseline,
//! a clock that ticks on every read and a simple reroute model. Faults can be
//! injected per flow, per link, per reroute or for the whole source.

use super::TelemetryPort;
use flowsteer_common::{
    FlowId, LinkId, NodeId, SimTime, TeResult, TelemetryError, TelemetryResult,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

fn default_capacity() -> f64 {
    1.0
}

fn default_tick() -> f64 {
    1.0
}

/// Scripted link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkScenario {
    /// Link identity
    pub id: LinkId,
    /// Normalized utilization reported by reads
    pub utilization: f64,
    /// Capacity in bandwidth units (default 1.0)
    #[serde(default = "default_capacity")]
    pub capacity: f64,
}

/// Scripted flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowScenario {
    /// Flow identity
    pub id: FlowId,
    /// Source endpoint
    pub src: NodeId,
    /// Destination endpoint
    pub dst: NodeId,
    /// Requested bandwidth
    pub bandwidth: f64,
    /// Links carrying the flow, in order
    #[serde(default)]
    pub path: Vec<LinkId>,
    /// Observed average latency
    pub latency: f64,
    /// Congestion-free baseline latency
    pub expected_latency: f64,
}

/// Whole scripted network
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scenario {
    /// Links in observation order
    pub links: Vec<LinkScenario>,
    /// Flows in enumeration order
    pub flows: Vec<FlowScenario>,
    /// Initial clock reading
    #[serde(default)]
    pub start_time: SimTime,
    /// Clock advance per `current_time()` read
    #[serde(default = "default_tick")]
    pub tick: SimTime,
    /// Source stops running once the clock reaches this time
    #[serde(default)]
    pub end_time: Option<SimTime>,
}

impl Scenario {
    /// Load a scenario from a JSON file
    pub fn load(path: impl AsRef<Path>) -> TeResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Injected faults
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    /// Every per-flow read for these flows fails
    pub flow_faults: HashSet<FlowId>,
    /// Utilization reads for these links fail
    pub link_faults: HashSet<LinkId>,
    /// Reroute requests for these flows return an error
    pub failing_reroutes: HashSet<FlowId>,
    /// Reroute requests for these flows are refused
    pub rejected_reroutes: HashSet<FlowId>,
    /// `flow_ids()` reports no collection
    pub flow_list_unavailable: bool,
    /// Every call fails with `Unreachable`
    pub unreachable: bool,
}

#[derive(Debug)]
struct MemoryState {
    scenario: Scenario,
    time: SimTime,
    stopped: bool,
    faults: FaultPlan,
    rerouted: Vec<FlowId>,
}

impl MemoryState {
    fn check_reachable(&self) -> TelemetryResult<()> {
        if self.faults.unreachable {
            return Err(TelemetryError::Unreachable("in-memory source disconnected".into()));
        }
        Ok(())
    }

    fn flow(&self, id: &FlowId) -> TelemetryResult<&FlowScenario> {
        self.check_reachable()?;
        if self.faults.flow_faults.contains(id) {
            return Err(TelemetryError::unavailable(format!("flow {}", id)));
        }
        self.scenario
            .flows
            .iter()
            .find(|f| &f.id == id)
            .ok_or_else(|| TelemetryError::unavailable(format!("unknown flow {}", id)))
    }
}

/// Telemetry port backed by a scripted scenario
#[derive(Debug)]
pub struct MemoryTelemetry {
    state: Mutex<MemoryState>,
}

impl MemoryTelemetry {
    /// Create from a scenario
    pub fn new(scenario: Scenario) -> Self {
        let time = scenario.start_time;
        Self {
            state: Mutex::new(MemoryState {
                scenario,
                time,
                stopped: false,
                faults: FaultPlan::default(),
                rerouted: Vec::new(),
            }),
        }
    }

    /// Attach a fault plan
    pub fn with_faults(self, faults: FaultPlan) -> Self {
        self.set_faults(faults);
        self
    }

    /// Replace the fault plan
    pub fn set_faults(&self, faults: FaultPlan) {
        self.state.lock().faults = faults;
    }

    /// Peek at the clock without advancing it
    pub fn now(&self) -> SimTime {
        self.state.lock().time
    }

    /// Move the clock forward
    pub fn advance(&self, dt: SimTime) {
        self.state.lock().time += dt;
    }

    /// End the episode
    pub fn stop(&self) {
        self.state.lock().stopped = true;
    }

    /// Flows successfully rerouted so far, in request order
    pub fn rerouted(&self) -> Vec<FlowId> {
        self.state.lock().rerouted.clone()
    }

    /// Drop a flow from the source
    pub fn remove_flow(&self, id: &FlowId) {
        self.state.lock().scenario.flows.retain(|f| &f.id != id);
    }

    /// Add or replace a flow
    pub fn upsert_flow(&self, flow: FlowScenario) {
        let mut state = self.state.lock();
        match state.scenario.flows.iter_mut().find(|f| f.id == flow.id) {
            Some(existing) => *existing = flow,
            None => state.scenario.flows.push(flow),
        }
    }

    /// Override a link's utilization
    pub fn set_link_utilization(&self, id: &LinkId, utilization: f64) {
        let mut state = self.state.lock();
        if let Some(link) = state.scenario.links.iter_mut().find(|l| &l.id == id) {
            link.utilization = utilization;
        }
    }

    /// Override a flow's observed latency
    pub fn set_flow_latency(&self, id: &FlowId, latency: f64) {
        let mut state = self.state.lock();
        if let Some(flow) = state.scenario.flows.iter_mut().find(|f| &f.id == id) {
            flow.latency = latency;
        }
    }
}

impl TelemetryPort for MemoryTelemetry {
    fn flow_ids(&self) -> TelemetryResult<Vec<FlowId>> {
        let state = self.state.lock();
        state.check_reachable()?;
        if state.faults.flow_list_unavailable {
            return Err(TelemetryError::unavailable("flow id list"));
        }
        Ok(state.scenario.flows.iter().map(|f| f.id.clone()).collect())
    }

    fn flow_avg_latency(&self, flow: &FlowId, _window: f64) -> TelemetryResult<f64> {
        Ok(self.state.lock().flow(flow)?.latency)
    }

    fn flow_endpoints(&self, flow: &FlowId) -> TelemetryResult<Option<(NodeId, NodeId)>> {
        let state = self.state.lock();
        state.check_reachable()?;
        if state.faults.flow_faults.contains(flow) {
            return Err(TelemetryError::unavailable(format!("flow {}", flow)));
        }
        Ok(state
            .scenario
            .flows
            .iter()
            .find(|f| &f.id == flow)
            .map(|f| (f.src.clone(), f.dst.clone())))
    }

    fn expected_latency(&self, _src: &NodeId, _dst: &NodeId, flow: &FlowId) -> TelemetryResult<f64> {
        Ok(self.state.lock().flow(flow)?.expected_latency)
    }

    fn requested_bandwidth(&self, flow: &FlowId) -> TelemetryResult<f64> {
        Ok(self.state.lock().flow(flow)?.bandwidth)
    }

    fn flow_path(&self, flow: &FlowId) -> TelemetryResult<Vec<LinkId>> {
        Ok(self.state.lock().flow(flow)?.path.clone())
    }

    fn link_ids(&self) -> TelemetryResult<Vec<LinkId>> {
        let state = self.state.lock();
        state.check_reachable()?;
        Ok(state.scenario.links.iter().map(|l| l.id.clone()).collect())
    }

    fn link_avg_utilization(&self, link_index: usize, _window: f64) -> TelemetryResult<f64> {
        let state = self.state.lock();
        state.check_reachable()?;
        let link = state
            .scenario
            .links
            .get(link_index)
            .ok_or_else(|| TelemetryError::unavailable(format!("link index {}", link_index)))?;
        if state.faults.link_faults.contains(&link.id) {
            return Err(TelemetryError::unavailable(format!("link {}", link.id)));
        }
        Ok(link.utilization)
    }

    fn current_time(&self) -> TelemetryResult<SimTime> {
        let mut state = self.state.lock();
        state.check_reachable()?;
        let now = state.time;
        let tick = state.scenario.tick;
        state.time = now + tick;
        Ok(now)
    }

    fn is_running(&self) -> TelemetryResult<bool> {
        let state = self.state.lock();
        state.check_reachable()?;
        let before_end = state.scenario.end_time.map_or(true, |end| state.time < end);
        Ok(!state.stopped && before_end)
    }

    fn reroute_flow(&self, flow: &FlowId) -> TelemetryResult<bool> {
        let mut state = self.state.lock();
        state.check_reachable()?;
        if state.faults.failing_reroutes.contains(flow) {
            return Err(TelemetryError::unavailable(format!("reroute of {}", flow)));
        }
        if state.faults.rejected_reroutes.contains(flow) {
            return Ok(false);
        }

        let Some(idx) = state.scenario.flows.iter().position(|f| &f.id == flow) else {
            return Ok(false);
        };
        let (bandwidth, path) = {
            let f = &mut state.scenario.flows[idx];
            f.latency = f.expected_latency;
            (f.bandwidth, f.path.clone())
        };
        for link in state.scenario.links.iter_mut().filter(|l| path.contains(&l.id)) {
            if link.capacity > 0.0 {
                link.utilization = (link.utilization - bandwidth / link.capacity).max(0.0);
            }
        }
        state.rerouted.push(flow.clone());
        Ok(true)
    }
}
