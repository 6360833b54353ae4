//! Full decision loop against the in-memory telemetry port

use flowsteer_common::{FlowId, FlowStats, LinkId, LinkStats};
use flowsteer_core::telemetry::{FaultPlan, FlowScenario, LinkScenario};
use flowsteer_core::{
    DecisionLoop, EngineConfig, MemoryTelemetry, Scenario, SharedRegistry, StepOutcome, TelemetryPort,
};
use std::sync::Arc;

fn flow(id: &str, latency: f64, bandwidth: f64, path: &[&str]) -> FlowScenario {
    FlowScenario {
        id: id.into(),
        src: "h1".into(),
        dst: "h2".into(),
        bandwidth,
        path: path.iter().map(|l| (*l).into()).collect(),
        latency,
        expected_latency: 20.0,
    }
}

fn network(flows: usize) -> Scenario {
    Scenario {
        links: vec![
            LinkScenario { id: "L1".into(), utilization: 0.95, capacity: 1000.0 },
            LinkScenario { id: "L2".into(), utilization: 0.40, capacity: 1000.0 },
            LinkScenario { id: "L3".into(), utilization: 0.10, capacity: 1000.0 },
        ],
        flows: (0..flows)
            .map(|i| flow(&format!("F{:02}", i), 21.0 + i as f64 * 3.0, 5.0, &["L1", "L2"]))
            .collect(),
        start_time: 0.0,
        tick: 1.0,
        end_time: None,
    }
}

fn rerouted_ids(outcome: &StepOutcome) -> Vec<&str> {
    outcome.info.reroutes.iter().map(|r| r.flow_id.as_str()).collect()
}

#[test]
fn test_budget_limits_reroutes() {
    let config = EngineConfig { k: 10, ..EngineConfig::default() };
    let mut decision = DecisionLoop::new(MemoryTelemetry::new(network(20)), &config).unwrap();

    let out = decision.step().unwrap();
    // floor(20 * 0.15) = 3, worst latency first
    assert_eq!(rerouted_ids(&out), ["F19", "F18", "F17"]);
    assert!(out.info.reroutes.iter().all(|r| r.rerouted));
}

#[test]
fn test_k_caps_below_budget() {
    let config = EngineConfig { k: 1, max_reroute_ratio: 1.0, ..EngineConfig::default() };
    let mut decision = DecisionLoop::new(MemoryTelemetry::new(network(8)), &config).unwrap();
    assert_eq!(decision.step().unwrap().info.reroutes.len(), 1);
}

#[test]
fn test_observation_length_survives_flow_churn() {
    let port = Arc::new(MemoryTelemetry::new(network(4)));
    let mut decision = DecisionLoop::new(Arc::clone(&port), &EngineConfig::default()).unwrap();
    assert_eq!(decision.observation_dim(), 3 + 4);

    port.remove_flow(&FlowId::from("F01"));
    port.upsert_flow(flow("NEW", 500.0, 5.0, &["L3"]));
    let out = decision.step().unwrap();

    assert_eq!(out.observation.len(), 7);
    assert_eq!(out.observation.latencies()[1], 0.0);
    out.observation.validate(7).unwrap();

    port.remove_flow(&FlowId::from("F00"));
    port.remove_flow(&FlowId::from("F02"));
    assert_eq!(decision.step().unwrap().observation.len(), 7);
}

#[test]
fn test_gating_follows_simulation_time() {
    let scenario = Scenario { tick: 0.5, ..network(10) };
    let mut decision = DecisionLoop::new(MemoryTelemetry::new(scenario), &EngineConfig::default()).unwrap();

    let gated: Vec<bool> = (0..5).map(|_| decision.step().unwrap().info.gated).collect();
    assert_eq!(gated, [false, true, false, true, false]);

    let metrics = decision.metrics().snapshot();
    assert_eq!(metrics.steps, 5);
    assert_eq!(metrics.gated_steps, 2);
}

#[test]
fn test_disabled_gating_decides_every_step() {
    let config = EngineConfig { update_interval: None, ..EngineConfig::default() };
    let scenario = Scenario { tick: 0.0, ..network(10) };
    let mut decision = DecisionLoop::new(MemoryTelemetry::new(scenario), &config).unwrap();

    for _ in 0..3 {
        assert!(!decision.step().unwrap().info.gated);
    }
}

#[test]
fn test_cooldown_excludes_recent_reroutes() {
    let config = EngineConfig {
        reroute_cooldown: Some(5.0),
        update_interval: None,
        ..EngineConfig::default()
    };
    let port = Arc::new(MemoryTelemetry::new(network(10)));
    let mut decision = DecisionLoop::new(Arc::clone(&port), &config).unwrap();

    assert_eq!(rerouted_ids(&decision.step().unwrap()), ["F09"]);

    // the reroute did not help, but F09 is cooling down
    port.set_flow_latency(&FlowId::from("F09"), 900.0);
    assert_eq!(rerouted_ids(&decision.step().unwrap()), ["F08"]);

    for _ in 0..3 {
        assert_ne!(rerouted_ids(&decision.step().unwrap()), ["F09"]);
    }
    // t = 5, cooldown over
    assert_eq!(rerouted_ids(&decision.step().unwrap()), ["F09"]);
}

#[test]
fn test_per_flow_faults_are_neutralized() {
    let mut faults = FaultPlan::default();
    faults.flow_faults.insert("F09".into());
    let port = MemoryTelemetry::new(network(10)).with_faults(faults);
    let mut decision = DecisionLoop::new(port, &EngineConfig::default()).unwrap();

    let out = decision.step().unwrap();
    assert_eq!(rerouted_ids(&out), ["F08"]);
    assert_eq!(out.info.scored_flows, 9);
    // pre capture, post capture and scoring each saw the fault once
    assert_eq!(out.info.neutralized_faults, 3);
    assert_eq!(out.observation.latencies()[9], 0.0);
}

#[test]
fn test_budget_counts_only_scored_flows() {
    let mut faults = FaultPlan::default();
    for i in 0..14 {
        faults.flow_faults.insert(format!("F{:02}", i).as_str().into());
    }
    let port = MemoryTelemetry::new(network(20)).with_faults(faults);
    let config = EngineConfig { max_reroute_ratio: 0.5, k: 10, ..EngineConfig::default() };
    let mut decision = DecisionLoop::new(port, &config).unwrap();

    let out = decision.step().unwrap();
    assert_eq!(out.info.scored_flows, 6);
    // floor(6 * 0.5) = 3, not floor(20 * 0.5)
    assert_eq!(rerouted_ids(&out), ["F19", "F18", "F17"]);
}

#[test]
fn test_all_flows_faulted_selects_nothing() {
    let mut faults = FaultPlan::default();
    for i in 0..5 {
        faults.flow_faults.insert(format!("F{:02}", i).as_str().into());
    }
    let port = MemoryTelemetry::new(network(5)).with_faults(faults);
    let mut decision = DecisionLoop::new(port, &EngineConfig::default()).unwrap();

    let out = decision.step().unwrap();
    assert_eq!(out.info.scored_flows, 0);
    assert!(out.info.reroutes.is_empty());
}

#[test]
fn test_link_fault_encodes_zero() {
    let mut faults = FaultPlan::default();
    faults.link_faults.insert("L1".into());
    let port = MemoryTelemetry::new(network(3)).with_faults(faults);
    let mut decision = DecisionLoop::new(port, &EngineConfig::default()).unwrap();

    let out = decision.step().unwrap();
    assert_eq!(out.observation.utilizations()[0], 0.0);
    assert!((out.observation.utilizations()[1] - 0.4).abs() < 0.01);
}

#[test]
fn test_refused_reroute_is_reported() {
    let mut faults = FaultPlan::default();
    faults.rejected_reroutes.insert("F09".into());
    let port = MemoryTelemetry::new(network(10)).with_faults(faults);
    let mut decision = DecisionLoop::new(port, &EngineConfig::default()).unwrap();

    let out = decision.step().unwrap();
    assert_eq!(rerouted_ids(&out), ["F09"]);
    assert!(!out.info.reroutes[0].rerouted);
    assert!(decision.port().rerouted().is_empty());
}

#[test]
fn test_unreachable_mid_episode() {
    let port = Arc::new(MemoryTelemetry::new(network(5)));
    let mut decision = DecisionLoop::new(Arc::clone(&port), &EngineConfig::default()).unwrap();
    decision.step().unwrap();

    port.set_faults(FaultPlan { unreachable: true, ..FaultPlan::default() });
    assert!(decision.step().unwrap_err().is_fatal());
}

#[test]
fn test_extreme_readings_stay_in_bounds() {
    let port = Arc::new(MemoryTelemetry::new(network(2)));
    port.set_link_utilization(&LinkId::from("L1"), f64::NAN);
    port.set_link_utilization(&LinkId::from("L2"), 3.5);
    port.set_flow_latency(&FlowId::from("F00"), 5e9);
    port.set_flow_latency(&FlowId::from("F01"), f64::NEG_INFINITY);

    let mut decision = DecisionLoop::new(Arc::clone(&port), &EngineConfig::default()).unwrap();
    let out = decision.step().unwrap();

    assert_eq!(out.observation.utilizations(), &[0.0, 1.0, 0.1]);
    assert!(out.observation.latencies()[0] <= 1e6);
    assert_eq!(out.observation.latencies()[1], 0.0);
    assert!(out.reward.is_finite() && out.reward.abs() <= 100.0);
}

#[test]
fn test_registry_fed_concurrently() {
    let shared = Arc::new(SharedRegistry::new());
    shared.update_link(LinkId::from("L1"), LinkStats::new("L1", 0.9, 1.0, 0.0));

    let writer = {
        let shared = Arc::clone(&shared);
        std::thread::spawn(move || {
            for i in 0..50 {
                let id = FlowId::from(format!("F{:02}", i % 10).as_str());
                let stats = FlowStats::new(id.clone(), "h1", "h2", 1.0 + i as f64, vec![LinkId::from("L1")], 30.0);
                shared.update_flow(id, stats);
            }
        })
    };

    let config = EngineConfig { update_interval: None, ..EngineConfig::default() };
    let mut decision = DecisionLoop::new(MemoryTelemetry::new(network(10)), &config)
        .unwrap()
        .with_registry(Arc::clone(&shared));
    for _ in 0..5 {
        let out = decision.step().unwrap();
        assert!(out.info.reroutes.len() <= 1);
    }
    writer.join().unwrap();

    // F09 was last written with the largest bandwidth
    let out = decision.step().unwrap();
    assert_eq!(rerouted_ids(&out), ["F09"]);
}

#[test]
fn test_arc_port_is_a_port() {
    let port: Arc<MemoryTelemetry> = Arc::new(MemoryTelemetry::new(network(2)));
    assert_eq!(port.link_ids().unwrap().len(), 3);
    assert_eq!(port.flow_ids().unwrap().len(), 2);
}
