//! flowsteer - runs one decision-loop episode against a scenario file

use flowsteer_core::{run_episode, DecisionLoop, EngineConfig, MemoryTelemetry, Scenario};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_SCENARIO: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/scenarios/fat-tree.json");
const MAX_STEPS: u64 = 1_000;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("flowsteer v{}", env!("CARGO_PKG_VERSION"));

    let config = match std::env::var("FLOWSTEER_CONFIG") {
        Ok(path) => EngineConfig::load(&path).unwrap_or_else(|e| {
            tracing::warn!(%path, error = %e, "config not loaded, using defaults");
            EngineConfig::default()
        }),
        Err(_) => EngineConfig::default(),
    };

    let scenario_path = std::env::var("FLOWSTEER_SCENARIO").unwrap_or_else(|_| {
        tracing::warn!("FLOWSTEER_SCENARIO not set, using bundled scenario");
        DEFAULT_SCENARIO.into()
    });
    let scenario = Scenario::load(&scenario_path)?;

    let mut decision = DecisionLoop::new(MemoryTelemetry::new(scenario), &config)?;
    let summary = run_episode(&mut decision, MAX_STEPS)?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    println!("{}", serde_json::to_string_pretty(&decision.metrics().snapshot())?);
    Ok(())
}
