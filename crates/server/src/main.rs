//! Housing Sandbox
//!
//! Runs a code-block script against a console host. Usage:
//!
//! ```text
//! housing-sandbox [script.json]      run a script (default: built-in demo)
//! housing-sandbox --dump             print the demo script as JSON
//! ```
//!
//! Engine settings are read from `config/engine.txt`.

mod console;
mod demo;

use anyhow::Context;
use console::ConsoleEffects;
use housing_config::EngineConfig;
use housing_scripting::{
    CodeScript, Collaborators, EventType, HostSystemVariables, MainThreadEffects, RunReport, Runtime,
    ScriptEngine, TracingSink, Trigger,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const CONFIG_PATH: &str = "config/engine.txt";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let arg = std::env::args().nth(1);
    if arg.as_deref() == Some("--dump") {
        println!("{}", serde_json::to_string_pretty(&demo::welcome_script())?);
        return Ok(());
    }

    info!("🚀 Housing sandbox starting up...");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("📂 Loading configuration from {}...", CONFIG_PATH);
    let config = EngineConfig::load_or_default(CONFIG_PATH);
    config.display();

    let mut script = match arg {
        Some(path) => load_script(&path)?,
        None => demo::welcome_script(),
    };
    script
        .load()
        .with_context(|| format!("script {} failed validation", script.name()))?;
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!(
        "✓ Script {} loaded: {} lines, {} functions",
        script.name(),
        script.line_count(),
        script.functions().len()
    );

    // Host side: the console world, reached only through the effect pump
    let system = Arc::new(HostSystemVariables::new());
    system.set_online_players(2);
    let world = Arc::new(ConsoleEffects::new(system.clone()));
    let (effects, mut pump) = MainThreadEffects::channel(world, config.effect_queue_capacity);
    let pump_task = tokio::spawn(async move { pump.run().await });

    let runtime = Runtime::start(
        config,
        Collaborators::new(Arc::new(effects), Arc::new(TracingSink), system),
    );
    let engine = ScriptEngine::new(runtime.clone());
    let script = Arc::new(script);

    // Joins are delivered in arrival order: the greet line reads back the
    // visit counter it just incremented
    let joins = vec![
        Trigger::new(EventType::PlayerJoin).by("alex"),
        Trigger::new(EventType::PlayerJoin).by("sam"),
    ];
    let others = vec![
        Trigger::new(EventType::PlayerChat).by("alex"),
        Trigger::new(EventType::Custom {
            name: "doorbell".into(),
        })
        .by("sam"),
    ];

    // Runs block on the effect pump, so they go to the blocking pool
    let mut handles = Vec::new();
    {
        let engine = engine.clone();
        let script = script.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            joins
                .into_iter()
                .map(|trigger| engine.run(&script, trigger))
                .collect::<Vec<_>>()
        }));
    }
    for trigger in others {
        let engine = engine.clone();
        let script = script.clone();
        handles.push(tokio::task::spawn_blocking(move || vec![engine.run(&script, trigger)]));
    }

    for handle in handles {
        for run in handle.await.context("script run panicked")? {
            match run {
                Ok(report) => print_report(&report),
                Err(e) => error!("Run rejected: {}", e),
            }
        }
    }

    info!("Globals: {:?}", script.globals().snapshot());
    let stats = script.stats();
    info!(
        "Script stats: {} runs, {} blocks, {} failed, deepest {}",
        stats.runs, stats.blocks_executed, stats.blocks_failed, stats.max_depth_reached
    );
    for (kind, operation, count) in runtime.statistics().snapshot() {
        info!("  {} {}: {}", kind, operation, count);
    }

    runtime.shutdown();
    drop(engine);
    drop(runtime);
    if tokio::time::timeout(Duration::from_secs(2), pump_task).await.is_err() {
        warn!("⚠️  Effect pump did not close in time");
    }

    info!("👋 Sandbox finished");
    Ok(())
}

fn load_script(path: &str) -> anyhow::Result<CodeScript> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
    let script = serde_json::from_str(&text).with_context(|| format!("parsing {}", path))?;
    Ok(script)
}

fn print_report(report: &RunReport) {
    info!(
        "Run of {}: {} lines, {} failures, {:?}",
        report.script,
        report.lines.len(),
        report.failures(),
        report.stats.elapsed
    );
    for line in &report.lines {
        for outcome in &line.outcomes {
            info!(
                "  line {} {}{} {}",
                line.number,
                "  ".repeat(outcome.depth),
                outcome.kind,
                outcome.result
            );
        }
    }
    if let Some(err) = &report.aborted {
        warn!("  aborted: {}", err);
    }
}
