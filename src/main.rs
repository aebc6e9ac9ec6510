use std::io::{self, Read, Write};

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use recommendation_planner::{
    clustering::TermOverlapScorer,
    config::{Config, LogFormat},
    consensus::{InMemoryResolutionLog, JsonlResolutionLog, ResolutionLog},
    ImplementationPlanner, PlanInput,
};

/// Append consensus resolutions here instead of keeping them in memory.
const RESOLUTION_LOG_ENV: &str = "PLANNER_RESOLUTION_LOG";

fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Recommendation planner starting..."
    );

    let planner = ImplementationPlanner::new(&config)?;

    let mut raw = String::new();
    io::stdin().read_to_string(&mut raw)?;
    let input: PlanInput = match serde_json::from_str(&raw) {
        Ok(input) => input,
        Err(e) => {
            error!(error = %e, "Failed to parse plan input");
            return Err(e.into());
        }
    };

    let mut log: Box<dyn ResolutionLog> = match std::env::var(RESOLUTION_LOG_ENV) {
        Ok(path) if !path.trim().is_empty() => {
            info!(path = %path, "Appending resolutions to file");
            Box::new(JsonlResolutionLog::new(path))
        }
        _ => Box::new(InMemoryResolutionLog::new()),
    };

    let plan = match planner.plan(input, &mut TermOverlapScorer::new(), log.as_mut()) {
        Ok(plan) => plan,
        Err(e) => {
            error!(error = %e, "Planning failed");
            return Err(e.into());
        }
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, &plan)?;
    writeln!(out)?;

    info!(
        ordered = plan.graph.sequence.len(),
        unordered = plan.graph.statistics.unordered_count,
        "Plan written"
    );
    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
