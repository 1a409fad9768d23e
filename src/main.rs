use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chaosmon::config::{self, Config};
use chaosmon::orchestrator::ChaosOrchestrator;
use chaosmon::scenario::{ChaosScenario, ScenarioKind, Severity};
use clap::Parser;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "chaosmon",
    about = "Resource-aware chaos scenario runner with guaranteed target cleanup"
)]
struct Cli {
    /// Chaos scenario to run
    #[arg(value_enum)]
    scenario: ScenarioKind,

    /// Scenario severity (recorded in logs; scales nothing)
    #[arg(long, value_enum, default_value_t = Severity::Medium)]
    severity: Severity,

    /// Scenario duration in seconds
    #[arg(long, default_value_t = 60)]
    duration: u64,

    /// Path to config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Target binary, overriding the configured path
    #[arg(long)]
    target: Option<PathBuf>,

    /// Minimum memory headroom in MB, overriding the configured threshold
    #[arg(long)]
    memory_headroom_mb: Option<u64>,

    /// Pre-flight resource wait timeout in seconds
    #[arg(long)]
    wait_timeout: Option<u64>,
}

fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    tracing_subscriber::fmt().with_target(false).init();

    let cli = Cli::parse();
    let config = load_config_for_cli(&cli)?;
    if cli.duration == 0 {
        return Err(eyre!("--duration must be greater than 0"));
    }

    let scenario = ChaosScenario {
        kind: cli.scenario,
        severity: cli.severity,
        duration: Duration::from_secs(cli.duration),
    };

    // The handler only sets a flag; all shutdown work happens at the
    // orchestrator's normal poll points.
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancelled);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))?;

    info!(
        scenario = scenario.kind.label(),
        severity = scenario.severity.as_str(),
        duration_secs = cli.duration,
        target = %config.target.binary.display(),
        "chaosmon starting"
    );

    let mut orchestrator = ChaosOrchestrator::new(config, scenario, cancelled);
    if orchestrator.run() {
        info!("chaos run completed successfully; target survived without resource exhaustion");
        Ok(ExitCode::SUCCESS)
    } else {
        error!("chaos run failed; check resource logs above");
        Ok(ExitCode::FAILURE)
    }
}

fn load_config_for_cli(cli: &Cli) -> Result<Config> {
    // An explicitly-requested config file must load cleanly; only the
    // implicit chaosmon.toml lookup falls back to defaults.
    let mut config = match &cli.config {
        Some(path) => config::try_load_config_from_path(path)?,
        None => config::load_config(),
    };

    if let Some(target) = &cli.target {
        config.target.binary = target.clone();
    }
    if let Some(headroom) = cli.memory_headroom_mb {
        config.thresholds.memory_headroom_mb = headroom;
    }
    if let Some(timeout) = cli.wait_timeout {
        config.timing.wait_timeout_secs = timeout;
    }

    Ok(config)
}
