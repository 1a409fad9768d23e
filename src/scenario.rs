use std::env;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use clap::ValueEnum;
use tracing::{error, info, warn};

use crate::config::ThresholdConfig;
use crate::system::monitor::{ResourceMonitor, pressure_issues};
use crate::system::snapshot::ResourceSnapshot;
use crate::system::supervisor::ProcessSupervisor;

/// The three fault-injection scenarios. A closed enum: unknown kinds are
/// rejected at argument parsing, never at dispatch time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum ScenarioKind {
    MemoryPressure,
    CpuStress,
    NetworkChaos,
}

impl ScenarioKind {
    pub fn label(self) -> &'static str {
        match self {
            ScenarioKind::MemoryPressure => "memory pressure",
            ScenarioKind::CpuStress => "CPU stress",
            ScenarioKind::NetworkChaos => "network chaos",
        }
    }

    /// Fixed monitoring cadence per scenario; also the worst-case
    /// pressure-detection latency.
    pub fn cadence(self) -> Duration {
        match self {
            ScenarioKind::MemoryPressure => Duration::from_secs(10),
            ScenarioKind::CpuStress | ScenarioKind::NetworkChaos => Duration::from_secs(5),
        }
    }
}

/// Severity is accepted and logged but intentionally scales nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ChaosScenario {
    pub kind: ScenarioKind,
    pub severity: Severity,
    pub duration: Duration,
}

/// What a scenario loop should do after looking at one snapshot.
#[derive(Debug, PartialEq)]
enum TickDecision {
    Continue,
    /// Free memory fell below the critical floor; overrides ordinary
    /// pressure handling and ends the scenario immediately.
    EmergencyAbort { available_mb: f64 },
    PressureAbort { issues: Vec<String> },
}

fn evaluate_tick(snapshot: &ResourceSnapshot, thresholds: &ThresholdConfig) -> TickDecision {
    if !snapshot.degraded && snapshot.memory_available_mb < thresholds.critical_memory_mb as f64 {
        return TickDecision::EmergencyAbort {
            available_mb: snapshot.memory_available_mb,
        };
    }
    let issues = pressure_issues(snapshot, thresholds);
    if issues.is_empty() {
        TickDecision::Continue
    } else {
        TickDecision::PressureAbort { issues }
    }
}

/// Runs the selected scenario strategy against the supervised process.
/// Returns false on process death, resource pressure, emergency abort, or
/// cancellation; the caller still performs its guaranteed shutdown.
pub fn run_scenario(
    scenario: &ChaosScenario,
    monitor: &mut ResourceMonitor,
    supervisor: &mut ProcessSupervisor,
    cancelled: &AtomicBool,
) -> bool {
    info!(
        severity = scenario.severity.as_str(),
        duration_secs = scenario.duration.as_secs(),
        "starting {} scenario",
        scenario.kind.label()
    );
    match scenario.kind {
        ScenarioKind::MemoryPressure | ScenarioKind::NetworkChaos => {
            monitor_loop(scenario.kind, scenario.duration, monitor, supervisor, cancelled)
        }
        ScenarioKind::CpuStress => run_cpu_stress(scenario, monitor, supervisor, cancelled),
    }
}

/// Shared monitoring loop: each iteration checks process health, the
/// critical-memory floor, and resource pressure, then logs usage and sleeps
/// one cadence.
fn monitor_loop(
    kind: ScenarioKind,
    duration: Duration,
    monitor: &mut ResourceMonitor,
    supervisor: &mut ProcessSupervisor,
    cancelled: &AtomicBool,
) -> bool {
    let label = kind.label();
    let cadence = kind.cadence();
    let start = Instant::now();
    let mut step = 0u32;

    while start.elapsed() < duration {
        if cancelled.load(Ordering::SeqCst) {
            info!("cancellation requested, ending {label} scenario early");
            return false;
        }
        if !supervisor.is_healthy() {
            error!("target died during {label} scenario");
            return false;
        }

        let snapshot = monitor.sample();
        match evaluate_tick(&snapshot, monitor.thresholds()) {
            TickDecision::EmergencyAbort { available_mb } => {
                error!(
                    "EMERGENCY: memory critically low ({available_mb:.1}MB), \
                     aborting {label} scenario to prevent system kill"
                );
                return false;
            }
            TickDecision::PressureAbort { issues } => {
                for issue in &issues {
                    warn!("resource pressure: {issue}");
                }
                warn!("aborting {label} scenario early under resource pressure");
                return false;
            }
            TickDecision::Continue => {}
        }

        step += 1;
        info!("{label} step {step} | {}", snapshot.summary());
        thread::sleep(cadence);
    }

    info!("{label} scenario completed");
    true
}

/// CPU stress delegates load generation to stress-ng when it is installed;
/// otherwise it degrades to monitor-only polling at the same cadence.
fn run_cpu_stress(
    scenario: &ChaosScenario,
    monitor: &mut ResourceMonitor,
    supervisor: &mut ProcessSupervisor,
    cancelled: &AtomicBool,
) -> bool {
    let generator = spawn_load_generator(scenario.duration);
    if generator.is_none() {
        info!("stress-ng not available, falling back to monitor-only polling");
    }

    let ok = monitor_loop(
        ScenarioKind::CpuStress,
        scenario.duration,
        monitor,
        supervisor,
        cancelled,
    );

    if let Some(mut child) = generator {
        if ok {
            if let Err(err) = child.wait() {
                warn!("failed waiting for load generator: {err}");
            }
        } else {
            // Aborted early; don't leave the generator loading the box.
            let _ = child.kill();
            let _ = child.wait();
        }
    }
    ok
}

fn spawn_load_generator(duration: Duration) -> Option<Child> {
    let binary = find_in_path("stress-ng")?;
    let timeout = format!("{}s", duration.as_secs());
    match Command::new(&binary)
        .args(["--cpu", "2", "--timeout", &timeout, "--quiet"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => {
            info!(pid = child.id(), "started stress-ng load generator");
            Some(child)
        }
        Err(err) => {
            warn!("found stress-ng but failed to start it: {err}");
            None
        }
    }
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}
