use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{error, info, warn};

use crate::config::Config;
use crate::scenario::{ChaosScenario, run_scenario};
use crate::system::monitor::ResourceMonitor;
use crate::system::supervisor::{ProcessState, ProcessSupervisor};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Init,
    PreFlight,
    Starting,
    RunningScenario,
    ShuttingDown,
    Done,
}

/// Top-level state machine: pre-flight checks, target start, scenario run,
/// guaranteed two-phase shutdown. Every path that starts the target converges
/// on `ShuttingDown`; the program never exits with the target still attached.
pub struct ChaosOrchestrator {
    config: Config,
    monitor: ResourceMonitor,
    supervisor: ProcessSupervisor,
    scenario: ChaosScenario,
    cancelled: Arc<AtomicBool>,
    state: RunState,
    aborted: bool,
}

impl ChaosOrchestrator {
    /// All shared state is passed in explicitly; independent orchestrators
    /// can run in parallel tests without touching each other.
    pub fn new(config: Config, scenario: ChaosScenario, cancelled: Arc<AtomicBool>) -> Self {
        let monitor = ResourceMonitor::new(config.thresholds.clone());
        let supervisor = ProcessSupervisor::new(config.target.clone(), config.timing.clone());
        ChaosOrchestrator {
            config,
            monitor,
            supervisor,
            scenario,
            cancelled,
            state: RunState::Init,
            aborted: false,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn aborted(&self) -> bool {
        self.aborted
    }

    pub fn process_state(&self) -> ProcessState {
        self.supervisor.state()
    }

    /// Graceful-terminate signals sent to the target over the whole run.
    pub fn termination_signals(&self) -> u32 {
        self.supervisor.signals_sent()
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Drives the full run. Returns true only if pre-flight passed, the
    /// target started, headroom held after start, and the scenario strategy
    /// succeeded without cancellation.
    pub fn run(&mut self) -> bool {
        self.state = RunState::PreFlight;
        if !self.pre_flight() || self.is_cancelled() {
            // Nothing was started, so there is nothing to shut down.
            self.aborted = true;
            self.state = RunState::Done;
            error!("aborted before target start");
            return false;
        }

        self.state = RunState::Starting;
        let mut scenario_ok = false;
        match self.supervisor.start(&mut self.monitor) {
            Err(err) => {
                error!("target failed to start: {err:#}");
                self.aborted = true;
            }
            Ok(()) => {
                let required = self.config.thresholds.memory_headroom_mb;
                let (ok, message) = self.monitor.check_headroom(required);
                info!("{message}");
                if !ok {
                    warn!("insufficient headroom after target startup, aborting run");
                    self.aborted = true;
                } else if self.is_cancelled() {
                    self.aborted = true;
                } else {
                    info!("target started with sufficient resources");
                    self.state = RunState::RunningScenario;
                    scenario_ok = run_scenario(
                        &self.scenario,
                        &mut self.monitor,
                        &mut self.supervisor,
                        &self.cancelled,
                    );
                    if !scenario_ok {
                        // Process death, pressure, emergency, or cancellation.
                        self.aborted = true;
                    }
                }
            }
        }

        // Guaranteed shutdown: runs on scenario failure, post-start abort,
        // start failure, and cancellation alike.
        self.state = RunState::ShuttingDown;
        self.supervisor.stop(&mut self.monitor);
        self.state = RunState::Done;

        if self.is_cancelled() {
            warn!("run cancelled by interrupt");
            self.aborted = true;
        }
        !self.aborted && scenario_ok
    }

    /// Headroom, pressure, and target-binary checks before anything is
    /// spawned. When the system is merely busy, waits a bounded window for
    /// resources to free up before declaring failure.
    fn pre_flight(&mut self) -> bool {
        info!("starting pre-flight resource checks");
        self.monitor.log_usage("pre-run system state");

        let binary = self.config.target.resolved_binary();
        if !binary.exists() {
            error!("target binary not found at {}", binary.display());
            return false;
        }

        let required = self.config.thresholds.memory_headroom_mb;
        let (headroom_ok, message) = self.monitor.check_headroom(required);
        info!("{message}");
        let (pressure, issues) = self.monitor.check_pressure();
        for issue in &issues {
            warn!("resource pressure: {issue}");
        }

        if headroom_ok && !pressure {
            info!("pre-flight checks passed");
            return true;
        }

        let timeout = self.config.timing.wait_timeout();
        info!(
            "system not ready, waiting up to {}s for resources",
            timeout.as_secs()
        );
        if self.monitor.wait_until_available(timeout) {
            info!("pre-flight checks passed after wait");
            true
        } else {
            error!("pre-flight failed: system not healthy for stress testing");
            false
        }
    }
}
