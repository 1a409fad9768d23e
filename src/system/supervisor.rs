use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use color_eyre::Result;
use color_eyre::eyre::eyre;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, Signal, System};
use tracing::{error, info, warn};

use crate::config::{TargetConfig, TimingConfig};
use crate::system::monitor::ResourceMonitor;

/// Poll interval while waiting out the graceful-stop grace period.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Lifecycle of the monitored process. Transitions are monotonic and only
/// ever written by the supervisor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessState {
    NotStarted,
    Running,
    Stopping,
    Stopped,
    Failed,
}

/// Starts, health-checks, and terminates the monitored external process.
/// Termination is always two-phase: SIGTERM, a fixed grace period, then
/// SIGKILL with an unconditional wait.
pub struct ProcessSupervisor {
    target: TargetConfig,
    timing: TimingConfig,
    child: Option<Child>,
    state: ProcessState,
    start_time: Option<Instant>,
    signals_sent: u32,
    sys: System,
}

impl ProcessSupervisor {
    pub fn new(target: TargetConfig, timing: TimingConfig) -> Self {
        ProcessSupervisor {
            target,
            timing,
            child: None,
            state: ProcessState::NotStarted,
            start_time: None,
            signals_sent: 0,
            sys: System::new(),
        }
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(|c| c.id())
    }

    /// Number of graceful-terminate signals issued so far. Stays at one per
    /// process no matter how many times `stop` is called.
    pub fn signals_sent(&self) -> u32 {
        self.signals_sent
    }

    /// Launches the target and waits out a short grace window; an exit inside
    /// that window is a startup failure. Resource usage is logged immediately
    /// before and after for comparison.
    pub fn start(&mut self, monitor: &mut ResourceMonitor) -> Result<()> {
        // One process per supervisor; a second spawn would leak the first.
        if self.state != ProcessState::NotStarted {
            return Err(eyre!("target already started (state {:?})", self.state));
        }
        monitor.log_usage("before target startup");

        let mut cmd = Command::new(&self.target.binary);
        cmd.args(&self.target.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.target.workdir {
            cmd.current_dir(dir);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                self.transition(ProcessState::Failed);
                return Err(eyre!(
                    "failed to launch {}: {err}",
                    self.target.binary.display()
                ));
            }
        };

        info!(
            pid = child.id(),
            "target launched, waiting {}s startup grace window",
            self.timing.startup_grace_secs
        );
        thread::sleep(self.timing.startup_grace());

        match child.try_wait() {
            Ok(Some(status)) => {
                self.transition(ProcessState::Failed);
                Err(eyre!("target exited during startup grace window: {status}"))
            }
            Ok(None) => {
                self.start_time = Some(Instant::now());
                self.child = Some(child);
                self.transition(ProcessState::Running);
                monitor.log_usage("after target startup");
                Ok(())
            }
            Err(err) => {
                // Can't tell whether the child is alive; don't leak it.
                let _ = child.kill();
                let _ = child.wait();
                self.transition(ProcessState::Failed);
                Err(eyre!("failed to poll target after launch: {err}"))
            }
        }
    }

    /// Non-blocking liveness check, safe to call every scenario iteration.
    pub fn is_healthy(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Two-phase termination: SIGTERM, wait up to the stop grace period, then
    /// SIGKILL and an unconditional wait. A final resource snapshot is logged
    /// on every path. Calling `stop` on an already-stopped handle sends no
    /// signal.
    pub fn stop(&mut self, monitor: &mut ResourceMonitor) {
        if !matches!(self.state, ProcessState::Running | ProcessState::Stopping) {
            monitor.log_usage("after target shutdown");
            return;
        }
        let Some(mut child) = self.child.take() else {
            self.transition(ProcessState::Stopped);
            monitor.log_usage("after target shutdown");
            return;
        };

        self.transition(ProcessState::Stopping);
        let pid = child.id();
        info!(pid, "stopping target (SIGTERM)");
        self.signals_sent += 1;
        if !send_terminate(&mut self.sys, pid) {
            warn!(pid, "could not deliver SIGTERM (process already gone?)");
        }

        let deadline = Instant::now() + self.timing.stop_grace();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    info!(pid, "target stopped gracefully ({status})");
                    break;
                }
                Ok(None) if Instant::now() < deadline => thread::sleep(STOP_POLL_INTERVAL),
                Ok(None) => {
                    warn!(pid, "grace period elapsed, forcing shutdown (SIGKILL)");
                    let _ = child.kill();
                    match child.wait() {
                        Ok(status) => info!(pid, "target force-killed ({status})"),
                        Err(err) => error!(pid, "failed waiting for killed target: {err}"),
                    }
                    break;
                }
                Err(err) => {
                    warn!(pid, "failed to poll target during shutdown: {err}");
                    let _ = child.kill();
                    let _ = child.wait();
                    break;
                }
            }
        }

        self.transition(ProcessState::Stopped);
        if let Some(started) = self.start_time {
            info!("target uptime was {}s", started.elapsed().as_secs());
        }
        monitor.log_usage("after target shutdown");
    }

    /// Applies a state change only if it moves forward; the state machine
    /// never regresses.
    fn transition(&mut self, next: ProcessState) {
        use ProcessState::*;
        let allowed = matches!(
            (self.state, next),
            (NotStarted, Running | Failed)
                | (Running, Stopping | Stopped | Failed)
                | (Stopping, Stopped)
        );
        if allowed {
            self.state = next;
        }
    }
}

/// Delivers a graceful-terminate signal via sysinfo, falling back to a plain
/// kill on platforms without SIGTERM support.
fn send_terminate(sys: &mut System, pid: u32) -> bool {
    let sys_pid = Pid::from_u32(pid);
    let pids = [sys_pid];
    sys.refresh_processes_specifics(
        ProcessesToUpdate::Some(&pids),
        true,
        ProcessRefreshKind::nothing(),
    );
    match sys.process(sys_pid) {
        Some(process) => match process.kill_with(Signal::Term) {
            Some(delivered) => delivered,
            None => process.kill(),
        },
        None => false,
    }
}
