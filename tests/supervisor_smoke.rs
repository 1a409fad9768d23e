use std::path::PathBuf;

use chaosmon::config::{TargetConfig, ThresholdConfig, TimingConfig};
use chaosmon::system::monitor::ResourceMonitor;
use chaosmon::system::supervisor::{ProcessState, ProcessSupervisor};

fn shell_target(script: &str) -> TargetConfig {
    #[cfg(windows)]
    {
        TargetConfig {
            binary: PathBuf::from("powershell"),
            args: vec![
                "-NoProfile".to_string(),
                "-NonInteractive".to_string(),
                "-Command".to_string(),
                script.to_string(),
            ],
            workdir: None,
        }
    }

    #[cfg(not(windows))]
    {
        TargetConfig {
            binary: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_string(), script.to_string()],
            workdir: None,
        }
    }
}

fn fast_timing() -> TimingConfig {
    TimingConfig {
        wait_timeout_secs: 0,
        startup_grace_secs: 1,
        stop_grace_secs: 3,
    }
}

#[cfg(not(windows))]
const SLEEP_30: &str = "sleep 30";
#[cfg(windows)]
const SLEEP_30: &str = "Start-Sleep -Seconds 30";

#[test]
fn start_stop_and_idempotent_stop() {
    let mut monitor = ResourceMonitor::new(ThresholdConfig::default());
    let mut sup = ProcessSupervisor::new(shell_target(SLEEP_30), fast_timing());

    sup.start(&mut monitor).expect("target should start");
    assert_eq!(sup.state(), ProcessState::Running);
    assert!(sup.pid().is_some());
    assert!(sup.is_healthy());

    sup.stop(&mut monitor);
    assert_eq!(sup.state(), ProcessState::Stopped);
    assert_eq!(sup.signals_sent(), 1);
    assert!(!sup.is_healthy());

    // Second stop must send no second signal and land in the same state.
    sup.stop(&mut monitor);
    assert_eq!(sup.state(), ProcessState::Stopped);
    assert_eq!(sup.signals_sent(), 1);
}

#[test]
fn second_start_is_rejected() {
    let mut monitor = ResourceMonitor::new(ThresholdConfig::default());
    let mut sup = ProcessSupervisor::new(shell_target(SLEEP_30), fast_timing());

    sup.start(&mut monitor).expect("target should start");
    let pid = sup.pid();

    // The running child must be left untouched by the rejected call.
    assert!(sup.start(&mut monitor).is_err());
    assert_eq!(sup.state(), ProcessState::Running);
    assert_eq!(sup.pid(), pid);
    assert!(sup.is_healthy());

    sup.stop(&mut monitor);
    assert_eq!(sup.state(), ProcessState::Stopped);
}

#[test]
fn early_exit_in_grace_window_is_startup_failure() {
    let mut monitor = ResourceMonitor::new(ThresholdConfig::default());
    let mut sup = ProcessSupervisor::new(shell_target("exit 3"), fast_timing());

    let result = sup.start(&mut monitor);
    assert!(result.is_err());
    assert_eq!(sup.state(), ProcessState::Failed);
    assert!(!sup.is_healthy());

    // Stopping a failed handle is a no-op with no signal.
    sup.stop(&mut monitor);
    assert_eq!(sup.state(), ProcessState::Failed);
    assert_eq!(sup.signals_sent(), 0);
}

#[test]
fn missing_binary_is_startup_failure() {
    let mut monitor = ResourceMonitor::new(ThresholdConfig::default());
    let target = TargetConfig {
        binary: PathBuf::from("/nonexistent/chaosmon-no-such-binary"),
        args: Vec::new(),
        workdir: None,
    };
    let mut sup = ProcessSupervisor::new(target, fast_timing());

    assert!(sup.start(&mut monitor).is_err());
    assert_eq!(sup.state(), ProcessState::Failed);
}

#[cfg(unix)]
#[test]
fn sigterm_resistant_child_is_force_killed() {
    let mut monitor = ResourceMonitor::new(ThresholdConfig::default());
    let mut sup = ProcessSupervisor::new(
        shell_target("trap '' TERM; sleep 30"),
        TimingConfig {
            wait_timeout_secs: 0,
            startup_grace_secs: 1,
            stop_grace_secs: 2,
        },
    );

    sup.start(&mut monitor).expect("target should start");
    assert!(sup.is_healthy());

    // SIGTERM is ignored by the child; stop must escalate to SIGKILL after
    // the grace period and still reap the process.
    sup.stop(&mut monitor);
    assert_eq!(sup.state(), ProcessState::Stopped);
    assert!(!sup.is_healthy());
}
