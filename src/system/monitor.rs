use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use sysinfo::{Disks, System};
use tracing::{info, warn};

use crate::config::ThresholdConfig;
use crate::system::snapshot::ResourceSnapshot;

const MB: f64 = 1024.0 * 1024.0;
const GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Fixed poll interval for `wait_until_available`. Kept coarse so the
/// monitoring itself never contributes meaningful CPU pressure.
const WAIT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Samples OS-level memory, CPU, and disk usage and evaluates headroom and
/// pressure against the configured thresholds.
pub struct ResourceMonitor {
    sys: System,
    disks: Disks,
    thresholds: ThresholdConfig,
    disk_path: PathBuf,
}

impl ResourceMonitor {
    pub fn new(thresholds: ThresholdConfig) -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu_all();
        let disks = Disks::new_with_refreshed_list();
        let disk_path = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        ResourceMonitor {
            sys,
            disks,
            thresholds,
            disk_path,
        }
    }

    pub fn thresholds(&self) -> &ThresholdConfig {
        &self.thresholds
    }

    /// Takes a fresh snapshot. CPU usage is averaged over a short window
    /// (two refreshes separated by the sysinfo minimum interval), so a call
    /// blocks for a fraction of a second but never materially longer.
    pub fn sample(&mut self) -> ResourceSnapshot {
        self.sys.refresh_memory();
        self.sys.refresh_cpu_all();
        thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        self.sys.refresh_cpu_all();
        self.disks.refresh(true);

        let total_mb = self.sys.total_memory() as f64 / MB;
        let available_mb = self.sys.available_memory() as f64 / MB;
        let used_mb = (total_mb - available_mb).max(0.0);
        let used_pct = if total_mb > 0.0 {
            used_mb / total_mb * 100.0
        } else {
            0.0
        };

        let load = System::load_average();
        let disk = disk_usage_for(&self.disks, &self.disk_path);
        let (disk_total_gb, disk_free_gb) = match disk {
            Some((total, available)) => (total as f64 / GB, available as f64 / GB),
            None => (0.0, 0.0),
        };
        let disk_used_gb = (disk_total_gb - disk_free_gb).max(0.0);
        let disk_used_pct = if disk_total_gb > 0.0 {
            disk_used_gb / disk_total_gb * 100.0
        } else {
            0.0
        };

        let degraded = self.sys.total_memory() == 0 || disk.is_none();
        if degraded {
            warn!("OS metrics query came back empty; snapshot flagged degraded");
        }

        ResourceSnapshot {
            timestamp: SystemTime::now(),
            memory_total_mb: total_mb,
            memory_available_mb: available_mb,
            memory_used_mb: used_mb,
            memory_used_pct: used_pct,
            cpu_used_pct: self.sys.global_cpu_usage() as f64,
            load_avg: [load.one, load.five, load.fifteen],
            disk_total_gb,
            disk_used_gb,
            disk_free_gb,
            disk_used_pct,
            degraded,
        }
    }

    /// True iff at least `required_mb` of memory is currently available.
    /// The message states both the observed and the required value.
    pub fn check_headroom(&mut self, required_mb: u64) -> (bool, String) {
        let snapshot = self.sample();
        let ok = has_headroom(&snapshot, required_mb);
        (ok, headroom_message(&snapshot, required_mb))
    }

    /// Evaluates every metric against its own threshold; the issue list names
    /// each breached metric with its observed value, never just the first.
    pub fn check_pressure(&mut self) -> (bool, Vec<String>) {
        let snapshot = self.sample();
        let issues = pressure_issues(&snapshot, &self.thresholds);
        (!issues.is_empty(), issues)
    }

    /// Polls every 5s until headroom holds and no pressure is detected, or
    /// the timeout elapses.
    pub fn wait_until_available(&mut self, timeout: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            let (ok, message) = self.check_headroom(self.thresholds.memory_headroom_mb);
            let (pressure, issues) = self.check_pressure();
            if ok && !pressure {
                info!("resources available: {message}");
                return true;
            }
            info!("waiting for resources... {message}");
            for issue in &issues {
                info!("  {issue}");
            }
            thread::sleep(WAIT_POLL_INTERVAL);
        }
        warn!(
            "timed out waiting for sufficient resources ({}s)",
            timeout.as_secs()
        );
        false
    }

    /// Logs current resource usage with a context message and returns the
    /// snapshot it was based on.
    pub fn log_usage(&mut self, context: &str) -> ResourceSnapshot {
        let snapshot = self.sample();
        info!("{context} | {}", snapshot.summary());
        snapshot
    }
}

/// True iff the snapshot satisfies the headroom requirement. False exactly
/// when `memory_available_mb < required_mb`.
pub fn has_headroom(snapshot: &ResourceSnapshot, required_mb: u64) -> bool {
    snapshot.memory_available_mb >= required_mb as f64
}

pub fn headroom_message(snapshot: &ResourceSnapshot, required_mb: u64) -> String {
    if has_headroom(snapshot, required_mb) {
        format!(
            "sufficient memory headroom: {:.1}MB available (required: {required_mb}MB)",
            snapshot.memory_available_mb
        )
    } else {
        format!(
            "insufficient memory headroom: {:.1}MB available, need {required_mb}MB",
            snapshot.memory_available_mb
        )
    }
}

/// Pure pressure evaluation over a snapshot. Each metric is compared to its
/// own threshold independently; a degraded snapshot is fail-safe pressure.
pub fn pressure_issues(snapshot: &ResourceSnapshot, thresholds: &ThresholdConfig) -> Vec<String> {
    let mut issues = Vec::new();
    if snapshot.degraded {
        issues.push("resource sampling degraded; treating as pressure".to_string());
    }
    if snapshot.memory_used_pct > thresholds.memory_pct_threshold {
        issues.push(format!(
            "high memory usage: {:.1}%",
            snapshot.memory_used_pct
        ));
    }
    if snapshot.cpu_used_pct > thresholds.cpu_pct_threshold {
        issues.push(format!("high CPU usage: {:.1}%", snapshot.cpu_used_pct));
    }
    if snapshot.disk_used_pct > thresholds.disk_pct_threshold {
        issues.push(format!("high disk usage: {:.1}%", snapshot.disk_used_pct));
    }
    issues
}

/// Total and available space for the disk whose mount point is the deepest
/// prefix of `path`, falling back to the largest disk when no mount matches.
fn disk_usage_for(disks: &Disks, path: &std::path::Path) -> Option<(u64, u64)> {
    let mut best: Option<(&sysinfo::Disk, usize)> = None;
    for disk in disks.list() {
        let mount = disk.mount_point();
        if path.starts_with(mount) {
            let depth = mount.components().count();
            if best.is_none_or(|(_, d)| depth >= d) {
                best = Some((disk, depth));
            }
        }
    }
    let disk = match best {
        Some((disk, _)) => disk,
        None => disks.list().iter().max_by_key(|d| d.total_space())?,
    };
    Some((disk.total_space(), disk.available_space()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::snapshot::test_snapshot;

    #[test]
    fn headroom_boundary_is_exact() {
        let mut snap = test_snapshot();
        snap.memory_available_mb = 512.0;
        assert!(has_headroom(&snap, 512));
        snap.memory_available_mb = 511.9;
        assert!(!has_headroom(&snap, 512));
    }

    #[test]
    fn headroom_message_states_both_values() {
        let mut snap = test_snapshot();
        snap.memory_available_mb = 100.0;
        let msg = headroom_message(&snap, 512);
        assert!(msg.contains("100.0MB"));
        assert!(msg.contains("512MB"));
    }

    #[test]
    fn no_pressure_when_all_below_thresholds() {
        let issues = pressure_issues(&test_snapshot(), &ThresholdConfig::default());
        assert!(issues.is_empty());
    }

    #[test]
    fn each_metric_breaches_independently() {
        let thresholds = ThresholdConfig::default();

        let mut snap = test_snapshot();
        snap.memory_used_pct = 90.0;
        let issues = pressure_issues(&snap, &thresholds);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("memory"));
        assert!(issues[0].contains("90.0%"));

        let mut snap = test_snapshot();
        snap.cpu_used_pct = 99.5;
        let issues = pressure_issues(&snap, &thresholds);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("CPU"));
        assert!(issues[0].contains("99.5%"));

        let mut snap = test_snapshot();
        snap.disk_used_pct = 95.0;
        let issues = pressure_issues(&snap, &thresholds);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("disk"));
    }

    #[test]
    fn all_breached_metrics_are_listed() {
        let thresholds = ThresholdConfig::default();
        let mut snap = test_snapshot();
        snap.memory_used_pct = 95.0;
        snap.cpu_used_pct = 95.0;
        snap.disk_used_pct = 95.0;
        let issues = pressure_issues(&snap, &thresholds);
        assert_eq!(issues.len(), 3);
    }

    #[test]
    fn threshold_values_are_exclusive_bounds() {
        // A metric sitting exactly at its threshold is not a breach.
        let thresholds = ThresholdConfig::default();
        let mut snap = test_snapshot();
        snap.memory_used_pct = 85.0;
        snap.cpu_used_pct = 85.0;
        snap.disk_used_pct = 90.0;
        assert!(pressure_issues(&snap, &thresholds).is_empty());
    }

    #[test]
    fn degraded_snapshot_is_fail_safe_pressure() {
        let mut snap = test_snapshot();
        snap.degraded = true;
        let issues = pressure_issues(&snap, &ThresholdConfig::default());
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("degraded"));
    }
}
