use std::time::SystemTime;

/// Immutable point-in-time sample of system memory, CPU, and disk usage.
///
/// Used memory is derived as `total - available`, so the accounting identity
/// `memory_used_mb + memory_available_mb == memory_total_mb` holds exactly.
#[derive(Clone, Debug)]
pub struct ResourceSnapshot {
    pub timestamp: SystemTime,
    pub memory_total_mb: f64,
    pub memory_available_mb: f64,
    pub memory_used_mb: f64,
    pub memory_used_pct: f64,
    pub cpu_used_pct: f64,
    pub load_avg: [f64; 3],
    pub disk_total_gb: f64,
    pub disk_used_gb: f64,
    pub disk_free_gb: f64,
    pub disk_used_pct: f64,
    /// Set when an OS metrics query came back empty; callers treat a degraded
    /// snapshot as resource pressure rather than trusting its zeros.
    pub degraded: bool,
}

impl ResourceSnapshot {
    /// One-line usage summary for log output.
    pub fn summary(&self) -> String {
        format!(
            "Memory: {:.1}/{:.1}MB ({:.1}%) | CPU: {:.1}% | Disk: {:.1}/{:.1}GB ({:.1}%)",
            self.memory_used_mb,
            self.memory_total_mb,
            self.memory_used_pct,
            self.cpu_used_pct,
            self.disk_used_gb,
            self.disk_total_gb,
            self.disk_used_pct,
        )
    }
}

#[cfg(test)]
pub(crate) fn test_snapshot() -> ResourceSnapshot {
    ResourceSnapshot {
        timestamp: SystemTime::now(),
        memory_total_mb: 8192.0,
        memory_available_mb: 6144.0,
        memory_used_mb: 2048.0,
        memory_used_pct: 25.0,
        cpu_used_pct: 10.0,
        load_avg: [0.5, 0.4, 0.3],
        disk_total_gb: 500.0,
        disk_used_gb: 100.0,
        disk_free_gb: 400.0,
        disk_used_pct: 20.0,
        degraded: false,
    }
}
