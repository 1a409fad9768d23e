use std::path::{Path, PathBuf};
use std::time::Duration;

use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use serde::Deserialize;

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub target: TargetConfig,
    pub thresholds: ThresholdConfig,
    pub timing: TimingConfig,
}

/// The monitored binary: where it lives and how it is launched.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub binary: PathBuf,
    pub args: Vec<String>,
    pub workdir: Option<PathBuf>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        TargetConfig {
            binary: PathBuf::from("build/slonana_validator"),
            args: vec![
                "--ledger-path".to_string(),
                "/tmp/chaos_test_ledger".to_string(),
                "--log-level".to_string(),
                "info".to_string(),
            ],
            workdir: None,
        }
    }
}

impl TargetConfig {
    /// Binary path resolved against the configured workdir, if any.
    pub fn resolved_binary(&self) -> PathBuf {
        match &self.workdir {
            Some(dir) if self.binary.is_relative() => dir.join(&self.binary),
            _ => self.binary.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Minimum free memory required before and after target startup (MB).
    pub memory_headroom_mb: u64,
    /// Free memory floor below which a running scenario aborts immediately (MB).
    pub critical_memory_mb: u64,
    pub memory_pct_threshold: f64,
    pub cpu_pct_threshold: f64,
    pub disk_pct_threshold: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        ThresholdConfig {
            memory_headroom_mb: 512,
            critical_memory_mb: 256,
            memory_pct_threshold: 85.0,
            cpu_pct_threshold: 85.0,
            disk_pct_threshold: 90.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// How long pre-flight waits for resources to free up before giving up.
    pub wait_timeout_secs: u64,
    /// Window after spawn in which an early exit counts as a startup failure.
    pub startup_grace_secs: u64,
    /// Wait after SIGTERM before escalating to SIGKILL.
    pub stop_grace_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            wait_timeout_secs: 60,
            startup_grace_secs: 5,
            stop_grace_secs: 10,
        }
    }
}

impl TimingConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn startup_grace(&self) -> Duration {
        Duration::from_secs(self.startup_grace_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }
}

pub fn config_path() -> PathBuf {
    PathBuf::from("chaosmon.toml")
}

pub fn load_config() -> Config {
    let path = config_path();
    if path.exists() {
        load_config_from_path(&path)
    } else {
        Config::default()
    }
}

/// Best-effort loader for the implicit `chaosmon.toml` lookup: a file that
/// cannot be read or parsed falls back to defaults.
pub fn load_config_from_path(path: &Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(contents) => toml::from_str(&contents).unwrap_or_default(),
        Err(_) => Config::default(),
    }
}

/// Strict loader for explicitly-requested config paths: an unreadable or
/// malformed file is a fatal error, never a silent default.
pub fn try_load_config_from_path(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&contents)
        .wrap_err_with(|| format!("failed to parse config file {}", path.display()))
}
