//! Configuration types for agent profiling

use crate::context::Environment;
use anyhow::Context as _;
use std::path::PathBuf;
use std::time::Duration;

/// Overrides the directory profiles are written to
pub const PROFILE_DIR_VAR: &str = "JUJUD_PROFILE_DIR";

/// Overrides the heap snapshot interval (e.g. "30s", "5m")
pub const PROFILE_INTERVAL_VAR: &str = "JUJUD_PROFILE_INTERVAL";

/// Profiling configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilingConfig {
    /// Directory CPU profiles and heap snapshots are written to
    pub output_dir: PathBuf,

    /// Time between periodic heap snapshots
    pub heap_interval: Duration,

    /// How many CPU profile file suffixes to try before giving up
    pub cpu_file_attempts: u32,

    /// CPU sampling frequency in Hz
    pub cpu_frequency_hz: i32,
}

impl Default for ProfilingConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("/tmp"),
            heap_interval: Duration::from_secs(60),
            cpu_file_attempts: 10,
            cpu_frequency_hz: 100,
        }
    }
}

impl ProfilingConfig {
    /// Defaults, with directory and interval overridable from the environment
    pub fn from_env(env: &dyn Environment) -> anyhow::Result<Self> {
        let mut config = Self::default();
        if let Some(dir) = env.var(PROFILE_DIR_VAR).filter(|d| !d.is_empty()) {
            config.output_dir = PathBuf::from(dir);
        }
        if let Some(interval) = env.var(PROFILE_INTERVAL_VAR).filter(|i| !i.is_empty()) {
            config.heap_interval = jujud_shared::utils::parse_duration(&interval)
                .with_context(|| format!("invalid {}: {:?}", PROFILE_INTERVAL_VAR, interval))?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.heap_interval.is_zero() {
            anyhow::bail!("Heap snapshot interval must be greater than 0");
        }

        if self.cpu_file_attempts == 0 {
            anyhow::bail!("At least one CPU profile file attempt is required");
        }

        if self.cpu_frequency_hz <= 0 {
            anyhow::bail!("CPU sampling frequency must be greater than 0");
        }

        if self.cpu_frequency_hz > 10000 {
            anyhow::bail!("CPU sampling frequency too high (max 10000 Hz)");
        }

        Ok(())
    }
}
