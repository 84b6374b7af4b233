//! Runtime configuration, loaded from a mounted YAML file with a default
//! fallback.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULT_MACHINE_START_TIMEOUT_MIN: u64 = 8;

/// Tunables of the runtime orchestrator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Upper bound on one machine's bootstrap, in minutes. Exceeding it is
    /// an infrastructure failure for that machine.
    #[serde(default = "default_machine_start_timeout_min")]
    pub machine_start_timeout_min: u64,
}

fn default_machine_start_timeout_min() -> u64 {
    DEFAULT_MACHINE_START_TIMEOUT_MIN
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            machine_start_timeout_min: DEFAULT_MACHINE_START_TIMEOUT_MIN,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading runtime configuration");
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&raw)?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.machine_start_timeout_min == 0 {
            anyhow::bail!("machine_start_timeout_min must be greater than zero");
        }
        Ok(())
    }

    #[must_use]
    pub fn machine_start_timeout(&self) -> Duration {
        Duration::from_secs(self.machine_start_timeout_min * 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = RuntimeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.machine_start_timeout(), Duration::from_secs(8 * 60));
    }

    #[test]
    fn loads_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "machine_start_timeout_min: 13").unwrap();

        let config = RuntimeConfig::from_file(file.path()).unwrap();
        assert_eq!(config.machine_start_timeout_min, 13);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_timeout_fails_validation() {
        let config = RuntimeConfig {
            machine_start_timeout_min: 0,
        };
        assert!(config.validate().is_err());
    }
}
