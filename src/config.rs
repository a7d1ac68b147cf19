use std::{env, fs, path::PathBuf, time::Duration};

use crate::prelude::*;
use nestify::nest;
use proctrack::watcher::DEFAULT_QUEUE_CAPACITY;
use proctrack::{RetryPolicy, RuntimeClassifier, RuntimeProfile};
use serde::{Deserialize, Serialize};

nest! {
    #[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]*
    #[serde(default, rename_all = "kebab-case")]*
    /// Optional tuning of the tracker, read from `~/.config/proctrack/config.yaml`
    ///
    /// Every key may be omitted. Runtime profiles listed here are added to the built-in
    /// docker profile.
    pub struct ProctrackConfig {
        /// Event batches buffered between the watcher and the tracker
        pub queue_capacity: usize,
        pub retry: pub struct RetryConfig {
            pub initial_backoff_ms: u64,
            pub max_backoff_ms: u64,
        },
        pub runtimes: Vec<RuntimeProfile>,
    }
}

impl Default for ProctrackConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            retry: RetryConfig::default(),
            runtimes: Vec::new(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
            max_backoff_ms: policy.max_backoff.as_millis() as u64,
        }
    }
}

/// `$XDG_CONFIG_HOME/proctrack/{config_name}.yaml`, `config.yaml` without a name,
/// with `~/.config` when `XDG_CONFIG_HOME` is unset
fn get_configuration_file_path(config_name: Option<&str>) -> Result<PathBuf> {
    let config_dir = match env::var("XDG_CONFIG_HOME") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => {
            let home = env::var("HOME").context("Neither XDG_CONFIG_HOME nor HOME is set")?;
            PathBuf::from(home).join(".config")
        }
    };
    let config_dir = config_dir.join("proctrack");

    Ok(match config_name {
        Some(name) => config_dir.join(format!("{name}.yaml")),
        None => config_dir.join("config.yaml"),
    })
}

impl ProctrackConfig {
    /// Load the configuration, or the defaults when the file does not exist
    pub fn load(config_name: Option<&str>) -> Result<Self> {
        let config_path = get_configuration_file_path(config_name)?;

        let config = match fs::read(&config_path) {
            Ok(content) => {
                let config: ProctrackConfig = serde_yaml::from_slice(&content).context(
                    format!("Failed to parse proctrack config at {}", config_path.display()),
                )?;
                debug!("Config loaded from {}", config_path.display());
                config
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Config file not found at {}", config_path.display());
                ProctrackConfig::default()
            }
            Err(e) => bail!("Failed to load config at {}: {e}", config_path.display()),
        };

        config.validate().context(format!(
            "Invalid proctrack config at {}",
            config_path.display()
        ))?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.queue_capacity > 0, "queue-capacity must be positive");
        ensure!(
            self.retry.initial_backoff_ms <= self.retry.max_backoff_ms,
            "retry.initial-backoff-ms ({}) exceeds retry.max-backoff-ms ({})",
            self.retry.initial_backoff_ms,
            self.retry.max_backoff_ms
        );
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
        }
    }

    /// The built-in runtimes followed by the configured ones
    pub fn classifier(&self) -> RuntimeClassifier {
        self.runtimes
            .iter()
            .cloned()
            .fold(RuntimeClassifier::default(), RuntimeClassifier::with_profile)
    }
}
