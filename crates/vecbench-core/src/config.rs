//! Benchmark configuration for vecbench
//!
//! Configuration lives in a TOML file. Without an explicit path the user
//! config (`~/.config/vecbench/config.toml`, or `$VECBENCH_CONFIG_DIR`) is
//! used when present, otherwise the built-in defaults.

pub mod types;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bail_invalid;
use crate::error::{BenchError, Result};
use crate::runner::LevelTiming;
use crate::sweep::SweepSettings;
use crate::worker::{PacingSchedule, SearchParams, WorkerMode};

pub use types::{BenchConfig, ModeConfig};

const CONFIG_DIR: &str = "vecbench";
const CONFIG_FILE: &str = "config.toml";
const CONFIG_DIR_ENV_VAR: &str = "VECBENCH_CONFIG_DIR";

impl BenchConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(BenchError::not_found("config file", path.display()));
        }
        let content = fs::read_to_string(path)?;
        let config: BenchConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| BenchError::Other(format!("failed to serialize config: {}", e)))
    }

    /// Path of the user config file
    pub fn user_config_path() -> Result<PathBuf> {
        // Allow environment variable override for testing
        let config_dir = if let Ok(env_dir) = std::env::var(CONFIG_DIR_ENV_VAR) {
            PathBuf::from(env_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| {
                    BenchError::Other("unable to determine config directory".to_string())
                })?
                .join(CONFIG_DIR)
        };

        Ok(config_dir.join(CONFIG_FILE))
    }

    /// Explicit path, else the user config if it exists, else defaults
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::user_config_path() {
            Ok(user) if user.exists() => {
                tracing::debug!(path = %user.display(), "using user config");
                Self::load(&user)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Reject values the sweep cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.concurrencies.is_empty() {
            bail_invalid!("concurrencies", "at least one level is required");
        }
        if self.concurrencies.contains(&0) {
            bail_invalid!("concurrencies", "levels must be at least 1");
        }
        if self.k == 0 {
            bail_invalid!("k", 0);
        }
        if self.nq == 0 {
            bail_invalid!("nq", 0);
        }
        positive_secs("duration_secs", self.duration_secs)?;
        positive_secs("barrier_timeout_secs", self.barrier_timeout_secs)?;
        positive_secs("grace_secs", self.grace_secs)?;

        if let ModeConfig::Paced {
            intervals_ms,
            window_secs,
            settle_secs,
        } = &self.mode
        {
            if intervals_ms.is_empty() {
                bail_invalid!("mode.intervals_ms", "at least one interval is required");
            }
            for interval in intervals_ms {
                positive_secs("mode.intervals_ms", *interval)?;
            }
            positive_secs("mode.window_secs", *window_secs)?;
            non_negative_secs("mode.settle_secs", *settle_secs)?;
        }
        Ok(())
    }

    /// Validated sweep settings
    pub fn sweep_settings(&self) -> Result<SweepSettings> {
        self.validate()?;

        let mode = match &self.mode {
            ModeConfig::Saturate => WorkerMode::Saturate,
            ModeConfig::Paced {
                intervals_ms,
                window_secs,
                settle_secs,
            } => WorkerMode::Paced(PacingSchedule {
                intervals: intervals_ms
                    .iter()
                    .map(|ms| duration("mode.intervals_ms", ms / 1000.0))
                    .collect::<Result<_>>()?,
                window: duration("mode.window_secs", *window_secs)?,
                settle: duration("mode.settle_secs", *settle_secs)?,
            }),
        };

        Ok(SweepSettings {
            concurrencies: self.concurrencies.clone(),
            params: SearchParams {
                k: self.k,
                nq: self.nq,
                duration: duration("duration_secs", self.duration_secs)?,
                mode,
            },
            timing: LevelTiming {
                barrier_timeout: duration("barrier_timeout_secs", self.barrier_timeout_secs)?,
                grace: duration("grace_secs", self.grace_secs)?,
            },
        })
    }
}

fn positive_secs(context: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        bail_invalid!(context, value);
    }
    Ok(())
}

fn duration(context: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|_| BenchError::invalid_value(context, secs))
}

fn non_negative_secs(context: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        bail_invalid!(context, value);
    }
    Ok(())
}
