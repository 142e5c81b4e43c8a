//! YAML run configuration.
//!
//! Several files may be given; they are merged in order. Later non-zero
//! scalars win, headers merge key by key and scripts concatenate.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use flutter_core::{Action, RunConfig, Script, Timeline};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Collector request timeout when no file sets one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("no configuration files given")]
    NoFiles,

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("failed to parse timeline {}: {source}", path.display())]
    Timeline {
        path: PathBuf,
        source: flutter_core::Error,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OtlpDestination {
    /// Base URL; `/v1/metrics` and `/v1/traces` are appended
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl OtlpDestination {
    pub fn timeout(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_TIMEOUT)
    }

    pub fn is_configured(&self) -> bool {
        !self.endpoint.is_empty()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    /// Zero picks a seed from the clock
    #[serde(default)]
    pub seed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallclock_start: Option<DateTime<Utc>>,
    /// Zero means "as long as the script"
    #[serde(default, with = "humantime_serde")]
    pub duration: Duration,
    #[serde(default)]
    pub dryrun: bool,
    #[serde(default)]
    pub otlp_destination: OtlpDestination,
    #[serde(default)]
    pub script: Vec<Action>,
}

impl Config {
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    /// Fold `other` into `self`; `other` is the later file.
    pub fn merge(&mut self, other: Config) {
        if other.seed != 0 {
            self.seed = other.seed;
        }
        if other.wallclock_start.is_some() {
            self.wallclock_start = other.wallclock_start;
        }
        if !other.duration.is_zero() {
            self.duration = other.duration;
        }
        self.dryrun |= other.dryrun;

        let dest = other.otlp_destination;
        if !dest.endpoint.is_empty() {
            self.otlp_destination.endpoint = dest.endpoint;
        }
        self.otlp_destination.headers.extend(dest.headers);
        if dest.timeout.is_some() {
            self.otlp_destination.timeout = dest.timeout;
        }

        self.script.extend(other.script);
    }

    pub fn to_run_config(&self) -> RunConfig {
        RunConfig {
            seed: self.seed,
            wallclock_start: self.wallclock_start,
            duration: self.duration,
            dry_run: self.dryrun,
            ..Default::default()
        }
    }

    pub fn to_script(&self) -> Script {
        Script::from_actions(self.script.iter().cloned())
    }
}

/// Load and merge every file in order.
pub fn load_configs<P: AsRef<Path>>(paths: &[P]) -> Result<Config, ConfigLoadError> {
    if paths.is_empty() {
        return Err(ConfigLoadError::NoFiles);
    }

    let mut merged = Config::default();
    for path in paths {
        let path = path.as_ref();
        info!(path = %path.display(), "loading config");
        let text = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Config::from_yaml(&text).map_err(|source| ConfigLoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        merged.merge(config);
    }
    Ok(merged)
}

/// Read a timeline file; `.yaml`/`.yml` parse as YAML, anything else as JSON.
pub fn load_timeline(path: &Path) -> Result<Timeline, ConfigLoadError> {
    info!(path = %path.display(), "loading timeline");
    let text = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml")
    );
    let parsed = if is_yaml {
        Timeline::from_yaml(&text)
    } else {
        Timeline::from_json(&text)
    };
    parsed.map_err(|source| ConfigLoadError::Timeline {
        path: path.to_path_buf(),
        source,
    })
}
