//! Configuration mapping for the archive session.
//!
//! Options are a flat string map, loaded from the `[esoarchive]` section of a
//! TOML file and/or assembled from CLI flags. Known numeric/boolean keys are
//! coerced and validated up front; everything else (credentials, target,
//! coordinates) passes through untouched so new form fields can be configured
//! without a code change.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::error;

use crate::error::ArchiveError;

/// Section of the configuration file that is read; other sections are ignored.
pub const CONFIG_SECTION: &str = "esoarchive";

/// Keys that must coerce to an integer.
const INT_KEYS: &[&str] = &[
    "max_workers",
    "rows",
    "starttime",
    "endtime",
    "poll_interval",
    "poll_timeout",
];

/// Keys that must be exactly "true" or "false".
const BOOL_KEYS: &[&str] = &["headless", "debug"];

#[derive(Debug, Clone, Default)]
pub struct ArchiveOptions {
    values: BTreeMap<String, String>,
}

impl ArchiveOptions {
    /// Validate a raw option mapping.
    ///
    /// Coercible keys are checked here so a bad value aborts before any
    /// browser is launched. Unknown keys are kept verbatim.
    pub fn from_map(values: BTreeMap<String, String>) -> Result<Self, ArchiveError> {
        for (key, value) in &values {
            if INT_KEYS.contains(&key.as_str()) {
                coerce_int(key, value)?;
            } else if BOOL_KEYS.contains(&key.as_str()) {
                coerce_bool(key, value)?;
            }
        }
        Ok(Self { values })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Integer value of a previously validated key.
    fn int_value(&self, key: &str) -> Option<i64> {
        self.values.get(key).and_then(|v| v.trim().parse().ok())
    }

    fn bool_value(&self, key: &str) -> Option<bool> {
        self.values.get(key).map(|v| v == "true")
    }

    /// Worker pool size for the download phase.
    pub fn max_workers(&self) -> usize {
        self.int_value("max_workers").map(|n| n.max(1) as usize).unwrap_or(1)
    }

    /// Run the browser without a visible window.
    pub fn headless(&self) -> bool {
        self.bool_value("headless").unwrap_or(true)
    }

    /// Verbose logging plus login screenshots in the log.
    pub fn debug(&self) -> bool {
        self.bool_value("debug").unwrap_or(false)
    }

    /// Initial interval between completion-poll checks.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.int_value("poll_interval").map(|n| n.max(1) as u64).unwrap_or(2))
    }

    /// Upper bound on the completion wait.
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.int_value("poll_timeout").map(|n| n.max(1) as u64).unwrap_or(600))
    }

    pub fn username(&self) -> &str {
        self.get("username").unwrap_or_default()
    }

    pub fn password(&self) -> &str {
        self.get("password").unwrap_or_default()
    }
}

fn coerce_int(key: &str, value: &str) -> Result<i64, ArchiveError> {
    value.trim().parse().map_err(|_| {
        let err = ArchiveError::Config {
            key: key.to_string(),
            reason: format!("Not an integer: {value:?}"),
        };
        error!("{err}");
        err
    })
}

fn coerce_bool(key: &str, value: &str) -> Result<bool, ArchiveError> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        other => {
            let err = ArchiveError::Config {
                key: key.to_string(),
                reason: format!("Not a boolean: {other:?}"),
            };
            error!("{err}");
            Err(err)
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    esoarchive: BTreeMap<String, String>,
}

/// Load the raw option mapping from the `[esoarchive]` section of a TOML file.
///
/// Values are strings; coercion happens in [`ArchiveOptions::from_map`] so the
/// file and the CLI go through the same validation.
pub fn load_config_file(path: &Path) -> Result<BTreeMap<String, String>, ArchiveError> {
    let contents = std::fs::read_to_string(path)?;
    let parsed: ConfigFile = toml::from_str(&contents).map_err(|e| ArchiveError::Config {
        key: CONFIG_SECTION.to_string(),
        reason: e.to_string(),
    })?;
    Ok(parsed.esoarchive)
}
