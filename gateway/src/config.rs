// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interfaces for parsing configuration files and working with a gateway
//! server configuration

use crate::error::ConfigError;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use daemon_common::logging::ConfigLogging;
use daemon_gateway_types::DaemonKind;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Configuration for a gateway server
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Config {
    /// Path of the Unix domain socket daemons connect to
    pub socket_path: Utf8PathBuf,
    /// Upper bound on the size of a single request line.
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,
    /// Health monitor settings.
    pub monitor: MonitorConfig,
    /// Daemon services served by this gateway, keyed by kind. A kind that is
    /// absent here is not registered with the health monitor and its calls
    /// are refused.
    pub daemons: BTreeMap<DaemonKind, DaemonConfig>,
    /// Server-wide logging configuration.
    pub log: ConfigLogging,
}

fn default_max_request_bytes() -> usize {
    1024 * 1024
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct MonitorConfig {
    /// How long after startup before staleness is evaluated at all
    #[serde(with = "humantime_serde")]
    pub startup_grace_period: Duration,
    /// How often the sweep runs
    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    pub poll_interval: Duration,
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(5)
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct DaemonConfig {
    /// Longest allowed gap between two valid responses from this daemon
    #[serde(with = "humantime_serde")]
    pub max_acceptable_update_delay: Duration,
}

impl Config {
    /// Load a `Config` from the given TOML file
    ///
    /// This config object can then be used to create a new gateway server.
    pub fn from_file<P: AsRef<Utf8Path>>(path: P) -> Result<Config, LoadError> {
        let path = path.as_ref();
        let file_contents = std::fs::read_to_string(path)
            .map_err(|err| LoadError::Io { path: path.into(), err })?;
        let config_parsed: Config = toml::from_str(&file_contents)
            .map_err(|err| LoadError::Parse { path: path.into(), err })?;
        Ok(config_parsed)
    }

    /// Check the constraints that the file format alone cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut reasons = Vec::new();

        if self.socket_path.as_str().is_empty() {
            reasons.push(String::from("socket_path must not be empty"));
        }
        if self.max_request_bytes == 0 {
            reasons.push(String::from("max_request_bytes must be positive"));
        }
        if self.monitor.poll_interval.is_zero() {
            reasons.push(String::from("monitor.poll_interval must be positive"));
        }
        if self.daemons.is_empty() {
            reasons.push(String::from("no daemon services configured"));
        }
        for (kind, daemon) in &self.daemons {
            if daemon.max_acceptable_update_delay.is_zero() {
                reasons.push(format!(
                    "daemons.{kind}.max_acceptable_update_delay must be \
                     positive"
                ));
            }
        }

        if reasons.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::InvalidConfig { reasons })
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("error reading \"{path}\": {err}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("error parsing \"{path}\": {err}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        err: toml::de::Error,
    },
}
