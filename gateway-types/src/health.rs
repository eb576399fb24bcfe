// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Health monitor status as reported to callers

use serde::Deserialize;
use serde::Serialize;
use std::time::Duration;

/// Lifecycle state of the health monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    /// Sweeps run but cannot fail until the startup grace period elapses.
    GracePeriod,
    /// Sweeps evaluate every registered daemon.
    Active,
    /// Stopped explicitly; no further sweeps will run.
    Stopped,
    /// A daemon breached its staleness budget.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonHealth {
    pub key: String,
    /// Time since the last valid response (or since registration)
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    #[serde(with = "humantime_serde")]
    pub max_acceptable_delay: Duration,
    /// whether `elapsed` is within `max_acceptable_delay`
    pub healthy: bool,
    /// number of valid responses accepted for this daemon
    pub valid_responses: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub state: MonitorState,
    pub enabled: bool,
    pub daemons: Vec<DaemonHealth>,
}

impl HealthReport {
    pub fn daemon(&self, key: &str) -> Option<&DaemonHealth> {
        self.daemons.iter().find(|d| d.key == key)
    }
}
