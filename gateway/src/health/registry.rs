// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-daemon update bookkeeping

use crate::error::HealthError;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Registry-side state of one daemon
#[derive(Clone, Debug)]
struct DaemonEntry {
    max_acceptable_delay: Duration,
    last_update_time: Instant,
}

/// How long it has been since a daemon last reported, as of some instant
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DaemonDelay {
    pub key: Arc<str>,
    pub elapsed: Duration,
    pub max_acceptable_delay: Duration,
}

impl DaemonDelay {
    /// A daemon is in breach only once it is strictly past its budget.
    pub fn is_breached(&self) -> bool {
        self.elapsed > self.max_acceptable_delay
    }

    pub fn overage(&self) -> Duration {
        self.elapsed.saturating_sub(self.max_acceptable_delay)
    }
}

/// Maps daemon key to its update budget and the time of its last valid
/// update.
///
/// Keys are never removed. Callers are expected to wrap the registry in a
/// lock; every method here operates on a consistent view of all entries.
#[derive(Debug, Default)]
pub struct DaemonRegistry {
    entries: BTreeMap<Arc<str>, DaemonEntry>,
}

impl DaemonRegistry {
    pub fn new() -> DaemonRegistry {
        DaemonRegistry::default()
    }

    /// Track a new daemon, treating `now` as its most recent update.
    pub fn register(
        &mut self,
        key: &str,
        max_acceptable_delay: Duration,
        now: Instant,
    ) -> Result<(), HealthError> {
        if self.entries.contains_key(key) {
            return Err(HealthError::DuplicateKey { key: key.to_string() });
        }
        if max_acceptable_delay.is_zero() {
            return Err(HealthError::InvalidDelay { key: key.to_string() });
        }
        self.entries.insert(
            Arc::from(key),
            DaemonEntry { max_acceptable_delay, last_update_time: now },
        );
        Ok(())
    }

    /// Record a valid update for `key` at `now`.
    pub fn touch(&mut self, key: &str, now: Instant) -> Result<(), HealthError> {
        let entry = self
            .entries
            .get_mut(key)
            .ok_or_else(|| HealthError::UnknownKey { key: key.to_string() })?;
        // Updates racing on the same key may arrive with instants out of
        // order; the timestamp only ever moves forward.
        entry.last_update_time = entry.last_update_time.max(now);
        Ok(())
    }

    pub fn snapshot_delays(&self, now: Instant) -> Vec<DaemonDelay> {
        self.entries
            .iter()
            .map(|(key, entry)| DaemonDelay {
                key: Arc::clone(key),
                elapsed: now.saturating_duration_since(entry.last_update_time),
                max_acceptable_delay: entry.max_acceptable_delay,
            })
            .collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
