// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Valid-response accounting

use std::collections::BTreeMap;
use std::sync::Mutex;

/// Hook invoked every time a daemon call is accepted.
///
/// Implementations are called on the request path and must not block.
pub trait ResponseObserver: Send + Sync {
    fn valid_response(&self, key: &str);
}

/// Counts accepted responses per daemon key.
#[derive(Debug, Default)]
pub struct ValidResponseCounter {
    counts: Mutex<BTreeMap<String, u64>>,
}

impl ValidResponseCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, key: &str) -> u64 {
        self.counts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .copied()
            .unwrap_or(0)
    }
}

impl ResponseObserver for ValidResponseCounter {
    fn valid_response(&self, key: &str) {
        let mut counts =
            self.counts.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *counts.entry(key.to_string()).or_default() += 1;
    }
}

/// An observer that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ResponseObserver for NoopObserver {
    fn valid_response(&self, _key: &str) {}
}
