// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::health::HealthMonitor;
use crate::metrics::ResponseObserver;
use crate::metrics::ValidResponseCounter;
use crate::services::DaemonSinks;
use daemon_gateway_types::health::DaemonHealth;
use daemon_gateway_types::health::HealthReport;
use daemon_gateway_types::DaemonKind;
use slog::Logger;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Shared state used by daemon request handlers
pub struct ServerContext {
    pub monitor: HealthMonitor,
    pub sinks: DaemonSinks,
    pub valid_responses: ValidResponseCounter,
    pub observer: Arc<dyn ResponseObserver>,
    pub log: Logger,
    enabled: BTreeSet<DaemonKind>,
}

impl ServerContext {
    pub fn new(
        monitor: HealthMonitor,
        enabled: BTreeSet<DaemonKind>,
        sinks: DaemonSinks,
        observer: Arc<dyn ResponseObserver>,
        log: &Logger,
    ) -> Arc<Self> {
        Arc::new(ServerContext {
            monitor,
            sinks,
            valid_responses: ValidResponseCounter::new(),
            observer,
            log: log.clone(),
            enabled,
        })
    }

    /// Whether this gateway was configured to serve `kind`
    pub fn serves(&self, kind: DaemonKind) -> bool {
        self.enabled.contains(&kind)
    }

    pub fn health_report(&self) -> HealthReport {
        let status = self.monitor.status();
        HealthReport {
            state: status.state,
            enabled: status.enabled,
            daemons: status
                .daemons
                .into_iter()
                .map(|delay| DaemonHealth {
                    healthy: !delay.is_breached(),
                    valid_responses: self.valid_responses.count(&delay.key),
                    key: delay.key.to_string(),
                    elapsed: delay.elapsed,
                    max_acceptable_delay: delay.max_acceptable_delay,
                })
                .collect(),
        }
    }
}
