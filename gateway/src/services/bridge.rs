// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `add_bridge_events`: deposits observed by the bridge daemon

use crate::error::ServiceError;
use daemon_gateway_types::bridge::AddBridgeEventsRequest;
use daemon_gateway_types::bridge::BridgeEvent;
use std::sync::Mutex;

/// Destination for recognized bridge events
pub trait BridgeEventSink: Send + Sync {
    /// Accept a batch of events whose ids are already known to be
    /// consecutive.
    fn add_bridge_events(
        &self,
        events: &[BridgeEvent],
    ) -> Result<(), ServiceError>;
}

/// Check the structural rules every batch must satisfy before it reaches a
/// sink.
pub fn validate(request: &AddBridgeEventsRequest) -> Result<(), ServiceError> {
    for pair in request.bridge_events.windows(2) {
        let expected = pair[0].id.checked_add(1);
        if expected != Some(pair[1].id) {
            return Err(ServiceError::InvalidPayload(format!(
                "bridge event ids are not consecutive: {} followed by {}",
                pair[0].id, pair[1].id
            )));
        }
    }
    Ok(())
}

/// In-memory record of recognized bridge events, in id order
#[derive(Debug, Default)]
pub struct BridgeEventQueue {
    inner: Mutex<QueueInner>,
}

#[derive(Debug, Default)]
struct QueueInner {
    next_id: u32,
    events: Vec<BridgeEvent>,
}

impl BridgeEventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id the next recognized event must carry
    pub fn next_id(&self) -> u32 {
        self.lock().next_id
    }

    pub fn events(&self) -> Vec<BridgeEvent> {
        self.lock().events.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl BridgeEventSink for BridgeEventQueue {
    fn add_bridge_events(
        &self,
        events: &[BridgeEvent],
    ) -> Result<(), ServiceError> {
        let mut inner = self.lock();
        let Some(first) = events.first() else {
            return Ok(());
        };
        if first.id > inner.next_id {
            return Err(ServiceError::Rejected(format!(
                "bridge event {} is ahead of the next expected id {}",
                first.id, inner.next_id
            )));
        }

        // Events the daemon re-sends after a restart are already recognized.
        let next_id = inner.next_id;
        let fresh: Vec<_> =
            events.iter().filter(|e| e.id >= next_id).cloned().collect();
        if let Some(last) = fresh.last() {
            inner.next_id = last.id.saturating_add(1);
            inner.events.extend(fresh);
        }
        Ok(())
    }
}
