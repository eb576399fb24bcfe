// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `liquidate_subaccounts`: candidates found by the liquidation daemon

use crate::error::ServiceError;
use daemon_gateway_types::liquidation::LiquidateSubaccountsRequest;
use std::sync::Mutex;

/// Destination for liquidation snapshots
pub trait LiquidationSink: Send + Sync {
    fn liquidate_subaccounts(
        &self,
        request: &LiquidateSubaccountsRequest,
    ) -> Result<(), ServiceError>;
}

/// Keeps the most recent snapshot reported by the liquidation daemon.
#[derive(Debug, Default)]
pub struct LiquidatableSubaccounts {
    latest: Mutex<Option<LiquidateSubaccountsRequest>>,
}

impl LiquidatableSubaccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<LiquidateSubaccountsRequest> {
        self.latest
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl LiquidationSink for LiquidatableSubaccounts {
    fn liquidate_subaccounts(
        &self,
        request: &LiquidateSubaccountsRequest,
    ) -> Result<(), ServiceError> {
        let mut latest =
            self.latest.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(current) = latest.as_ref() {
            if request.block_height < current.block_height {
                return Err(ServiceError::Rejected(format!(
                    "liquidation snapshot for block {} is older than the \
                     current snapshot for block {}",
                    request.block_height, current.block_height
                )));
            }
        }

        let mut snapshot = request.clone();
        snapshot.liquidatable_subaccount_ids.sort();
        snapshot.liquidatable_subaccount_ids.dedup();
        snapshot.negative_tnc_subaccount_ids.sort();
        snapshot.negative_tnc_subaccount_ids.dedup();
        *latest = Some(snapshot);
        Ok(())
    }
}
