// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wire types shared between the daemon gateway and the daemons that call it.
//!
//! Each message is a single JSON object on its own line. Requests and
//! responses are internally tagged by a `"type"` field.

pub mod bridge;
pub mod health;
pub mod liquidation;
pub mod pricefeed;

use serde::Deserialize;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// The kinds of daemon that report into the gateway.
///
/// The string form of each kind doubles as the key under which the daemon is
/// tracked by the health monitor.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DaemonKind {
    Bridge,
    PriceFeed,
    Liquidation,
}

impl DaemonKind {
    pub const ALL: [DaemonKind; 3] =
        [DaemonKind::Bridge, DaemonKind::PriceFeed, DaemonKind::Liquidation];

    /// Health monitor key for this kind of daemon
    pub fn key(&self) -> &'static str {
        match self {
            DaemonKind::Bridge => "bridge",
            DaemonKind::PriceFeed => "pricefeed",
            DaemonKind::Liquidation => "liquidation",
        }
    }
}

impl fmt::Display for DaemonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for DaemonKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DaemonKind::ALL
            .into_iter()
            .find(|kind| kind.key() == s)
            .ok_or_else(|| format!("invalid daemon kind: {}", s))
    }
}

/// A call from a daemon into the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DaemonRequest {
    AddBridgeEvents(bridge::AddBridgeEventsRequest),
    UpdateMarketPrices(pricefeed::UpdateMarketPricesRequest),
    LiquidateSubaccounts(liquidation::LiquidateSubaccountsRequest),
    /// Query the health monitor. This is not a liveness signal for any
    /// daemon.
    HealthStatus,
}

impl DaemonRequest {
    /// The daemon this request reports for, if any.
    pub fn daemon(&self) -> Option<DaemonKind> {
        match self {
            DaemonRequest::AddBridgeEvents(_) => Some(DaemonKind::Bridge),
            DaemonRequest::UpdateMarketPrices(_) => {
                Some(DaemonKind::PriceFeed)
            }
            DaemonRequest::LiquidateSubaccounts(_) => {
                Some(DaemonKind::Liquidation)
            }
            DaemonRequest::HealthStatus => None,
        }
    }
}

/// The gateway's answer to a [`DaemonRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DaemonResponse {
    AddBridgeEvents(bridge::AddBridgeEventsResponse),
    UpdateMarketPrices(pricefeed::UpdateMarketPricesResponse),
    LiquidateSubaccounts(liquidation::LiquidateSubaccountsResponse),
    HealthStatus(health::HealthReport),
    Error(ErrorResponse),
}

impl DaemonResponse {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        DaemonResponse::Error(ErrorResponse { code, message: message.into() })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, DaemonResponse::Error(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The request could not be decoded.
    InvalidRequest,
    /// The payload was decoded but rejected by validation or by the sink it
    /// feeds.
    InvalidPayload,
    /// This gateway was not configured to serve the requested daemon.
    ServiceNotEnabled,
    /// The payload was applied but the daemon is unknown to the health
    /// monitor.
    DaemonNotRegistered,
}
