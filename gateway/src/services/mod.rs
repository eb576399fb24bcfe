// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-daemon request handlers
//!
//! Every handler follows the same sequence: check that this gateway serves
//! the daemon, validate the payload, hand it to the daemon's sink, and only
//! then record a valid response with the health monitor.  A call that fails
//! at any step leaves the daemon's staleness clock untouched.

pub mod bridge;
pub mod liquidation;
pub mod pricefeed;

use crate::context::ServerContext;
use crate::error::ServiceError;
use crate::metrics::ResponseObserver;
use daemon_gateway_types::bridge::AddBridgeEventsRequest;
use daemon_gateway_types::bridge::AddBridgeEventsResponse;
use daemon_gateway_types::liquidation::LiquidateSubaccountsRequest;
use daemon_gateway_types::liquidation::LiquidateSubaccountsResponse;
use daemon_gateway_types::pricefeed::UpdateMarketPricesRequest;
use daemon_gateway_types::pricefeed::UpdateMarketPricesResponse;
use daemon_gateway_types::DaemonKind;
use daemon_gateway_types::DaemonRequest;
use daemon_gateway_types::DaemonResponse;
use slog::debug;
use slog::warn;
use std::sync::Arc;

pub use bridge::BridgeEventQueue;
pub use bridge::BridgeEventSink;
pub use liquidation::LiquidatableSubaccounts;
pub use liquidation::LiquidationSink;
pub use pricefeed::MarketPriceCache;
pub use pricefeed::MarketPriceSink;

/// Where accepted daemon payloads go
#[derive(Clone)]
pub struct DaemonSinks {
    pub bridge: Arc<dyn BridgeEventSink>,
    pub prices: Arc<dyn MarketPriceSink>,
    pub liquidations: Arc<dyn LiquidationSink>,
}

impl Default for DaemonSinks {
    fn default() -> Self {
        DaemonSinks {
            bridge: Arc::new(BridgeEventQueue::new()),
            prices: Arc::new(MarketPriceCache::new()),
            liquidations: Arc::new(LiquidatableSubaccounts::new()),
        }
    }
}

/// Dispatch one decoded request.  Failures are answered with an error
/// response; they never affect the gateway as a whole.
pub fn handle_request(
    ctx: &ServerContext,
    request: DaemonRequest,
) -> DaemonResponse {
    let daemon = request.daemon();
    let result = match request {
        DaemonRequest::AddBridgeEvents(request) => {
            add_bridge_events(ctx, request).map(DaemonResponse::AddBridgeEvents)
        }
        DaemonRequest::UpdateMarketPrices(request) => {
            update_market_prices(ctx, request)
                .map(DaemonResponse::UpdateMarketPrices)
        }
        DaemonRequest::LiquidateSubaccounts(request) => {
            liquidate_subaccounts(ctx, request)
                .map(DaemonResponse::LiquidateSubaccounts)
        }
        DaemonRequest::HealthStatus => {
            Ok(DaemonResponse::HealthStatus(ctx.health_report()))
        }
    };

    result.unwrap_or_else(|err| {
        warn!(
            ctx.log,
            "daemon call failed";
            "daemon" => daemon.map(|d| d.key()),
            "error" => %err,
        );
        err.into()
    })
}

fn add_bridge_events(
    ctx: &ServerContext,
    request: AddBridgeEventsRequest,
) -> Result<AddBridgeEventsResponse, ServiceError> {
    ensure_enabled(ctx, DaemonKind::Bridge)?;
    bridge::validate(&request)?;
    ctx.sinks.bridge.add_bridge_events(&request.bridge_events)?;
    report_valid_response(ctx, DaemonKind::Bridge)?;
    Ok(AddBridgeEventsResponse {})
}

fn update_market_prices(
    ctx: &ServerContext,
    request: UpdateMarketPricesRequest,
) -> Result<UpdateMarketPricesResponse, ServiceError> {
    ensure_enabled(ctx, DaemonKind::PriceFeed)?;
    pricefeed::validate(&request)?;
    ctx.sinks.prices.update_market_prices(&request.market_price_updates)?;
    report_valid_response(ctx, DaemonKind::PriceFeed)?;
    Ok(UpdateMarketPricesResponse {})
}

fn liquidate_subaccounts(
    ctx: &ServerContext,
    request: LiquidateSubaccountsRequest,
) -> Result<LiquidateSubaccountsResponse, ServiceError> {
    ensure_enabled(ctx, DaemonKind::Liquidation)?;
    ctx.sinks.liquidations.liquidate_subaccounts(&request)?;
    report_valid_response(ctx, DaemonKind::Liquidation)?;
    Ok(LiquidateSubaccountsResponse {})
}

fn ensure_enabled(
    ctx: &ServerContext,
    kind: DaemonKind,
) -> Result<(), ServiceError> {
    if ctx.serves(kind) {
        Ok(())
    } else {
        Err(ServiceError::NotEnabled(kind))
    }
}

fn report_valid_response(
    ctx: &ServerContext,
    kind: DaemonKind,
) -> Result<(), ServiceError> {
    let key = kind.key();
    ctx.monitor.register_valid_response(key)?;
    ctx.valid_responses.valid_response(key);
    ctx.observer.valid_response(key);
    debug!(ctx.log, "valid daemon response"; "daemon" => key);
    Ok(())
}
