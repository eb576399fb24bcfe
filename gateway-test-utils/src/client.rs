// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A minimal daemon-side client for the gateway socket

use anyhow::bail;
use anyhow::Context;
use camino::Utf8Path;
use daemon_gateway_types::bridge::AddBridgeEventsRequest;
use daemon_gateway_types::bridge::BridgeEvent;
use daemon_gateway_types::health::HealthReport;
use daemon_gateway_types::liquidation::LiquidateSubaccountsRequest;
use daemon_gateway_types::pricefeed::MarketPriceUpdate;
use daemon_gateway_types::pricefeed::UpdateMarketPricesRequest;
use daemon_gateway_types::DaemonRequest;
use daemon_gateway_types::DaemonResponse;
use futures::SinkExt;
use futures::StreamExt;
use tokio::net::UnixStream;
use tokio_util::codec::Framed;
use tokio_util::codec::LinesCodec;

pub struct DaemonClient {
    framed: Framed<UnixStream, LinesCodec>,
}

impl DaemonClient {
    pub async fn connect(socket_path: &Utf8Path) -> anyhow::Result<Self> {
        let stream = UnixStream::connect(socket_path)
            .await
            .with_context(|| format!("connecting to {socket_path}"))?;
        Ok(DaemonClient { framed: Framed::new(stream, LinesCodec::new()) })
    }

    /// Send one raw line and decode whatever comes back.
    pub async fn send_raw(&mut self, line: &str) -> anyhow::Result<DaemonResponse> {
        self.framed.send(line).await.context("sending request")?;
        let Some(response) = self.framed.next().await else {
            bail!("gateway closed the connection");
        };
        let response = response.context("reading response")?;
        serde_json::from_str(&response)
            .with_context(|| format!("decoding response {response:?}"))
    }

    pub async fn call(
        &mut self,
        request: &DaemonRequest,
    ) -> anyhow::Result<DaemonResponse> {
        let line = serde_json::to_string(request).context("encoding request")?;
        self.send_raw(&line).await
    }

    pub async fn add_bridge_events(
        &mut self,
        bridge_events: Vec<BridgeEvent>,
    ) -> anyhow::Result<DaemonResponse> {
        self.call(&DaemonRequest::AddBridgeEvents(AddBridgeEventsRequest {
            bridge_events,
        }))
        .await
    }

    pub async fn update_market_prices(
        &mut self,
        market_price_updates: Vec<MarketPriceUpdate>,
    ) -> anyhow::Result<DaemonResponse> {
        self.call(&DaemonRequest::UpdateMarketPrices(
            UpdateMarketPricesRequest { market_price_updates },
        ))
        .await
    }

    pub async fn liquidate_subaccounts(
        &mut self,
        request: LiquidateSubaccountsRequest,
    ) -> anyhow::Result<DaemonResponse> {
        self.call(&DaemonRequest::LiquidateSubaccounts(request)).await
    }

    pub async fn health_status(&mut self) -> anyhow::Result<HealthReport> {
        match self.call(&DaemonRequest::HealthStatus).await? {
            DaemonResponse::HealthStatus(report) => Ok(report),
            other => bail!("unexpected response to health_status: {other:?}"),
        }
    }
}
