// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::TimeZone;
use chrono::Utc;
use daemon_gateway::metrics::ResponseObserver;
use daemon_gateway_test_utils::setup;
use daemon_gateway_types::bridge::AddBridgeEventsResponse;
use daemon_gateway_types::bridge::BridgeEvent;
use daemon_gateway_types::bridge::Coin;
use daemon_gateway_types::health::MonitorState;
use daemon_gateway_types::liquidation::LiquidateSubaccountsRequest;
use daemon_gateway_types::liquidation::LiquidateSubaccountsResponse;
use daemon_gateway_types::liquidation::SubaccountId;
use daemon_gateway_types::pricefeed::ExchangePrice;
use daemon_gateway_types::pricefeed::MarketPriceUpdate;
use daemon_gateway_types::pricefeed::UpdateMarketPricesResponse;
use daemon_gateway_types::DaemonResponse;
use daemon_gateway_types::ErrorCode;

fn bridge_event(id: u32) -> BridgeEvent {
    BridgeEvent {
        id,
        coin: Coin {
            denom: String::from("adv4tnt"),
            amount: String::from("12345678901234567890123"),
        },
        address: String::from("dydx1depositor"),
        eth_block_height: 19_000_000 + u64::from(id),
    }
}

fn price_update(market_id: u32, price: u64) -> MarketPriceUpdate {
    MarketPriceUpdate {
        market_id,
        exchange_prices: vec![ExchangePrice {
            exchange_id: String::from("Binance"),
            price,
            last_update_time: Some(
                Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
            ),
        }],
    }
}

#[tokio::test]
async fn daemon_calls_reach_their_sinks() {
    let testctx = setup::test_setup("daemon_calls_reach_their_sinks").await;
    let mut client = testctx.client().await;

    let response = client
        .add_bridge_events(vec![bridge_event(0), bridge_event(1)])
        .await
        .unwrap();
    assert_eq!(
        response,
        DaemonResponse::AddBridgeEvents(AddBridgeEventsResponse {})
    );
    assert_eq!(testctx.bridge.next_id(), 2);

    let response = client
        .update_market_prices(vec![price_update(0, 4_200_000)])
        .await
        .unwrap();
    assert_eq!(
        response,
        DaemonResponse::UpdateMarketPrices(UpdateMarketPricesResponse {})
    );
    assert_eq!(testctx.prices.price(0, "Binance").unwrap().price, 4_200_000);

    let response = client
        .liquidate_subaccounts(LiquidateSubaccountsRequest {
            block_height: 55,
            liquidatable_subaccount_ids: vec![SubaccountId {
                owner: String::from("dydx1underwater"),
                number: 0,
            }],
            negative_tnc_subaccount_ids: vec![],
        })
        .await
        .unwrap();
    assert_eq!(
        response,
        DaemonResponse::LiquidateSubaccounts(LiquidateSubaccountsResponse {})
    );
    assert_eq!(testctx.liquidations.latest().unwrap().block_height, 55);

    for key in ["bridge", "pricefeed", "liquidation"] {
        assert_eq!(testctx.observer.count(key), 1, "{key}");
    }

    testctx.teardown().await;
}

#[tokio::test]
async fn rejected_payloads_are_not_counted() {
    let testctx = setup::test_setup("rejected_payloads_are_not_counted").await;
    let mut client = testctx.client().await;

    // Not consecutive.
    let response = client
        .add_bridge_events(vec![bridge_event(0), bridge_event(2)])
        .await
        .unwrap();
    assert_error(&response, ErrorCode::InvalidPayload);

    // A gap relative to what the sink has already recognized.
    let response =
        client.add_bridge_events(vec![bridge_event(5)]).await.unwrap();
    assert_error(&response, ErrorCode::InvalidPayload);

    let response = client.update_market_prices(vec![]).await.unwrap();
    assert_error(&response, ErrorCode::InvalidPayload);
    let response =
        client.update_market_prices(vec![price_update(3, 0)]).await.unwrap();
    assert_error(&response, ErrorCode::InvalidPayload);

    assert_eq!(testctx.bridge.next_id(), 0);
    assert_eq!(testctx.prices.price(3, "Binance"), None);
    assert_eq!(testctx.observer.count("bridge"), 0);
    assert_eq!(testctx.observer.count("pricefeed"), 0);

    let report = client.health_status().await.unwrap();
    assert_eq!(report.daemon("bridge").unwrap().valid_responses, 0);

    testctx.teardown().await;
}

#[tokio::test]
async fn health_status_reports_each_daemon() {
    let testctx = setup::test_setup("health_status_reports_each_daemon").await;
    let mut client = testctx.client().await;

    client.add_bridge_events(vec![bridge_event(0)]).await.unwrap();
    client.add_bridge_events(vec![bridge_event(1)]).await.unwrap();

    let report = client.health_status().await.unwrap();
    assert_eq!(report.state, MonitorState::Active);
    assert!(report.enabled);
    assert_eq!(
        report.daemons.iter().map(|d| d.key.as_str()).collect::<Vec<_>>(),
        vec!["bridge", "liquidation", "pricefeed"]
    );
    let bridge = report.daemon("bridge").unwrap();
    assert_eq!(bridge.valid_responses, 2);
    assert!(bridge.healthy);
    assert!(bridge.elapsed <= bridge.max_acceptable_delay);

    // Asking for health is not a liveness signal for anyone.
    assert_eq!(report.daemon("pricefeed").unwrap().valid_responses, 0);

    testctx.teardown().await;
}

#[tokio::test]
async fn disabled_monitoring_is_reported() {
    let testctx = setup::test_setup("disabled_monitoring_is_reported").await;
    testctx.server.disable_update_monitoring_for_testing();

    let report = testctx.client().await.health_status().await.unwrap();
    assert!(!report.enabled);

    testctx.teardown().await;
}

#[tokio::test]
async fn observer_sees_only_accepted_calls() {
    let testctx = setup::test_setup("observer_sees_only_accepted_calls").await;
    let mut client = testctx.client().await;

    client
        .update_market_prices(vec![price_update(1, 10), price_update(2, 20)])
        .await
        .unwrap();
    client.update_market_prices(vec![price_update(1, 0)]).await.unwrap();

    assert_eq!(testctx.observer.count("pricefeed"), 1);
    // The observer is independent of the gateway's own accounting.
    testctx.observer.valid_response("pricefeed");
    let report = client.health_status().await.unwrap();
    assert_eq!(report.daemon("pricefeed").unwrap().valid_responses, 1);

    testctx.teardown().await;
}

fn assert_error(response: &DaemonResponse, code: ErrorCode) {
    match response {
        DaemonResponse::Error(e) => assert_eq!(e.code, code, "{e:?}"),
        other => panic!("expected {code:?} error, got {other:?}"),
    }
}
