// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end staleness detection

use assert_matches::assert_matches;
use daemon_gateway::DaemonConfig;
use daemon_gateway::ServerError;
use daemon_gateway_test_utils::setup;
use daemon_gateway_types::bridge::BridgeEvent;
use daemon_gateway_types::bridge::Coin;
use daemon_gateway_types::health::MonitorState;
use daemon_gateway_types::DaemonKind;
use std::time::Duration;

const BUDGET: Duration = Duration::from_millis(400);
const DEADLINE: Duration = Duration::from_secs(10);

/// The test config, serving only the bridge daemon with a short budget
fn bridge_only_config() -> daemon_gateway::Config {
    let mut config = setup::load_test_config();
    config.monitor.poll_interval = Duration::from_millis(20);
    config.daemons.clear();
    config.daemons.insert(
        DaemonKind::Bridge,
        DaemonConfig { max_acceptable_update_delay: BUDGET },
    );
    config
}

fn bridge_event(id: u32) -> BridgeEvent {
    BridgeEvent {
        id,
        coin: Coin { denom: String::from("adv4tnt"), amount: String::from("1") },
        address: String::from("dydx1depositor"),
        eth_block_height: u64::from(id),
    }
}

#[tokio::test]
async fn silent_daemon_fails_the_gateway() {
    let mut testctx = setup::test_setup_with_config(
        "silent_daemon_fails_the_gateway",
        bridge_only_config(),
    )
    .await;

    let result =
        tokio::time::timeout(DEADLINE, testctx.server.wait_for_finish())
            .await
            .expect("gateway should have failed");
    let breach = assert_matches!(
        result,
        Err(ServerError::StalenessBreach(breach)) => breach
    );
    assert_eq!(breach.key, "bridge");
    assert_eq!(breach.max_acceptable_delay, BUDGET);
    assert!(breach.elapsed > BUDGET);
    assert_eq!(testctx.server.apictx().monitor.state(), MonitorState::Failed);

    // The listener went down with the monitor.
    assert!(!testctx.server.socket_path().exists());

    testctx.teardown().await;
}

#[tokio::test]
async fn active_daemon_keeps_the_gateway_alive() {
    let mut testctx = setup::test_setup_with_config(
        "active_daemon_keeps_the_gateway_alive",
        bridge_only_config(),
    )
    .await;
    let mut client = testctx.client().await;

    // Report well within the budget for several budgets' worth of time.
    for id in 0..15 {
        let response = client.add_bridge_events(vec![bridge_event(id)]).await;
        assert!(!response.unwrap().is_error());
        tokio::time::sleep(BUDGET / 5).await;
    }
    assert_eq!(testctx.server.apictx().monitor.failure(), None);
    assert_eq!(testctx.observer.count("bridge"), 15);

    // Then go quiet.
    let result =
        tokio::time::timeout(DEADLINE, testctx.server.wait_for_finish())
            .await
            .expect("gateway should have failed");
    assert_matches!(result, Err(ServerError::StalenessBreach(_)));

    testctx.teardown().await;
}

#[tokio::test]
async fn rejected_payloads_do_not_keep_a_daemon_alive() {
    let mut testctx = setup::test_setup_with_config(
        "rejected_payloads_do_not_keep_a_daemon_alive",
        bridge_only_config(),
    )
    .await;
    let mut client = testctx.client().await;

    let chatter = async {
        loop {
            // Never consecutive, so always rejected.
            match client
                .add_bridge_events(vec![bridge_event(0), bridge_event(7)])
                .await
            {
                Ok(response) => assert!(response.is_error()),
                // The gateway hangs up once it has failed.
                Err(_) => std::future::pending::<()>().await,
            }
            tokio::time::sleep(BUDGET / 10).await;
        }
    };

    let result = tokio::select! {
        result = testctx.server.wait_for_finish() => result,
        () = chatter => unreachable!(),
        () = tokio::time::sleep(DEADLINE) => panic!("gateway should have failed"),
    };
    let breach = assert_matches!(
        result,
        Err(ServerError::StalenessBreach(breach)) => breach
    );
    assert_eq!(breach.key, "bridge");
    assert_eq!(testctx.observer.count("bridge"), 0);

    testctx.teardown().await;
}

#[tokio::test]
async fn disabled_monitoring_never_fails() {
    let mut testctx = setup::test_setup_with_config(
        "disabled_monitoring_never_fails",
        bridge_only_config(),
    )
    .await;
    testctx.server.disable_update_monitoring_for_testing();

    let result = tokio::time::timeout(
        BUDGET * 5,
        testctx.server.wait_for_finish(),
    )
    .await;
    assert!(result.is_err(), "gateway finished unexpectedly: {result:?}");
    assert_eq!(testctx.server.apictx().monitor.failure(), None);

    testctx.teardown().await;
}

#[tokio::test]
async fn grace_period_delays_detection() {
    let mut config = bridge_only_config();
    config.monitor.startup_grace_period = BUDGET * 3;
    let mut testctx =
        setup::test_setup_with_config("grace_period_delays_detection", config)
            .await;

    let start = tokio::time::Instant::now();
    let result =
        tokio::time::timeout(DEADLINE, testctx.server.wait_for_finish())
            .await
            .expect("gateway should have failed");
    assert_matches!(result, Err(ServerError::StalenessBreach(_)));
    assert!(start.elapsed() >= BUDGET * 2);

    testctx.teardown().await;
}

#[tokio::test]
async fn stopped_gateway_finishes_cleanly() {
    let mut testctx = setup::test_setup_with_config(
        "stopped_gateway_finishes_cleanly",
        bridge_only_config(),
    )
    .await;

    testctx.server.stop();
    testctx.server.stop();
    testctx.server.wait_for_finish().await.unwrap();
    assert_eq!(testctx.server.apictx().monitor.state(), MonitorState::Stopped);

    // Well past the budget; a stopped monitor stays quiet.
    tokio::time::sleep(BUDGET * 2).await;
    assert_eq!(testctx.server.apictx().monitor.failure(), None);

    testctx.teardown().await;
}
