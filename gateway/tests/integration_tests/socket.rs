// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Socket lifecycle and wire protocol handling

use assert_matches::assert_matches;
use camino_tempfile::Utf8TempDir;
use daemon_gateway::GatewayArguments;
use daemon_gateway::Server;
use daemon_gateway::StartError;
use daemon_gateway_test_utils::client::DaemonClient;
use daemon_gateway_test_utils::dev::test_setup_log;
use daemon_gateway_test_utils::setup;
use daemon_gateway_types::DaemonKind;
use daemon_gateway_types::DaemonResponse;
use daemon_gateway_types::ErrorCode;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::fs::PermissionsExt;

fn error_code(response: &DaemonResponse) -> Option<ErrorCode> {
    match response {
        DaemonResponse::Error(e) => Some(e.code),
        _ => None,
    }
}

#[tokio::test]
async fn socket_is_private_to_owner() {
    let testctx = setup::test_setup("socket_is_private_to_owner").await;

    let metadata =
        std::fs::metadata(testctx.server.socket_path()).unwrap();
    assert!(metadata.file_type().is_socket());
    assert_eq!(metadata.permissions().mode() & 0o777, 0o600);

    testctx.teardown().await;
}

#[tokio::test]
async fn stale_socket_is_replaced() {
    let logctx = test_setup_log("stale_socket_is_replaced");
    let socket_dir = Utf8TempDir::new().unwrap();
    let socket_path = socket_dir.path().join("gateway.sock");
    std::fs::write(&socket_path, b"left behind by a crashed gateway").unwrap();

    let mut config = setup::load_test_config();
    config.socket_path = socket_path.clone();
    let server =
        Server::start(config, GatewayArguments::default(), &logctx.log)
            .await
            .unwrap();

    let metadata = std::fs::metadata(&socket_path).unwrap();
    assert!(metadata.file_type().is_socket());
    let mut client = DaemonClient::connect(&socket_path).await.unwrap();
    client.health_status().await.unwrap();

    server.close().await.unwrap();
    assert!(!socket_path.exists());
    logctx.cleanup_successful();
}

#[tokio::test]
async fn unwritable_socket_path_fails_start() {
    let logctx = test_setup_log("unwritable_socket_path_fails_start");
    let mut config = setup::load_test_config();
    config.socket_path = "/nonexistent/dir/gateway.sock".into();

    let error =
        Server::start(config, GatewayArguments::default(), &logctx.log)
            .await
            .err()
            .expect("start should fail");
    assert_matches!(error, StartError::Bind { .. });
    logctx.cleanup_successful();
}

#[tokio::test]
async fn invalid_config_fails_start() {
    let logctx = test_setup_log("invalid_config_fails_start");
    let mut config = setup::load_test_config();
    config.daemons.clear();

    let error =
        Server::start(config, GatewayArguments::default(), &logctx.log)
            .await
            .err()
            .expect("start should fail");
    assert_matches!(error, StartError::InvalidConfig(_));
    logctx.cleanup_successful();
}

#[tokio::test]
async fn unconfigured_service_is_refused() {
    let mut config = setup::load_test_config();
    config.daemons.remove(&DaemonKind::Liquidation);
    let testctx =
        setup::test_setup_with_config("unconfigured_service_is_refused", config)
            .await;
    let mut client = testctx.client().await;

    let response = client
        .send_raw(
            r#"{"type":"liquidate_subaccounts","block_height":1,"liquidatable_subaccount_ids":[]}"#,
        )
        .await
        .unwrap();
    assert_eq!(error_code(&response), Some(ErrorCode::ServiceNotEnabled));
    assert_eq!(testctx.liquidations.latest(), None);

    let report = client.health_status().await.unwrap();
    assert!(report.daemon("liquidation").is_none());

    testctx.teardown().await;
}

#[tokio::test]
async fn malformed_requests_leave_the_connection_open() {
    let testctx =
        setup::test_setup("malformed_requests_leave_the_connection_open")
            .await;
    let mut client = testctx.client().await;

    let response = client.send_raw("this is not json").await.unwrap();
    assert_eq!(error_code(&response), Some(ErrorCode::InvalidRequest));

    let response =
        client.send_raw(r#"{"type":"launch_missiles"}"#).await.unwrap();
    assert_eq!(error_code(&response), Some(ErrorCode::InvalidRequest));

    // Same connection, still usable.
    let report = client.health_status().await.unwrap();
    assert!(report.daemons.iter().all(|d| d.valid_responses == 0));

    testctx.teardown().await;
}

#[tokio::test]
async fn oversized_request_closes_the_connection() {
    let testctx =
        setup::test_setup("oversized_request_closes_the_connection").await;
    let max_request_bytes = setup::load_test_config().max_request_bytes;
    let mut client = testctx.client().await;

    let oversized = format!(
        r#"{{"type":"add_bridge_events","bridge_events":[],"pad":"{}"}}"#,
        "x".repeat(max_request_bytes)
    );
    let response = client.send_raw(&oversized).await.unwrap();
    assert_eq!(error_code(&response), Some(ErrorCode::InvalidRequest));
    assert!(client.health_status().await.is_err());

    // Other connections are unaffected.
    let report = testctx.client().await.health_status().await.unwrap();
    assert!(report.daemons.iter().all(|d| d.valid_responses == 0));

    testctx.teardown().await;
}

#[tokio::test]
async fn concurrent_daemons_share_the_socket() {
    let testctx =
        setup::test_setup("concurrent_daemons_share_the_socket").await;

    let mut clients = Vec::new();
    for _ in 0..4 {
        clients.push(testctx.client().await);
    }
    let calls = clients.iter_mut().map(|client| async move {
        client.update_market_prices(vec![]).await.unwrap();
        client.health_status().await.unwrap()
    });
    let reports = futures::future::join_all(calls).await;
    assert_eq!(reports.len(), 4);

    testctx.teardown().await;
}
