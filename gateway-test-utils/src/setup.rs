// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::client::DaemonClient;
use crate::dev::LogContext;
use camino::Utf8Path;
use camino_tempfile::Utf8TempDir;
use daemon_gateway::metrics::ValidResponseCounter;
use daemon_gateway::services::BridgeEventQueue;
use daemon_gateway::services::DaemonSinks;
use daemon_gateway::services::LiquidatableSubaccounts;
use daemon_gateway::services::MarketPriceCache;
use daemon_gateway::GatewayArguments;
use std::sync::Arc;

pub struct GatewayTestContext {
    pub server: daemon_gateway::Server,
    pub bridge: Arc<BridgeEventQueue>,
    pub prices: Arc<MarketPriceCache>,
    pub liquidations: Arc<LiquidatableSubaccounts>,
    pub observer: Arc<ValidResponseCounter>,
    pub logctx: LogContext,
    // Holds the socket; removed when the context goes away.
    socket_dir: Utf8TempDir,
}

impl GatewayTestContext {
    pub async fn client(&self) -> DaemonClient {
        DaemonClient::connect(self.server.socket_path())
            .await
            .expect("failed to connect to gateway")
    }

    pub fn socket_dir(&self) -> &Utf8Path {
        self.socket_dir.path()
    }

    pub async fn teardown(self) {
        let GatewayTestContext { server, logctx, socket_dir, .. } = self;
        server.close().await.unwrap();
        drop(socket_dir);
        logctx.cleanup_successful();
    }
}

pub fn load_test_config() -> daemon_gateway::Config {
    // The test config is located relative to the directory this file is in.
    let manifest_dir = Utf8Path::new(env!("CARGO_MANIFEST_DIR"));
    let server_config_file_path = manifest_dir.join("configs/config.test.toml");
    daemon_gateway::Config::from_file(&server_config_file_path)
        .expect("failed to load config.test.toml")
}

pub async fn test_setup(test_name: &str) -> GatewayTestContext {
    test_setup_with_config(test_name, load_test_config()).await
}

/// Start a gateway from `server_config`, with its socket placed in a fresh
/// temporary directory and in-memory sinks the test can inspect.
pub async fn test_setup_with_config(
    test_name: &str,
    mut server_config: daemon_gateway::Config,
) -> GatewayTestContext {
    let logctx = LogContext::new(test_name, &server_config.log);
    let log = &logctx.log;

    let socket_dir = Utf8TempDir::new().expect("failed to create socket dir");
    server_config.socket_path = socket_dir.path().join("gateway.sock");

    let bridge = Arc::new(BridgeEventQueue::new());
    let prices = Arc::new(MarketPriceCache::new());
    let liquidations = Arc::new(LiquidatableSubaccounts::new());
    let observer = Arc::new(ValidResponseCounter::new());
    let args = GatewayArguments {
        sinks: DaemonSinks {
            bridge: bridge.clone(),
            prices: prices.clone(),
            liquidations: liquidations.clone(),
        },
        response_observer: observer.clone(),
    };

    let server = daemon_gateway::Server::start(server_config, args, log)
        .await
        .unwrap();

    GatewayTestContext {
        server,
        bridge,
        prices,
        liquidations,
        observer,
        logctx,
        socket_dir,
    }
}
