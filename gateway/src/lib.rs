// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod config;
mod context;
mod error;
mod listener;

pub mod health;
pub mod metrics;
pub mod services;

pub use config::Config;
pub use config::DaemonConfig;
pub use config::LoadError;
pub use config::MonitorConfig;
pub use context::ServerContext;
pub use error::ConfigError;
pub use error::HealthError;
pub use error::ServerError;
pub use error::ServiceError;
pub use error::StalenessBreach;
pub use error::StartError;

use camino::Utf8Path;
use camino::Utf8PathBuf;
use daemon_common::logging::ConfigLogging;
use health::HealthMonitor;
use metrics::NoopObserver;
use metrics::ResponseObserver;
use services::DaemonSinks;
use slog::crit;
use slog::info;
use slog::o;
use slog::Logger;
use std::sync::Arc;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Collaborators a gateway hands accepted payloads to
pub struct GatewayArguments {
    pub sinks: DaemonSinks,
    pub response_observer: Arc<dyn ResponseObserver>,
}

impl Default for GatewayArguments {
    fn default() -> Self {
        GatewayArguments {
            sinks: DaemonSinks::default(),
            response_observer: Arc::new(NoopObserver),
        }
    }
}

pub struct Server {
    /// shared state used by daemon request handlers
    apictx: Arc<ServerContext>,
    socket_path: Utf8PathBuf,
    /// tells the listener to stop accepting and drain
    shutdown_tx: watch::Sender<bool>,
    /// accept loop; `None` once it has been joined
    serve_task: Option<JoinHandle<Result<(), ServerError>>>,
    log: Logger,
}

impl Server {
    /// Start a gateway server.
    ///
    /// Registers every configured daemon with a new health monitor, then
    /// binds the daemon socket.  The monitor's startup grace period begins
    /// here.
    pub async fn start(
        config: Config,
        args: GatewayArguments,
        log: &Logger,
    ) -> Result<Server, StartError> {
        config.validate()?;

        let log = log.new(o!("component" => "gateway"));
        info!(log, "setting up daemon gateway");

        let monitor = HealthMonitor::new(&config.monitor, &log);
        for (kind, daemon) in &config.daemons {
            monitor
                .register_daemon_service(
                    kind.key(),
                    daemon.max_acceptable_update_delay,
                )
                .map_err(StartError::Registration)?;
        }

        let listener = listener::bind(&config.socket_path, &log)?;

        let apictx = ServerContext::new(
            monitor,
            config.daemons.keys().copied().collect(),
            args.sinks,
            args.response_observer,
            &log.new(o!("component" => "handlers")),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let serve_task = tokio::spawn(listener::serve(
            listener,
            config.socket_path.clone(),
            Arc::clone(&apictx),
            config.max_request_bytes,
            shutdown_rx,
            log.new(o!("component" => "listener")),
        ));

        Ok(Server {
            apictx,
            socket_path: config.socket_path,
            shutdown_tx,
            serve_task: Some(serve_task),
            log,
        })
    }

    pub fn socket_path(&self) -> &Utf8Path {
        &self.socket_path
    }

    pub fn apictx(&self) -> &Arc<ServerContext> {
        &self.apictx
    }

    pub fn disable_update_monitoring_for_testing(&self) {
        self.apictx.monitor.disable_for_testing();
    }

    /// Stop the health monitor, then stop accepting daemon connections.
    ///
    /// Returns without waiting for open connections to drain; use
    /// [`Server::close()`] for that.  Safe to call more than once.
    pub fn stop(&self) {
        self.apictx.monitor.stop();
        if !self.shutdown_tx.send_replace(true) {
            info!(self.log, "stopping daemon gateway");
        }
    }

    /// Wait for the server to shut down
    ///
    /// Resolves with the breach if a daemon goes stale, or with the
    /// listener's result once the server has been stopped.  Note that this
    /// doesn't initiate a shutdown.
    pub async fn wait_for_finish(&mut self) -> Result<(), ServerError> {
        let Some(serve_task) = self.serve_task.as_mut() else {
            return Ok(());
        };

        let breach = tokio::select! {
            breach = self.apictx.monitor.wait_for_failure() => breach,
            joined = serve_task => {
                self.serve_task = None;
                return flatten_serve_result(joined);
            }
        };

        // The daemons are no longer trustworthy; stop serving them.
        crit!(
            self.log,
            "shutting down after staleness breach";
            "daemon" => &breach.key,
        );
        self.stop();
        if let Some(serve_task) = self.serve_task.take() {
            let _ = flatten_serve_result(serve_task.await);
        }
        Err(ServerError::StalenessBreach(breach))
    }

    /// Stop the server and wait for its connections to drain
    pub async fn close(mut self) -> Result<(), ServerError> {
        self.stop();
        match self.serve_task.take() {
            Some(serve_task) => flatten_serve_result(serve_task.await),
            None => Ok(()),
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

fn flatten_serve_result(
    joined: Result<Result<(), ServerError>, tokio::task::JoinError>,
) -> Result<(), ServerError> {
    joined.map_err(|err| ServerError::ListenerTask(err.to_string()))?
}

fn root_logger(config: &ConfigLogging) -> Result<Logger, String> {
    config.to_logger("daemon-gateway").map_err(|err| err.to_string())
}

/// Run an instance of the [Server] until it fails or the process is asked to
/// terminate.
pub async fn run_server(config: Config) -> Result<(), String> {
    let log = root_logger(&config.log)?;

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|err| format!("installing SIGTERM handler: {err}"))?;
    let mut server = Server::start(config, GatewayArguments::default(), &log)
        .await
        .map_err(|err| format!("starting gateway: {err}"))?;

    let signal_name = tokio::select! {
        result = server.wait_for_finish() => {
            return result.map_err(|err| err.to_string());
        }
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    };

    info!(log, "received signal; shutting down"; "signal" => signal_name);
    server.close().await.map_err(|err| err.to_string())
}
