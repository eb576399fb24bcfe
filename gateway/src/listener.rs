// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The local socket daemons connect to

use crate::context::ServerContext;
use crate::error::ServerError;
use crate::error::StartError;
use crate::services::handle_request;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use daemon_gateway_types::DaemonRequest;
use daemon_gateway_types::DaemonResponse;
use daemon_gateway_types::ErrorCode;
use futures::SinkExt;
use futures::StreamExt;
use nix::sys::stat::umask;
use nix::sys::stat::Mode;
use slog::debug;
use slog::error;
use slog::info;
use slog::o;
use slog::warn;
use slog::Logger;
use std::io;
use std::sync::Arc;
use std::sync::Mutex;
use tokio::net::UnixListener;
use tokio::net::UnixStream;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::codec::Framed;
use tokio_util::codec::LinesCodec;
use tokio_util::codec::LinesCodecError;

// The umask is process-wide; concurrent binds must not interleave their
// set/restore pairs.
static UMASK_LOCK: Mutex<()> = Mutex::new(());

/// Restores the process umask when dropped
struct UmaskGuard {
    previous: Mode,
}

impl UmaskGuard {
    fn set(mask: Mode) -> UmaskGuard {
        UmaskGuard { previous: umask(mask) }
    }
}

impl Drop for UmaskGuard {
    fn drop(&mut self) {
        umask(self.previous);
    }
}

/// Remove whatever a previous run left at `path`.
fn remove_stale_socket(path: &Utf8Path) -> Result<(), StartError> {
    let result = match std::fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(err) => Err(err),
    };
    match result {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(StartError::RemoveSocket { path: path.to_owned(), err }),
    }
}

/// Bind the daemon socket at `path`, readable and writable only by the
/// owning user.
pub(crate) fn bind(
    path: &Utf8Path,
    log: &Logger,
) -> Result<UnixListener, StartError> {
    remove_stale_socket(path)?;

    let listener = {
        let _lock =
            UMASK_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // The socket file's mode comes from the umask in effect at bind time.
        let _umask = UmaskGuard::set(
            Mode::S_IXUSR | Mode::S_IRWXG | Mode::S_IRWXO,
        );
        UnixListener::bind(path)
            .map_err(|err| StartError::Bind { path: path.to_owned(), err })?
    };

    info!(log, "listening for daemon connections"; "socket_path" => %path);
    Ok(listener)
}

async fn wait_for_shutdown(shutdown_rx: &mut watch::Receiver<bool>) {
    // An error means the server handle is gone, which is a shutdown too.
    let _ = shutdown_rx.wait_for(|stop| *stop).await;
}

/// Accept connections until `shutdown_rx` reports `true`, then drain the
/// open connections and remove the socket file.
pub(crate) async fn serve(
    listener: UnixListener,
    socket_path: Utf8PathBuf,
    apictx: Arc<ServerContext>,
    max_request_bytes: usize,
    mut shutdown_rx: watch::Receiver<bool>,
    log: Logger,
) -> Result<(), ServerError> {
    let mut connections = JoinSet::new();
    let mut next_connection_id: u64 = 0;

    let result = loop {
        tokio::select! {
            () = wait_for_shutdown(&mut shutdown_rx) => break Ok(()),

            accepted = listener.accept() => {
                let stream = match accepted {
                    Ok((stream, _)) => stream,
                    Err(err) => break Err(ServerError::Accept(err)),
                };
                let connection_id = next_connection_id;
                next_connection_id += 1;
                let log = log.new(o!("connection" => connection_id));
                debug!(log, "accepted daemon connection");
                connections.spawn(serve_connection(
                    stream,
                    Arc::clone(&apictx),
                    max_request_bytes,
                    shutdown_rx.clone(),
                    log,
                ));
            }

            Some(joined) = connections.join_next(),
                if !connections.is_empty() =>
            {
                if let Err(err) = joined {
                    warn!(log, "daemon connection task failed"; "error" => %err);
                }
            }
        }
    };

    drop(listener);
    debug!(log, "draining daemon connections"; "count" => connections.len());
    while let Some(joined) = connections.join_next().await {
        if let Err(err) = joined {
            warn!(log, "daemon connection task failed"; "error" => %err);
        }
    }

    if let Err(err) = std::fs::remove_file(&socket_path) {
        if err.kind() != io::ErrorKind::NotFound {
            warn!(
                log,
                "failed to remove daemon socket";
                "socket_path" => %socket_path,
                "error" => %err,
            );
        }
    }

    match &result {
        Ok(()) => info!(log, "daemon listener stopped"),
        Err(err) => error!(log, "daemon listener failed"; "error" => %err),
    }
    result
}

/// Answer requests on one connection, one JSON line each way.
///
/// Undecodable requests are answered with an error and the connection stays
/// open, except for oversized ones: the codec cannot resynchronize after
/// those, so the connection is closed once the error has been sent.
async fn serve_connection(
    stream: UnixStream,
    apictx: Arc<ServerContext>,
    max_request_bytes: usize,
    mut shutdown_rx: watch::Receiver<bool>,
    log: Logger,
) {
    let mut framed = Framed::new(
        stream,
        LinesCodec::new_with_max_length(max_request_bytes),
    );

    // Set once the stream can no longer be framed reliably.
    let mut hang_up = false;
    loop {
        let frame = tokio::select! {
            () = wait_for_shutdown(&mut shutdown_rx) => break,
            frame = framed.next() => frame,
        };

        let response = match frame {
            None => {
                debug!(log, "daemon disconnected");
                break;
            }
            Some(Ok(line)) if line.trim().is_empty() => continue,
            Some(Ok(line)) => match serde_json::from_str::<DaemonRequest>(&line)
            {
                Ok(request) => handle_request(&apictx, request),
                Err(err) => {
                    warn!(log, "invalid daemon request"; "error" => %err);
                    DaemonResponse::error(
                        ErrorCode::InvalidRequest,
                        format!("invalid request: {err}"),
                    )
                }
            },
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                warn!(
                    log,
                    "daemon request too large";
                    "max_request_bytes" => max_request_bytes,
                );
                hang_up = true;
                DaemonResponse::error(
                    ErrorCode::InvalidRequest,
                    format!(
                        "request exceeds the maximum of {max_request_bytes} \
                         bytes"
                    ),
                )
            }
            Some(Err(LinesCodecError::Io(err))) => {
                warn!(log, "error reading from daemon"; "error" => %err);
                break;
            }
        };

        let encoded = match serde_json::to_string(&response) {
            Ok(encoded) => encoded,
            Err(err) => {
                error!(log, "failed to encode response"; "error" => %err);
                break;
            }
        };
        if let Err(err) = framed.send(encoded).await {
            warn!(log, "error writing to daemon"; "error" => %err);
            break;
        }
        if hang_up {
            break;
        }
    }
}
