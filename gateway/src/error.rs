// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error handling facilities for the daemon gateway.

use camino::Utf8PathBuf;
use daemon_gateway_types::DaemonKind;
use daemon_gateway_types::DaemonResponse;
use daemon_gateway_types::ErrorCode;
use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration file: {}", .reasons.join(", "))]
    InvalidConfig { reasons: Vec<String> },
}

/// Errors from the health monitor's registration and reporting operations
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum HealthError {
    #[error("daemon {key:?} is already registered")]
    DuplicateKey { key: String },
    #[error("daemon {key:?} is not registered")]
    UnknownKey { key: String },
    #[error(
        "daemon {key:?}: maximum acceptable update delay must be positive"
    )]
    InvalidDelay { key: String },
    #[error("cannot register daemon {key:?}: health monitor has been stopped")]
    MonitorStopped { key: String },
}

/// A registered daemon went longer than its budget without a valid response.
///
/// This is always fatal to the hosting process.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error(
    "{key} daemon has not reported a valid response in {elapsed:?} \
     (maximum acceptable update delay is {max_acceptable_delay:?})"
)]
pub struct StalenessBreach {
    pub key: String,
    pub elapsed: Duration,
    pub max_acceptable_delay: Duration,
}

impl StalenessBreach {
    /// How far past its budget the daemon is
    pub fn overage(&self) -> Duration {
        self.elapsed.saturating_sub(self.max_acceptable_delay)
    }
}

/// Errors that prevent the gateway from starting. All of them are fatal.
#[derive(Debug, Error)]
pub enum StartError {
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
    #[error("failed to clear socket path \"{path}\": {err}")]
    RemoveSocket {
        path: Utf8PathBuf,
        #[source]
        err: io::Error,
    },
    #[error("failed to listen on \"{path}\": {err}")]
    Bind {
        path: Utf8PathBuf,
        #[source]
        err: io::Error,
    },
    #[error("failed to register daemon service with health monitor: {0}")]
    Registration(#[source] HealthError),
}

/// Reasons a running gateway stops other than an explicit, clean stop
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    StalenessBreach(#[from] StalenessBreach),
    #[error("failed to accept daemon connection: {0}")]
    Accept(#[source] io::Error),
    #[error("daemon listener task failed: {0}")]
    ListenerTask(String),
}

/// Errors from a single daemon call. These fail the call, never the gateway.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("payload rejected: {0}")]
    Rejected(String),
    #[error("{0} daemon is not served by this gateway")]
    NotEnabled(DaemonKind),
    #[error(transparent)]
    Health(#[from] HealthError),
}

impl ServiceError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ServiceError::InvalidPayload(_) | ServiceError::Rejected(_) => {
                ErrorCode::InvalidPayload
            }
            ServiceError::NotEnabled(_) => ErrorCode::ServiceNotEnabled,
            ServiceError::Health(_) => ErrorCode::DaemonNotRegistered,
        }
    }
}

impl From<ServiceError> for DaemonResponse {
    fn from(err: ServiceError) -> Self {
        DaemonResponse::error(err.error_code(), err.to_string())
    }
}
