// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use camino::Utf8PathBuf;
use daemon_common::logging::ConfigLogging;
use daemon_common::logging::ConfigLoggingIfExists;
use daemon_common::logging::ConfigLoggingLevel;
use slog::Logger;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

static LOG_FILE_ID: AtomicU32 = AtomicU32::new(0);

/// A logger for one test, plus the file it writes to (if any)
///
/// File-mode configurations are redirected to a fresh file in the temporary
/// directory named after the test.  Call
/// [`LogContext::cleanup_successful()`] when the test passes so that only the
/// logs of failed tests are left behind.
pub struct LogContext {
    pub log: Logger,
    log_path: Option<Utf8PathBuf>,
}

impl LogContext {
    pub fn new(test_name: &str, initial_config: &ConfigLogging) -> LogContext {
        let (log_config, log_path) = match initial_config {
            ConfigLogging::File { level, if_exists, .. } => {
                let path = log_file_for_test(test_name);
                eprintln!("log file: {}", path);
                let config = ConfigLogging::File {
                    level: *level,
                    path: path.to_string(),
                    if_exists: *if_exists,
                };
                (config, Some(path))
            }
            other => (other.clone(), None),
        };

        let log = log_config
            .to_logger(test_name)
            .unwrap_or_else(|e| panic!("failed to create test logger: {e}"));
        LogContext { log, log_path }
    }

    pub fn log_path(&self) -> Option<&Utf8PathBuf> {
        self.log_path.as_ref()
    }

    /// Remove the log file.  Only call this once the test has passed.
    pub fn cleanup_successful(self) {
        let LogContext { log, log_path } = self;
        drop(log);
        if let Some(path) = log_path {
            let _ = std::fs::remove_file(path);
        }
    }
}

fn log_file_for_test(test_name: &str) -> Utf8PathBuf {
    let dir = Utf8PathBuf::try_from(std::env::temp_dir())
        .unwrap_or_else(|_| Utf8PathBuf::from("/tmp"));
    let arg0 = std::env::args()
        .next()
        .and_then(|arg0| {
            Utf8PathBuf::from(arg0).file_name().map(str::to_owned)
        })
        .unwrap_or_else(|| String::from("test"));
    let id = LOG_FILE_ID.fetch_add(1, Ordering::SeqCst);
    dir.join(format!(
        "{}-{}.{}.{}.log",
        arg0,
        test_name,
        std::process::id(),
        id
    ))
}

/// Set up a [`LogContext`] appropriate for a test named `test_name`
pub fn test_setup_log(test_name: &str) -> LogContext {
    let log_config = ConfigLogging::File {
        level: ConfigLoggingLevel::Trace,
        path: String::from("UNUSED"),
        if_exists: ConfigLoggingIfExists::Fail,
    };

    LogContext::new(test_name, &log_config)
}
