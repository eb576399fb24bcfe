// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Logging configuration
//!
//! Represents the "log" top-level object in a server configuration file and
//! knows how to turn it into a root [`slog::Logger`].

use serde::Deserialize;
use serde::Serialize;
use slog::o;
use slog::Drain;
use slog::Level;
use slog::Logger;
use std::fs::File;
use std::fs::OpenOptions;
use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use thiserror::Error;

/// Error returned when the configured log destination cannot be set up
#[derive(Debug, Error)]
#[error("initializing logger: {0}")]
pub struct InitError(pub String);

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "mode")]
pub enum ConfigLogging {
    #[serde(rename = "stderr-terminal")]
    StderrTerminal { level: ConfigLoggingLevel },

    #[serde(rename = "file")]
    File {
        level: ConfigLoggingLevel,
        path: String,
        if_exists: ConfigLoggingIfExists,
    },

    // "test-suite" mode generates log files in a particular directory that
    // are named with the program name, the process id, and a per-process
    // counter, so that several servers started by one test binary don't
    // clobber each other's logs.
    #[serde(rename = "test-suite")]
    TestSuite { level: ConfigLoggingLevel, directory: String },
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub enum ConfigLoggingIfExists {
    #[serde(rename = "fail")]
    Fail,
    #[serde(rename = "truncate")]
    Truncate,
    #[serde(rename = "append")]
    Append,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub enum ConfigLoggingLevel {
    #[serde(rename = "trace")]
    Trace,
    #[serde(rename = "debug")]
    Debug,
    #[serde(rename = "info")]
    Info,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "critical")]
    Critical,
}

impl From<ConfigLoggingLevel> for Level {
    fn from(config_level: ConfigLoggingLevel) -> Level {
        match config_level {
            ConfigLoggingLevel::Trace => Level::Trace,
            ConfigLoggingLevel::Debug => Level::Debug,
            ConfigLoggingLevel::Info => Level::Info,
            ConfigLoggingLevel::Warn => Level::Warning,
            ConfigLoggingLevel::Error => Level::Error,
            ConfigLoggingLevel::Critical => Level::Critical,
        }
    }
}

static TEST_SUITE_LOGGER_ID: AtomicU32 = AtomicU32::new(0);

impl ConfigLogging {
    /// Create the root logger based on the requested configuration.
    ///
    /// `name` is recorded as the bunyan "name" field when logging to a file.
    pub fn to_logger(&self, name: &str) -> Result<Logger, InitError> {
        // The bunyan drain keeps the name for the life of the process.
        let name: &'static str = Box::leak(name.to_owned().into_boxed_str());
        match self {
            ConfigLogging::StderrTerminal { level } => {
                let decorator = slog_term::TermDecorator::new().build();
                let drain =
                    slog_term::FullFormat::new(decorator).build().fuse();
                Ok(async_root_logger(*level, drain))
            }

            ConfigLogging::File { level, path, if_exists } => {
                let mut open_options = OpenOptions::new();
                open_options.write(true);
                open_options.create(true);

                match if_exists {
                    ConfigLoggingIfExists::Fail => {
                        open_options.create_new(true);
                    }
                    ConfigLoggingIfExists::Append => {
                        open_options.append(true);
                    }
                    ConfigLoggingIfExists::Truncate => {
                        open_options.truncate(true);
                    }
                }

                let file = open_log_file(&open_options, Path::new(path))?;
                let drain = slog_bunyan::with_name(name, file).build();
                Ok(async_root_logger(*level, drain))
            }

            ConfigLogging::TestSuite { level, directory } => {
                let mut open_options = OpenOptions::new();
                open_options.write(true).create_new(true);

                let arg0 = std::env::args()
                    .next()
                    .as_deref()
                    .map(Path::new)
                    .and_then(Path::file_name)
                    .and_then(|name| name.to_str())
                    .map(str::to_owned)
                    .ok_or_else(|| {
                        InitError(String::from(
                            "cannot determine program name for test log",
                        ))
                    })?;
                let pid = std::process::id();
                let id = TEST_SUITE_LOGGER_ID.fetch_add(1, Ordering::SeqCst);
                let mut pathbuf = PathBuf::from(directory);
                pathbuf.push(format!("{}.{}.{}.log", arg0, pid, id));

                let file = open_log_file(&open_options, &pathbuf)?;
                let drain = slog_bunyan::with_name(name, file).build();
                Ok(async_root_logger(*level, drain))
            }
        }
    }
}

// We use an async drain for every destination to take care of
// synchronization.  The terminal and file drains are not safe to share across
// threads on their own.
fn async_root_logger<T>(level: ConfigLoggingLevel, drain: T) -> Logger
where
    T: Drain + Send + 'static,
    <T as Drain>::Err: std::fmt::Debug,
{
    let pid = std::process::id();
    let level_drain = slog::LevelFilter(drain, Level::from(level)).fuse();
    let async_drain = slog_async::Async::new(level_drain).build().fuse();
    Logger::root(async_drain, o!("pid" => pid))
}

fn open_log_file(
    open_options: &OpenOptions,
    path: &Path,
) -> Result<File, InitError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            InitError(format!("open log file \"{}\": {}", path.display(), e))
        })?;
    }

    let file = open_options.open(path).map_err(|e| {
        InitError(format!("open log file \"{}\": {}", path.display(), e))
    })?;

    // Record a message to stderr so that a reader who doesn't already know
    // how logging is configured knows where the rest of the log messages
    // went.
    eprintln!("note: configured to log to \"{}\"", path.display());
    Ok(file)
}
