// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Logging initialization
//!
//! Installs a global `tracing` subscriber: a console layer (text or JSON)
//! and, with the `file-logging` feature, a JSON file layer that rotates daily
//! inside a timestamped run folder:
//!
//! ```text
//! ./logs/
//!   └── run_20250101_120000/
//!       └── connectome.log.2025-01-01
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::cli::CrateDebugFlags;
use crate::config::{LogFormat, LoggingOptions};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Keeps file writers alive; logs are flushed when it is dropped.
pub struct LoggingGuard {
    #[cfg(feature = "file-logging")]
    _file_guards: Vec<tracing_appender::non_blocking::WorkerGuard>,
    log_dir: Option<PathBuf>,
}

impl LoggingGuard {
    /// Run folder receiving log files, if file logging is active.
    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }
}

fn env_filter(directives: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(directives)
        .with_context(|| format!("Invalid log filter directives: {}", directives))
}

/// Install the global subscriber.
///
/// # Errors
/// Fails on invalid level directives, when file logging is requested without
/// the `file-logging` feature, when the log folder cannot be created, or when
/// a global subscriber is already installed.
pub fn init_logging(debug_flags: &CrateDebugFlags, options: &LoggingOptions) -> Result<LoggingGuard> {
    let directives = debug_flags.to_filter_string(&options.level);
    let mut layers: Vec<BoxedLayer> = Vec::new();

    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_file(false)
        .with_line_number(false);
    let console: BoxedLayer = match options.format {
        LogFormat::Text => console.with_filter(env_filter(&directives)?).boxed(),
        LogFormat::Json => console.json().with_filter(env_filter(&directives)?).boxed(),
    };
    layers.push(console);

    #[cfg_attr(not(feature = "file-logging"), allow(unused_mut))]
    let mut guard = LoggingGuard {
        #[cfg(feature = "file-logging")]
        _file_guards: Vec::new(),
        log_dir: None,
    };

    if options.file_logging {
        #[cfg(feature = "file-logging")]
        {
            let run_folder = options
                .log_dir
                .join(format!("run_{}", chrono::Utc::now().format("%Y%m%d_%H%M%S")));
            std::fs::create_dir_all(&run_folder).with_context(|| {
                format!("Failed to create log directory: {}", run_folder.display())
            })?;

            let appender = tracing_appender::rolling::daily(&run_folder, "connectome.log");
            let (writer, file_guard) = tracing_appender::non_blocking(appender);
            layers.push(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .json()
                    .with_filter(env_filter(&directives)?)
                    .boxed(),
            );
            guard._file_guards.push(file_guard);
            guard.log_dir = Some(run_folder);
        }
        #[cfg(not(feature = "file-logging"))]
        anyhow::bail!("File logging requested but the `file-logging` feature is disabled");
    }

    Registry::default()
        .with(layers)
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    tracing::debug!(filter = %directives, format = %options.format, "logging initialised");
    Ok(guard)
}

/// Console-only logging at `info`, honouring debug flags.
pub fn init_logging_default(debug_flags: &CrateDebugFlags) -> Result<LoggingGuard> {
    init_logging(debug_flags, &LoggingOptions::default())
}
