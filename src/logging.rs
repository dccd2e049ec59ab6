//! Structured logging with daily rotation and run correlation.
//!
//! Dual output: human console plus a rotating file, both behind `EnvFilter`.
//! Every run gets a UUID `run_id` carried on the root span so one process
//! lifetime can be stitched back together from rotated files.
//!
//! Environment:
//! - `LOG_FORMAT=pretty|json` (default pretty)
//! - `LOG_DIR` (default ./logs)
//! - `RUN_ID` (default generated)
//! - `RUST_LOG` filter (default info)

use std::io;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use uuid::Uuid;

const LOG_FILE_PREFIX: &str = "arb_engine.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    pub fn from_env() -> Self {
        match std::env::var("LOG_FORMAT")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Run identifier for log correlation: `RUN_ID` env var or a fresh UUID.
pub fn run_id() -> Uuid {
    std::env::var("RUN_ID")
        .ok()
        .and_then(|s| Uuid::parse_str(&s).ok())
        .unwrap_or_else(Uuid::new_v4)
}

/// Initialize the subscriber stack. The returned guard must live for the
/// program lifetime so the non-blocking file writer flushes on exit.
pub fn init() -> WorkerGuard {
    let log_dir = std::env::var("LOG_DIR").unwrap_or_else(|_| "./logs".to_string());
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Failed to create log directory {}: {}", log_dir, e);
    }

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,cross_venue_arb=info,hyper=warn,reqwest=warn")
        })
    };

    match LogFormat::from_env() {
        LogFormat::Pretty => {
            let console = fmt::layer()
                .with_writer(io::stdout)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .with_filter(filter());
            let file = fmt::layer()
                .with_writer(file_writer)
                .with_target(true)
                .with_line_number(true)
                .with_ansi(false)
                .compact()
                .with_filter(filter());
            tracing_subscriber::registry().with(console).with(file).init();
        }
        LogFormat::Json => {
            let console = fmt::layer()
                .with_writer(io::stdout)
                .with_ansi(false)
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(false)
                .with_filter(filter());
            let file = fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(false)
                .with_filter(filter());
            tracing_subscriber::registry().with(console).with(file).init();
        }
    }

    guard
}
