//! Logging bootstrap for hosts embedding the sale.
//!
//! - Text or JSON output, RFC3339 (UTC) timestamps.
//! - EnvFilter: explicit directive, else RUST_LOG, else "info".
//! - `log` records are forwarded into `tracing` by the subscriber.

use std::env;

use tracing_subscriber::{fmt, EnvFilter};

/// Subscriber options; see [`init`].
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Filter directive (e.g. "info,fixed_sale=debug"); `None` reads RUST_LOG.
    pub env_filter: Option<String>,
    pub json: bool,
    /// Print target, file and line number.
    pub with_targets_and_lines: bool,
    pub with_threads: bool,
    /// ANSI colors, text format only.
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            env_filter: None,
            json: false,
            with_targets_and_lines: true,
            with_threads: false,
            ansi: false,
        }
    }
}

/// Install the global subscriber. Call once at process start; a second call
/// returns an error.
pub fn init(cfg: LoggingConfig) -> anyhow::Result<()> {
    let filter = match &cfg.env_filter {
        Some(s) => EnvFilter::try_new(s.as_str()).unwrap_or_else(|_| EnvFilter::new("info")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(cfg.with_targets_and_lines)
        .with_file(cfg.with_targets_and_lines)
        .with_line_number(cfg.with_targets_and_lines)
        .with_thread_ids(cfg.with_threads)
        .with_thread_names(cfg.with_threads)
        .with_timer(fmt::time::UtcTime::rfc_3339());

    let res = if cfg.json {
        builder
            .json()
            .with_ansi(false)
            .with_current_span(true)
            .with_span_list(true)
            .flatten_event(true)
            .try_init()
    } else {
        builder.with_ansi(cfg.ansi).try_init()
    };
    res.map_err(|e| anyhow::anyhow!(e))
}

/// Init from LOG_JSON / LOG_ANSI / LOG_THREADS and RUST_LOG.
pub fn init_from_env() -> anyhow::Result<()> {
    let flag = |k: &str| env::var(k).map(|v| v == "true").unwrap_or(false);
    init(LoggingConfig {
        env_filter: None,
        json: flag("LOG_JSON"),
        with_targets_and_lines: true,
        with_threads: flag("LOG_THREADS"),
        ansi: flag("LOG_ANSI"),
    })
}
