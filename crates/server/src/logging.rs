//! Logging setup.
//!
//! Structured `tracing` output to stderr through a non-blocking writer.
//! Filter resolution: `COACHLINE_LOG_FILTER` env, then `RUST_LOG`, then the
//! default. Format is `json` or `pretty` via `COACHLINE_LOG_FORMAT`.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

pub struct LoggingHandle {
    // Dropping the guard flushes buffered log lines; hold it for the
    // process lifetime.
    pub guard: WorkerGuard,
}

pub fn init_logging() -> anyhow::Result<LoggingHandle> {
    let filter = std::env::var("COACHLINE_LOG_FILTER")
        .ok()
        .and_then(|value| EnvFilter::try_new(value).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER));

    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
    let format = std::env::var("COACHLINE_LOG_FORMAT").unwrap_or_else(|_| "pretty".into());

    let registry = tracing_subscriber::registry().with(filter);
    if format.eq_ignore_ascii_case("json") {
        registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .json()
                    .flatten_event(true)
                    .with_target(true),
            )
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(writer).with_ansi(false).with_target(false))
            .init();
    }

    tracing::info!(
        component = "logging",
        event = "logging.initialized",
        format = %format,
    );

    Ok(LoggingHandle { guard })
}
