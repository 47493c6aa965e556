//! Structured Logging Configuration
//!
//! - JSON output for log aggregation (`LOG_FORMAT=json`)
//! - Human-readable output otherwise
//!
//! `RUST_LOG` sets the filter; when unset the caller's default is used
//! (normally `info`), e.g. `RUST_LOG=propo_session=debug`.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Initialize logging, reading `LOG_FORMAT` and `RUST_LOG`.
pub fn init_logging(service_name: &str) {
    let format = std::env::var("LOG_FORMAT").unwrap_or_default();
    init_logging_with(service_name, &format, "info");
}

/// Initialize logging with an explicit format and fallback filter.
///
/// `RUST_LOG` still wins over `default_filter` when it is set.
pub fn init_logging_with(service_name: &str, format: &str, default_filter: &str) {
    let env_filter = build_filter(default_filter);

    if format.eq_ignore_ascii_case("json") {
        init_json_logging(env_filter);
    } else {
        init_text_logging(env_filter);
    }

    tracing::debug!(service = service_name, "Logging initialized");
}

fn build_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn init_json_logging(env_filter: EnvFilter) {
    // try_init: a second initialization (tests, embedding apps) is not fatal
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .flatten_event(true)
                .with_span_events(FmtSpan::CLOSE),
        )
        .try_init();
}

fn init_text_logging(env_filter: EnvFilter) {
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(true),
        )
        .try_init();
}
