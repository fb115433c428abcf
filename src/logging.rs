//! Logging and tracing infrastructure for apkdock.
//!
//! Structured logging through the tracing crate, with a human readable and a
//! JSON output mode. Filtering follows `RUST_LOG`.

use std::sync::Once;
use tracing::info;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

static INIT: Once = Once::new();

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize the global tracing subscriber.
///
/// This should be called once at program startup.
/// Subsequent calls are ignored.
pub fn init_tracing() {
    INIT.call_once(|| {
        let fmt_layer = fmt::layer()
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true)
            .with_thread_names(true)
            .with_line_number(true);

        // try_init: tests and embedders may already own a global subscriber
        let _ = tracing_subscriber::registry()
            .with(default_filter())
            .with(fmt_layer)
            .try_init();

        info!("apkdock tracing initialized");
    });
}

/// Initialize tracing with JSON output for log shipping.
pub fn init_tracing_json() {
    INIT.call_once(|| {
        let fmt_layer = fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true)
            .with_thread_names(true)
            .with_line_number(true)
            .with_current_span(true);

        let _ = tracing_subscriber::registry()
            .with(default_filter())
            .with(fmt_layer)
            .try_init();

        info!("apkdock tracing initialized (JSON mode)");
    });
}

/// Open the span that wraps one analysis job.
#[macro_export]
macro_rules! job_span {
    ($job:expr) => {
        tracing::info_span!(
            "job",
            job_id = %$job.id,
            tool = %$job.tool_id,
            filename = %$job.uploaded_filename
        )
    };
}

/// Macro for logging and returning errors
#[macro_export]
macro_rules! log_error {
    ($err:expr) => {{
        let e = $err;
        tracing::error!(error = %e, "Operation failed");
        e
    }};
    ($err:expr, $msg:expr) => {{
        let e = $err;
        tracing::error!(error = %e, message = $msg, "Operation failed");
        e
    }};
}
