//! Structured logging setup.
//!
//! Initializes a `tracing` subscriber with:
//! - `RUST_LOG` environment filter support (default `tutor_rag=info`)
//! - JSON output when `RUST_LOG_FORMAT=json`
//! - output on stderr, so stdout stays clean for command results

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// Subsequent calls are no-ops.
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tutor_rag=info"));

    let is_json = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(false)
        .with_line_number(false);

    if is_json {
        let _ = subscriber.json().try_init();
    } else {
        let _ = subscriber.try_init();
    }
}
