//! Logging setup for the binaries.
//!
//! Verbosity comes from `RUST_LOG`, falling back to `info`. Logs go to
//! stderr so the flight report on stdout stays clean.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Human-readable output. A second call is a no-op.
pub fn init() {
    let _ = tracing_subscriber::registry()
        .with(filter())
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .try_init();
}

/// One JSON object per line, for log aggregation.
pub fn init_json() {
    let _ = tracing_subscriber::registry()
        .with(filter())
        .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_twice_doesnt_panic() {
        init();
        init();
        init_json();
    }
}
