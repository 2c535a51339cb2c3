//! Log output for the binaries.
//!
//! Logs go to stderr. Stdout carries the root chain printed by `check_traces`.

use tracing_subscriber::{prelude::*, util::SubscriberInitExt, EnvFilter};

/// Used when `RUST_LOG` is unset or does not parse.
const DEFAULT_DIRECTIVES: &str = "warn,trace_inspector=info";

fn env_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Installs a formatting subscriber filtered by `RUST_LOG`. Records emitted
/// through `log` by the libraries are forwarded to it.
pub fn init() {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(std::io::stderr)
                .with_filter(env_filter(directives.as_deref())),
        )
        .init();
}
