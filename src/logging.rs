//! Subscriber setup for `tracing` output on stderr.

use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;

/// Directive used when `RUST_LOG` is unset or unparsable.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose { "relay=debug" } else { "relay=info" }
}

/// Install the global subscriber. A second call is a no-op.
pub fn init(format: LogFormat, verbose: bool) {
    let fallback = default_directive(verbose);
    let make_filter = || {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(fallback))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    };

    match format {
        LogFormat::Pretty => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(make_filter())
                .with_target(true)
                .with_writer(std::io::stderr)
                .try_init();
        }
        LogFormat::Json => {
            let _ = tracing_subscriber::fmt()
                .json()
                .with_env_filter(make_filter())
                .with_current_span(false)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
}
