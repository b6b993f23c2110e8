use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Build the filter: `RUST_LOG` wins, then `--debug`, then the configured directive.
pub fn env_filter(configured: &str, debug: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directive = if debug { "debug" } else { configured };
        EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"))
    })
}

/// Install the global subscriber. Logs go to stderr so stdout stays machine-readable.
/// Calling this twice is harmless; the second call is ignored.
pub fn init(configured: &str, debug: bool) {
    let _ = Registry::default()
        .with(env_filter(configured, debug))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init();
}
