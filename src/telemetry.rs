use tracing_subscriber::{EnvFilter, prelude::*};

/// Installs the global tracing subscriber, writing to stderr.
///
/// `RUST_LOG` overrides `default_filter`. Calling it again is a no-op.
pub fn init(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let result = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(filter)
        .try_init();

    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
