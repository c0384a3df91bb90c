use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Default filter when RUST_LOG is not set
fn default_directives() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info,marker_cluster_lib=warn"
    }
}

/// Initialize logging to stderr, keeping stdout free for the JSON output.
///
/// - If RUST_LOG is not set, a helpful default is used.
/// - With the `profiling` feature, scopes are emitted as tracing spans.
pub fn setup_logging() {
    let from_env = std::env::var("RUST_LOG").is_ok();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives()));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(filter);

    if tracing_subscriber::registry().with(fmt_layer).try_init().is_err() {
        // A subscriber is already installed (e.g. by a test harness)
        return;
    }

    if !from_env {
        tracing::debug!("RUST_LOG set to default: {}", default_directives());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_logging_twice() {
        setup_logging();
        setup_logging();
        tracing::info!("still logging");
    }

    #[test]
    fn test_default_directives_parse() {
        assert!(EnvFilter::try_new(default_directives()).is_ok());
    }
}
