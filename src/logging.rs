//! Subscriber setup for binaries. Library code only emits events.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a stderr `fmt` subscriber. `RUST_LOG` wins; otherwise `info`, raised to
/// `debug` for the canvas crates when `verbose` is set.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(verbose: bool) {
    let default = if verbose {
        "info,canvas_sync=debug,canvas_fetcher=debug,canvas_durable_cache=debug,canvas_transport=debug"
    } else {
        "info"
    };
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
