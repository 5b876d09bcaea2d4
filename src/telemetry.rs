//! Log output setup
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,sled=warn,reqwest=warn,hyper=warn";

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
/// Calling this twice is harmless; the second call is ignored.
pub fn init(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let result = if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
