//! Tracing subscriber bootstrap.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::Error;
use crate::result::Result;

/// Install the global tracing subscriber.
///
/// The filter is read from `RUST_LOG` and falls back to `default_filter`
/// (e.g. `"info"` or `"keel_reconciler=debug"`).
pub fn init(default_filter: &str) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| Error::invalid_config(format!("tracing subscriber: {e}")))
}
