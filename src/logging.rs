//! Tracing setup for the binary.
//!
//! `RUST_LOG` takes precedence; otherwise the configured level applies to
//! this crate while HTTP and WebSocket internals stay at `warn`.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::error::Error;

const QUIET_TARGETS: [&str; 5] = [
    "hyper",
    "hyper_util",
    "reqwest",
    "tungstenite",
    "tokio_tungstenite",
];

/// Installs the global subscriber. Timestamps are UTC.
///
/// # Errors
///
/// Returns [`Error::Config`] if `level` is not a valid filter or a global
/// subscriber is already installed.
pub fn init(level: &str) -> Result<(), Error> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directives(level))
            .map_err(|e| Error::Config(format!("invalid LOG_LEVEL {level}: {e}")))?,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()
        .map_err(|e| Error::Config(format!("failed to install logger: {e}")))
}

fn default_directives(level: &str) -> String {
    let mut directives = level.to_lowercase();
    for target in QUIET_TARGETS {
        directives.push_str(&format!(",{target}=warn"));
    }
    directives
}
