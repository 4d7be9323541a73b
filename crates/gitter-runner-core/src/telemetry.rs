//! Tracing initialisation for Gitter Runner binaries.
//!
//! Call [`init_tracing`] once at program start.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialise the global tracing subscriber.
///
/// * `json` emits newline-delimited JSON log lines.
/// * `level` is the default verbosity when `RUST_LOG` is not set; HTTP
///   client internals are held at `warn`.
///
/// Only the first call takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        registry.with(fmt::layer().with_target(false)).try_init().ok();
    }
}

fn default_directives(level: Level) -> String {
    format!("{},hyper=warn,reqwest=warn,rustls=warn", level.as_str().to_lowercase())
}
