//! Structured logging setup: an `EnvFilter`-driven `tracing-subscriber` registry, the
//! same layering the teacher's test harnesses use for their own tracing init.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `filter` is an `EnvFilter` directive string (e.g.
/// `"info"`, `"dispatch_core=debug,warn"`); falls back to `info` if empty or invalid.
pub fn init(filter: &str) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .parse_lossy(filter);

    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .ok();
}
