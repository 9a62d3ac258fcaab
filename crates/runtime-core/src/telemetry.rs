//! Tracing subscriber bootstrap

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global subscriber that honors `RUST_LOG`, falling back to
/// `default_directives` (e.g. `"recorder=info,checkpoint=info"`).
///
/// Panics if a global subscriber is already set; use [`try_init_tracing`]
/// where that can happen.
pub fn init_tracing(default_directives: &str) {
    tracing_subscriber::registry()
        .with(env_filter(default_directives))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Like [`init_tracing`], but returns false instead of panicking when a
/// subscriber is already installed
pub fn try_init_tracing(default_directives: &str) -> bool {
    tracing_subscriber::registry()
        .with(env_filter(default_directives))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init()
        .is_ok()
}

fn env_filter(default_directives: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directives.into())
}
