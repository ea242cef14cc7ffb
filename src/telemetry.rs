//! Tracing setup.
//!
//! The filter comes from `RUST_LOG` when set, otherwise from the configured
//! level, otherwise [`DEFAULT_FILTER`]. Output goes to stderr so that
//! rendered manifests on stdout stay machine readable.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Filter used when nothing else is configured.
pub const DEFAULT_FILTER: &str = "podflow=info";

/// Build the filter directive string.
pub fn filter_directive(env: Option<&str>, configured: Option<&str>) -> String {
    env.filter(|v| !v.trim().is_empty())
        .or_else(|| configured.filter(|v| !v.trim().is_empty()))
        .map(|level| {
            // A bare level applies to this crate only.
            if is_bare_level(level) {
                format!("podflow={}", level.trim())
            } else {
                level.trim().to_string()
            }
        })
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

fn is_bare_level(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error" | "off"
    )
}

/// Install the global subscriber.
///
/// Calling this twice is harmless; the second call leaves the first
/// subscriber in place.
pub fn init_tracing(configured_level: Option<&str>) {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let directive = filter_directive(env.as_deref(), configured_level);
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(filter),
        )
        .try_init();
}
