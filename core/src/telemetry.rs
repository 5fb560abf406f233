// Logging setup
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Filter used when RUST_LOG is unset
pub const DEFAULT_FILTER: &str = "info,relay_core=info";

/// Install the global tracing subscriber.
///
/// Honors `RUST_LOG`; falls back to `default_filter` (or [`DEFAULT_FILTER`]).
/// Fails if a global subscriber is already installed.
pub fn init_tracing(
    default_filter: Option<&str>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(default_filter.unwrap_or(DEFAULT_FILTER))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()?;

    info!(target: "telemetry", "Tracing initialized");
    Ok(())
}
