//! Tracing initialization for the worker process.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize structured logging from `RUST_LOG`, defaulting to debug-level
/// output for pixelmill crates.
pub fn init_telemetry() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "pixelmill=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}
