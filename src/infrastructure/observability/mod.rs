//! Observability for drawcast
//!
//! Structured logs go through `tracing`; counters and histograms live in a
//! process-local Prometheus registry that callers render on demand. Nothing
//! here listens for incoming requests.

pub mod metrics;

pub use metrics::EngineMetrics;

/// Installs the global fmt subscriber, honouring `RUST_LOG` and defaulting
/// to `info`. Calling it twice is harmless.
pub fn init_tracing() {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}
