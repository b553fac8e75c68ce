//! Tracing initialisation helpers for tests.
//!
//! Call [`init_test_tracing`] at the top of any test that emits tracing events
//! and wants them captured by the test harness. Initialisation happens at
//! most once per process, so every test may call it.

use tracing_subscriber::EnvFilter;

/// Initialise a tracing subscriber that writes to the test-harness writer
/// and respects the `RUST_LOG` environment variable (default `debug` for the
/// crelay crates).
///
/// ```ignore
/// #[tokio::test]
/// async fn my_test() {
///     crelay_test_utils::init_test_tracing();
///     tracing::info!("visible with --nocapture");
/// }
/// ```
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("crelay_core=debug,crelay_config=debug")),
        )
        .with_test_writer()
        .try_init();
}
