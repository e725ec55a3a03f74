//! Log output setup
//!
//! The library only emits `tracing` events. Binaries and tests that want to
//! see them call [`init_logging`] once at startup.

use tracing_subscriber::EnvFilter;

/// Directive used when neither `RUST_LOG` nor the caller says otherwise
pub const DEFAULT_DIRECTIVE: &str = "stagecast=info";

/// Install a formatted subscriber filtered by `RUST_LOG`
///
/// `default_directive` applies when `RUST_LOG` is unset or invalid. Returns
/// `false` if a global subscriber was already installed, in which case the
/// existing one is left alone.
pub fn init_logging(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

/// Subscriber for tests, writing through the test harness capture
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stagecast=debug")),
        )
        .with_test_writer()
        .try_init();
}
