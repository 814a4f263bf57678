use std::sync::Once;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

/// Initialize the logging system with sensible defaults.
///
/// Log level can be set using the RUST_LOG environment variable.
/// Example: RUST_LOG=debug,admission_limiter=trace
pub fn init() {
    init_with_default("info");
}

/// Same as [`init`], but with an explicit fallback directive for when RUST_LOG is unset.
pub fn init_with_default(default_directive: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive));

        // try_init: a test harness or host binary may already own the global subscriber
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true) // Useful for debugging concurrency issues
                    .with_line_number(true),
            )
            .try_init();

        tracing::debug!("Logging initialized");
    });
}

/// Macro for logging one scope decision of an admission check
#[macro_export]
macro_rules! admission_event {
    ($scope:expr, $key:expr, $allowed:expr, $limit:expr, $window_ms:expr) => {
        tracing::debug!(
            scope = $scope,
            key = $key,
            allowed = $allowed,
            limit = $limit,
            window_ms = $window_ms,
            "Admission check"
        )
    };
}

/// Macro for logging store operations with timing
#[macro_export]
macro_rules! storage_op {
    ($operation:expr, $key:expr, $result:expr, $elapsed_ms:expr) => {
        tracing::trace!(
            operation = $operation,
            key = $key,
            success = $result.is_ok(),
            elapsed_ms = $elapsed_ms,
            "Storage operation"
        )
    };
}
