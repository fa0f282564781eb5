//! Process-wide logging setup for ledger hosts and tests.

/// Tracing subscriber configuration.
pub mod tracing;

pub use self::tracing::{DEFAULT_FILTER, init_with};

/// Initialize structured JSON logging, filtered by `RUST_LOG` (default
/// `info`).
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init_with(DEFAULT_FILTER);
}
