//! Engine configuration loading and representation.

use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// Runtime knobs of the ledger engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound on a single verification call.
    pub gateway_timeout: Duration,
    /// How many verification calls a batch keeps in flight.
    pub verification_concurrency: usize,
    /// Number of entries the activity feed retains.
    pub activity_capacity: usize,
    /// Payments shown on a card detail view.
    pub recent_payments_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gateway_timeout: Duration::from_secs(15),
            verification_concurrency: 1,
            activity_capacity: 200,
            recent_payments_limit: 10,
        }
    }
}

impl EngineConfig {
    /// Read `BILLBOOK_*` environment variables over the defaults.
    ///
    /// - `BILLBOOK_GATEWAY_TIMEOUT_MS`
    /// - `BILLBOOK_VERIFICATION_CONCURRENCY`
    /// - `BILLBOOK_ACTIVITY_CAPACITY`
    /// - `BILLBOOK_RECENT_PAYMENTS_LIMIT`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`EngineConfig::from_env`] but with an injectable lookup.
    /// Malformed values are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let gateway_timeout = parse_var(&lookup, "BILLBOOK_GATEWAY_TIMEOUT_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.gateway_timeout);
        let verification_concurrency = parse_var(&lookup, "BILLBOOK_VERIFICATION_CONCURRENCY")
            .unwrap_or(defaults.verification_concurrency)
            .max(1);
        let activity_capacity = parse_var(&lookup, "BILLBOOK_ACTIVITY_CAPACITY")
            .unwrap_or(defaults.activity_capacity);
        let recent_payments_limit = parse_var(&lookup, "BILLBOOK_RECENT_PAYMENTS_LIMIT")
            .unwrap_or(defaults.recent_payments_limit);

        Self {
            gateway_timeout,
            verification_concurrency,
            activity_capacity,
            recent_payments_limit,
        }
    }

    pub fn with_gateway_timeout(mut self, timeout: Duration) -> Self {
        self.gateway_timeout = timeout;
        self
    }

    pub fn with_verification_concurrency(mut self, concurrency: usize) -> Self {
        self.verification_concurrency = concurrency.max(1);
        self
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring malformed configuration value");
            None
        }
    }
}
