//! Optimistic concurrency expectations for versioned records.

use crate::error::{LedgerError, LedgerResult};

/// Optimistic concurrency expectation for a stored record.
///
/// Versions start at 1 on first insert and increase by one on every write;
/// version 0 means "does not exist yet".
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking.
    Any,
    /// Require the record to be at an exact version (0 = absent).
    Exact(u64),
}

impl ExpectedVersion {
    /// Expectation for inserting a brand-new record.
    pub const fn absent() -> Self {
        ExpectedVersion::Exact(0)
    }

    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> LedgerResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(LedgerError::conflict(format!(
                "optimistic concurrency check failed (expected: {self:?}, actual: {actual})"
            )))
        }
    }
}
