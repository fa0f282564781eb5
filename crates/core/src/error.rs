//! Ledger error model.

use thiserror::Error;

use crate::id::{BillId, CardId, CustomerId};

/// Result type used across the ledger.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger-level error.
///
/// Precondition violations are deterministic and surfaced to the caller with
/// no mutation applied. Gateway failures are per-item and never retried here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// An amount was negative, missing where required, or overflowed.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// A profit percentage fell outside [0, 100] or was not a number.
    #[error("invalid percentage: {0}")]
    InvalidPercentage(String),

    /// One or more bills are not AVAILABLE (or do not exist).
    #[error("bills not available: {}", join_ids(.ids))]
    BillNotAvailable { ids: Vec<BillId> },

    /// SOLD and CROSSED bills are permanent records.
    #[error("bill {0} is locked (sold or crossed)")]
    BillLocked(BillId),

    #[error("bill {0} not found")]
    BillNotFound(BillId),

    /// A sale or bill-backed payment referenced no bills.
    #[error("selection is empty")]
    EmptySelection,

    /// A POS payment was submitted without a positive amount.
    #[error("payment amount is empty")]
    EmptyAmount,

    #[error("customer {0} is inactive")]
    CustomerInactive(CustomerId),

    #[error("customer {0} not found")]
    CustomerNotFound(CustomerId),

    #[error("card {0} not found")]
    CardNotFound(CardId),

    #[error("profit percentage is required")]
    MissingProfitPercentage,

    /// A destructive operation was requested without explicit confirmation.
    #[error("confirmation required: {0}")]
    ConfirmationRequired(String),

    /// The verification gateway did not answer within the configured bound.
    #[error("verification gateway timed out after {after_ms}ms for {code}")]
    GatewayTimeout { code: String, after_ms: u64 },

    #[error("verification gateway error: {0}")]
    GatewayError(String),

    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The persistence boundary failed.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invalid_amount(msg: impl Into<String>) -> Self {
        Self::InvalidAmount(msg.into())
    }

    pub fn bill_not_available(ids: impl IntoIterator<Item = BillId>) -> Self {
        Self::BillNotAvailable {
            ids: ids.into_iter().collect(),
        }
    }

    /// Whether the error is a precondition failure (caller input or state),
    /// as opposed to an infrastructure failure.
    pub fn is_precondition(&self) -> bool {
        !matches!(
            self,
            Self::GatewayTimeout { .. } | Self::GatewayError(_) | Self::Storage(_)
        )
    }
}

fn join_ids(ids: &[BillId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
