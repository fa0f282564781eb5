use serde::{Deserialize, Serialize};

use billbook_core::Money;

/// A debt record confirmed by the external verification gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedRecord {
    pub amount: Money,
    pub full_name: String,
    pub address: String,
    /// Billing period as reported by the provider (e.g. "04/2025").
    pub billing_cycle: String,
}

/// Answer of the gateway for one customer code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VerificationOutcome {
    /// The debt is still owed.
    Verified(VerifiedRecord),
    /// No outstanding debt for this code (paid off or unknown).
    NotFound,
}

impl VerificationOutcome {
    pub fn is_owed(&self) -> bool {
        matches!(self, VerificationOutcome::Verified(_))
    }
}
