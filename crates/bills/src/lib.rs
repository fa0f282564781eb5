//! Bills domain module (prepaid utility-debt inventory).
//!
//! This crate contains the bill status state machine and the selection gate
//! used before a sale or card payment, implemented purely as deterministic
//! domain logic (no IO, no storage).

pub mod bill;
pub mod filter;
pub mod selection;
pub mod verification;

pub use bill::{Bill, BillStatus, NO_DEBT_MARKER, NewBill, ProviderRegion, normalize_code};
pub use filter::BillFilter;
pub use selection::{dedupe_ids, select_available};
pub use verification::{VerificationOutcome, VerifiedRecord};
