//! Sales domain module.
//!
//! This crate contains the rules for selling a set of verified bills to a
//! customer at a profit percentage, implemented purely as deterministic
//! domain logic (no IO, no storage). Persisting the outcome atomically is the
//! infrastructure layer's job.

pub mod sale;

pub use sale::{Sale, SaleAborted, SaleDraft, SalePaymentMethod, SaleSettlement, settle_sale};
