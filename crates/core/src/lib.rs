//! `billbook-core`: ledger foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by every ledger
//! module: identifiers, the error taxonomy, money arithmetic and the
//! optimistic version expectation used at the persistence boundary.

pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod value_object;
pub mod version;

pub use entity::Entity;
pub use error::{LedgerError, LedgerResult};
pub use id::{BillId, CardId, CardPaymentId, CustomerId, SaleId};
pub use money::{Money, Percentage, Split, compute_split};
pub use value_object::ValueObject;
pub use version::ExpectedVersion;
