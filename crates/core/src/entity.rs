//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Every ledger record (bill, customer, sale, card, card payment) is keyed by
/// its identifier at the persistence boundary.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug + core::fmt::Display;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;

    /// Stable entity kind label (e.g. "bill"), used in logs and conflicts.
    fn kind() -> &'static str;
}
