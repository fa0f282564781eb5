//! The contract shared by every ledger event type.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Fact about one committed ledger mutation.
///
/// An event names the single record it concerns; mutations that touch many
/// records (a sale selling several bills) are described from the record that
/// owns the change.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Dotted `area.record.action` name, e.g. "bills.bill.crossed".
    fn event_type(&self) -> &'static str;

    /// The record the event is about, as `(id, record kind)`.
    fn subject(&self) -> (Uuid, &'static str);

    /// One line for humans reading the activity feed.
    fn summary(&self) -> String;

    /// When the mutation was committed.
    fn occurred_at(&self) -> DateTime<Utc>;
}
