//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus distributes ledger events to any number of consumers (activity
//! feeds, notifiers, export jobs). It is **not** a source of truth: the
//! persistence boundary is, and events are published only after a commit.
//!
//! Delivery is at-least-once and consumers must be idempotent.

use std::sync::Arc;
use std::sync::mpsc::Receiver;

/// A subscription to an event stream.
///
/// Each subscription gets a copy of every message published after it was
/// created (broadcast semantics). Consumers poll it between ledger
/// operations:
///
/// ```ignore
/// let subscription = engine.bus().subscribe();
/// engine.create_sale(&draft)?;
/// for envelope in subscription.drain() {
///     notify(envelope.payload())?;
/// }
/// ```
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Take every message that is already queued, oldest first.
    pub fn drain(&self) -> Vec<M> {
        self.receiver.try_iter().collect()
    }
}

/// Domain-agnostic event bus (pub/sub abstraction).
///
/// ```text
/// Ledger operation → LedgerStore::commit → EventBus::publish → Consumers
/// ```
///
/// `publish()` can fail; since the mutation is already committed, callers
/// log the failure rather than report the operation as failed.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
