//! Ledger events and their distribution.
//!
//! Events are facts about committed ledger mutations. They are published on
//! an [`EventBus`] strictly after the persistence boundary accepted the
//! write, so consumers never observe a mutation that was rolled back.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
