//! Ledger events, their publication, and the recent-activity feed.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::warn;
use uuid::Uuid;

use billbook_bills::{BillStatus, ProviderRegion};
use billbook_cards::CardPaymentMethod;
use billbook_core::{BillId, CardId, CardPaymentId, CustomerId, Money, SaleId};
use billbook_events::{Event, EventBus, EventEnvelope};

/// Fact about a committed ledger mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    BillIngested {
        bill_id: BillId,
        customer_code: String,
        region: ProviderRegion,
        amount: Option<Money>,
        created: bool,
        occurred_at: DateTime<Utc>,
    },
    BillCreated {
        bill_id: BillId,
        customer_code: String,
        occurred_at: DateTime<Utc>,
    },
    BillRechecked {
        bill_id: BillId,
        amount: Option<Money>,
        occurred_at: DateTime<Utc>,
    },
    BillCrossed {
        bill_id: BillId,
        customer_code: String,
        occurred_at: DateTime<Utc>,
    },
    BillHoldChanged {
        bill_id: BillId,
        status: BillStatus,
        occurred_at: DateTime<Utc>,
    },
    BillDeleted {
        bill_id: BillId,
        occurred_at: DateTime<Utc>,
    },
    SaleCreated {
        sale_id: SaleId,
        customer_id: CustomerId,
        bill_ids: Vec<BillId>,
        total: Money,
        profit_value: Money,
        occurred_at: DateTime<Utc>,
    },
    CustomerCreated {
        customer_id: CustomerId,
        name: String,
        occurred_at: DateTime<Utc>,
    },
    CustomerUpdated {
        customer_id: CustomerId,
        occurred_at: DateTime<Utc>,
    },
    CustomerDeleted {
        customer_id: CustomerId,
        sales_removed: usize,
        cards_removed: usize,
        payments_removed: usize,
        bills_removed: usize,
        occurred_at: DateTime<Utc>,
    },
    CardCreated {
        card_id: CardId,
        customer_id: CustomerId,
        occurred_at: DateTime<Utc>,
    },
    CardUpdated {
        card_id: CardId,
        occurred_at: DateTime<Utc>,
    },
    CardDeleted {
        card_id: CardId,
        payments_removed: usize,
        occurred_at: DateTime<Utc>,
    },
    PaymentCreated {
        payment_id: CardPaymentId,
        card_id: CardId,
        method: CardPaymentMethod,
        total_amount: Money,
        profit_value: Money,
        bill_ids: Vec<BillId>,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for LedgerEvent {
    fn subject(&self) -> (Uuid, &'static str) {
        match self {
            LedgerEvent::BillIngested { bill_id, .. }
            | LedgerEvent::BillCreated { bill_id, .. }
            | LedgerEvent::BillRechecked { bill_id, .. }
            | LedgerEvent::BillCrossed { bill_id, .. }
            | LedgerEvent::BillHoldChanged { bill_id, .. }
            | LedgerEvent::BillDeleted { bill_id, .. } => (*bill_id.as_uuid(), "bill"),
            LedgerEvent::SaleCreated { sale_id, .. } => (*sale_id.as_uuid(), "sale"),
            LedgerEvent::CustomerCreated { customer_id, .. }
            | LedgerEvent::CustomerUpdated { customer_id, .. }
            | LedgerEvent::CustomerDeleted { customer_id, .. } => {
                (*customer_id.as_uuid(), "customer")
            }
            LedgerEvent::CardCreated { card_id, .. }
            | LedgerEvent::CardUpdated { card_id, .. }
            | LedgerEvent::CardDeleted { card_id, .. } => (*card_id.as_uuid(), "card"),
            LedgerEvent::PaymentCreated { payment_id, .. } => {
                (*payment_id.as_uuid(), "card_payment")
            }
        }
    }

    fn summary(&self) -> String {
        match self {
            LedgerEvent::BillIngested {
                customer_code,
                created: true,
                ..
            } => format!("verified new bill {customer_code}"),
            LedgerEvent::BillIngested { customer_code, .. } => {
                format!("refreshed bill {customer_code}")
            }
            LedgerEvent::BillCreated { customer_code, .. } => {
                format!("entered bill {customer_code}")
            }
            LedgerEvent::BillRechecked { bill_id, .. } => format!("rechecked bill {bill_id}"),
            LedgerEvent::BillCrossed { customer_code, .. } => {
                format!("bill {customer_code} no longer owed")
            }
            LedgerEvent::BillHoldChanged { bill_id, status, .. } => {
                format!("bill {bill_id} is now {status}")
            }
            LedgerEvent::BillDeleted { bill_id, .. } => format!("deleted bill {bill_id}"),
            LedgerEvent::SaleCreated {
                bill_ids, total, ..
            } => format!("sold {} bill(s) for {total}", bill_ids.len()),
            LedgerEvent::CustomerCreated { name, .. } => format!("added customer {name}"),
            LedgerEvent::CustomerUpdated { customer_id, .. } => {
                format!("updated customer {customer_id}")
            }
            LedgerEvent::CustomerDeleted { customer_id, .. } => {
                format!("deleted customer {customer_id} and its history")
            }
            LedgerEvent::CardCreated { card_id, .. } => format!("added card {card_id}"),
            LedgerEvent::CardUpdated { card_id, .. } => format!("updated card {card_id}"),
            LedgerEvent::CardDeleted { card_id, .. } => format!("deleted card {card_id}"),
            LedgerEvent::PaymentCreated {
                method,
                total_amount,
                ..
            } => format!("card payment of {total_amount} via {method:?}"),
        }
    }

    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::BillIngested { .. } => "bills.bill.ingested",
            LedgerEvent::BillCreated { .. } => "bills.bill.created",
            LedgerEvent::BillRechecked { .. } => "bills.bill.rechecked",
            LedgerEvent::BillCrossed { .. } => "bills.bill.crossed",
            LedgerEvent::BillHoldChanged { .. } => "bills.bill.hold_changed",
            LedgerEvent::BillDeleted { .. } => "bills.bill.deleted",
            LedgerEvent::SaleCreated { .. } => "sales.sale.created",
            LedgerEvent::CustomerCreated { .. } => "customers.customer.created",
            LedgerEvent::CustomerUpdated { .. } => "customers.customer.updated",
            LedgerEvent::CustomerDeleted { .. } => "customers.customer.deleted",
            LedgerEvent::CardCreated { .. } => "cards.card.created",
            LedgerEvent::CardUpdated { .. } => "cards.card.updated",
            LedgerEvent::CardDeleted { .. } => "cards.card.deleted",
            LedgerEvent::PaymentCreated { .. } => "cards.payment.created",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::BillIngested { occurred_at, .. }
            | LedgerEvent::BillCreated { occurred_at, .. }
            | LedgerEvent::BillRechecked { occurred_at, .. }
            | LedgerEvent::BillCrossed { occurred_at, .. }
            | LedgerEvent::BillHoldChanged { occurred_at, .. }
            | LedgerEvent::BillDeleted { occurred_at, .. }
            | LedgerEvent::SaleCreated { occurred_at, .. }
            | LedgerEvent::CustomerCreated { occurred_at, .. }
            | LedgerEvent::CustomerUpdated { occurred_at, .. }
            | LedgerEvent::CustomerDeleted { occurred_at, .. }
            | LedgerEvent::CardCreated { occurred_at, .. }
            | LedgerEvent::CardUpdated { occurred_at, .. }
            | LedgerEvent::CardDeleted { occurred_at, .. }
            | LedgerEvent::PaymentCreated { occurred_at, .. } => *occurred_at,
        }
    }
}

/// One row of the recent-activity feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub sequence: u64,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub summary: String,
    pub details: JsonValue,
    pub occurred_at: DateTime<Utc>,
}

impl ActivityEntry {
    pub fn from_envelope(envelope: &EventEnvelope<LedgerEvent>) -> Self {
        let event = envelope.payload();
        Self {
            sequence: envelope.sequence_number(),
            event_type: event.event_type().to_string(),
            entity_type: envelope.entity_type().to_string(),
            entity_id: envelope.entity_id(),
            summary: event.summary(),
            details: serde_json::to_value(event).unwrap_or_default(),
            occurred_at: event.occurred_at(),
        }
    }
}

/// Bounded, newest-last log of recent ledger activity.
#[derive(Debug)]
pub struct ActivityFeed {
    capacity: usize,
    entries: Mutex<VecDeque<ActivityEntry>>,
}

impl ActivityFeed {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn record(&self, entry: ActivityEntry) {
        if self.capacity == 0 {
            return;
        }
        if let Ok(mut entries) = self.entries.lock() {
            while entries.len() >= self.capacity {
                entries.pop_front();
            }
            entries.push_back(entry);
        }
    }

    /// Up to `limit` entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<ActivityEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.iter().rev().take(limit).cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Wraps events in envelopes, records them in the feed and publishes them.
///
/// Only called after a successful commit. A failed publish is logged and
/// swallowed: the mutation already happened.
#[derive(Debug)]
pub struct ActivityPublisher<B> {
    bus: B,
    feed: ActivityFeed,
    sequence: AtomicU64,
}

impl<B> ActivityPublisher<B>
where
    B: EventBus<EventEnvelope<LedgerEvent>>,
{
    pub fn new(bus: B, capacity: usize) -> Self {
        Self {
            bus,
            feed: ActivityFeed::new(capacity),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn feed(&self) -> &ActivityFeed {
        &self.feed
    }

    pub fn publish(&self, event: LedgerEvent) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let envelope = EventEnvelope::seal(sequence, event);

        self.feed.record(ActivityEntry::from_envelope(&envelope));

        let event_type = envelope.payload().event_type();
        if let Err(err) = self.bus.publish(envelope) {
            warn!(event_type, sequence, error = ?err, "failed to publish ledger event");
        }
    }
}
