use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::Event;

/// Envelope for an event, carrying entity + feed metadata.
///
/// Notes:
/// - `entity_id` is the primary record the event is about (bill, sale, ...).
/// - `sequence_number` is monotonically increasing per publisher, giving the
///   activity feed a total order.
/// - `payload` is the typed event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,

    entity_id: Uuid,
    entity_type: String,

    /// Monotonically increasing position in the publisher's feed.
    sequence_number: u64,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        entity_id: Uuid,
        entity_type: impl Into<String>,
        sequence_number: u64,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            entity_id,
            entity_type: entity_type.into(),
            sequence_number,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn entity_id(&self) -> Uuid {
        self.entity_id
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

impl<E: Event> EventEnvelope<E> {
    /// Wrap a freshly committed event as entry `sequence_number` of a feed,
    /// taking the entity metadata from the event itself.
    pub fn seal(sequence_number: u64, payload: E) -> Self {
        let (entity_id, entity_type) = payload.subject();
        Self::new(Uuid::now_v7(), entity_id, entity_type, sequence_number, payload)
    }
}
