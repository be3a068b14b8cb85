use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

// ============================================================================
// Event Envelope - Audit metadata around a domain event
// ============================================================================
//
// Aggregates emit plain domain events. The command handler wraps each one in
// an envelope before it is persisted next to the aggregate document, giving
// every order an append-only history of who changed what and when.
//
// ============================================================================

/// Generic Event Envelope - wraps any domain event with metadata
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EventEnvelope<E> {
    pub event_id: Uuid,
    pub aggregate_id: Uuid,
    pub sequence_number: i64,

    pub event_type: String,
    pub event_data: E,

    // Groups the events produced by one request or one webhook delivery
    pub correlation_id: Uuid,

    // Who triggered this event (None for provider callbacks and the reaper)
    pub actor_id: Option<Uuid>,

    pub recorded_at: DateTime<Utc>,
}

impl<E: DomainEvent> EventEnvelope<E> {
    pub fn new(
        aggregate_id: Uuid,
        sequence_number: i64,
        event_data: E,
        correlation_id: Uuid,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            aggregate_id,
            sequence_number,
            event_type: event_data.event_type().to_string(),
            event_data,
            correlation_id,
            actor_id: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_actor(mut self, actor_id: Option<Uuid>) -> Self {
        self.actor_id = actor_id;
        self
    }
}

// ============================================================================
// Domain Event Trait
// ============================================================================

/// Implemented by every event enum that flows through an envelope.
pub trait DomainEvent: Serialize + for<'de> Deserialize<'de> + Clone + Send + Sync {
    /// Stable name recorded in the envelope, e.g. "OrderPlaced"
    fn event_type(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize, Clone, Debug)]
    enum TestEvent {
        Happened { data: String },
    }

    impl DomainEvent for TestEvent {
        fn event_type(&self) -> &'static str {
            "Happened"
        }
    }

    #[test]
    fn test_event_envelope_takes_type_from_event() {
        let aggregate_id = Uuid::new_v4();
        let correlation_id = Uuid::new_v4();
        let actor = Uuid::new_v4();

        let envelope = EventEnvelope::new(
            aggregate_id,
            3,
            TestEvent::Happened { data: "x".to_string() },
            correlation_id,
        )
        .with_actor(Some(actor));

        assert_eq!(envelope.aggregate_id, aggregate_id);
        assert_eq!(envelope.sequence_number, 3);
        assert_eq!(envelope.event_type, "Happened");
        assert_eq!(envelope.correlation_id, correlation_id);
        assert_eq!(envelope.actor_id, Some(actor));
    }
}
