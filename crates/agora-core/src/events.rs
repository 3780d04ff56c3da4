//! AI engine event types, envelope and event bus.
//!
//! Side effects that are observable but never retried (budget alerts,
//! provider fallbacks, rate limiting, finished interactions) are published
//! here. Downstream consumers (notifications, dashboards, audit sinks)
//! subscribe independently.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{InteractionStatus, OperationKind, ProviderKind};

// ============================================================================
// Event Envelope
// ============================================================================

/// Versioned wrapper around an [`AiEvent`].
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    /// Unique event identifier (UUIDv7 for temporal ordering).
    pub event_id: Uuid,
    /// Namespaced event type (e.g., `"budget.alert"`).
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    /// Scope key the event relates to, when any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub payload_version: u32,
    pub payload: AiEvent,
}

impl EventEnvelope {
    pub fn new(event: AiEvent) -> Self {
        Self {
            event_id: crate::uuid_utils::new_v7(),
            event_type: event.namespaced_event_type().to_string(),
            occurred_at: Utc::now(),
            scope: event.scope().map(String::from),
            payload_version: 1,
            payload: event,
        }
    }
}

// ============================================================================
// AI Event (domain payloads)
// ============================================================================

/// Serialized with a `type` tag, e.g. `{"type":"BudgetAlert",...}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum AiEvent {
    /// Monthly spend crossed the alert threshold fraction of the limit.
    BudgetAlert {
        scope: String,
        spent: f64,
        limit: f64,
        threshold: f64,
        /// Budget period as `YYYY-MM`.
        period: String,
    },
    /// The orchestrator moved on to the next provider in the chain.
    ProviderFallback {
        request_id: Uuid,
        operation: OperationKind,
        from: ProviderKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        to: Option<ProviderKind>,
        reason: String,
    },
    /// A request was refused by the rate limiter.
    RateLimited {
        request_id: Uuid,
        scope: String,
        window: String,
        retry_after_secs: u64,
    },
    /// An interaction reached a terminal state.
    InteractionFinished {
        request_id: Uuid,
        scope: String,
        operation: OperationKind,
        status: InteractionStatus,
        cost_usd: f64,
    },
}

impl AiEvent {
    pub fn namespaced_event_type(&self) -> &'static str {
        match self {
            AiEvent::BudgetAlert { .. } => "budget.alert",
            AiEvent::ProviderFallback { .. } => "provider.fallback",
            AiEvent::RateLimited { .. } => "scope.rate_limited",
            AiEvent::InteractionFinished { .. } => "interaction.finished",
        }
    }

    pub fn scope(&self) -> Option<&str> {
        match self {
            AiEvent::BudgetAlert { scope, .. }
            | AiEvent::RateLimited { scope, .. }
            | AiEvent::InteractionFinished { scope, .. } => Some(scope),
            AiEvent::ProviderFallback { .. } => None,
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Broadcast-based event bus. Cloning shares the same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event to all subscribers. Dropped silently when nobody listens.
    pub fn emit(&self, event: AiEvent) {
        let envelope = EventEnvelope::new(event);
        tracing::debug!(
            event_type = %envelope.event_type,
            event_id = %envelope.event_id,
            subscriber_count = self.tx.receiver_count(),
            "EventBus emit"
        );
        let _ = self.tx.send(envelope);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::defaults::EVENT_BUS_CAPACITY)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus_emit_subscribe() {
        let bus = EventBus::new(32);
        let mut rx = bus.subscribe();

        bus.emit(AiEvent::BudgetAlert {
            scope: "college:42".to_string(),
            spent: 85.0,
            limit: 100.0,
            threshold: 0.8,
            period: "2026-10".to_string(),
        });

        let envelope = rx.recv().await.unwrap();
        assert!(matches!(envelope.payload, AiEvent::BudgetAlert { .. }));
        assert_eq!(envelope.event_type, "budget.alert");
        assert_eq!(envelope.scope.as_deref(), Some("college:42"));
        assert_eq!(envelope.payload_version, 1);
    }

    #[tokio::test]
    async fn test_event_bus_multiple_subscribers() {
        let bus = EventBus::new(32);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(AiEvent::ProviderFallback {
            request_id: Uuid::nil(),
            operation: OperationKind::Tag,
            from: ProviderKind::OpenAi,
            to: Some(ProviderKind::Anthropic),
            reason: "permanent: 401".to_string(),
        });

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1.event_type, "provider.fallback");
        assert_eq!(e2.event_type, "provider.fallback");
        assert!(e1.scope.is_none());
    }

    #[tokio::test]
    async fn test_event_bus_no_subscribers_ok() {
        let bus = EventBus::new(4);
        bus.emit(AiEvent::RateLimited {
            request_id: Uuid::nil(),
            scope: "user:1".to_string(),
            window: "minute".to_string(),
            retry_after_secs: 3,
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_event_json_serialization() {
        let event = AiEvent::InteractionFinished {
            request_id: Uuid::nil(),
            scope: "global:global".to_string(),
            operation: OperationKind::Summarize,
            status: InteractionStatus::Cached,
            cost_usd: 0.0,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"InteractionFinished""#));
        assert!(json.contains(r#""status":"cached""#));
        assert!(json.contains(r#""operation":"summarize""#));
    }
}
