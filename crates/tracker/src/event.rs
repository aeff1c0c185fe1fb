//! The canonical event envelope and the batch shape sent to the collector.
//!
//! Events are immutable once constructed. Ordering within a session is
//! insertion order; there is no uniqueness constraint beyond arrival order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single named, timestamped occurrence with a free-form payload.
///
/// The payload is not validated: arbitrary keys pass through unchanged and
/// consumers tolerate missing fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub page_url: String,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl Event {
    /// Stamp a new event with the capture time.
    pub fn record(
        name: impl Into<String>,
        session_id: impl Into<String>,
        page_url: impl Into<String>,
        payload: Map<String, Value>,
    ) -> Self {
        Self {
            name: name.into(),
            session_id: session_id.into(),
            timestamp: Utc::now(),
            page_url: page_url.into(),
            payload,
        }
    }
}

/// Environment details captured once per session and attached to every batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub user_agent: String,
    pub language: String,
    pub timezone: String,
    pub screen_width: u32,
    pub screen_height: u32,
    pub color_depth: u32,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            user_agent: "unknown".to_string(),
            language: "unknown".to_string(),
            timezone: "unknown".to_string(),
            screen_width: 0,
            screen_height: 0,
            color_depth: 0,
        }
    }
}

/// The wire envelope for one flush: the full pending queue plus client info.
///
/// One POST per flush. No chunking, no compression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBatch {
    pub session_id: String,
    pub events: Vec<Event>,
    pub user_info: ClientInfo,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_serializes_with_payload_keys_intact() {
        let mut payload = Map::new();
        payload.insert("element".to_string(), json!("a"));
        payload.insert("x".to_string(), json!(42));

        let event = Event::record("click", "folio_1_abc", "https://example.com/", payload);
        let wire = serde_json::to_string(&event).unwrap();

        assert!(wire.contains("\"name\":\"click\""));
        assert!(wire.contains("\"element\":\"a\""));
        assert!(wire.contains("\"x\":42"));
        assert!(wire.contains("\"timestamp\""));
    }

    #[test]
    fn batch_round_trips() {
        let batch = EventBatch {
            session_id: "folio_1_abc".to_string(),
            events: vec![Event::record("page_view", "folio_1_abc", "/", Map::new())],
            user_info: ClientInfo::default(),
        };

        let wire = serde_json::to_string(&batch).unwrap();
        let back: EventBatch = serde_json::from_str(&wire).unwrap();
        assert_eq!(back.events.len(), 1);
        assert_eq!(back.events[0].name, "page_view");
        assert_eq!(back.user_info.user_agent, "unknown");
    }

    #[test]
    fn event_tolerates_missing_payload() {
        let wire = r#"{"name":"ping","session_id":"s","timestamp":"2026-01-01T00:00:00Z","page_url":"/"}"#;
        let event: Event = serde_json::from_str(wire).unwrap();
        assert!(event.payload.is_empty());
    }
}
