//! Analytics endpoints: batch ingestion from the tracker and the admin
//! summary.

use axum::{
    extract::State,
    http::{header, HeaderMap},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;
use crate::store::{EventRecord, VisitRecord};

/// One event as sent by the tracker. Fields are individually optional:
/// consumers tolerate missing fields, and older clients use `event` for the
/// name key.
#[derive(Debug, Deserialize)]
pub struct IncomingEvent {
    #[serde(default, alias = "event")]
    pub name: String,
    #[serde(default)]
    pub session_id: String,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub page_url: String,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

/// The flush envelope: `{session_id, events, user_info}`.
#[derive(Debug, Deserialize)]
pub struct TrackRequest {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub events: Vec<IncomingEvent>,
    #[serde(default)]
    pub user_info: Map<String, Value>,
}

/// POST /api/analytics/track
///
/// Persists a batch. `page_view` events count as visits; everything else is
/// stored as a raw event. Any 2xx tells the tracker to clear its queue.
pub async fn handle_track(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<TrackRequest>,
) -> Result<Json<Value>, AppError> {
    let ip = client_ip(&headers);
    let user_agent = header_str(&headers, header::USER_AGENT)
        .or_else(|| {
            request
                .user_info
                .get("user_agent")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| "unknown".to_string());

    // The original client generated ids; tolerate their absence anyway.
    let batch_session = if request.session_id.is_empty() {
        Uuid::new_v4().to_string()
    } else {
        request.session_id.clone()
    };

    let count = request.events.len();
    for event in request.events {
        let timestamp = event.timestamp.unwrap_or_else(Utc::now);
        let session_id = if event.session_id.is_empty() {
            batch_session.clone()
        } else {
            event.session_id
        };
        let name = if event.name.is_empty() {
            "unknown".to_string()
        } else {
            event.name
        };

        if name == "page_view" {
            state.store.track_visit(VisitRecord {
                timestamp,
                ip: ip.clone(),
                user_agent: user_agent.clone(),
                page: if event.page_url.is_empty() {
                    "main".to_string()
                } else {
                    event.page_url
                },
            })?;
        } else {
            state.store.track_event(EventRecord {
                timestamp,
                session_id,
                name,
                ip: ip.clone(),
                user_agent: user_agent.clone(),
            })?;
        }
    }

    debug!(count, session_id = %batch_session, "tracked event batch");
    Ok(Json(json!({ "success": true })))
}

/// GET /api/analytics
///
/// Admin dashboard summary. Requires `Authorization: Bearer <ADMIN_PASSWORD>`.
pub async fn handle_summary(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let expected = format!("Bearer {}", state.config.admin_password);
    let authorized = header_str(&headers, header::AUTHORIZATION)
        .map(|v| v == expected)
        .unwrap_or(false);
    if !authorized {
        return Err(AppError::Unauthorized);
    }

    let summary = state.store.summary();
    Ok(Json(json!({
        "success": true,
        "data": serde_json::to_value(summary).map_err(anyhow::Error::from)?
    })))
}

/// First X-Forwarded-For entry, or "unknown". The service is expected to sit
/// behind a reverse proxy that sets the header.
fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::AnalyticsStore;
    use std::sync::Arc;

    fn test_state(dir: &tempfile::TempDir) -> AppState {
        AppState {
            store: Arc::new(AnalyticsStore::open(dir.path().join("analytics.json"))),
            config: Config {
                data_dir: dir.path().to_path_buf(),
                admin_password: "sesame".to_string(),
                port: 0,
                rust_log: "info".to_string(),
            },
        }
    }

    fn incoming(name: &str) -> IncomingEvent {
        IncomingEvent {
            name: name.to_string(),
            session_id: String::new(),
            timestamp: None,
            page_url: "/".to_string(),
            payload: Map::new(),
        }
    }

    #[tokio::test]
    async fn track_routes_page_views_to_visits() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
        headers.insert(header::USER_AGENT, "Mozilla/5.0".parse().unwrap());

        let request = TrackRequest {
            session_id: "folio_1_abc".to_string(),
            events: vec![incoming("page_view"), incoming("click"), incoming("scroll_depth")],
            user_info: Map::new(),
        };
        let response = handle_track(State(state.clone()), headers, Json(request))
            .await
            .unwrap();
        assert_eq!(response.0["success"], true);

        let summary = state.store.summary();
        assert_eq!(summary.overview.total_visits, 1);
        assert_eq!(summary.overview.total_events, 2);
        assert_eq!(summary.last_visit.unwrap().ip, "203.0.113.9");
        assert_eq!(summary.last_event.unwrap().session_id, "folio_1_abc");
    }

    #[tokio::test]
    async fn track_tolerates_a_bare_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        // No session id, no headers, event under the legacy `event` key.
        let request: TrackRequest = serde_json::from_value(json!({
            "events": [{"event": "click"}]
        }))
        .unwrap();
        handle_track(State(state.clone()), HeaderMap::new(), Json(request))
            .await
            .unwrap();

        let summary = state.store.summary();
        assert_eq!(summary.event_counts["click"], 1);
        let last = summary.last_event.unwrap();
        assert_eq!(last.ip, "unknown");
        // Fallback session id is a generated UUID.
        assert!(Uuid::parse_str(&last.session_id).is_ok());
    }

    #[test]
    fn track_request_reads_a_serialized_tracker_batch() {
        let mut payload = Map::new();
        payload.insert("depth".to_string(), json!(50));
        let batch = folio_tracker::EventBatch {
            session_id: "folio_1_abc".to_string(),
            events: vec![folio_tracker::Event::record(
                "scroll_depth",
                "folio_1_abc",
                "/",
                payload,
            )],
            user_info: folio_tracker::ClientInfo::default(),
        };

        let wire = serde_json::to_value(&batch).unwrap();
        let request: TrackRequest = serde_json::from_value(wire).unwrap();

        assert_eq!(request.session_id, "folio_1_abc");
        assert_eq!(request.events.len(), 1);
        assert_eq!(request.events[0].name, "scroll_depth");
        assert_eq!(request.events[0].payload["depth"], 50);
        assert_eq!(request.user_info["user_agent"], "unknown");
    }

    #[tokio::test]
    async fn summary_requires_the_admin_password() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let denied = handle_summary(State(state.clone()), HeaderMap::new()).await;
        assert!(matches!(denied, Err(AppError::Unauthorized)));

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer sesame".parse().unwrap());
        let response = handle_summary(State(state), headers).await.unwrap();
        assert_eq!(response.0["success"], true);
        assert_eq!(response.0["data"]["overview"]["total_visits"], 0);
    }

    #[tokio::test]
    async fn summary_rejects_the_wrong_password() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer wrong".parse().unwrap());
        let denied = handle_summary(State(state), headers).await;
        assert!(matches!(denied, Err(AppError::Unauthorized)));
    }
}
