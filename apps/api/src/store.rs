//! JSON-file analytics store.
//!
//! One document on disk, held in memory behind a mutex and written back
//! whole on every mutation. Visits and events are capped to the most recent
//! entries to keep the file bounded; a missing or corrupt file resets to the
//! default structure rather than failing startup.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Keep only the most recent visits to manage file size.
const MAX_VISITS_STORED: usize = 1000;
/// Keep only the most recent raw events.
const MAX_EVENTS_STORED: usize = 500;
/// User agents are truncated before aggregation.
const USER_AGENT_MAX: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitRecord {
    pub timestamp: DateTime<Utc>,
    pub ip: String,
    pub user_agent: String,
    pub page: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub name: String,
    pub ip: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyticsData {
    #[serde(default)]
    pub visits: Vec<VisitRecord>,
    #[serde(default)]
    pub events: Vec<EventRecord>,
    #[serde(default)]
    pub user_agents: HashMap<String, u64>,
    #[serde(default)]
    pub event_counts: HashMap<String, u64>,
    #[serde(default)]
    pub total_visits: u64,
    #[serde(default)]
    pub total_events: u64,
}

#[derive(Debug, Serialize)]
pub struct Overview {
    pub total_visits: u64,
    pub total_events: u64,
    pub recent_visits_30d: usize,
    pub recent_events_30d: usize,
    pub events_per_visit: f64,
}

#[derive(Debug, Serialize)]
pub struct DailyActivity {
    pub visits: usize,
    pub events: usize,
}

#[derive(Debug, Serialize)]
pub struct BrowserCount {
    pub user_agent: String,
    pub count: u64,
}

/// Aggregate view served to the admin dashboard.
#[derive(Debug, Serialize)]
pub struct AnalyticsSummary {
    pub overview: Overview,
    /// `YYYY-MM-DD` keyed activity for the last 7 days.
    pub daily_activity: Vec<(String, DailyActivity)>,
    pub top_browsers: Vec<BrowserCount>,
    pub event_counts: HashMap<String, u64>,
    pub last_visit: Option<VisitRecord>,
    pub last_event: Option<EventRecord>,
}

pub struct AnalyticsStore {
    path: PathBuf,
    data: Mutex<AnalyticsData>,
}

impl AnalyticsStore {
    /// Open the store, loading any existing document. A missing file starts
    /// empty; a corrupt one is logged and replaced with the default
    /// structure on the next save.
    pub fn open(path: PathBuf) -> Self {
        let data = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<AnalyticsData>(&raw) {
                Ok(data) => {
                    info!(
                        visits = data.total_visits,
                        events = data.total_events,
                        "analytics store loaded"
                    );
                    data
                }
                Err(e) => {
                    error!(path = %path.display(), error = %e, "analytics store corrupt, resetting");
                    AnalyticsData::default()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => AnalyticsData::default(),
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to read analytics store, resetting");
                AnalyticsData::default()
            }
        };

        Self {
            path,
            data: Mutex::new(data),
        }
    }

    pub fn track_visit(&self, mut visit: VisitRecord) -> io::Result<()> {
        truncate_chars(&mut visit.user_agent, USER_AGENT_MAX);
        let mut data = self.lock();

        *data.user_agents.entry(visit.user_agent.clone()).or_insert(0) += 1;
        data.visits.push(visit);
        data.total_visits += 1;
        cap_front(&mut data.visits, MAX_VISITS_STORED);

        self.save(&data)
    }

    pub fn track_event(&self, mut event: EventRecord) -> io::Result<()> {
        truncate_chars(&mut event.user_agent, USER_AGENT_MAX);
        let mut data = self.lock();

        *data.event_counts.entry(event.name.clone()).or_insert(0) += 1;
        data.events.push(event);
        data.total_events += 1;
        cap_front(&mut data.events, MAX_EVENTS_STORED);

        self.save(&data)
    }

    pub fn summary(&self) -> AnalyticsSummary {
        let data = self.lock();
        let now = Utc::now();
        let thirty_days_ago = now - Duration::days(30);

        let recent_visits: Vec<&VisitRecord> = data
            .visits
            .iter()
            .filter(|v| v.timestamp >= thirty_days_ago)
            .collect();
        let recent_events: Vec<&EventRecord> = data
            .events
            .iter()
            .filter(|e| e.timestamp >= thirty_days_ago)
            .collect();

        let mut top_browsers: Vec<BrowserCount> = data
            .user_agents
            .iter()
            .map(|(user_agent, &count)| BrowserCount {
                user_agent: user_agent.clone(),
                count,
            })
            .collect();
        top_browsers.sort_by(|a, b| b.count.cmp(&a.count));
        top_browsers.truncate(5);

        let daily_activity = (0..7)
            .map(|i| {
                let day = (now - Duration::days(i)).format("%Y-%m-%d").to_string();
                let visits = recent_visits
                    .iter()
                    .filter(|v| v.timestamp.format("%Y-%m-%d").to_string() == day)
                    .count();
                let events = recent_events
                    .iter()
                    .filter(|e| e.timestamp.format("%Y-%m-%d").to_string() == day)
                    .count();
                (day, DailyActivity { visits, events })
            })
            .collect();

        let events_per_visit =
            data.total_events as f64 / (data.total_visits.max(1)) as f64;

        AnalyticsSummary {
            overview: Overview {
                total_visits: data.total_visits,
                total_events: data.total_events,
                recent_visits_30d: recent_visits.len(),
                recent_events_30d: recent_events.len(),
                events_per_visit: (events_per_visit * 100.0).round() / 100.0,
            },
            daily_activity,
            top_browsers,
            event_counts: data.event_counts.clone(),
            last_visit: data.visits.last().cloned(),
            last_event: data.events.last().cloned(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AnalyticsData> {
        // A poisoned lock only happens after a panic in another handler;
        // the data itself is still structurally valid JSON.
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn save(&self, data: &AnalyticsData) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(data).map_err(io::Error::other)?;
        std::fs::write(&self.path, raw)
    }
}

fn cap_front<T>(items: &mut Vec<T>, max: usize) {
    if items.len() > max {
        items.drain(..items.len() - max);
    }
}

/// Truncate on a character boundary; byte-indexed `String::truncate` panics
/// mid-codepoint on multibyte user agents.
fn truncate_chars(s: &mut String, max: usize) {
    if let Some((idx, _)) = s.char_indices().nth(max) {
        s.truncate(idx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visit(ip: &str, ua: &str) -> VisitRecord {
        VisitRecord {
            timestamp: Utc::now(),
            ip: ip.to_string(),
            user_agent: ua.to_string(),
            page: "main".to_string(),
        }
    }

    fn event(name: &str) -> EventRecord {
        EventRecord {
            timestamp: Utc::now(),
            session_id: "folio_1_abc".to_string(),
            name: name.to_string(),
            ip: "203.0.113.9".to_string(),
            user_agent: "test".to_string(),
        }
    }

    fn temp_store() -> (tempfile::TempDir, AnalyticsStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = AnalyticsStore::open(dir.path().join("analytics.json"));
        (dir, store)
    }

    #[test]
    fn visits_are_capped_at_the_most_recent_1000() {
        let (_dir, store) = temp_store();
        for i in 0..1005 {
            store.track_visit(visit(&format!("10.0.0.{}", i % 256), "ua")).unwrap();
        }
        let summary = store.summary();
        assert_eq!(summary.overview.total_visits, 1005);
        assert_eq!(summary.overview.recent_visits_30d, 1000);
    }

    #[test]
    fn events_are_capped_at_500_but_counts_survive() {
        let (_dir, store) = temp_store();
        for _ in 0..505 {
            store.track_event(event("click")).unwrap();
        }
        let summary = store.summary();
        assert_eq!(summary.overview.total_events, 505);
        assert_eq!(summary.overview.recent_events_30d, 500);
        assert_eq!(summary.event_counts["click"], 505);
    }

    #[test]
    fn store_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analytics.json");
        {
            let store = AnalyticsStore::open(path.clone());
            store.track_visit(visit("203.0.113.9", "Mozilla/5.0")).unwrap();
            store.track_event(event("scroll_depth")).unwrap();
        }

        let reloaded = AnalyticsStore::open(path);
        let summary = reloaded.summary();
        assert_eq!(summary.overview.total_visits, 1);
        assert_eq!(summary.overview.total_events, 1);
        assert_eq!(summary.last_event.unwrap().name, "scroll_depth");
    }

    #[test]
    fn corrupt_file_resets_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analytics.json");
        std::fs::write(&path, "{{{not json").unwrap();

        let store = AnalyticsStore::open(path);
        let summary = store.summary();
        assert_eq!(summary.overview.total_visits, 0);
        assert!(summary.last_visit.is_none());
    }

    #[test]
    fn long_user_agents_are_truncated_before_aggregation() {
        let (_dir, store) = temp_store();
        let long_ua = "x".repeat(120);
        store.track_visit(visit("10.0.0.1", &long_ua)).unwrap();
        store.track_visit(visit("10.0.0.2", &long_ua)).unwrap();

        let summary = store.summary();
        assert_eq!(summary.top_browsers.len(), 1);
        assert_eq!(summary.top_browsers[0].user_agent.len(), 50);
        assert_eq!(summary.top_browsers[0].count, 2);
    }

    #[test]
    fn top_browsers_are_ordered_and_capped_at_five() {
        let (_dir, store) = temp_store();
        for (ua, n) in [("a", 5), ("b", 3), ("c", 9), ("d", 1), ("e", 2), ("f", 4)] {
            for _ in 0..n {
                store.track_visit(visit("10.0.0.1", ua)).unwrap();
            }
        }
        let summary = store.summary();
        assert_eq!(summary.top_browsers.len(), 5);
        assert_eq!(summary.top_browsers[0].user_agent, "c");
        assert_eq!(summary.top_browsers[0].count, 9);
        assert!(!summary.top_browsers.iter().any(|b| b.user_agent == "d"));
    }

    #[test]
    fn events_per_visit_is_rounded_to_two_decimals() {
        let (_dir, store) = temp_store();
        store.track_visit(visit("10.0.0.1", "ua")).unwrap();
        store.track_visit(visit("10.0.0.2", "ua")).unwrap();
        store.track_visit(visit("10.0.0.3", "ua")).unwrap();
        store.track_event(event("click")).unwrap();

        let summary = store.summary();
        assert_eq!(summary.overview.events_per_visit, 0.33);
    }
}
