//! Session identity and the aggregates derived from it.
//!
//! One session per tracker, created at spawn and gone when the page unloads.
//! Everything here is plain state mutated by the driver task; no locking.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use tokio::time::Instant;

use crate::config::EngagementWeights;

/// Generates a session id: fixed prefix, current millis, short random
/// base-36 suffix. Uniqueness is best-effort; collisions are treated as
/// negligible, not guarded against.
pub fn new_session_id(prefix: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix = base36(rand::random::<u64>());
    format!("{prefix}_{millis}_{suffix}")
}

fn base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    // Keep the suffix short; 9 digits cover the full u64 range's low bits.
    out.truncate(9);
    String::from_utf8(out).unwrap_or_default()
}

/// Quantize a pointer position into the heatmap grid.
pub fn heat_bucket(x: f64, y: f64, cell_px: u32) -> (i64, i64) {
    let cell = cell_px.max(1) as f64;
    ((x / cell).floor() as i64, (y / cell).floor() as i64)
}

/// The engagement score heuristic. Minutes are fractional before capping,
/// and the sum is rounded once at the end.
pub fn engagement_score(
    weights: &EngagementWeights,
    elapsed: std::time::Duration,
    event_count: u64,
    distinct_sections: usize,
) -> u32 {
    let minutes = elapsed.as_secs_f64() / 60.0;
    let score = minutes.min(weights.minute_cap) * weights.minute_weight
        + (event_count as f64).min(weights.event_cap) * weights.event_weight
        + distinct_sections as f64 * weights.section_weight;
    score.round() as u32
}

/// One hot cell in a `heatmap_data` report.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HeatCell {
    pub cell_x: i64,
    pub cell_y: i64,
    pub count: u64,
}

/// Per-element click tally entry in the session summary.
#[derive(Debug, Clone, Serialize)]
pub struct ClickCount {
    pub label: String,
    pub count: u64,
}

/// Point-in-time snapshot of the session, exposed to the host application.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub duration_secs: u64,
    pub event_count: u64,
    pub engagement_score: u32,
    pub distinct_sections: Vec<String>,
    pub top_clicked: Vec<ClickCount>,
    pub max_scroll_depth: u32,
}

pub struct SessionState {
    id: String,
    started_at: Instant,
    pub last_activity: Instant,
    pub active: bool,
    milestones_reached: BTreeSet<u32>,
    max_scroll_depth: u32,
    heatmap: HashMap<(i64, i64), u64>,
    sections: BTreeSet<String>,
    current_section: Option<String>,
    clicks: HashMap<String, u64>,
    event_count: u64,
}

impl SessionState {
    pub fn new(prefix: &str) -> Self {
        let now = Instant::now();
        Self {
            id: new_session_id(prefix),
            started_at: now,
            last_activity: now,
            active: true,
            milestones_reached: BTreeSet::new(),
            max_scroll_depth: 0,
            heatmap: HashMap::new(),
            sections: BTreeSet::new(),
            current_section: None,
            clicks: HashMap::new(),
            event_count: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    pub fn since_last_activity(&self) -> std::time::Duration {
        self.last_activity.elapsed()
    }

    /// A qualifying input arrived. Resets the inactivity clock and
    /// reactivates the session if it had gone inactive.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
        self.active = true;
    }

    pub fn mark_inactive(&mut self) {
        self.active = false;
    }

    pub fn note_event(&mut self) {
        self.event_count += 1;
    }

    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    /// Milestones in {25, 50, 75, 100} crossed for the first time by this
    /// scroll depth. One-shot per milestone per session: scrolling back up
    /// and down again never re-fires one.
    pub fn cross_milestones(&mut self, percent: u32) -> Vec<u32> {
        self.max_scroll_depth = self.max_scroll_depth.max(percent);
        [25, 50, 75, 100]
            .into_iter()
            .filter(|m| percent >= *m && self.milestones_reached.insert(*m))
            .collect()
    }

    pub fn max_scroll_depth(&self) -> u32 {
        self.max_scroll_depth
    }

    /// Count a pointer sample against its grid cell. Returns a heatmap
    /// report when the configured number of distinct cells has accumulated
    /// since the last report.
    pub fn record_mouse(
        &mut self,
        x: f64,
        y: f64,
        cell_px: u32,
        report_every: u64,
        top_n: usize,
    ) -> Option<Vec<HeatCell>> {
        let bucket = heat_bucket(x, y, cell_px);
        let is_new = !self.heatmap.contains_key(&bucket);
        *self.heatmap.entry(bucket).or_insert(0) += 1;

        if is_new && report_every > 0 && self.heatmap.len() as u64 % report_every == 0 {
            Some(self.top_cells(top_n))
        } else {
            None
        }
    }

    /// Hottest cells by count, descending. Ties fall in iteration order,
    /// which is unspecified beyond the count ordering.
    pub fn top_cells(&self, n: usize) -> Vec<HeatCell> {
        let mut cells: Vec<HeatCell> = self
            .heatmap
            .iter()
            .map(|(&(cell_x, cell_y), &count)| HeatCell {
                cell_x,
                cell_y,
                count,
            })
            .collect();
        cells.sort_by(|a, b| b.count.cmp(&a.count));
        cells.truncate(n);
        cells
    }

    #[cfg(test)]
    pub fn cell_count(&self, x: f64, y: f64, cell_px: u32) -> u64 {
        self.heatmap
            .get(&heat_bucket(x, y, cell_px))
            .copied()
            .unwrap_or(0)
    }

    pub fn visit_section(&mut self, section: &str) {
        self.current_section = Some(section.to_string());
        self.sections.insert(section.to_string());
    }

    /// The section currently marked active on the page, or "unknown".
    pub fn current_section(&self) -> &str {
        self.current_section.as_deref().unwrap_or("unknown")
    }

    pub fn tally_click(&mut self, label: String) {
        *self.clicks.entry(label).or_insert(0) += 1;
    }

    pub fn summary(&self, weights: &EngagementWeights) -> SessionSummary {
        let mut top_clicked: Vec<ClickCount> = self
            .clicks
            .iter()
            .map(|(label, &count)| ClickCount {
                label: label.clone(),
                count,
            })
            .collect();
        top_clicked.sort_by(|a, b| b.count.cmp(&a.count));
        top_clicked.truncate(5);

        SessionSummary {
            session_id: self.id.clone(),
            duration_secs: self.elapsed().as_secs(),
            event_count: self.event_count,
            engagement_score: engagement_score(
                weights,
                self.elapsed(),
                self.event_count,
                self.sections.len(),
            ),
            distinct_sections: self.sections.iter().cloned().collect(),
            top_clicked,
            max_scroll_depth: self.max_scroll_depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn session_id_has_prefix_millis_and_suffix() {
        let id = new_session_id("folio");
        let parts: Vec<&str> = id.splitn(3, '_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "folio");
        assert!(parts[1].parse::<i64>().unwrap() > 0);
        assert!(!parts[2].is_empty());
        assert!(parts[2].chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn heat_bucket_quantizes_to_grid() {
        assert_eq!(heat_bucket(120.0, 80.0, 50), (2, 1));
        assert_eq!(heat_bucket(0.0, 0.0, 50), (0, 0));
        assert_eq!(heat_bucket(49.9, 49.9, 50), (0, 0));
        assert_eq!(heat_bucket(50.0, 50.0, 50), (1, 1));
    }

    #[test]
    fn repeated_hits_increment_the_same_bucket() {
        let mut session = SessionState::new("t");
        session.record_mouse(120.0, 80.0, 50, 20, 5);
        session.record_mouse(130.0, 90.0, 50, 20, 5);
        session.record_mouse(149.0, 99.0, 50, 20, 5);
        assert_eq!(session.cell_count(120.0, 80.0, 50), 3);
    }

    #[test]
    fn heatmap_reports_every_20th_distinct_cell() {
        let mut session = SessionState::new("t");
        let mut reports = 0;
        for i in 0..40 {
            // Each sample lands in a fresh cell.
            if session
                .record_mouse(i as f64 * 50.0, 0.0, 50, 20, 5)
                .is_some()
            {
                reports += 1;
            }
        }
        assert_eq!(reports, 2);
    }

    #[test]
    fn heatmap_report_carries_top_cells_by_count() {
        let mut session = SessionState::new("t");
        for _ in 0..5 {
            session.record_mouse(10.0, 10.0, 50, 0, 5);
        }
        for _ in 0..3 {
            session.record_mouse(100.0, 10.0, 50, 0, 5);
        }
        session.record_mouse(200.0, 10.0, 50, 0, 5);

        let top = session.top_cells(2);
        assert_eq!(top.len(), 2);
        assert_eq!((top[0].cell_x, top[0].cell_y, top[0].count), (0, 0, 5));
        assert_eq!((top[1].cell_x, top[1].cell_y, top[1].count), (2, 0, 3));
    }

    #[test]
    fn milestones_fire_once_and_never_refire() {
        let mut session = SessionState::new("t");
        assert_eq!(session.cross_milestones(30), vec![25]);
        assert_eq!(session.cross_milestones(0), Vec::<u32>::new());
        assert_eq!(session.cross_milestones(60), vec![50]);
        // 25 does not repeat, 75 and 100 arrive together.
        assert_eq!(session.cross_milestones(100), vec![75, 100]);
        assert_eq!(session.cross_milestones(100), Vec::<u32>::new());
        assert_eq!(session.max_scroll_depth(), 100);
    }

    #[test]
    fn engagement_score_matches_reference_case() {
        // 5 minutes, 20 events, 2 sections: 50 + 40 + 40.
        let score = engagement_score(
            &EngagementWeights::default(),
            Duration::from_secs(5 * 60),
            20,
            2,
        );
        assert_eq!(score, 130);
    }

    #[test]
    fn engagement_score_caps_minutes_and_events() {
        let score = engagement_score(
            &EngagementWeights::default(),
            Duration::from_secs(60 * 60),
            500,
            1,
        );
        // 10*10 + 50*2 + 1*20
        assert_eq!(score, 220);
    }

    #[test]
    fn summary_collects_top_clicks_and_sections() {
        let mut session = SessionState::new("t");
        session.visit_section("about");
        session.visit_section("projects");
        session.visit_section("about");
        for _ in 0..3 {
            session.tally_click("a#nav-projects".to_string());
        }
        session.tally_click("button#download-resume".to_string());

        let summary = session.summary(&EngagementWeights::default());
        assert_eq!(summary.distinct_sections.len(), 2);
        assert_eq!(summary.top_clicked[0].label, "a#nav-projects");
        assert_eq!(summary.top_clicked[0].count, 3);
        assert_eq!(summary.session_id, session.id());
    }
}
