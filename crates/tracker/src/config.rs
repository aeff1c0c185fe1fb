//! Tracker configuration.
//!
//! Every sampling window, threshold, and scoring weight the pipeline uses is
//! a field here. Several of these values (the heatmap report cadence, the
//! engagement weights) are inherited tuning constants with no stated
//! rationale, so they are kept configurable rather than baked in.

use std::path::PathBuf;
use std::time::Duration;

/// Weights and caps for the engagement score heuristic.
///
/// `score = min(minutes, minute_cap) * minute_weight
///        + min(events, event_cap) * event_weight
///        + distinct_sections * section_weight`, rounded.
///
/// Higher is more engaged; there is no calibrated target range.
#[derive(Debug, Clone, Copy)]
pub struct EngagementWeights {
    pub minute_weight: f64,
    pub minute_cap: f64,
    pub event_weight: f64,
    pub event_cap: f64,
    pub section_weight: f64,
}

impl Default for EngagementWeights {
    fn default() -> Self {
        Self {
            minute_weight: 10.0,
            minute_cap: 10.0,
            event_weight: 2.0,
            event_cap: 50.0,
            section_weight: 20.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// URL of the page this session is tracking, stamped onto every event.
    pub page_url: String,
    /// Prefix for generated session ids.
    pub session_prefix: String,
    /// Flush once the pending queue reaches this length.
    pub flush_threshold: usize,
    /// Quiet period after which the session flips to inactive.
    pub inactivity_timeout: Duration,
    /// Cadence of `session_ping` events while active.
    pub ping_interval: Duration,
    /// Trailing debounce window for scroll sampling.
    pub scroll_debounce: Duration,
    /// Trailing debounce window for mouse-move sampling.
    pub mouse_debounce: Duration,
    /// Heatmap grid cell edge, in pixels.
    pub heatmap_cell_px: u32,
    /// Emit `heatmap_data` every Nth distinct grid cell observed.
    pub heatmap_report_every: u64,
    /// Number of hottest cells carried by each `heatmap_data` event.
    pub heatmap_top_cells: usize,
    /// Click text is truncated to this many characters.
    pub click_text_max: usize,
    pub engagement: EngagementWeights,
    /// Opt-out flag file. When set, the flag is read once at spawn and a
    /// disabled tracker is returned if the visitor opted out.
    pub consent_path: Option<PathBuf>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            page_url: "/".to_string(),
            session_prefix: "folio".to_string(),
            flush_threshold: 10,
            inactivity_timeout: Duration::from_secs(5 * 60),
            ping_interval: Duration::from_secs(30),
            scroll_debounce: Duration::from_millis(250),
            mouse_debounce: Duration::from_millis(1000),
            heatmap_cell_px: 50,
            heatmap_report_every: 20,
            heatmap_top_cells: 5,
            click_text_max: 100,
            engagement: EngagementWeights::default(),
            consent_path: None,
        }
    }
}
