//! Capture layer: the typed input surface the host page feeds signals
//! through.
//!
//! The host binds whatever native listeners it has (DOM events in a webview,
//! synthetic input in tests) and translates each one into a [`PageSignal`].
//! The pipeline turns signals into events; high-frequency signals (scroll,
//! mouse movement) are debounced before they produce anything.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// A qualifying input that resets the inactivity clock without carrying any
/// other data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    MouseDown,
    KeyPress,
    TouchStart,
}

/// Description of the element under a click, as reported by the host.
#[derive(Debug, Clone, Default)]
pub struct ClickTarget {
    pub tag: String,
    pub id: String,
    pub classes: Vec<String>,
    pub text: String,
    /// Whether the element's bounding box intersects the viewport.
    pub in_viewport: bool,
}

/// Recognized click categories. Matching one adds a specialized event on top
/// of the generic `click` event; it never changes control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickCategory {
    Navigation,
    Download,
    ProjectView,
    SkillView,
}

impl ClickCategory {
    pub fn event_name(self) -> &'static str {
        match self {
            ClickCategory::Navigation => "navigation",
            ClickCategory::Download => "download",
            ClickCategory::ProjectView => "project_view",
            ClickCategory::SkillView => "skill_view",
        }
    }
}

impl ClickTarget {
    /// Category detection by class or id. First match wins.
    pub fn category(&self) -> Option<ClickCategory> {
        let has_class = |c: &str| self.classes.iter().any(|cls| cls == c);

        if has_class("nav-link") || self.id.starts_with("nav-") {
            Some(ClickCategory::Navigation)
        } else if has_class("download-btn") || self.id == "download-resume" {
            Some(ClickCategory::Download)
        } else if has_class("project-card") {
            Some(ClickCategory::ProjectView)
        } else if has_class("skill-item") {
            Some(ClickCategory::SkillView)
        } else {
            None
        }
    }

    /// Label used for the per-element click tally in the session summary.
    pub fn label(&self) -> String {
        if !self.id.is_empty() {
            format!("{}#{}", self.tag, self.id)
        } else {
            self.tag.clone()
        }
    }

    /// Payload for the generic `click` event. Text is truncated for size,
    /// never redacted (click text is already on-screen content).
    pub fn payload(&self, x: f64, y: f64, text_max: usize) -> Map<String, Value> {
        let text: String = self.text.chars().take(text_max).collect();
        let mut payload = Map::new();
        payload.insert("element".to_string(), json!(self.tag));
        payload.insert("element_id".to_string(), json!(self.id));
        payload.insert("element_classes".to_string(), json!(self.classes));
        payload.insert("text".to_string(), json!(text));
        payload.insert("x".to_string(), json!(x));
        payload.insert("y".to_string(), json!(y));
        payload.insert("in_viewport".to_string(), json!(self.in_viewport));
        payload
    }
}

/// A raw browser-level signal, before enrichment.
#[derive(Debug, Clone)]
pub enum PageSignal {
    Click {
        target: ClickTarget,
        x: f64,
        y: f64,
    },
    /// Raw scroll position sample; debounced before processing.
    Scroll {
        scroll_y: f64,
        document_height: f64,
        viewport_height: f64,
    },
    /// Tab visibility change. `hidden = true` fires `page_blur`,
    /// `hidden = false` fires `page_focus` and resets the activity clock.
    Visibility {
        hidden: bool,
    },
    /// Raw pointer position; debounced, then quantized into the heatmap grid.
    MouseMove {
        x: f64,
        y: f64,
    },
    /// An input or textarea changed. Only the fact that a value exists is
    /// recorded, never the value itself.
    Input {
        element_type: String,
        element_name: String,
        has_value: bool,
    },
    /// An uncaught host-side error. Captured as telemetry, never fatal.
    ScriptError {
        message: String,
        source: String,
        line: u32,
        column: u32,
    },
    /// The section of the page currently marked active.
    SectionChange {
        section: String,
    },
    Activity(ActivityKind),
    /// The page is going away. Emits `page_unload` and forces a best-effort
    /// final flush.
    Unload,
}

/// Percentage of the scrollable area covered, rounded and clamped to 0..=100.
///
/// A page with no scrollable area counts as fully scrolled.
pub fn scroll_percent(scroll_y: f64, document_height: f64, viewport_height: f64) -> u32 {
    let scrollable = document_height - viewport_height;
    if scrollable <= 0.0 {
        return 100;
    }
    let pct = (scroll_y / scrollable * 100.0).round();
    pct.clamp(0.0, 100.0) as u32
}
