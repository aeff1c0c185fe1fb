//! Session event pipeline for the Folio resume site.
//!
//! One [`Tracker`] per page visit: the host feeds it capture-layer signals
//! and named events, the pipeline enriches and buffers them, and batches go
//! to the collector once the queue reaches the flush threshold (or on page
//! teardown, best-effort). Transport failures retain the queue for the next
//! trigger; delivery is at-least-once.

pub mod capture;
pub mod config;
pub mod consent;
pub mod debounce;
pub mod dispatch;
pub mod event;
pub mod session;
pub mod tracker;

pub use capture::{ActivityKind, ClickCategory, ClickTarget, PageSignal};
pub use config::{EngagementWeights, TrackerConfig};
pub use dispatch::{HttpTransport, MemoryTransport, Transport, TransportError};
pub use event::{ClientInfo, Event, EventBatch};
pub use session::SessionSummary;
pub use tracker::Tracker;
