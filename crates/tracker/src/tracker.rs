//! Tracker lifecycle: a clone-able handle in front of a single driver task.
//!
//! All mutable state (session, pending queue, aggregates) lives in the
//! driver, which owns it exclusively; commands and debounced samples arrive
//! over channels, so the queue needs no locking and events keep the order
//! their triggering signals were dispatched in.
//!
//! Nothing in here is fatal to the host. Sends to a dead driver are dropped
//! silently, transport failures retain the queue, and an opted-out visitor
//! gets a disabled handle whose operations are all no-ops.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::capture::{scroll_percent, PageSignal};
use crate::config::TrackerConfig;
use crate::consent;
use crate::dispatch::{Dispatcher, Transport};
use crate::event::{ClientInfo, Event};
use crate::session::{SessionState, SessionSummary};

enum Command {
    Record {
        name: String,
        payload: Map<String, Value>,
    },
    Signal(PageSignal),
    Flush(oneshot::Sender<()>),
    Summary(oneshot::Sender<SessionSummary>),
    Unload(oneshot::Sender<()>),
}

/// Handle to a running session event pipeline.
///
/// Constructed explicitly with [`Tracker::spawn`] and passed by reference to
/// whatever needs to record events; there is no ambient global instance.
#[derive(Clone)]
pub struct Tracker {
    tx: Option<mpsc::UnboundedSender<Command>>,
}

impl Tracker {
    /// Start the pipeline. Reads the opt-out flag first when a consent path
    /// is configured and returns a disabled handle if the visitor opted out.
    pub fn spawn(
        config: TrackerConfig,
        client_info: ClientInfo,
        transport: Arc<dyn Transport>,
    ) -> Tracker {
        if let Some(path) = &config.consent_path {
            if consent::opted_out(path) {
                info!("visitor opted out of analytics, tracker disabled");
                return Tracker::disabled();
            }
        }

        let session = SessionState::new(&config.session_prefix);
        info!(session_id = session.id(), "analytics session started");

        let (tx, rx) = mpsc::unbounded_channel();
        let (scroll_debounce, scroll_rx) = crate::debounce::Debouncer::new(config.scroll_debounce);
        let (mouse_debounce, mouse_rx) = crate::debounce::Debouncer::new(config.mouse_debounce);
        let dispatcher = Dispatcher::new(config.flush_threshold, transport);

        let driver = Driver {
            cfg: config,
            client_info,
            session,
            dispatcher,
            rx,
            scroll_debounce,
            scroll_rx,
            mouse_debounce,
            mouse_rx,
        };
        tokio::spawn(driver.run());

        Tracker { tx: Some(tx) }
    }

    /// A handle that accepts every call and does nothing.
    pub fn disabled() -> Tracker {
        Tracker { tx: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Record an arbitrary named event with a free-form payload.
    pub fn record(&self, name: impl Into<String>, payload: Map<String, Value>) {
        self.send(Command::Record {
            name: name.into(),
            payload,
        });
    }

    /// Feed a capture-layer signal into the pipeline.
    pub fn signal(&self, signal: PageSignal) {
        self.send(Command::Signal(signal));
    }

    /// Explicit flush. Resolves once the attempt has completed, whether or
    /// not delivery succeeded.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        self.send(Command::Flush(ack));
        let _ = done.await;
    }

    /// Point-in-time session summary, or None when the tracker is disabled.
    pub async fn summary(&self) -> Option<SessionSummary> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Summary(reply));
        rx.await.ok()
    }

    /// Record `page_unload`, fire a best-effort final flush, and stop the
    /// driver. Resolves once the unload event is queued for delivery, not
    /// once it is delivered.
    pub async fn unload(&self) {
        let (ack, done) = oneshot::channel();
        self.send(Command::Unload(ack));
        let _ = done.await;
    }

    fn send(&self, command: Command) {
        if let Some(tx) = &self.tx {
            // A closed channel means the driver already unloaded.
            let _ = tx.send(command);
        }
    }
}

struct ScrollSample {
    scroll_y: f64,
    document_height: f64,
    viewport_height: f64,
}

struct Driver {
    cfg: TrackerConfig,
    client_info: ClientInfo,
    session: SessionState,
    dispatcher: Dispatcher,
    rx: mpsc::UnboundedReceiver<Command>,
    scroll_debounce: crate::debounce::Debouncer<ScrollSample>,
    scroll_rx: mpsc::UnboundedReceiver<ScrollSample>,
    mouse_debounce: crate::debounce::Debouncer<(f64, f64)>,
    mouse_rx: mpsc::UnboundedReceiver<(f64, f64)>,
}

impl Driver {
    async fn run(mut self) {
        let mut ping = interval_at(
            Instant::now() + self.cfg.ping_interval,
            self.cfg.ping_interval,
        );
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let idle_at = self.session.last_activity + self.cfg.inactivity_timeout;

            tokio::select! {
                cmd = self.rx.recv() => match cmd {
                    None => break,
                    Some(cmd) => {
                        if self.handle_command(cmd).await {
                            break;
                        }
                    }
                },
                Some(sample) = self.scroll_rx.recv() => self.handle_scroll_sample(sample).await,
                Some((x, y)) = self.mouse_rx.recv() => self.handle_mouse_sample(x, y).await,
                _ = ping.tick() => self.handle_ping().await,
                _ = sleep_until(idle_at), if self.session.active => self.handle_idle().await,
            }
        }
        debug!(session_id = self.session.id(), "tracker driver stopped");
    }

    /// Returns true when the driver should stop.
    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Record { name, payload } => {
                self.record_event(&name, payload).await;
                false
            }
            Command::Signal(signal) => self.handle_signal(signal).await,
            Command::Flush(ack) => {
                self.dispatcher
                    .flush(self.session.id(), &self.client_info)
                    .await;
                let _ = ack.send(());
                false
            }
            Command::Summary(reply) => {
                let _ = reply.send(self.session.summary(&self.cfg.engagement));
                false
            }
            Command::Unload(ack) => {
                self.handle_unload();
                let _ = ack.send(());
                true
            }
        }
    }

    async fn handle_signal(&mut self, signal: PageSignal) -> bool {
        match signal {
            PageSignal::Click { target, x, y } => {
                let payload = target.payload(x, y, self.cfg.click_text_max);
                self.session.tally_click(target.label());
                let category = target.category();
                self.record_event("click", payload.clone()).await;
                if let Some(category) = category {
                    self.record_event(category.event_name(), payload).await;
                }
            }
            PageSignal::Scroll {
                scroll_y,
                document_height,
                viewport_height,
            } => {
                self.session.touch();
                self.scroll_debounce.submit(ScrollSample {
                    scroll_y,
                    document_height,
                    viewport_height,
                });
            }
            PageSignal::MouseMove { x, y } => {
                self.session.touch();
                self.mouse_debounce.submit((x, y));
            }
            PageSignal::Activity(_) => self.session.touch(),
            PageSignal::Visibility { hidden: true } => {
                let idle_secs = self.session.since_last_activity().as_secs();
                let mut payload = Map::new();
                payload.insert("seconds_since_activity".to_string(), json!(idle_secs));
                self.record_event("page_blur", payload).await;
            }
            PageSignal::Visibility { hidden: false } => {
                self.session.touch();
                self.record_event("page_focus", Map::new()).await;
            }
            PageSignal::Input {
                element_type,
                element_name,
                has_value,
            } => {
                let mut payload = Map::new();
                payload.insert("element_type".to_string(), json!(element_type));
                payload.insert("element_name".to_string(), json!(element_name));
                // Only the fact that a value exists is recorded, never the value.
                payload.insert("has_value".to_string(), json!(has_value));
                self.record_event("form_interaction", payload).await;
            }
            PageSignal::ScriptError {
                message,
                source,
                line,
                column,
            } => {
                let mut payload = Map::new();
                payload.insert("message".to_string(), json!(message));
                payload.insert("source".to_string(), json!(source));
                payload.insert("line".to_string(), json!(line));
                payload.insert("column".to_string(), json!(column));
                self.record_event("javascript_error", payload).await;
            }
            PageSignal::SectionChange { section } => {
                self.session.visit_section(&section);
                let mut payload = Map::new();
                payload.insert("section".to_string(), json!(section));
                self.record_event("section_view", payload).await;
            }
            PageSignal::Unload => {
                self.handle_unload();
                return true;
            }
        }
        false
    }

    async fn handle_scroll_sample(&mut self, sample: ScrollSample) {
        let percent = scroll_percent(
            sample.scroll_y,
            sample.document_height,
            sample.viewport_height,
        );
        for milestone in self.session.cross_milestones(percent) {
            let mut payload = Map::new();
            payload.insert("depth".to_string(), json!(milestone));
            payload.insert("percent".to_string(), json!(percent));
            self.record_event("scroll_depth", payload).await;
        }
    }

    async fn handle_mouse_sample(&mut self, x: f64, y: f64) {
        let report = self.session.record_mouse(
            x,
            y,
            self.cfg.heatmap_cell_px,
            self.cfg.heatmap_report_every,
            self.cfg.heatmap_top_cells,
        );
        if let Some(cells) = report {
            let mut payload = Map::new();
            payload.insert(
                "cells".to_string(),
                serde_json::to_value(&cells).unwrap_or(Value::Null),
            );
            payload.insert("cell_px".to_string(), json!(self.cfg.heatmap_cell_px));
            self.record_event("heatmap_data", payload).await;
        }
    }

    async fn handle_ping(&mut self) {
        if !self.session.active {
            return;
        }
        let mut payload = Map::new();
        payload.insert(
            "elapsed_secs".to_string(),
            json!(self.session.elapsed().as_secs()),
        );
        payload.insert("section".to_string(), json!(self.session.current_section()));
        self.record_event("session_ping", payload).await;
    }

    async fn handle_idle(&mut self) {
        self.session.mark_inactive();
        let mut payload = Map::new();
        payload.insert(
            "inactive_after_secs".to_string(),
            json!(self.cfg.inactivity_timeout.as_secs()),
        );
        self.record_event("session_inactive", payload).await;
    }

    fn handle_unload(&mut self) {
        self.scroll_debounce.cancel();
        self.mouse_debounce.cancel();

        let mut payload = Map::new();
        payload.insert(
            "duration_secs".to_string(),
            json!(self.session.elapsed().as_secs()),
        );
        payload.insert("event_count".to_string(), json!(self.session.event_count()));
        let event = Event::record(
            "page_unload",
            self.session.id(),
            &self.cfg.page_url,
            payload,
        );
        self.session.note_event();
        // Enqueue directly: the teardown flush below sends everything anyway.
        self.dispatcher.enqueue(event);
        self.dispatcher
            .flush_detached(self.session.id(), &self.client_info);
    }

    async fn record_event(&mut self, name: &str, payload: Map<String, Value>) {
        let event = Event::record(name, self.session.id(), &self.cfg.page_url, payload);
        self.session.note_event();
        if self.dispatcher.enqueue(event) {
            self.dispatcher
                .flush(self.session.id(), &self.client_info)
                .await;
        }
    }
}
