//! Batch dispatcher: the pending queue and the transport that drains it.
//!
//! Delivery is at-least-once. A failed flush keeps the queue untouched for
//! the next trigger; there is no backoff, no retry cap, and no dedup on
//! redelivery. A success clears the whole queue (partial acceptance is not
//! modeled).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::event::{ClientInfo, Event, EventBatch};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("collector rejected batch (status {status})")]
    Status { status: u16 },
}

/// Delivery seam for batches. Swappable so tests can run without a network
/// and hosts can plug in beacon-style senders.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, batch: EventBatch) -> Result<(), TransportError>;
}

/// POSTs each batch as JSON to the collector endpoint. Any 2xx is success.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, batch: EventBatch) -> Result<(), TransportError> {
        let response = self.client.post(&self.endpoint).json(&batch).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TransportError::Status {
                status: status.as_u16(),
            })
        }
    }
}

/// Accumulates batches in memory. Intended for tests and local inspection.
#[derive(Default)]
pub struct MemoryTransport {
    batches: Mutex<Vec<EventBatch>>,
    fail_next: Mutex<bool>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `send` fail with a simulated 503.
    pub fn fail_next(&self) {
        if let Ok(mut fail) = self.fail_next.lock() {
            *fail = true;
        }
    }

    pub fn batches(&self) -> Vec<EventBatch> {
        self.batches.lock().map(|b| b.clone()).unwrap_or_default()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().map(|b| b.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, batch: EventBatch) -> Result<(), TransportError> {
        let should_fail = self
            .fail_next
            .lock()
            .map(|mut f| std::mem::take(&mut *f))
            .unwrap_or(false);
        if should_fail {
            return Err(TransportError::Status { status: 503 });
        }
        if let Ok(mut batches) = self.batches.lock() {
            batches.push(batch);
        }
        Ok(())
    }
}

/// Owns the pending queue. Mutated only from the driver task.
pub struct Dispatcher {
    queue: VecDeque<Event>,
    threshold: usize,
    transport: Arc<dyn Transport>,
}

impl Dispatcher {
    pub fn new(threshold: usize, transport: Arc<dyn Transport>) -> Self {
        Self {
            queue: VecDeque::new(),
            threshold,
            transport,
        }
    }

    /// Append an event. Returns true when the queue has reached the flush
    /// threshold; the caller decides when to actually flush.
    pub fn enqueue(&mut self, event: Event) -> bool {
        self.queue.push_back(event);
        self.queue.len() >= self.threshold
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    fn build_batch(&self, session_id: &str, user_info: &ClientInfo) -> EventBatch {
        EventBatch {
            session_id: session_id.to_string(),
            events: self.queue.iter().cloned().collect(),
            user_info: user_info.clone(),
        }
    }

    /// Deliver the full queue in one call. On success the queue is cleared;
    /// on failure it is retained as-is for the next trigger.
    pub async fn flush(&mut self, session_id: &str, user_info: &ClientInfo) {
        if self.queue.is_empty() {
            return;
        }
        let batch = self.build_batch(session_id, user_info);
        let count = batch.events.len();
        match self.transport.send(batch).await {
            Ok(()) => {
                debug!(count, "flushed event batch");
                self.queue.clear();
            }
            Err(e) => {
                warn!(count, error = %e, "batch flush failed, retaining queue");
            }
        }
    }

    /// Fire-and-forget flush for page teardown. The send is spawned and
    /// never awaited; the queue is cleared at spawn time. The page may
    /// terminate before the call completes and that loss is accepted.
    pub fn flush_detached(&mut self, session_id: &str, user_info: &ClientInfo) {
        if self.queue.is_empty() {
            return;
        }
        let batch = self.build_batch(session_id, user_info);
        self.queue.clear();
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            if let Err(e) = transport.send(batch).await {
                debug!(error = %e, "teardown flush lost");
            }
        });
    }
}
