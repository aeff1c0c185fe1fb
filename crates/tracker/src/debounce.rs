//! Trailing debounce as an explicit scheduled task.
//!
//! A [`Debouncer`] holds at most one pending value. Each submission
//! overwrites the slot and reschedules the timer, so a burst of submissions
//! collapses to exactly one delivery of the last value after a quiet window.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub struct Debouncer<T: Send + 'static> {
    window: Duration,
    out: mpsc::UnboundedSender<T>,
    slot: Arc<Mutex<Option<T>>>,
    timer: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> Debouncer<T> {
    /// Create a debouncer and the receiving end its firings arrive on.
    pub fn new(window: Duration) -> (Self, mpsc::UnboundedReceiver<T>) {
        let (out, rx) = mpsc::unbounded_channel();
        (
            Self {
                window,
                out,
                slot: Arc::new(Mutex::new(None)),
                timer: None,
            },
            rx,
        )
    }

    /// Submit a value, replacing any pending one and restarting the window.
    pub fn submit(&mut self, value: T) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(value);
        }
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }

        let slot = Arc::clone(&self.slot);
        let out = self.out.clone();
        let window = self.window;
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let value = slot.lock().ok().and_then(|mut s| s.take());
            if let Some(value) = value {
                let _ = out.send(value);
            }
        }));
    }

    /// Drop any pending value and cancel the timer.
    pub fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        if let Ok(mut slot) = self.slot.lock() {
            *slot = None;
        }
    }
}

impl<T: Send + 'static> Drop for Debouncer<T> {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
