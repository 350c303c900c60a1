use parley_client::SessionEvent;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

pub const EVENT_TIMEOUT_MS: u64 = 3000;
pub const QUIET_WINDOW_MS: u64 = 300;

/// Session events as seen by the application, with waiting helpers.
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<SessionEvent>,
    seen: Vec<SessionEvent>,
}

impl EventStream {
    pub fn new(rx: mpsc::UnboundedReceiver<SessionEvent>) -> Self {
        Self {
            rx,
            seen: Vec::new(),
        }
    }

    /// Waits for the first event matching `pred`, keeping everything received on the way.
    pub async fn wait_for<F>(&mut self, mut pred: F) -> SessionEvent
    where
        F: FnMut(&SessionEvent) -> bool,
    {
        let deadline = Duration::from_millis(EVENT_TIMEOUT_MS);
        loop {
            let event = timeout(deadline, self.rx.recv())
                .await
                .expect("Timed out waiting for session event")
                .expect("Session event stream ended");
            self.seen.push(event.clone());
            if pred(&event) {
                return event;
            }
        }
    }

    /// Collects whatever arrives within the quiet window.
    pub async fn drain(&mut self) -> Vec<SessionEvent> {
        let window = Duration::from_millis(QUIET_WINDOW_MS);
        let mut drained = Vec::new();
        while let Ok(Some(event)) = timeout(window, self.rx.recv()).await {
            self.seen.push(event.clone());
            drained.push(event);
        }
        drained
    }

    /// Every event received so far.
    pub fn seen(&self) -> &[SessionEvent] {
        &self.seen
    }
}
