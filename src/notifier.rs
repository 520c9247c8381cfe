//! Desktop notifications via notify-rust (D-Bus).

use notify_rust::{Notification, Urgency};
use tracing::{debug, warn};

pub struct Notifier {
    enabled: bool,
}

impl Notifier {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Transient status, e.g. listening turned on.
    pub fn status(&self, summary: &str, body: &str) {
        self.show(summary, body, Urgency::Low, 3000);
    }

    /// Stays up until dismissed.
    pub fn alert(&self, summary: &str, body: &str) {
        self.show(summary, body, Urgency::Critical, 0);
    }

    fn show(&self, summary: &str, body: &str, urgency: Urgency, timeout_ms: i32) {
        if !self.enabled {
            return;
        }

        debug!("Notification: {summary}");

        if let Err(e) = Notification::new()
            .summary(summary)
            .body(body)
            .icon("audio-input-microphone")
            .urgency(urgency)
            .timeout(timeout_ms)
            .show()
        {
            warn!("Failed to show notification: {e}");
        }
    }
}
