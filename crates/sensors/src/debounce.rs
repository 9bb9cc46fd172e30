//! Software debounce shared by line implementations.

use std::time::Duration;

/// Accepts a transition only if it is at least `window` after the previously
/// accepted one. Timestamps are offsets from any fixed monotonic origin.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    last_accepted: Option<Duration>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns true and remembers `at` if the transition passes the filter
    pub fn accept(&mut self, at: Duration) -> bool {
        if let Some(last) = self.last_accepted {
            if at.saturating_sub(last) < self.window {
                return false;
            }
        }
        self.last_accepted = Some(at);
        true
    }
}
