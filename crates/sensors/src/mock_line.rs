//! Mock line implementation
//!
//! Implements `EdgeLine` without hardware. Transitions are produced by
//! `trigger()` calls or, when auto-fire is configured, by a background thread
//! after a random delay. Used for tests and `--simulate` runs.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use contracts::{ContractError, Edge, EdgeCallback, EdgeEvent, EdgeLine};
use rand::Rng;
use tracing::{debug, trace};

use crate::debounce::Debouncer;

/// Mock line configuration
#[derive(Debug, Clone, Default)]
pub struct MockLineConfig {
    /// Fire once after a random delay in this range each time the line is requested
    pub auto_fire: Option<(Duration, Duration)>,
}

impl MockLineConfig {
    /// Fire between `min` and `max` after every request
    pub fn auto_fire(min: Duration, max: Duration) -> Self {
        Self {
            auto_fire: Some((min, max.max(min))),
        }
    }
}

struct LineInner {
    callback: Option<EdgeCallback>,
    debouncer: Debouncer,
    generation: u64,
}

/// Mock GPIO line
pub struct MockLine {
    chip: String,
    offset: u32,
    config: MockLineConfig,
    origin: Instant,
    inner: Arc<Mutex<LineInner>>,
    requested: Arc<AtomicBool>,
    fail_requests: AtomicBool,
    request_count: AtomicU64,
    release_count: AtomicU64,
}

impl MockLine {
    /// Create a mock line that only fires on `trigger()`
    pub fn new(chip: impl Into<String>, offset: u32) -> Self {
        Self::with_config(chip, offset, MockLineConfig::default())
    }

    /// Create a mock line with configuration
    pub fn with_config(chip: impl Into<String>, offset: u32, config: MockLineConfig) -> Self {
        Self {
            chip: chip.into(),
            offset,
            config,
            origin: Instant::now(),
            inner: Arc::new(Mutex::new(LineInner {
                callback: None,
                debouncer: Debouncer::new(Duration::ZERO),
                generation: 0,
            })),
            requested: Arc::new(AtomicBool::new(false)),
            fail_requests: AtomicBool::new(false),
            request_count: AtomicU64::new(0),
            release_count: AtomicU64::new(0),
        }
    }

    /// Simulate a transition on this line.
    ///
    /// Returns true if the transition passed the debounce filter and was
    /// handed to the callback.
    pub fn trigger(&self) -> bool {
        self.emit(EdgeEvent::now(self.offset))
    }

    /// Simulate a notification carrying a foreign line offset
    pub fn trigger_offset(&self, offset: u32) -> bool {
        self.emit(EdgeEvent::now(offset))
    }

    /// Make subsequent `request` calls fail with `HardwareUnavailable`
    pub fn set_fail_requests(&self, fail: bool) {
        self.fail_requests.store(fail, Ordering::SeqCst);
    }

    /// Callback registered by the current request, if any
    pub fn current_callback(&self) -> Option<EdgeCallback> {
        self.inner.lock().unwrap().callback.clone()
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    pub fn release_count(&self) -> u64 {
        self.release_count.load(Ordering::Relaxed)
    }

    fn emit(&self, event: EdgeEvent) -> bool {
        emit(&self.inner, self.origin, event)
    }

    fn spawn_auto_fire(&self, generation: u64, min: Duration, max: Duration) {
        let delay_ms = rand::rng().random_range(min.as_millis() as u64..=max.as_millis() as u64);
        let delay = Duration::from_millis(delay_ms);
        let inner = Arc::clone(&self.inner);
        let requested = Arc::clone(&self.requested);
        let origin = self.origin;
        let offset = self.offset;
        let label = self.label();

        thread::spawn(move || {
            thread::sleep(delay);
            let current = inner.lock().unwrap().generation;
            if current != generation || !requested.load(Ordering::SeqCst) {
                trace!(line = %label, "auto-fire cancelled");
                return;
            }
            debug!(line = %label, delay_ms, "mock line auto-fire");
            emit(&inner, origin, EdgeEvent::now(offset));
        });
    }
}

fn emit(inner: &Mutex<LineInner>, origin: Instant, event: EdgeEvent) -> bool {
    let callback = {
        let mut guard = inner.lock().unwrap();
        let Some(callback) = guard.callback.clone() else {
            return false;
        };
        let at = event.fired_at.saturating_duration_since(origin);
        if !guard.debouncer.accept(at) {
            return false;
        }
        callback
    };
    // Run outside the lock so the callback may touch the line
    callback(event);
    true
}

impl EdgeLine for MockLine {
    fn offset(&self) -> u32 {
        self.offset
    }

    fn label(&self) -> String {
        format!("{}:{}", self.chip, self.offset)
    }

    fn request(
        &self,
        edge: Edge,
        debounce: Duration,
        callback: EdgeCallback,
    ) -> Result<(), ContractError> {
        if self.fail_requests.load(Ordering::SeqCst) {
            return Err(ContractError::hardware_unavailable(
                self.label(),
                "mock request failure",
            ));
        }

        let generation = {
            let mut guard = self.inner.lock().unwrap();
            guard.callback = Some(callback);
            guard.debouncer = Debouncer::new(debounce);
            guard.generation += 1;
            guard.generation
        };
        self.requested.store(true, Ordering::SeqCst);
        self.request_count.fetch_add(1, Ordering::Relaxed);

        trace!(line = %self.label(), %edge, "mock line requested");

        if let Some((min, max)) = self.config.auto_fire {
            self.spawn_auto_fire(generation, min, max);
        }
        Ok(())
    }

    fn release(&self) {
        if !self.requested.swap(false, Ordering::SeqCst) {
            return;
        }
        let mut guard = self.inner.lock().unwrap();
        guard.callback = None;
        guard.generation += 1;
        self.release_count.fetch_add(1, Ordering::Relaxed);
    }

    fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}
