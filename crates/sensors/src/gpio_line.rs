//! GPIO character device line
//!
//! Wraps a gpio-cdev line as a type implementing `EdgeLine`.
//! Only compiled when `real-gpio` feature is enabled.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use contracts::{ContractError, Edge, EdgeCallback, EdgeEvent, EdgeLine, PinConfig};
use futures::StreamExt;
use gpio_cdev::{AsyncLineEventHandle, Chip, EventRequestFlags, EventType, LineRequestFlags};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, trace, warn};

use crate::debounce::Debouncer;
use crate::error::Result;
use crate::kernel_clock::kernel_instant;
use crate::provider::LineProvider;

/// Who gets notified, and for which edge
struct Subscription {
    edge: Edge,
    debouncer: Debouncer,
    callback: EdgeCallback,
}

type SubscriptionSlot = Arc<Mutex<Option<Subscription>>>;

/// gpio-cdev backed line
///
/// The kernel line is claimed for both edges on the first `request` and
/// stays claimed until the `GpioLine` is dropped. `request` and `release`
/// only swap the subscription slot, so re-arming never races the kernel
/// for the line. Event times are the kernel's interrupt timestamps.
pub struct GpioLine {
    pin: PinConfig,
    consumer: String,
    subscription: SubscriptionSlot,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl GpioLine {
    pub fn new(pin: PinConfig, consumer: impl Into<String>) -> Self {
        Self {
            pin,
            consumer: consumer.into(),
            subscription: Arc::new(Mutex::new(None)),
            reader: Mutex::new(None),
        }
    }

    fn unavailable(&self, err: impl std::fmt::Display) -> ContractError {
        ContractError::hardware_unavailable(self.pin.label(), err.to_string())
    }

    fn reader_alive(&self) -> bool {
        self.reader
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Claim the kernel line and start the reader task
    fn claim(&self) -> std::result::Result<JoinHandle<()>, ContractError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| self.unavailable(e))?;
        let _guard = runtime.enter();

        let mut chip = Chip::new(self.pin.chip_path()).map_err(|e| self.unavailable(e))?;
        let line = chip
            .get_line(self.pin.line)
            .map_err(|e| self.unavailable(e))?;
        let handle = line
            .events(
                LineRequestFlags::INPUT,
                EventRequestFlags::BOTH_EDGES,
                &self.consumer,
            )
            .map_err(|e| self.unavailable(e))?;
        let mut events = AsyncLineEventHandle::new(handle).map_err(|e| self.unavailable(e))?;

        let offset = self.pin.line;
        let label = self.pin.label();
        let subscription = Arc::clone(&self.subscription);
        let task = runtime.spawn(async move {
            while let Some(next) = events.next().await {
                let event = match next {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(line = %label, error = %e, "line event stream failed");
                        break;
                    }
                };
                let edge = match event.event_type() {
                    EventType::RisingEdge => Edge::Rising,
                    EventType::FallingEdge => Edge::Falling,
                };

                let callback = {
                    let mut slot = subscription.lock().unwrap();
                    let Some(sub) = slot.as_mut().filter(|sub| sub.edge == edge) else {
                        continue;
                    };
                    if !sub.debouncer.accept(Duration::from_nanos(event.timestamp())) {
                        trace!(line = %label, "bounce filtered");
                        continue;
                    }
                    Arc::clone(&sub.callback)
                };
                callback(EdgeEvent {
                    sensor_id: offset,
                    fired_at: kernel_instant(event.timestamp()),
                });
            }
            debug!(line = %label, "line reader stopped");
        });

        debug!(line = %self.pin.label(), "line claimed");
        Ok(task)
    }
}

impl EdgeLine for GpioLine {
    fn offset(&self) -> u32 {
        self.pin.line
    }

    fn label(&self) -> String {
        self.pin.label()
    }

    #[instrument(name = "gpio_line_request", skip(self, callback), fields(line = %self.pin.label()))]
    fn request(
        &self,
        edge: Edge,
        debounce: Duration,
        callback: EdgeCallback,
    ) -> std::result::Result<(), ContractError> {
        *self.subscription.lock().unwrap() = Some(Subscription {
            edge,
            debouncer: Debouncer::new(debounce),
            callback,
        });

        if !self.reader_alive() {
            match self.claim() {
                Ok(task) => *self.reader.lock().unwrap() = Some(task),
                Err(e) => {
                    self.subscription.lock().unwrap().take();
                    return Err(e);
                }
            }
        }
        debug!(line = %self.pin.label(), %edge, "line armed");
        Ok(())
    }

    fn release(&self) {
        if self.subscription.lock().unwrap().take().is_some() {
            debug!(line = %self.pin.label(), "line disarmed");
        }
    }

    fn is_requested(&self) -> bool {
        self.subscription.lock().unwrap().is_some() && self.reader_alive()
    }
}

impl Drop for GpioLine {
    fn drop(&mut self) {
        self.subscription.lock().unwrap().take();
        if let Some(task) = self.reader.lock().unwrap().take() {
            task.abort();
            debug!(line = %self.pin.label(), "line released");
        }
    }
}

/// Provider for real GPIO lines
#[derive(Debug, Default, Clone, Copy)]
pub struct GpioLineProvider;

impl LineProvider for GpioLineProvider {
    fn backend(&self) -> &'static str {
        "gpio-cdev"
    }

    fn line(&self, pin: &PinConfig, consumer: &str) -> Result<Arc<dyn EdgeLine>> {
        Ok(Arc::new(GpioLine::new(pin.clone(), consumer)))
    }
}
