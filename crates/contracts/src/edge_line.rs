//! EdgeLine trait - hardware line abstraction
//!
//! Decouples edge sensors from concrete GPIO implementations so that real
//! gpio-cdev lines and mock lines are handled the same way.

use std::sync::Arc;
use std::time::Duration;

use crate::{ContractError, Edge, EdgeEvent};

/// Edge notification callback
///
/// Invoked from the notification source (reader task, mock trigger) for each
/// accepted transition. Uses `Arc` so the callback can be shared with a
/// background reader.
pub type EdgeCallback = Arc<dyn Fn(EdgeEvent) + Send + Sync>;

/// A single input line that can report edge transitions.
///
/// # Example
///
/// ```ignore
/// let line: Box<dyn EdgeLine> = get_line();
/// line.request(Edge::Rising, Duration::from_millis(1), Arc::new(|event| {
///     println!("line {} fired", event.sensor_id);
/// }))?;
/// // ... wait ...
/// line.release();
/// ```
pub trait EdgeLine: Send + Sync {
    /// Line offset on its chip
    fn offset(&self) -> u32;

    /// Human readable line label used in logs (e.g. `gpiochip2:24`)
    fn label(&self) -> String;

    /// Claim the line and start delivering edge notifications.
    ///
    /// Transitions closer together than `debounce` are filtered out before
    /// the callback runs. Requesting a line that is already requested replaces
    /// the previous callback.
    ///
    /// # Errors
    /// `ContractError::HardwareUnavailable` when the line cannot be claimed.
    fn request(
        &self,
        edge: Edge,
        debounce: Duration,
        callback: EdgeCallback,
    ) -> Result<(), ContractError>;

    /// Stop notifications. Must be idempotent. A line may keep its hardware
    /// claim until dropped.
    fn release(&self);

    /// Whether the line is currently requested
    fn is_requested(&self) -> bool;
}
