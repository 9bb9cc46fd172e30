//! Line provider abstraction
//!
//! Defines how the lane array obtains its hardware lines, so the real GPIO
//! backend and the mock backend can be swapped without touching the timing code.

use std::sync::Arc;

use contracts::{EdgeLine, PinConfig};

use crate::error::Result;

/// Source of edge lines
///
/// Creating a line must not claim it; claiming happens on `EdgeLine::request`
/// when a sensor is armed.
pub trait LineProvider: Send + Sync {
    /// Backend name for logs (`gpio-cdev`, `mock`)
    fn backend(&self) -> &'static str;

    /// Build the line for a configured pin
    ///
    /// # Arguments
    /// * `pin` - Chip and offset
    /// * `consumer` - Consumer label shown by the kernel while the line is claimed
    fn line(&self, pin: &PinConfig, consumer: &str) -> Result<Arc<dyn EdgeLine>>;
}
