//! Transport implementations
//!
//! The session talks to the race server only through `Transport`:
//! `HttpTransport` for the real server and `MockTransport` for tests and
//! offline runs.

mod http;
mod mock;

pub use self::http::HttpTransport;
pub use self::mock::{MockServer, MockTransport};

use crate::error::DerbyNetError;

/// Request/response channel to the race server
///
/// Implementations keep the login cookie between calls.
#[trait_variant::make(Transport: Send)]
pub trait LocalTransport {
    /// Endpoint description (used for logging)
    fn endpoint(&self) -> &str;

    /// POST a form to the action endpoint and return the reply body
    ///
    /// # Errors
    /// `Transport` when the request fails or the status is not 2xx
    async fn post_form(&mut self, fields: &[(String, String)]) -> Result<String, DerbyNetError>;

    /// POST a plain-text body to the log endpoint and return the reply body
    async fn post_log(&mut self, body: String) -> Result<String, DerbyNetError>;
}
