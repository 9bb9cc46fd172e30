//! HttpTransport - form POSTs over reqwest with a cookie store

use contracts::ServerConfig;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use tracing::{debug, instrument};

use crate::error::{DerbyNetError, Result};
use crate::transport::Transport;

/// HTTP transport to a DerbyNet server
pub struct HttpTransport {
    client: Client,
    action_url: String,
    log_url: String,
}

impl HttpTransport {
    /// Build the client; the cookie store carries the login session
    #[instrument(name = "http_transport_new", skip(server), fields(url = %server.action_url()))]
    pub fn new(server: &ServerConfig) -> Result<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(server.request_timeout())
            .build()
            .map_err(|e| DerbyNetError::transport(format!("cannot build HTTP client: {e}")))?;

        debug!(
            action_url = %server.action_url(),
            log_url = %server.log_url(),
            "HttpTransport ready"
        );

        Ok(Self {
            client,
            action_url: server.action_url(),
            log_url: server.log_url(),
        })
    }

    async fn read_body(url: &str, response: Response) -> Result<String> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DerbyNetError::transport(format!("{url}: {e}")))?;
        if !status.is_success() {
            return Err(DerbyNetError::transport(format!("{url}: HTTP {status}")));
        }
        Ok(body)
    }
}

impl Transport for HttpTransport {
    fn endpoint(&self) -> &str {
        &self.action_url
    }

    async fn post_form(&mut self, fields: &[(String, String)]) -> Result<String> {
        let response = self
            .client
            .post(&self.action_url)
            .form(fields)
            .send()
            .await
            .map_err(|e| DerbyNetError::transport(format!("{}: {e}", self.action_url)))?;
        Self::read_body(&self.action_url, response).await
    }

    async fn post_log(&mut self, body: String) -> Result<String> {
        let response = self
            .client
            .post(&self.log_url)
            .header(CONTENT_TYPE, "text/plain")
            .body(body)
            .send()
            .await
            .map_err(|e| DerbyNetError::transport(format!("{}: {e}", self.log_url)))?;
        Self::read_body(&self.log_url, response).await
    }
}
