//! MockTransport - scripted server for tests and offline runs

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::trace;

use crate::error::{DerbyNetError, Result};
use crate::messages::FormFields;
use crate::transport::Transport;

const DEFAULT_REPLY: &str = "<action-response><success/></action-response>";

type Reply = std::result::Result<String, String>;

#[derive(Default)]
struct MockState {
    /// Replies keyed by message name (`HEARTBEAT`, `role.login`, ...)
    by_message: HashMap<String, VecDeque<Reply>>,
    /// Replies for any message, used after the keyed ones
    queue: VecDeque<Reply>,
    default_reply: Option<String>,
    requests: Vec<FormFields>,
    logs: Vec<String>,
    log_reply: Option<String>,
    fail_logs: bool,
    delay: Duration,
    in_flight: usize,
    max_in_flight: usize,
}

/// Transport half handed to the session
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

/// Control half kept by the test to script replies and inspect traffic
#[derive(Clone)]
pub struct MockServer {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> (MockTransport, MockServer) {
        let state = Arc::new(Mutex::new(MockState::default()));
        (
            MockTransport {
                state: Arc::clone(&state),
            },
            MockServer { state },
        )
    }

    fn begin(&self) -> Duration {
        let mut state = self.state.lock().unwrap();
        state.in_flight += 1;
        state.max_in_flight = state.max_in_flight.max(state.in_flight);
        state.delay
    }

    fn end(&self) {
        self.state.lock().unwrap().in_flight -= 1;
    }
}

/// Message name of a recorded request
pub fn message_name(fields: &[(String, String)]) -> Option<&str> {
    let lookup = |key: &str| {
        fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    };
    lookup("message").or_else(|| lookup("action"))
}

impl Transport for MockTransport {
    fn endpoint(&self) -> &str {
        "mock://derbynet"
    }

    async fn post_form(&mut self, fields: &[(String, String)]) -> Result<String> {
        let delay = self.begin();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let reply = {
            let mut state = self.state.lock().unwrap();
            state.requests.push(fields.to_vec());
            let name = message_name(fields).unwrap_or_default().to_string();
            let keyed = state.by_message.get_mut(&name).and_then(VecDeque::pop_front);
            keyed
                .or_else(|| state.queue.pop_front())
                .unwrap_or_else(|| {
                    Ok(state
                        .default_reply
                        .clone()
                        .unwrap_or_else(|| DEFAULT_REPLY.to_string()))
                })
        };
        self.end();

        trace!(reply = ?reply, "mock transport reply");
        reply.map_err(DerbyNetError::transport)
    }

    async fn post_log(&mut self, body: String) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if state.fail_logs {
            return Err(DerbyNetError::transport("mock log endpoint down"));
        }
        let reply = state
            .log_reply
            .clone()
            .unwrap_or_else(|| format!("<success>{} bytes</success>", body.len()));
        state.logs.push(body);
        Ok(reply)
    }
}

impl MockServer {
    /// Reply to the next request of any kind
    pub fn push_reply(&self, body: impl Into<String>) {
        self.state.lock().unwrap().queue.push_back(Ok(body.into()));
    }

    /// Fail the next request of any kind with a transport error
    pub fn push_error(&self, message: impl Into<String>) {
        self.state.lock().unwrap().queue.push_back(Err(message.into()));
    }

    /// Reply to the next request carrying `message` (or `action` for login)
    pub fn reply_to(&self, message: &str, body: impl Into<String>) {
        self.state
            .lock()
            .unwrap()
            .by_message
            .entry(message.to_string())
            .or_default()
            .push_back(Ok(body.into()));
    }

    /// Fail the next request carrying `message`
    pub fn fail_next(&self, message: &str, error: impl Into<String>) {
        self.state
            .lock()
            .unwrap()
            .by_message
            .entry(message.to_string())
            .or_default()
            .push_back(Err(error.into()));
    }

    /// Reply used once the scripted replies run out
    pub fn set_default_reply(&self, body: impl Into<String>) {
        self.state.lock().unwrap().default_reply = Some(body.into());
    }

    /// Fixed reply for log posts; `None` echoes the byte count
    pub fn set_log_reply(&self, body: Option<String>) {
        self.state.lock().unwrap().log_reply = body;
    }

    pub fn fail_logs(&self, fail: bool) {
        self.state.lock().unwrap().fail_logs = fail;
    }

    /// Hold every form request for `delay` before replying
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = delay;
    }

    /// Every form request so far
    pub fn requests(&self) -> Vec<FormFields> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Message names of every form request so far
    pub fn messages(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter_map(|fields| message_name(fields).map(str::to_string))
            .collect()
    }

    /// Most recent request carrying `message`
    pub fn last_request(&self, message: &str) -> Option<FormFields> {
        self.requests()
            .into_iter()
            .rev()
            .find(|fields| message_name(fields) == Some(message))
    }

    /// Bodies received by the log endpoint
    pub fn logs(&self) -> Vec<String> {
        self.state.lock().unwrap().logs.clone()
    }

    /// Highest number of form requests that were in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.state.lock().unwrap().max_in_flight
    }
}
