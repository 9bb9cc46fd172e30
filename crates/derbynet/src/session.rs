//! ProtocolSession - the timer's conversation with the race server
//!
//! One session owns the transport (and with it the login cookie) plus the
//! session state, both behind a single async mutex so that heartbeat and race
//! messages never interleave on the wire. Every reply document is decoded and
//! dispatched before the lock is released.
//!
//! Heat announcements are additionally published on a `watch` channel: a
//! single slot holding the latest descriptor, so a late waiter sees the most
//! recent heat rather than a backlog.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use contracts::{HeatDescriptor, IdentityConfig, LaneTimes, LogSink, ServerConfig};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, instrument, trace, warn};

use crate::error::{DerbyNetError, Result};
use crate::messages::{login_fields, TimerMessage};
use crate::metrics::{record_message_sent, record_server_failure, record_transport_error};
use crate::response::{parse_log_reply, ActionResponse, ResponseElement};
use crate::transport::Transport;

/// Where the session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Disconnected,
    Authenticated,
    Idle,
    HeatPending,
    HeatActive,
    Terminated,
}

/// Session state, only changed while the session lock is held
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub authenticated: bool,
    pub log_diversion_active: bool,
    /// Current heat; an aborted heat keeps its round with heat number 0
    pub heat: Option<HeatDescriptor>,
    pub phase: SessionPhase,
}

struct SessionInner<T> {
    transport: T,
    state: SessionState,
}

#[derive(Debug, Default)]
struct Dispatched {
    flags_requested: bool,
    failures: usize,
}

/// Authenticated conversation with a DerbyNet server
pub struct ProtocolSession<T> {
    username: String,
    password: String,
    identity: IdentityConfig,
    inner: Mutex<SessionInner<T>>,
    heat_tx: watch::Sender<HeatDescriptor>,
    heat_rx: Mutex<watch::Receiver<HeatDescriptor>>,
    terminating: AtomicBool,
    log_sink: Option<Arc<dyn LogSink>>,
}

impl<T: Transport + Send> ProtocolSession<T> {
    pub fn new(transport: T, server: &ServerConfig, identity: IdentityConfig) -> Self {
        let (heat_tx, heat_rx) = watch::channel(HeatDescriptor::default());
        Self {
            username: server.username.clone(),
            password: server.password.clone(),
            identity,
            inner: Mutex::new(SessionInner {
                transport,
                state: SessionState::default(),
            }),
            heat_tx,
            heat_rx: Mutex::new(heat_rx),
            terminating: AtomicBool::new(false),
            log_sink: None,
        }
    }

    /// Inject the capability toggled by `remote-log`
    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = Some(sink);
        self
    }

    pub fn identity(&self) -> &IdentityConfig {
        &self.identity
    }

    /// Log in as the timer role.
    ///
    /// # Errors
    /// `Authentication` (fatal) if the request fails, the reply is malformed,
    /// or the server rejects the login.
    #[instrument(name = "session_authenticate", skip(self), fields(user = %self.username))]
    pub async fn authenticate(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let endpoint = inner.transport.endpoint().to_string();

        let body = inner
            .transport
            .post_form(&login_fields(&self.username, &self.password))
            .await
            .map_err(|e| {
                record_transport_error("LOGIN");
                DerbyNetError::authentication(format!("{endpoint}: {e}"))
            })?;
        let response = ActionResponse::parse(&body)
            .map_err(|e| DerbyNetError::authentication(format!("login reply: {e}")))?;

        if let Some((code, message)) = response.failures().next() {
            let err = DerbyNetError::authentication(format!("{code}: {message}"));
            self.dispatch(&mut inner.state, &response);
            return Err(err);
        }

        inner.state.authenticated = true;
        inner.state.phase = SessionPhase::Authenticated;
        info!(%endpoint, "logged in");

        if self.dispatch(&mut inner.state, &response).flags_requested {
            let flags = self.flags_message();
            self.exchange(&mut inner, flags).await?;
        }
        Ok(())
    }

    /// HELLO
    pub async fn send_hello(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.ensure_ready(&inner.state)?;
        self.exchange(&mut inner, TimerMessage::Hello).await?;
        if inner.state.phase == SessionPhase::Authenticated {
            inner.state.phase = SessionPhase::Idle;
        }
        Ok(())
    }

    /// IDENTIFIED with the configured identity and a build id
    pub async fn send_identification(&self, build_ident: &str) -> Result<()> {
        self.send(TimerMessage::Identified {
            timer: self.identity.timer.clone(),
            human: self.identity.human.clone(),
            ident: build_ident.to_string(),
        })
        .await
    }

    /// HEARTBEAT
    pub async fn send_heartbeat(&self) -> Result<()> {
        self.send(TimerMessage::Heartbeat).await
    }

    /// FLAGS; normally sent in answer to a `query` element
    pub async fn send_flags(&self) -> Result<()> {
        self.send(self.flags_message()).await
    }

    /// Wait for the next heat announcement.
    ///
    /// Returns true only if the announced heat number is nonzero; an abort,
    /// a termination or the timeout all return false.
    pub async fn wait_for_heat(&self, timeout: Duration) -> bool {
        self.next_heat(timeout).await.is_some()
    }

    /// Like `wait_for_heat`, returning the announced descriptor
    #[instrument(name = "session_next_heat", skip(self))]
    pub async fn next_heat(&self, timeout: Duration) -> Option<HeatDescriptor> {
        let mut rx = self.heat_rx.lock().await;
        match tokio::time::timeout(timeout, rx.changed()).await {
            Ok(Ok(())) => {
                let heat = rx.borrow_and_update().clone();
                debug!(heat = heat.heat_number, round_id = heat.round_id, "heat signal");
                heat.is_active().then_some(heat)
            }
            // Sender lives as long as the session
            Ok(Err(_)) => None,
            Err(_) => {
                trace!("no heat announced");
                None
            }
        }
    }

    /// Observe every heat change from now on, aborts included
    pub fn subscribe_heat(&self) -> watch::Receiver<HeatDescriptor> {
        self.heat_tx.subscribe()
    }

    /// STARTED; the gate has opened
    pub async fn report_started(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.ensure_ready(&inner.state)?;
        self.exchange(&mut inner, TimerMessage::Started).await?;
        if inner.state.phase == SessionPhase::HeatPending {
            inner.state.phase = SessionPhase::HeatActive;
        }
        Ok(())
    }

    /// FINISHED for the current heat.
    ///
    /// # Errors
    /// `NoActiveHeat` without sending anything if there is no current heat or
    /// it was aborted.
    #[instrument(name = "session_report_finished", skip(self))]
    pub async fn report_finished(&self, times: LaneTimes) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.ensure_ready(&inner.state)?;

        let heat = inner
            .state
            .heat
            .clone()
            .filter(HeatDescriptor::is_active)
            .ok_or(DerbyNetError::NoActiveHeat)?;

        self.exchange(
            &mut inner,
            TimerMessage::Finished {
                round_id: heat.round_id,
                heat: heat.heat_number,
                times,
            },
        )
        .await?;

        info!(
            round_id = heat.round_id,
            heat = heat.heat_number,
            ?times,
            "results reported"
        );

        // The reply may already announce the next heat
        let same_heat = inner.state.heat.as_ref() == Some(&heat);
        if same_heat && inner.state.phase != SessionPhase::Terminated {
            inner.state.phase = SessionPhase::Idle;
        }
        Ok(())
    }

    /// Clear the pending heat, send MALFUNCTION and stop the session.
    ///
    /// Only the first call does anything.
    #[instrument(name = "session_terminate", skip(self))]
    pub async fn terminate(&self, reason: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if self.terminating.swap(true, Ordering::SeqCst) {
            debug!("already terminating");
            return Ok(());
        }

        let cleared = inner.state.heat.as_ref().map(HeatDescriptor::aborted);
        inner.state.heat = cleared.clone();
        inner.state.phase = SessionPhase::Terminated;
        self.heat_tx.send_replace(cleared.unwrap_or_default());

        if !inner.state.authenticated {
            return Ok(());
        }

        warn!(reason, "sending termination notice");
        let message = TimerMessage::Malfunction {
            detectable: false,
            error: reason.to_string(),
        };
        match inner.transport.post_form(&message.fields()).await {
            Ok(_) => {
                record_message_sent(message.name());
                Ok(())
            }
            Err(e) => {
                record_transport_error(message.name());
                Err(e)
            }
        }
    }

    /// Whether `terminate` has been called
    pub fn is_terminating(&self) -> bool {
        self.terminating.load(Ordering::SeqCst)
    }

    pub async fn phase(&self) -> SessionPhase {
        self.inner.lock().await.state.phase
    }

    pub async fn current_heat(&self) -> Option<HeatDescriptor> {
        self.inner.lock().await.state.heat.clone()
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state.clone()
    }

    pub async fn is_log_diverted(&self) -> bool {
        self.inner.lock().await.state.log_diversion_active
    }

    /// POST one log record to the log endpoint.
    ///
    /// Returns the byte count the server acknowledged, or the attempted count
    /// if the reply cannot be read. Emits no log records itself.
    pub async fn post_log(&self, body: String) -> Result<usize> {
        let attempted = body.len();
        let mut inner = self.inner.lock().await;
        let reply = inner.transport.post_log(body).await?;
        Ok(parse_log_reply(&reply).unwrap_or(attempted))
    }

    fn flags_message(&self) -> TimerMessage {
        TimerMessage::Flags {
            ports: self.identity.ports.clone(),
            device_id: self.identity.device_id.clone(),
            device_name: self.identity.human.clone(),
        }
    }

    fn ensure_ready(&self, state: &SessionState) -> Result<()> {
        if self.is_terminating() {
            return Err(DerbyNetError::Terminating);
        }
        if !state.authenticated {
            return Err(DerbyNetError::NotAuthenticated);
        }
        Ok(())
    }

    async fn send(&self, message: TimerMessage) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.ensure_ready(&inner.state)?;
        self.exchange(&mut inner, message).await
    }

    /// Send `message` and dispatch the reply; a `query` in the reply is
    /// answered with FLAGS before returning.
    async fn exchange(&self, inner: &mut SessionInner<T>, message: TimerMessage) -> Result<()> {
        let mut next = Some(message);
        while let Some(message) = next.take() {
            let name = message.name();
            let body = match inner.transport.post_form(&message.fields()).await {
                Ok(body) => body,
                Err(e) => {
                    record_transport_error(name);
                    return Err(e);
                }
            };
            record_message_sent(name);

            let response = match ActionResponse::parse(&body) {
                Ok(response) => response,
                Err(e) => {
                    warn!(message = name, error = %e, "ignoring malformed reply");
                    return Ok(());
                }
            };
            if inner.state.log_diversion_active {
                debug!(message = name, reply = %body, "server reply");
            }

            let dispatched = self.dispatch(&mut inner.state, &response);
            if dispatched.flags_requested {
                if matches!(message, TimerMessage::Flags { .. }) {
                    debug!("query in FLAGS reply ignored");
                } else {
                    next = Some(self.flags_message());
                }
            }
        }
        Ok(())
    }

    fn dispatch(&self, state: &mut SessionState, response: &ActionResponse) -> Dispatched {
        let mut dispatched = Dispatched::default();
        for element in &response.elements {
            match element {
                ResponseElement::HeatReady(heat) => self.on_heat_ready(state, heat),
                ResponseElement::RemoteLog { send } => self.set_diversion(state, *send),
                ResponseElement::Query => dispatched.flags_requested = true,
                ResponseElement::Failure { code, message } => {
                    dispatched.failures += 1;
                    record_server_failure(code);
                    warn!(
                        index = dispatched.failures,
                        code = %code,
                        message = %message,
                        "server reported failure"
                    );
                }
                ResponseElement::Success => trace!("last command successful"),
                ResponseElement::Abort => self.on_abort(state),
                ResponseElement::RemoteStart
                | ResponseElement::AssignFlag
                | ResponseElement::AssignPort
                | ResponseElement::AssignDevice => {
                    debug!(element = ?element, "message ignored");
                }
                ResponseElement::Other(name) => trace!(element = %name, "unknown element ignored"),
            }
        }
        dispatched
    }

    fn on_heat_ready(&self, state: &mut SessionState, heat: &HeatDescriptor) {
        let repeated = state.heat.as_ref() == Some(heat)
            && matches!(
                state.phase,
                SessionPhase::HeatPending | SessionPhase::HeatActive
            );
        if repeated {
            trace!(heat = heat.heat_number, "heat already pending");
            return;
        }

        state.heat = Some(heat.clone());
        if state.phase != SessionPhase::Terminated {
            state.phase = if heat.is_active() {
                SessionPhase::HeatPending
            } else {
                SessionPhase::Idle
            };
        }
        info!(
            class = %heat.class_name,
            round = heat.round_ordinal,
            round_id = heat.round_id,
            heat = heat.heat_number,
            lane_mask = heat.lane_mask.0,
            "heat is ready"
        );
        // Descriptor is recorded before the waiter is released
        self.heat_tx.send_replace(heat.clone());
    }

    fn on_abort(&self, state: &mut SessionState) {
        let aborted = state.heat.as_ref().map(HeatDescriptor::aborted);
        state.heat = aborted.clone();
        if state.phase != SessionPhase::Terminated {
            state.phase = SessionPhase::Idle;
        }
        info!(
            round_id = aborted.as_ref().map(|h| h.round_id),
            "heat aborted by server"
        );
        self.heat_tx.send_replace(aborted.unwrap_or_default());
    }

    fn set_diversion(&self, state: &mut SessionState, enabled: bool) {
        if state.log_diversion_active == enabled {
            return;
        }
        state.log_diversion_active = enabled;
        if let Some(sink) = &self.log_sink {
            sink.divert(enabled);
        }
        if enabled {
            info!("sending logs to server");
        } else {
            info!("not sending logs to server");
        }
    }
}

impl<T> std::fmt::Debug for ProtocolSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolSession")
            .field("username", &self.username)
            .field("terminating", &self.terminating.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
