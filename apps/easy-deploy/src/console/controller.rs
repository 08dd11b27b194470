use std::sync::Arc;

use deploy_proto::{Channel, ConsoleRequest, decode_inbound, encode};
use deploy_transport::{ConnectionState, Connector, Endpoint, SessionEvent, SessionLink};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use super::commands::{self, OperationKind, OperationTimeouts};
use super::pending::{Operation, PendingOperations};
use super::ConsoleError;
use crate::transcript::{Entry, Transcript};

#[derive(Debug, Clone)]
pub struct ConsoleSettings {
    pub ws_base: String,
    pub token: String,
    pub timeouts: OperationTimeouts,
}

/// What changed after one call to [`Console::next_update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleUpdate {
    /// A frame arrived. `entry` is `None` when the message was suppressed.
    Received {
        entry: Option<Entry>,
        resolved: Vec<Operation>,
    },
    TimedOut(Vec<Operation>),
    Ended(ConnectionState),
}

enum Wake {
    Event(Option<SessionEvent>),
    Deadline,
}

pub struct Console {
    connector: Arc<dyn Connector>,
    settings: ConsoleSettings,
    state: ConnectionState,
    session: Option<Arc<dyn SessionLink>>,
    events: Option<mpsc::UnboundedReceiver<SessionEvent>>,
    pending: PendingOperations,
    transcript: Transcript,
}

impl Console {
    pub fn new(connector: Arc<dyn Connector>, settings: ConsoleSettings) -> Self {
        Self {
            connector,
            settings,
            state: ConnectionState::Disconnected,
            session: None,
            events: None,
            pending: PendingOperations::new(),
            transcript: Transcript::new(),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        match &self.session {
            Some(session) => session.state(),
            None => self.state,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn pending(&self) -> &PendingOperations {
        &self.pending
    }

    pub fn is_busy(&self, resource_id: i64) -> bool {
        self.pending.is_busy(resource_id)
    }

    /// True while something can still produce an update.
    pub fn is_watching(&self) -> bool {
        self.events.is_some() || !self.pending.is_empty()
    }

    /// Opens the console session. A no-op when already open.
    pub async fn connect(&mut self) -> Result<(), ConsoleError> {
        if self.connection_state().is_open() {
            return Ok(());
        }
        self.release().await;
        self.state = ConnectionState::Connecting;

        let opened = match Endpoint::new::<ConsoleRequest>(
            Channel::K8s,
            &self.settings.ws_base,
            &self.settings.token,
        ) {
            Ok(endpoint) => self.connector.open(&endpoint).await,
            Err(err) => Err(err),
        };
        let session = match opened {
            Ok(session) => session,
            Err(err) => {
                warn!(target = "console", error = %err, "console connection failed");
                self.state = ConnectionState::Disconnected;
                return Err(ConsoleError::Transport(err));
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        session.on_message(Arc::new(move |event| {
            let _ = tx.send(event);
        }));
        self.session = Some(session);
        self.events = Some(rx);
        self.state = ConnectionState::Open;
        info!(target = "console", "console connected");
        Ok(())
    }

    /// Drops the current session, if any, and opens a fresh one.
    pub async fn reconnect(&mut self) -> Result<(), ConsoleError> {
        self.close().await;
        self.connect().await
    }

    pub fn execute_command(&mut self, text: &str) -> Result<(), ConsoleError> {
        let command = commands::admit(text)?;
        let frame = encode(&ConsoleRequest::command(command))?;
        self.live_session()?.send(frame)?;
        debug!(target = "console", command, "command sent");
        Ok(())
    }

    pub fn deploy(&mut self, resource_id: i64) -> Result<(), ConsoleError> {
        self.issue(resource_id, OperationKind::Deploy)
    }

    pub fn stop(&mut self, resource_id: i64) -> Result<(), ConsoleError> {
        self.issue(resource_id, OperationKind::Stop)
    }

    fn issue(&mut self, resource_id: i64, kind: OperationKind) -> Result<(), ConsoleError> {
        let frame = encode(&ConsoleRequest::resource(kind.command(), resource_id))?;
        self.live_session()?.send(frame)?;

        let ttl = self.settings.timeouts.for_kind(kind);
        if self
            .pending
            .issue(resource_id, kind, Instant::now(), ttl)
            .is_some()
        {
            debug!(
                target = "console",
                resource_id,
                operation = kind.command(),
                "replaced pending operation"
            );
        }
        info!(
            target = "console",
            resource_id,
            operation = kind.command(),
            timeout_secs = ttl.as_secs(),
            "operation pending"
        );
        Ok(())
    }

    fn live_session(&self) -> Result<&Arc<dyn SessionLink>, ConsoleError> {
        match &self.session {
            Some(session) if session.state().is_open() => Ok(session),
            _ => Err(ConsoleError::NotConnected),
        }
    }

    /// Waits for the next inbound frame, session end, or operation deadline.
    /// `None` once nothing is left to wait for.
    pub async fn next_update(&mut self) -> Option<ConsoleUpdate> {
        loop {
            let deadline = self.pending.next_deadline();
            let wake = match self.events.as_mut() {
                Some(events) => {
                    tokio::select! {
                        biased;
                        event = events.recv() => Wake::Event(event),
                        _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                            Wake::Deadline
                        }
                    }
                }
                None => {
                    sleep_until(deadline?).await;
                    Wake::Deadline
                }
            };
            match wake {
                Wake::Event(Some(event)) => return Some(self.handle(event)),
                Wake::Event(None) => self.events = None,
                Wake::Deadline => {
                    let expired = self.expire_due(Instant::now());
                    if !expired.is_empty() {
                        return Some(ConsoleUpdate::TimedOut(expired));
                    }
                }
            }
        }
    }

    pub fn handle(&mut self, event: SessionEvent) -> ConsoleUpdate {
        match event {
            SessionEvent::Frame(text) => {
                let resolved = self.pending.resolve_all();
                if !resolved.is_empty() {
                    debug!(target = "console", count = resolved.len(), "pending operations resolved");
                }
                let entry = match decode_inbound(&text) {
                    Ok(event) => {
                        if !event.success {
                            warn!(target = "console", message = %event.message, "executor reported failure");
                        }
                        self.transcript.record(&event).cloned()
                    }
                    Err(err) => {
                        warn!(target = "console", error = %err, "malformed frame from executor");
                        self.transcript
                            .record_malformed(&text, &err.to_string())
                            .cloned()
                    }
                };
                ConsoleUpdate::Received { entry, resolved }
            }
            SessionEvent::Ended(state) => {
                warn!(target = "console", state = state.label(), "console session ended");
                self.state = state;
                self.session = None;
                self.events = None;
                ConsoleUpdate::Ended(state)
            }
        }
    }

    /// Times out every operation whose deadline is at or before `now`.
    pub fn expire_due(&mut self, now: Instant) -> Vec<Operation> {
        let expired = self.pending.expire(now);
        for op in &expired {
            warn!(
                target = "console",
                resource_id = op.resource_id,
                operation = op.kind.command(),
                "operation timed out without a reply"
            );
        }
        expired
    }

    pub fn clear_transcript(&mut self) {
        self.transcript.clear();
    }

    /// Tears the session down and forgets pending operations and transcript.
    pub async fn close(&mut self) {
        let had_session = self.session.is_some();
        self.release().await;
        self.pending.clear();
        self.transcript.clear();
        if had_session {
            self.state = ConnectionState::Closed;
            info!(target = "console", "console closed");
        }
    }

    async fn release(&mut self) {
        self.events = None;
        if let Some(session) = self.session.take() {
            session.close().await;
        }
    }
}
