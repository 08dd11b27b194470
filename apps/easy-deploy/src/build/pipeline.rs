use std::sync::Arc;

use deploy_proto::{BuildRequest, BuildTarget, Channel, decode_inbound, encode};
use deploy_transport::{ConnectionState, Connector, Endpoint, SessionEvent, SessionLink};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::markers;
use super::{BuildArtifact, BuildError, BuildFailure, Phase};
use crate::gateway::{BuildCredential, CredentialGateway};
use crate::transcript::Transcript;

#[derive(Debug, Clone)]
pub struct BuildSettings {
    pub ws_base: String,
    pub token: String,
}

/// Everything a front end shows about the current build.
#[derive(Debug, Clone, Default)]
pub struct BuildSnapshot {
    pub phase: Phase,
    pub target: Option<BuildTarget>,
    pub credential: Option<BuildCredential>,
    pub failure: Option<BuildFailure>,
    /// What the user should do before retrying from `AwaitingAccount`.
    pub notice: Option<String>,
    pub transcript: Transcript,
}

/// Drives one build session at a time.
///
/// Session events are queued by the transport listener and applied here one by
/// one through [`BuildPipeline::next_event`], so every handler sees the live
/// phase.
pub struct BuildPipeline {
    connector: Arc<dyn Connector>,
    gateway: Arc<dyn CredentialGateway>,
    settings: BuildSettings,
    state: BuildSnapshot,
    session: Option<Arc<dyn SessionLink>>,
    events: Option<mpsc::UnboundedReceiver<SessionEvent>>,
}

impl BuildPipeline {
    pub fn new(
        connector: Arc<dyn Connector>,
        gateway: Arc<dyn CredentialGateway>,
        settings: BuildSettings,
    ) -> Self {
        Self {
            connector,
            gateway,
            settings,
            state: BuildSnapshot::default(),
            session: None,
            events: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn transcript(&self) -> &Transcript {
        &self.state.transcript
    }

    pub fn failure(&self) -> Option<&BuildFailure> {
        self.state.failure.as_ref()
    }

    pub fn notice(&self) -> Option<&str> {
        self.state.notice.as_deref()
    }

    pub fn credential(&self) -> Option<&BuildCredential> {
        self.state.credential.as_ref()
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn snapshot(&self) -> BuildSnapshot {
        self.state.clone()
    }

    /// Checks the registry account, opens the docker session and asks for the
    /// repository clone. Later steps are driven by [`BuildPipeline::next_event`].
    pub async fn start(&mut self, artifact: BuildArtifact) -> Result<(), BuildError> {
        if self.state.phase.is_running() {
            return Err(BuildError::AlreadyInProgress(self.state.phase));
        }
        let target = artifact.into_target()?;

        self.release().await;
        self.state = BuildSnapshot {
            target: Some(target),
            ..BuildSnapshot::default()
        };
        self.enter(Phase::AwaitingAccount);

        let credential = match self.gateway.default_build_credential().await {
            Ok(credential) => credential,
            Err(err) => {
                warn!(target = "build.pipeline", error = %err, "account check blocked the build");
                self.state.notice = Some(err.to_string());
                return Err(err.into());
            }
        };
        info!(
            target = "build.pipeline",
            account = %credential.username,
            "pushing with registry account"
        );
        self.state.credential = Some(credential);

        self.enter(Phase::Connecting);
        let session = match self.open_session().await {
            Ok(session) => session,
            Err(err) => {
                warn!(target = "build.pipeline", error = %err, "could not open build session");
                self.state.notice = Some(format!("{err}; check that the executor is reachable and retry"));
                self.enter(Phase::AwaitingAccount);
                return Err(err);
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        session.on_message(Arc::new(move |event| {
            let _ = tx.send(event);
        }));
        self.session = Some(session);
        self.events = Some(rx);

        self.advance(Phase::Cloning).await;
        Ok(())
    }

    async fn open_session(&self) -> Result<Arc<dyn SessionLink>, BuildError> {
        let endpoint = Endpoint::new::<BuildRequest>(
            Channel::Docker,
            &self.settings.ws_base,
            &self.settings.token,
        )?;
        Ok(self.connector.open(&endpoint).await?)
    }

    /// Waits for the next session event and applies it. `None` when no session
    /// is attached or its event stream is gone.
    pub async fn next_event(&mut self) -> Option<Phase> {
        let event = self.events.as_mut()?.recv().await?;
        Some(self.handle(event).await)
    }

    /// Applies events until the build completes or fails.
    pub async fn run(&mut self) -> Phase {
        while !self.state.phase.is_terminal() {
            if self.next_event().await.is_none() {
                break;
            }
        }
        self.state.phase
    }

    pub async fn handle(&mut self, event: SessionEvent) -> Phase {
        match event {
            SessionEvent::Frame(text) => self.on_frame(&text).await,
            SessionEvent::Ended(state) => self.on_ended(state).await,
        }
        self.state.phase
    }

    /// Closes the session without waiting for the executor and forgets the
    /// build.
    pub async fn cancel(&mut self) {
        if self.state.phase != Phase::Idle {
            info!(target = "build.pipeline", phase = %self.state.phase, "build cancelled");
        }
        self.release().await;
        self.state = BuildSnapshot::default();
    }

    async fn on_frame(&mut self, text: &str) {
        let event = match decode_inbound(text) {
            Ok(event) => event,
            Err(err) => {
                warn!(target = "build.pipeline", error = %err, "malformed frame from executor");
                self.state.transcript.record_malformed(text, &err.to_string());
                return;
            }
        };
        self.state.transcript.record(&event);

        if !self.state.phase.is_running() {
            debug!(target = "build.pipeline", phase = %self.state.phase, "frame outside a running build");
            return;
        }
        if !event.success {
            self.fail(BuildFailure::Remote(event.message)).await;
            return;
        }
        let Some(marker) = markers::classify(&event.message) else {
            return;
        };
        if self.state.phase.awaiting() == Some(marker) {
            debug!(target = "build.pipeline", marker = marker.text(), "build step finished");
            self.advance(marker.leads_to()).await;
            if self.state.phase == Phase::Completed {
                info!(target = "build.pipeline", "image built and pushed");
            }
        } else {
            debug!(
                target = "build.pipeline",
                phase = %self.state.phase,
                marker = marker.text(),
                "marker does not finish the current phase"
            );
        }
    }

    async fn on_ended(&mut self, state: ConnectionState) {
        if self.state.phase.is_running() {
            self.fail(BuildFailure::Connection(state)).await;
        } else {
            debug!(target = "build.pipeline", state = state.label(), "build session ended");
            self.session = None;
        }
    }

    async fn advance(&mut self, next: Phase) {
        self.enter(next);
        let Some(step) = next.request_step() else {
            return;
        };
        let sent = match (&self.session, &self.state.target) {
            (Some(session), Some(target)) => encode(&BuildRequest::step(step, target))
                .map_err(|err| err.to_string())
                .and_then(|frame| session.send(frame).map_err(|err| err.to_string())),
            _ => Err("no open build session".to_owned()),
        };
        if let Err(reason) = sent {
            self.fail(BuildFailure::Send(reason)).await;
        }
    }

    /// Absorbing: the first failure wins and closes the session once.
    async fn fail(&mut self, failure: BuildFailure) {
        if self.state.phase.is_terminal() {
            return;
        }
        warn!(target = "build.pipeline", phase = %self.state.phase, reason = %failure, "build failed");
        self.state.failure = Some(failure);
        self.enter(Phase::Failed);
        self.release().await;
    }

    fn enter(&mut self, phase: Phase) {
        debug!(target = "build.pipeline", from = %self.state.phase, to = %phase, "phase change");
        self.state.phase = phase;
    }

    async fn release(&mut self) {
        self.events = None;
        if let Some(session) = self.session.take() {
            session.close().await;
        }
    }
}
