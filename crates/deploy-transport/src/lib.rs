//! One WebSocket connection per session: open with a handshake, write one text
//! frame at a time, hand every inbound frame to a single listener, close once.
//!
//! The transport knows nothing about builds or consoles. Controllers talk to it
//! through [`Connector`] and [`SessionLink`], which lets tests swap in the
//! scripted [`mock`] link.

use std::sync::Arc;

use async_trait::async_trait;
use deploy_proto::{Channel, ControlFrames, EndpointError, Handshake};
use thiserror::Error;
use url::Url;

mod dispatch;
pub mod mock;
mod websocket;

pub use websocket::{WsConnector, WsSession, DEFAULT_CONNECT_TIMEOUT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closed,
    Failed,
}

impl ConnectionState {
    pub fn is_open(self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    pub fn label(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
            ConnectionState::Failed => "failed",
        }
    }
}

/// What a session hands to its listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Frame(String),
    /// `Open -> Closed` or `Open -> Failed`; delivered once per session.
    Ended(ConnectionState),
}

pub type Listener = Arc<dyn Fn(SessionEvent) + Send + Sync>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(#[from] EndpointError),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("session is not connected")]
    NotConnected,
    #[error("handshake encoding failed: {0}")]
    Handshake(String),
}

/// Where to connect and which frames to write around the caller's traffic.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub channel: Channel,
    pub url: Url,
    pub handshake: Handshake,
}

impl Endpoint {
    pub fn new<F: ControlFrames>(
        channel: Channel,
        base: &str,
        token: &str,
    ) -> Result<Self, TransportError> {
        let url = channel.endpoint(base, token)?;
        let handshake = Handshake::for_protocol::<F>()
            .map_err(|err| TransportError::Handshake(err.to_string()))?;
        Ok(Self {
            channel,
            url,
            handshake,
        })
    }

    /// The url without its token, for logs.
    pub fn redacted(&self) -> String {
        let mut url = self.url.clone();
        url.set_query(None);
        url.to_string()
    }
}

/// An open session. Implementations are cheap to share behind an `Arc`.
#[async_trait]
pub trait SessionLink: Send + Sync {
    fn state(&self) -> ConnectionState;

    /// Writes exactly one frame. Never waits for a reply.
    fn send(&self, text: String) -> Result<(), TransportError>;

    /// Installs the single listener, replacing any previous one. Frames that
    /// arrived before the first listener are replayed to it in order.
    fn on_message(&self, listener: Listener);

    /// Best-effort goodbye frame, then release. Closing twice is a no-op.
    async fn close(&self);
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, endpoint: &Endpoint) -> Result<Arc<dyn SessionLink>, TransportError>;
}
