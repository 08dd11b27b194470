//! Wire envelopes exchanged with the remote executor.
//!
//! Two sessions share one inbound shape ([`InboundEvent`]) but use different
//! outbound requests:
//! - `/ws/docker` carries [`BuildRequest`] frames that step the image build
//! - `/ws/k8s` carries [`ConsoleRequest`] frames for the cluster console
//!
//! Nothing here holds state. Transports write the encoded text verbatim and
//! controllers decide what an inbound message means.

use serde::Serialize;
use thiserror::Error;

mod build;
mod channel;
mod console;
mod inbound;

pub use build::{BuildData, BuildRequest, BuildStep, BuildTarget};
pub use channel::{Channel, EndpointError};
pub use console::{ConsoleData, ConsoleRequest, ConsoleStep};
pub use inbound::{InboundData, InboundEvent};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
    #[error("failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Frames a protocol writes on its own when a session opens or closes.
pub trait ControlFrames: Serialize + Sized {
    fn init() -> Self;

    /// `None` when the protocol has no goodbye frame.
    fn close() -> Option<Self>;
}

/// Pre-encoded handshake text for a protocol, ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub init: String,
    pub close: Option<String>,
}

impl Handshake {
    pub fn for_protocol<F: ControlFrames>() -> Result<Self, CodecError> {
        let init = encode(&F::init())?;
        let close = F::close().map(|frame| encode(&frame)).transpose()?;
        Ok(Self { init, close })
    }
}

pub fn encode<T: Serialize>(value: &T) -> Result<String, CodecError> {
    Ok(serde_json::to_string(value)?)
}

/// Decodes one inbound text frame. Anything that is not a JSON object with
/// `success` and `message` is reported as [`CodecError::MalformedEnvelope`].
pub fn decode_inbound(text: &str) -> Result<InboundEvent, CodecError> {
    serde_json::from_str::<InboundEvent>(text)
        .map_err(|err| CodecError::MalformedEnvelope(err.to_string()))
}
