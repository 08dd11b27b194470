//! Interactive cluster console over the `/ws/k8s` session.

mod commands;
mod controller;
mod pending;

use deploy_proto::CodecError;
use deploy_transport::TransportError;
use thiserror::Error;

pub use commands::{OperationKind, OperationTimeouts, admit};
pub use controller::{Console, ConsoleSettings, ConsoleUpdate};
pub use pending::{Operation, OperationStatus, PendingOperations};

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("only kubectl commands may be sent, got {0:?}")]
    CommandRejected(String),
    #[error("console is not connected; establish the connection first")]
    NotConnected,
    #[error(transparent)]
    Transport(TransportError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl From<TransportError> for ConsoleError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::NotConnected => ConsoleError::NotConnected,
            other => ConsoleError::Transport(other),
        }
    }
}
