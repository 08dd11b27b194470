//! Remote image build: account check, connect, then clone, generate and
//! build & push, one outbound step per completion marker.

pub mod markers;
mod phase;
mod pipeline;

use std::fmt;

use deploy_proto::{BuildTarget, CodecError};
use deploy_transport::{ConnectionState, TransportError};
use thiserror::Error;

use crate::gateway::GatewayError;

pub use markers::Marker;
pub use phase::Phase;
pub use pipeline::{BuildPipeline, BuildSettings, BuildSnapshot};

/// What the user asked to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArtifact {
    /// Id of the stored Dockerfile record.
    pub dockerfile_id: i64,
    pub image_name: String,
}

impl BuildArtifact {
    pub fn new(dockerfile_id: i64, image_name: impl Into<String>) -> Self {
        Self {
            dockerfile_id,
            image_name: image_name.into(),
        }
    }

    fn into_target(self) -> Result<BuildTarget, BuildError> {
        let image_name = self.image_name.trim();
        if image_name.is_empty() {
            return Err(BuildError::InvalidArtifact(
                "image name cannot be empty".into(),
            ));
        }
        Ok(BuildTarget {
            id: self.dockerfile_id,
            docker_image_name: image_name.to_owned(),
        })
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("a build is already in progress ({0})")]
    AlreadyInProgress(Phase),
    #[error("invalid build artifact: {0}")]
    InvalidArtifact(String),
    #[error(transparent)]
    Credential(#[from] GatewayError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Why a build ended in [`Phase::Failed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildFailure {
    /// The executor answered `success: false`.
    Remote(String),
    /// The session dropped before the build finished.
    Connection(ConnectionState),
    /// A step request could not be written.
    Send(String),
}

impl fmt::Display for BuildFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildFailure::Remote(message) => write!(f, "executor reported failure: {message}"),
            BuildFailure::Connection(state) => write!(f, "session {} mid-build", state.label()),
            BuildFailure::Send(reason) => write!(f, "could not send build step: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_requires_image_name() {
        let err = BuildArtifact::new(7, "  ").into_target().unwrap_err();
        assert!(matches!(err, BuildError::InvalidArtifact(_)));

        let target = BuildArtifact::new(7, " app:latest ")
            .into_target()
            .expect("target");
        assert_eq!(target.id, 7);
        assert_eq!(target.docker_image_name, "app:latest");
    }
}
