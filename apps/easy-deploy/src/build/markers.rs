//! Completion markers the docker executor prints when a build step finishes.
//!
//! The executor has no structured step acknowledgment, so these exact
//! substrings are the contract. Keep them byte-for-byte.

use super::Phase;

pub const CLONE_SUCCESS: &str = "git clone success";
pub const DOCKERFILE_SUCCESS: &str = "Dockerfile build success";
pub const BUILD_PUSH_SUCCESS: &str = "docker build & push success";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    Cloned,
    DockerfileGenerated,
    ImagePushed,
}

/// Priority order. A message containing several markers matches the first.
const MARKERS: [(Marker, &str); 3] = [
    (Marker::Cloned, CLONE_SUCCESS),
    (Marker::DockerfileGenerated, DOCKERFILE_SUCCESS),
    (Marker::ImagePushed, BUILD_PUSH_SUCCESS),
];

impl Marker {
    pub fn text(self) -> &'static str {
        match self {
            Marker::Cloned => CLONE_SUCCESS,
            Marker::DockerfileGenerated => DOCKERFILE_SUCCESS,
            Marker::ImagePushed => BUILD_PUSH_SUCCESS,
        }
    }

    /// The phase this marker finishes.
    pub fn finishes(self) -> Phase {
        match self {
            Marker::Cloned => Phase::Cloning,
            Marker::DockerfileGenerated => Phase::Generating,
            Marker::ImagePushed => Phase::Building,
        }
    }

    /// The phase entered once this marker is seen in [`Marker::finishes`].
    pub fn leads_to(self) -> Phase {
        match self {
            Marker::Cloned => Phase::Generating,
            Marker::DockerfileGenerated => Phase::Building,
            Marker::ImagePushed => Phase::Completed,
        }
    }
}

pub fn classify(message: &str) -> Option<Marker> {
    MARKERS
        .iter()
        .find(|(_, text)| message.contains(text))
        .map(|(marker, _)| *marker)
}
