use serde::{Deserialize, Serialize};

use crate::ControlFrames;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStep {
    Init,
    CloneRepository,
    GenerateDockerfile,
    BuildImage,
}

/// The Dockerfile record and the image tag a build works on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildTarget {
    pub id: i64,
    pub docker_image_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BuildData {
    Target(BuildTarget),
    Empty {},
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    pub docker_build_step: BuildStep,
    pub data: BuildData,
}

impl BuildRequest {
    pub fn step(step: BuildStep, target: &BuildTarget) -> Self {
        Self {
            docker_build_step: step,
            data: BuildData::Target(target.clone()),
        }
    }
}

impl ControlFrames for BuildRequest {
    fn init() -> Self {
        Self {
            docker_build_step: BuildStep::Init,
            data: BuildData::Empty {},
        }
    }

    // The docker endpoint has no goodbye step; dropping the socket is enough.
    fn close() -> Option<Self> {
        None
    }
}
