use std::fmt;

use deploy_proto::BuildStep;

use super::markers::Marker;

/// Where a build session stands. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    #[default]
    Idle,
    AwaitingAccount,
    Connecting,
    Cloning,
    Generating,
    Building,
    Completed,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed)
    }

    /// Connecting through Building: a session exists or is being opened and a
    /// new build must be refused.
    pub fn is_running(self) -> bool {
        matches!(
            self,
            Phase::Connecting | Phase::Cloning | Phase::Generating | Phase::Building
        )
    }

    /// The marker that moves this phase forward.
    pub fn awaiting(self) -> Option<Marker> {
        match self {
            Phase::Cloning => Some(Marker::Cloned),
            Phase::Generating => Some(Marker::DockerfileGenerated),
            Phase::Building => Some(Marker::ImagePushed),
            _ => None,
        }
    }

    /// The request written when this phase is entered.
    pub fn request_step(self) -> Option<BuildStep> {
        match self {
            Phase::Cloning => Some(BuildStep::CloneRepository),
            Phase::Generating => Some(BuildStep::GenerateDockerfile),
            Phase::Building => Some(BuildStep::BuildImage),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::AwaitingAccount => "awaiting account",
            Phase::Connecting => "connecting",
            Phase::Cloning => "cloning repository",
            Phase::Generating => "generating dockerfile",
            Phase::Building => "building image",
            Phase::Completed => "completed",
            Phase::Failed => "failed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
