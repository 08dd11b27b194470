use std::time::Duration;

use super::ConsoleError;

const ALLOWED_PREFIX: &str = "kubectl";

/// Returns the command unchanged if it may be sent. The prefix is matched
/// literally; callers trim input before it gets here.
pub fn admit(text: &str) -> Result<&str, ConsoleError> {
    if text.starts_with(ALLOWED_PREFIX) {
        Ok(text)
    } else {
        Err(ConsoleError::CommandRejected(text.trim().to_owned()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationKind {
    Deploy,
    Stop,
}

impl OperationKind {
    /// The `command` field written for this operation.
    pub fn command(self) -> &'static str {
        match self {
            OperationKind::Deploy => "deploy",
            OperationKind::Stop => "stop",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationTimeouts {
    pub deploy: Duration,
    pub stop: Duration,
}

impl OperationTimeouts {
    pub fn for_kind(&self, kind: OperationKind) -> Duration {
        match kind {
            OperationKind::Deploy => self.deploy,
            OperationKind::Stop => self.stop,
        }
    }
}

impl Default for OperationTimeouts {
    fn default() -> Self {
        Self {
            deploy: Duration::from_secs(15),
            stop: Duration::from_secs(30),
        }
    }
}
