use serde::{Deserialize, Serialize};

use crate::ControlFrames;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsoleStep {
    Init,
    Connected,
    Close,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k8s_resource_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleRequest {
    pub step: ConsoleStep,
    pub command: String,
    #[serde(default)]
    pub data: ConsoleData,
}

impl ConsoleRequest {
    /// A free-form command typed by the user.
    pub fn command(text: impl Into<String>) -> Self {
        Self {
            step: ConsoleStep::Connected,
            command: text.into(),
            data: ConsoleData::default(),
        }
    }

    /// A command addressed at one stored Kubernetes resource.
    pub fn resource(command: impl Into<String>, resource_id: i64) -> Self {
        Self {
            step: ConsoleStep::Connected,
            command: command.into(),
            data: ConsoleData {
                k8s_resource_id: Some(resource_id),
            },
        }
    }

    fn control(step: ConsoleStep) -> Self {
        Self {
            step,
            command: String::new(),
            data: ConsoleData::default(),
        }
    }
}

impl ControlFrames for ConsoleRequest {
    fn init() -> Self {
        Self::control(ConsoleStep::Init)
    }

    fn close() -> Option<Self> {
        Some(Self::control(ConsoleStep::Close))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn free_form_command_has_empty_data() {
        let request = ConsoleRequest::command("kubectl get pods");
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({ "step": "connected", "command": "kubectl get pods", "data": {} })
        );
    }

    #[test]
    fn resource_command_carries_resource_id() {
        let request = ConsoleRequest::resource("deploy", 42);
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({ "step": "connected", "command": "deploy", "data": { "k8s_resource_id": 42 } })
        );
    }
}
