use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One message pushed by the executor. There is no correlation id; meaning is
/// carried by `message` alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub success: bool,
    pub message: String,
    #[serde(default, deserialize_with = "loose_data")]
    pub data: Option<InboundData>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundData {
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub result: String,
}

impl InboundEvent {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_result(mut self, command: impl Into<String>, result: impl Into<String>) -> Self {
        self.data = Some(InboundData {
            command: command.into(),
            result: result.into(),
        });
        self
    }

    /// Command output attached to the message, if any.
    pub fn result(&self) -> Option<&str> {
        self.data
            .as_ref()
            .map(|data| data.result.as_str())
            .filter(|result| !result.is_empty())
    }
}

// The docker executor sometimes ships bare strings or empty objects in `data`;
// none of that should cost us the whole envelope.
fn loose_data<'de, D>(deserializer: D) -> Result<Option<InboundData>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => Some(InboundData {
            command: map
                .get("command")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            result: match map.get("result") {
                Some(Value::String(text)) => text.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            },
        }),
        Some(Value::String(text)) => Some(InboundData {
            command: String::new(),
            result: text,
        }),
        Some(other) => Some(InboundData {
            command: String::new(),
            result: other.to_string(),
        }),
    })
}
