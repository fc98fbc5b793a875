//! Wire types for the OpenAI-compatible surface.

use std::fmt::Write as _;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::config::{MODEL_CREATED, MODEL_OWNER};
use crate::model::GenerationResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    /// Roles this service does not render; kept so forward-compatible
    /// clients never fail deserialization.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<usize>,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Serialize)]
pub struct AssistantMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct Choice {
    pub index: usize,
    pub message: AssistantMessage,
    pub finish_reason: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: &'static str,
    pub created: u64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

impl ChatCompletionResponse {
    pub fn assemble(model: &str, result: &GenerationResult) -> Self {
        ChatCompletionResponse {
            id: response_id(),
            object: "chat.completion",
            created: unix_now(),
            model: model.to_string(),
            choices: vec![Choice {
                index: 0,
                message: AssistantMessage {
                    role: "assistant",
                    content: result.text.trim().to_string(),
                },
                finish_reason: "stop",
            }],
            usage: Usage {
                prompt_tokens: result.prompt_tokens,
                completion_tokens: result.completion_tokens,
                total_tokens: result.prompt_tokens + result.completion_tokens,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub object: &'static str,
    pub created: u64,
    pub owned_by: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ModelList {
    pub object: &'static str,
    pub data: Vec<ModelInfo>,
}

impl ModelList {
    pub fn single(name: &str) -> Self {
        ModelList {
            object: "list",
            data: vec![ModelInfo {
                id: name.to_string(),
                object: "model",
                created: MODEL_CREATED,
                owned_by: MODEL_OWNER,
            }],
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model_loaded: bool,
}

fn response_id() -> String {
    let bytes: [u8; 16] = rand::random();
    let mut id = String::with_capacity(9 + 32);
    id.push_str("chatcmpl-");
    for byte in bytes {
        let _ = write!(id, "{byte:02x}");
    }
    id
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result() -> GenerationResult {
        GenerationResult {
            text: "  hello there  ".to_string(),
            prompt_tokens: 7,
            completion_tokens: 5,
        }
    }

    #[test]
    fn response_ids_are_unique_and_prefixed() {
        let a = ChatCompletionResponse::assemble("m", &sample_result());
        let b = ChatCompletionResponse::assemble("m", &sample_result());
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("chatcmpl-"));
        assert_eq!(a.id.len(), "chatcmpl-".len() + 32);
    }

    #[test]
    fn usage_totals_add_up_and_text_is_trimmed() {
        let response = ChatCompletionResponse::assemble("chatmod-lora", &sample_result());
        assert_eq!(response.usage.prompt_tokens, 7);
        assert_eq!(response.usage.completion_tokens, 5);
        assert_eq!(response.usage.total_tokens, 12);
        assert_eq!(response.choices[0].message.content, "hello there");
        assert_eq!(response.choices[0].finish_reason, "stop");
        assert_eq!(response.object, "chat.completion");
    }

    #[test]
    fn request_defaults_apply() {
        let request: ChatCompletionRequest =
            serde_json::from_value(serde_json::json!({"model": "m", "messages": []})).unwrap();
        assert!(!request.stream);
        assert!(request.temperature.is_none());
        assert!(request.max_tokens.is_none());
        assert!(request.messages.is_empty());
    }

    #[test]
    fn unknown_roles_deserialize_to_other() {
        let message: Message =
            serde_json::from_value(serde_json::json!({"role": "tool", "content": "x"})).unwrap();
        assert_eq!(message.role, Role::Other);
    }

    #[test]
    fn model_list_uses_fixed_metadata() {
        let list = ModelList::single("chatmod-lora");
        assert_eq!(list.object, "list");
        assert_eq!(list.data.len(), 1);
        assert_eq!(list.data[0].id, "chatmod-lora");
        assert_eq!(list.data[0].created, MODEL_CREATED);
        assert_eq!(list.data[0].owned_by, MODEL_OWNER);
    }
}
