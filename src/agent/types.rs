//! Type definitions for the agent module

use serde::{Deserialize, Serialize};

/// Role of a message in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System message providing context and instructions
    System,
    /// User message
    User,
    /// Assistant (AI) response
    Assistant,
    /// Tool/function result
    Function,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Function => write!(f, "function"),
        }
    }
}

/// A message in a conversation. Immutable after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender
    pub role: Role,
    /// Content of the message
    pub content: String,
    /// Optional name (for function messages)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Optional tool calls made by the assistant (native calling mode)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<AssistantToolCall>>,
}

impl Message {
    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Message {
            role: Role::System,
            content: content.into(),
            name: None,
            tool_calls: None,
        }
    }

    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Message {
            role: Role::User,
            content: content.into(),
            name: None,
            tool_calls: None,
        }
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Message {
            role: Role::Assistant,
            content: content.into(),
            name: None,
            tool_calls: None,
        }
    }
}

/// Tool call made by the assistant in native calling mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantToolCall {
    /// Unique ID for this tool call
    #[serde(default)]
    pub id: String,
    /// Type of tool call (usually "function")
    #[serde(rename = "type", default)]
    pub call_type: String,
    /// Function details
    pub function: FunctionCall,
}

/// Function call details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Name of the function to call
    pub name: String,
    /// Arguments as JSON string
    pub arguments: String,
}

/// Request to the chat-completion API
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    /// Model to use
    pub model: String,
    /// Messages in the conversation
    pub messages: Vec<Message>,
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Top-p sampling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Presence penalty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Stop sequences
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    /// Available tools/functions (native calling mode)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    /// Thinking-mode selector for models that support it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingMode>,
}

/// Thinking-mode request extension
#[derive(Debug, Clone, Serialize)]
pub struct ThinkingMode {
    /// Provider-specific mode name, e.g. "enabled"
    #[serde(rename = "type")]
    pub mode: String,
}

/// Tool definition for native function calling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Type of tool (usually "function")
    #[serde(rename = "type")]
    pub tool_type: String,
    /// Function definition
    pub function: FunctionDefinition,
}

/// Function definition for tools
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    /// Name of the function
    pub name: String,
    /// Description of what the function does
    pub description: String,
    /// JSON Schema for function parameters
    pub parameters: serde_json::Value,
}

/// Response from the chat-completion API
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    /// Unique ID for this completion
    #[serde(default)]
    pub id: String,
    /// Model used
    #[serde(default)]
    pub model: String,
    /// Completion choices
    pub choices: Vec<Choice>,
    /// Usage statistics
    pub usage: Option<Usage>,
}

/// A completion choice
#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    /// The generated message
    pub message: ResponseMessage,
    /// Reason for stopping
    pub finish_reason: Option<String>,
}

/// Assistant message in a completion response
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    /// Text content (may be absent when only tool calls are returned)
    #[serde(default)]
    pub content: Option<String>,
    /// Reasoning/thinking content from models that expose it
    #[serde(default)]
    pub reasoning_content: Option<String>,
    /// Native tool calls
    #[serde(default)]
    pub tool_calls: Option<Vec<AssistantToolCall>>,
}

/// Token usage statistics
#[derive(Debug, Clone, Deserialize)]
pub struct Usage {
    /// Tokens in the prompt
    pub prompt_tokens: u32,
    /// Tokens in the completion
    pub completion_tokens: u32,
    /// Total tokens used
    pub total_tokens: u32,
}

/// Generation options for chat completions
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    /// Sampling temperature (0.0 - 2.0)
    pub temperature: f32,
    /// Top-p sampling (0.0 - 1.0)
    pub top_p: f32,
    /// Presence penalty
    pub presence_penalty: Option<f32>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        GenerationOptions {
            temperature: 0.6,
            top_p: 0.95,
            presence_penalty: Some(1.1),
            max_tokens: None,
        }
    }
}

impl GenerationOptions {
    /// Low-temperature options for synthesis and extraction calls
    pub fn precise() -> Self {
        GenerationOptions {
            temperature: 0.2,
            presence_penalty: None,
            ..Default::default()
        }
    }

    /// Options for the planner/writer loops
    pub fn focused() -> Self {
        GenerationOptions {
            temperature: 0.1,
            presence_penalty: None,
            ..Default::default()
        }
    }

    /// Shift the temperature, used to diversify parallel samples
    pub fn with_temperature_offset(mut self, offset: f32) -> Self {
        self.temperature += offset;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors_set_roles() {
        assert_eq!(Message::system("s").role, Role::System);
        assert_eq!(Message::user("u").role, Role::User);
        assert_eq!(Message::assistant("a").role, Role::Assistant);
    }

    #[test]
    fn generation_options_offsets() {
        let opts = GenerationOptions::default().with_temperature_offset(0.4);
        assert!((opts.temperature - 1.0).abs() < f32::EPSILON);
        assert!((GenerationOptions::precise().temperature - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn response_tolerates_missing_fields() {
        let raw = r#"{"choices":[{"message":{"content":"hi"},"finish_reason":"stop"}]}"#;
        let resp: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.choices[0].message.content.as_deref(), Some("hi"));
        assert!(resp.choices[0].message.reasoning_content.is_none());
    }
}
