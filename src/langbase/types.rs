use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Message in a Langbase conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl Message {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Request to run a Langbase pipe
#[derive(Debug, Clone, Serialize)]
pub struct PipeRequest {
    /// Pipe name (required by Langbase API)
    pub name: String,
    pub messages: Vec<Message>,
    /// Always false: the search consumes whole completions
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<HashMap<String, String>>,
}

impl PipeRequest {
    /// Create a new pipe request with name and messages
    pub fn new(name: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            name: name.into(),
            messages,
            stream: false,
            variables: None,
        }
    }

    /// Add a single variable
    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }
}

/// Response from a Langbase pipe
#[derive(Debug, Clone, Deserialize)]
pub struct PipeResponse {
    #[serde(default)]
    pub success: bool,
    pub completion: String,
    #[serde(default)]
    pub raw: Option<RawResponse>,
}

/// Raw model response details
#[derive(Debug, Clone, Deserialize)]
pub struct RawResponse {
    pub model: Option<String>,
    pub usage: Option<Usage>,
}

/// Token usage information
#[derive(Debug, Clone, Deserialize)]
pub struct Usage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

impl PipeResponse {
    /// Total tokens reported by the provider, if any
    pub fn total_tokens(&self) -> Option<u32> {
        self.raw.as_ref()?.usage.as_ref()?.total_tokens
    }
}

/// Request to create (or upsert) a Langbase pipe
#[derive(Debug, Clone, Serialize)]
pub struct CreatePipeRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upsert: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,
}

/// Response from creating a pipe
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePipeResponse {
    pub name: String,
    #[serde(default)]
    pub url: String,
}

impl CreatePipeRequest {
    /// Create a new pipe request with just a name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            model: None,
            upsert: None,
            json: None,
            temperature: None,
            max_tokens: None,
            messages: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set model (e.g., "openai:gpt-4o-mini")
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_upsert(mut self, upsert: bool) -> Self {
        self.upsert = Some(upsert);
        self
    }

    /// Enable JSON output mode
    pub fn with_json_output(mut self, json: bool) -> Self {
        self.json = Some(json);
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the pipe's stored system prompt
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.messages = Some(vec![Message::system(prompt)]);
        self
    }
}
