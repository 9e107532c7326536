//! Core types for model interactions

use serde::{Deserialize, Serialize};

/// Chat model handle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    /// Model identifier (e.g., "gpt-4o-mini")
    pub id: String,
    /// Base URL for API calls
    pub base_url: String,
}

impl Model {
    /// Create a model handle with an explicit base URL
    pub fn new(id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            base_url: base_url.into(),
        }
    }

    /// Create a model handle pointing at the OpenAI API
    pub fn openai(id: impl Into<String>) -> Self {
        Self::new(id, "https://api.openai.com/v1")
    }
}

/// Embedding model handle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingModel {
    /// Model identifier (e.g., "text-embedding-3-small")
    pub id: String,
    /// Base URL for API calls
    pub base_url: String,
    /// Vector dimensionality the index was built with
    pub dimensions: u32,
}

impl EmbeddingModel {
    /// Create an embedding model handle with an explicit base URL
    pub fn new(id: impl Into<String>, base_url: impl Into<String>, dimensions: u32) -> Self {
        Self {
            id: id.into(),
            base_url: base_url.into(),
            dimensions,
        }
    }

    /// Create an embedding model handle pointing at the OpenAI API
    pub fn openai(id: impl Into<String>, dimensions: u32) -> Self {
        Self::new(id, "https://api.openai.com/v1", dimensions)
    }
}

/// Controller step that produced a synthetic assistant message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Generate,
    Validate,
    Execute,
    Document,
}

/// Metadata carried by assistant messages
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssistantMetadata {
    /// Which controller step recorded this message, if synthetic
    pub step: Option<Step>,
    /// Error strings attached by validation or execution
    #[serde(default)]
    pub error_messages: Vec<String>,
    /// Model that produced the message, if any
    pub model: Option<String>,
    #[serde(default)]
    pub timestamp: i64,
}

/// Message roles
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    /// User message
    User {
        content: String,
        #[serde(default)]
        timestamp: i64,
    },
    /// Assistant message
    Assistant {
        content: String,
        #[serde(flatten)]
        metadata: AssistantMetadata,
    },
}

impl Message {
    /// Create a user message
    pub fn user(text: impl Into<String>) -> Self {
        Self::User {
            content: text.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Create a plain assistant message
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Assistant {
            content: text.into(),
            metadata: AssistantMetadata {
                timestamp: chrono::Utc::now().timestamp_millis(),
                ..Default::default()
            },
        }
    }

    /// Create an assistant message recorded by a controller step,
    /// carrying the error strings that step observed.
    pub fn assistant_with_step(
        step: Step,
        text: impl Into<String>,
        error_messages: Vec<String>,
    ) -> Self {
        Self::Assistant {
            content: text.into(),
            metadata: AssistantMetadata {
                step: Some(step),
                error_messages,
                model: None,
                timestamp: chrono::Utc::now().timestamp_millis(),
            },
        }
    }

    /// Get the role as a string
    pub fn role(&self) -> &'static str {
        match self {
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
        }
    }

    /// Get the message body
    pub fn text(&self) -> &str {
        match self {
            Self::User { content, .. } => content,
            Self::Assistant { content, .. } => content,
        }
    }
}

/// Context for a model request
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// System prompt
    pub system_prompt: Option<String>,
    /// Conversation messages
    pub messages: Vec<Message>,
}

impl Context {
    /// Create a new context with a system prompt
    pub fn with_system(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: Some(system_prompt.into()),
            messages: vec![],
        }
    }

    /// Add a message to the context
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_roles() {
        assert_eq!(Message::user("hi").role(), "user");
        assert_eq!(Message::assistant("hello").role(), "assistant");
    }

    #[test]
    fn test_assistant_with_step_carries_errors() {
        let msg = Message::assistant_with_step(
            Step::Execute,
            "execution failed",
            vec!["boom".to_string()],
        );
        match msg {
            Message::Assistant { metadata, .. } => {
                assert_eq!(metadata.step, Some(Step::Execute));
                assert_eq!(metadata.error_messages, vec!["boom"]);
            }
            _ => panic!("expected assistant message"),
        }
    }

    #[test]
    fn test_message_serde_round_trip() {
        let msg = Message::assistant_with_step(Step::Document, "docs", vec!["e1".to_string()]);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"role\":\"assistant\""));
        assert!(json.contains("\"step\":\"document\""));
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.text(), "docs");
    }
}
