//! Model backend abstraction and drivers.
//!
//! The language model is consumed as an opaque collaborator through the
//! [`ModelBackend`] trait: given a role-tagged message sequence it returns a
//! role-tagged reply, and given a raw prompt it returns a [`Generation`].
//! The [`Orchestrator`] layers validation, call timeouts and result checks on
//! top of a backend.
//!
//! # Drivers
//!
//! - [`OllamaDriver`]: Ollama HTTP API (`/api/chat`, `/api/generate`)
//!
//! # Example
//!
//! ```rust,ignore
//! use dialog_gateway::llm::{LlmSettings, OllamaDriver, Orchestrator};
//!
//! let settings = LlmSettings {
//!     base_url: "http://127.0.0.1:11434".to_string(),
//!     model: "llama2".to_string(),
//! };
//! let driver = OllamaDriver::new(settings)?;
//! ```

pub mod ollama;
pub mod orchestrator;

pub use ollama::OllamaDriver;
pub use orchestrator::Orchestrator;

/// Model connection settings.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    /// Base URL of the model runtime (e.g., `http://127.0.0.1:11434`).
    pub base_url: String,
    /// Model identifier (e.g., `llama2`).
    pub model: String,
}

/// A single entry of a conversation log.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    /// Role of the message author.
    pub role: MessageRole,
    /// Text content.
    pub content: String,
}

impl Message {
    /// Create a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Create a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System prompt.
    System,
    /// User message.
    User,
    /// Assistant response.
    Assistant,
}

/// Result of a raw (non-conversational) generation call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Generation {
    /// Generated text, if the backend returned any.
    pub text: Option<String>,
    /// Whether the backend reported the generation as finished.
    pub done: bool,
}

/// The language-model collaborator.
///
/// Implementations only transport the call; they never touch conversation
/// state. Whether a [`Generation`] counts as complete is decided by the
/// [`Orchestrator`].
#[async_trait::async_trait]
pub trait ModelBackend: Send + Sync {
    /// Send a conversation and return the model's reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the reply is malformed.
    async fn chat(&self, messages: &[Message]) -> anyhow::Result<Message>;

    /// Generate a completion for a single prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body cannot be decoded.
    async fn generate(&self, prompt: &str) -> anyhow::Result<Generation>;
}
