//! Model call orchestration.
//!
//! The orchestrator is the single path through which every mode reaches the
//! model backend:
//! 1. Single-turn ask: instruction prefix + question, one user message, no memory
//! 2. Raw completion: one prompt, one finished completion
//! 3. Conversation turns issued by a [`DialogSession`](crate::session::DialogSession)
//!
//! Each call is bounded by a timeout so an unresponsive backend cannot wedge a
//! caller, and backend failures are turned into [`DialogError::Upstream`].
//!
//! # Example
//!
//! ```rust,ignore
//! use dialog_gateway::llm::{LlmSettings, OllamaDriver, Orchestrator};
//!
//! let driver = OllamaDriver::new(settings)?;
//! let orchestrator = Orchestrator::new(Arc::new(driver))
//!     .with_call_timeout(Duration::from_secs(60));
//!
//! let answer = orchestrator.ask_once("What can I cook with eggs?").await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::error::{DialogError, require_text};

use super::{Message, MessageRole, ModelBackend};

/// Default bound on a single model call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(120);

/// Wraps a [`ModelBackend`] with validation, timeouts and result checks.
#[derive(Clone)]
pub struct Orchestrator {
    backend: Arc<dyn ModelBackend>,
    call_timeout: Duration,
    instruction_prefix: String,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("call_timeout", &self.call_timeout)
            .field("instruction_prefix", &self.instruction_prefix)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create an orchestrator over the given backend.
    #[must_use]
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self {
            backend,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            instruction_prefix: String::new(),
        }
    }

    /// Set the bound applied to every model call.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set the static text prepended to single-turn questions.
    #[must_use]
    pub fn with_instruction_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.instruction_prefix = prefix.into();
        self
    }

    /// Send a conversation to the model and return its reply as an
    /// assistant message.
    ///
    /// The reply is always tagged [`MessageRole::Assistant`], whatever role
    /// the backend reported.
    pub async fn chat(&self, messages: &[Message]) -> Result<Message, DialogError> {
        let request_id = Uuid::new_v4().to_string();

        tracing::debug!(
            request_id = %request_id,
            message_count = messages.len(),
            "Starting model chat call"
        );

        let reply = match tokio::time::timeout(self.call_timeout, self.backend.chat(messages)).await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                tracing::error!(request_id = %request_id, error = %e, "Model chat call failed");
                return Err(DialogError::Upstream(format!("{e:#}")));
            }
            Err(_elapsed) => {
                tracing::error!(
                    request_id = %request_id,
                    timeout_secs = self.call_timeout.as_secs(),
                    "Model chat call timed out"
                );
                return Err(self.timeout_error());
            }
        };

        if reply.role != MessageRole::Assistant {
            tracing::warn!(
                request_id = %request_id,
                role = ?reply.role,
                "Model replied with unexpected role, recording as assistant"
            );
        }

        tracing::debug!(
            request_id = %request_id,
            content_length = reply.content.len(),
            "Model chat call completed"
        );

        Ok(Message::assistant(reply.content))
    }

    /// Single-turn ask: the instruction prefix concatenated with `question`
    /// is sent as the only message. Nothing is remembered between calls.
    pub async fn ask_once(&self, question: Option<&str>) -> Result<String, DialogError> {
        let question = require_text(question, "Question is required")?;
        let prompt = format!("{}{question}", self.instruction_prefix);

        let reply = self.chat(&[Message::user(prompt)]).await?;
        Ok(reply.content)
    }

    /// Generate a completion for a raw prompt.
    ///
    /// A generation that the backend did not mark as done, or that carries
    /// no text, is an error rather than partial output.
    pub async fn generate_completion(&self, prompt: Option<&str>) -> Result<String, DialogError> {
        let prompt = require_text(prompt, "Prompt is required")?;
        let request_id = Uuid::new_v4().to_string();

        tracing::debug!(
            request_id = %request_id,
            prompt_length = prompt.len(),
            "Starting model generate call"
        );

        let generation =
            match tokio::time::timeout(self.call_timeout, self.backend.generate(prompt)).await {
                Ok(Ok(generation)) => generation,
                Ok(Err(e)) => {
                    tracing::error!(request_id = %request_id, error = %e, "Model generate call failed");
                    return Err(DialogError::Upstream(format!("{e:#}")));
                }
                Err(_elapsed) => {
                    tracing::error!(request_id = %request_id, "Model generate call timed out");
                    return Err(self.timeout_error());
                }
            };

        match generation.text {
            Some(text) if generation.done && !text.is_empty() => Ok(text),
            _ => {
                tracing::error!(
                    request_id = %request_id,
                    done = generation.done,
                    "Incomplete generation from model"
                );
                Err(DialogError::Upstream(
                    "Incomplete or unexpected response structure from model".to_string(),
                ))
            }
        }
    }

    fn timeout_error(&self) -> DialogError {
        DialogError::Upstream(format!("model call timed out after {:?}", self.call_timeout))
    }
}
