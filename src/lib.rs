//! Dialog Gateway
//!
//! An HTTP service that relays user questions to a locally hosted language
//! model and keeps multi-turn conversation history per session.
//!
//! # Architecture
//!
//! - **Server**: Axum-based HTTP API (single-turn ask, raw completion, multi-turn dialog)
//! - **LLM**: Model backend trait, Ollama driver and call orchestration
//! - **Sessions**: Dialog sessions with serialized turns and a session registry
//!
//! # Modules
//!
//! - [`llm`]: Model backend trait, driver and orchestrator
//! - [`session`]: Dialog sessions and the session store
//! - [`error`]: Error kinds and their HTTP mapping
//! - [`config`]: Layered configuration

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::unused_async)]

pub mod config;
pub mod error;
pub mod llm;
pub mod resilience;
pub mod server;
pub mod session;
pub mod telemetry;

use crate::config::AppConfig;

use governor::DefaultDirectRateLimiter;
use llm::{ModelBackend, Orchestrator};
use session::SessionStore;
use std::sync::Arc;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Model call orchestration for every mode.
    pub orchestrator: Arc<Orchestrator>,
    /// Session registry for multi-turn dialogs.
    pub sessions: SessionStore,
    /// Global Rate Limiter
    pub rate_limiter: Arc<DefaultDirectRateLimiter>,
    /// Global Configuration
    pub config: Arc<AppConfig>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("orchestrator", &self.orchestrator)
            .field("sessions", &self.sessions)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Wire the shared state around a model backend.
    #[must_use]
    pub fn new(config: Arc<AppConfig>, backend: Arc<dyn ModelBackend>) -> Self {
        let orchestrator = Orchestrator::new(backend)
            .with_call_timeout(config.model_call_timeout())
            .with_instruction_prefix(config.dialog.instruction_prefix.clone());
        let sessions = SessionStore::new(config.dialog_options(), config.system_prompt());
        let rate_limiter = resilience::build_rate_limiter(&config.resilience);

        Self {
            orchestrator: Arc::new(orchestrator),
            sessions,
            rate_limiter: Arc::new(rate_limiter),
            config,
        }
    }
}
