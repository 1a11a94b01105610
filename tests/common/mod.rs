//! Shared fixtures for HTTP-level tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use axum_test::TestServer;
use dialog_gateway::AppState;
use dialog_gateway::config::{
    AppConfig, DialogConfig, LlmConfig, LogFormat, LoggingConfig, ResilienceConfig, ServerConfig,
    SessionsConfig,
};
use dialog_gateway::llm::{Generation, Message, ModelBackend};
use dialog_gateway::server::build_router;
use dialog_gateway::session::BusyPolicy;

/// Backend answering from a script. `None` entries fail the call.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Option<String>>>,
    generations: Mutex<VecDeque<Generation>>,
    contexts: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedBackend {
    pub fn with_replies(replies: &[Option<&str>]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.map(str::to_string)).collect()),
            ..Default::default()
        }
    }

    pub fn with_generation(text: Option<&str>, done: bool) -> Self {
        let backend = Self::default();
        backend.generations.lock().unwrap().push_back(Generation {
            text: text.map(str::to_string),
            done,
        });
        backend
    }

    /// Every message sequence the backend has been called with.
    pub fn contexts(&self) -> Vec<Vec<Message>> {
        self.contexts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ModelBackend for ScriptedBackend {
    async fn chat(&self, messages: &[Message]) -> anyhow::Result<Message> {
        self.contexts.lock().unwrap().push(messages.to_vec());
        let next = self.replies.lock().unwrap().pop_front().flatten();
        next.map(Message::assistant)
            .ok_or_else(|| anyhow::anyhow!("connect error: connection refused"))
    }

    async fn generate(&self, _prompt: &str) -> anyhow::Result<Generation> {
        self.generations
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("connect error: connection refused"))
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        server: ServerConfig {
            port: 0,
            host: "127.0.0.1".to_string(),
        },
        llm: LlmConfig {
            base_url: "http://127.0.0.1:11434".to_string(),
            model: "llama2".to_string(),
            request_timeout_secs: 5,
        },
        dialog: DialogConfig {
            system_prompt: "role play: your name is Trincoll Bot.".to_string(),
            instruction_prefix: "Chef: ".to_string(),
            include_replies: true,
            full_transcript: true,
            busy_policy: BusyPolicy::Reject,
        },
        sessions: SessionsConfig {
            idle_timeout_secs: 1800,
            cleanup_interval_secs: 60,
        },
        resilience: ResilienceConfig {
            rate_limit_enabled: false,
            requests_per_second: 5,
            burst_size: 10,
            timeout_disabled: false,
            request_timeout_secs: 30,
        },
        logging: LoggingConfig {
            format: LogFormat::Compact,
        },
    }
}

pub fn server_with(config: AppConfig, backend: Arc<ScriptedBackend>) -> TestServer {
    let state = AppState::new(Arc::new(config), backend);
    TestServer::new(build_router(state)).expect("test server")
}

pub fn server(backend: Arc<ScriptedBackend>) -> TestServer {
    server_with(test_config(), backend)
}
