//! Ollama HTTP API driver.
//!
//! Implements [`ModelBackend`] against a local Ollama runtime using the
//! non-streaming forms of `/api/chat` and `/api/generate`.

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{Generation, LlmSettings, Message, ModelBackend};

/// Request body for `/api/chat`.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

/// Response body of `/api/chat`.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<Message>,
}

/// Request body for `/api/generate`.
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

/// Response body of `/api/generate`.
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    done: bool,
}

/// Driver for the Ollama HTTP API.
#[derive(Clone)]
pub struct OllamaDriver {
    http: reqwest::Client,
    settings: LlmSettings,
    chat_url: Url,
    generate_url: Url,
}

impl std::fmt::Debug for OllamaDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaDriver")
            .field("settings", &self.settings)
            .finish()
    }
}

impl OllamaDriver {
    /// Create a new driver with the given settings.
    ///
    /// # Errors
    ///
    /// Returns an error if `settings.base_url` is not a valid URL.
    pub fn new(settings: LlmSettings) -> anyhow::Result<Self> {
        let base = Url::parse(&format!("{}/", settings.base_url.trim_end_matches('/')))
            .with_context(|| format!("invalid model base URL: {}", settings.base_url))?;
        let chat_url = base.join("api/chat")?;
        let generate_url = base.join("api/generate")?;

        Ok(Self {
            http: reqwest::Client::new(),
            settings,
            chat_url,
            generate_url,
        })
    }

    async fn post<B, R>(&self, url: &Url, body: &B) -> anyhow::Result<R>
    where
        B: Serialize + Sync,
        R: for<'de> Deserialize<'de>,
    {
        let resp = self
            .http
            .post(url.clone())
            .json(body)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("ollama returned {status}: {text}");
        }

        resp.json::<R>()
            .await
            .with_context(|| format!("unexpected response body from {url}"))
    }
}

#[async_trait::async_trait]
impl ModelBackend for OllamaDriver {
    async fn chat(&self, messages: &[Message]) -> anyhow::Result<Message> {
        let body = ChatRequest {
            model: &self.settings.model,
            messages,
            stream: false,
        };

        let resp: ChatResponse = self.post(&self.chat_url, &body).await?;
        resp.message
            .context("ollama chat response is missing the assistant message")
    }

    async fn generate(&self, prompt: &str) -> anyhow::Result<Generation> {
        let body = GenerateRequest {
            model: &self.settings.model,
            prompt,
            stream: false,
        };

        let resp: GenerateResponse = self.post(&self.generate_url, &body).await?;
        Ok(Generation {
            text: resp.response,
            done: resp.done,
        })
    }
}
