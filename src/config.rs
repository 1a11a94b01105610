use crate::llm::LlmSettings;
use crate::session::{BusyPolicy, DialogOptions};
use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// Default instruction prefix for single-turn questions.
pub const DEFAULT_INSTRUCTION_PREFIX: &str = "Roleplay, you are a kitchen assistant AI, and you will recommend dishes that users can make based on the ingredients they have and provide detailed recipes.";

/// Default system prompt seeding multi-turn sessions.
pub const DEFAULT_SYSTEM_PROMPT: &str = "role play: your name is Trincoll Bot.";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Base URL of the model runtime
    #[arg(long, env = "OLLAMA_HOST")]
    pub llm_base_url: Option<String>,

    /// Model name
    #[arg(long, env = "LLM_MODEL")]
    pub model: Option<String>,

    /// Enable rate limiting
    #[arg(long, env = "RATE_LIMIT_ENABLED")]
    pub rate_limit_enabled: Option<bool>,

    /// Disable timeout middleware
    #[arg(long, env = "TIMEOUT_DISABLED")]
    pub timeout_disabled: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub dialog: DialogConfig,
    pub sessions: SessionsConfig,
    pub resilience: ResilienceConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DialogConfig {
    /// Seed for multi-turn sessions. Empty disables seeding.
    pub system_prompt: String,
    /// Prepended to single-turn questions.
    pub instruction_prefix: String,
    /// Feed assistant replies back to the model.
    pub include_replies: bool,
    /// Keep a full-transcript log per session.
    pub full_transcript: bool,
    pub busy_policy: BusyPolicy,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionsConfig {
    pub idle_timeout_secs: u64,
    pub cleanup_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResilienceConfig {
    pub rate_limit_enabled: bool,
    pub requests_per_second: u32,
    pub burst_size: u32,
    pub timeout_disabled: bool,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder();

        // 1. Defaults
        builder = builder
            .set_default("server.port", 2001)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("llm.base_url", "http://127.0.0.1:11434")?
            .set_default("llm.model", "llama2")?
            .set_default("llm.request_timeout_secs", 120)?
            .set_default("dialog.system_prompt", DEFAULT_SYSTEM_PROMPT)?
            .set_default("dialog.instruction_prefix", DEFAULT_INSTRUCTION_PREFIX)?
            .set_default("dialog.include_replies", true)?
            .set_default("dialog.full_transcript", true)?
            .set_default("dialog.busy_policy", "reject")?
            .set_default("sessions.idle_timeout_secs", 30 * 60)?
            .set_default("sessions.cleanup_interval_secs", 60)?
            .set_default("resilience.rate_limit_enabled", true)?
            .set_default("resilience.requests_per_second", 5)?
            .set_default("resilience.burst_size", 10)?
            .set_default("resilience.timeout_disabled", false)?
            .set_default("resilience.request_timeout_secs", 150)?
            .set_default("logging.format", "compact")?;

        // 2. Config file: explicit path must exist, ./config.yaml is optional
        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path)),
            None => builder.add_source(File::with_name("config").required(false)),
        };

        // 3. Environment variables (prefixed with DIALOG_), e.g. DIALOG_SERVER__PORT=8000
        builder = builder.add_source(
            Environment::with_prefix("DIALOG")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // 4. CLI flags and their env vars win over everything else
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }
        if let Some(url) = cli.llm_base_url {
            builder = builder.set_override("llm.base_url", url)?;
        }
        if let Some(model) = cli.model {
            builder = builder.set_override("llm.model", model)?;
        }
        if let Some(rl) = cli.rate_limit_enabled {
            builder = builder.set_override("resilience.rate_limit_enabled", rl)?;
        }
        if let Some(td) = cli.timeout_disabled {
            builder = builder.set_override("resilience.timeout_disabled", td)?;
        }

        let cfg: Self = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values that would only fail later at request time.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if url::Url::parse(&self.llm.base_url).is_err() {
            return Err(config::ConfigError::Message(format!(
                "llm.base_url is not a valid URL: {}",
                self.llm.base_url
            )));
        }
        if self.llm.model.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "llm.model cannot be empty".to_string(),
            ));
        }
        if self.llm.request_timeout_secs == 0 || self.resilience.request_timeout_secs == 0 {
            return Err(config::ConfigError::Message(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        if self.resilience.requests_per_second == 0 {
            return Err(config::ConfigError::Message(
                "resilience.requests_per_second must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn llm_settings(&self) -> LlmSettings {
        LlmSettings {
            base_url: self.llm.base_url.clone(),
            model: self.llm.model.clone(),
        }
    }

    #[must_use]
    pub fn dialog_options(&self) -> DialogOptions {
        DialogOptions {
            include_replies: self.dialog.include_replies,
            full_transcript: self.dialog.full_transcript,
            busy_policy: self.dialog.busy_policy,
        }
    }

    /// Seed for new sessions, `None` when the prompt is blank.
    #[must_use]
    pub fn system_prompt(&self) -> Option<String> {
        let prompt = self.dialog.system_prompt.trim();
        (!prompt.is_empty()).then(|| prompt.to_string())
    }

    #[must_use]
    pub fn model_call_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.request_timeout_secs)
    }
}
