//! Dialog Gateway Server
//!
//! Entry point for the dialog HTTP service.

use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::sync::Arc;

use anyhow::Context;
use dialog_gateway::{config::AppConfig, server, telemetry};
use dotenvy::dotenv;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present)
    let _ = dotenv();

    let config = AppConfig::load().context("Configuration error")?;

    telemetry::init(config.logging.format);

    server::start_server(Arc::new(config)).await
}
