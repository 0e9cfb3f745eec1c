pub mod agent;
pub mod config;
pub mod logging;
pub mod model;
pub mod model_gateway;
pub mod providers;
pub mod web;
pub mod wikipedia;

use anyhow::{Context, Result};
use reqwest::Client;
use std::env;
use tracing::info;

use config::Config;

/// Shared by the model provider and the Wikipedia client. `MODEL_TIMEOUT_SECS`
/// is applied per model request, not here.
fn build_http_client() -> Result<Client> {
    Client::builder()
        .build()
        .context("Failed to initialize HTTP client")
}

/// Tool activity goes to stderr while the CLI waits for the final answer.
fn report_progress(message: &model::Message) {
    match message.role {
        model::MessageRole::Assistant if message.is_tool_request() => {
            for call in &message.tool_calls {
                eprintln!("-> {}({})", call.name, call.arguments);
            }
        }
        model::MessageRole::Tool => eprintln!("<- {}", message.content),
        _ => {}
    }
}

/// Loads configuration and either answers the question given on the command
/// line or serves the web UI.
pub async fn run() -> Result<()> {
    dotenvy::dotenv().ok();

    let cfg = Config::from_env()?;
    info!(
        provider = %cfg.model_provider,
        model = %cfg.model,
        model_base_url = %cfg.model_base_url,
        temperature = cfg.model_temperature,
        max_retries = cfg.model_max_retries,
        timeout_secs = ?cfg.model_timeout_secs,
        max_tool_rounds = cfg.max_tool_rounds,
        wiki_api_url = %cfg.wiki.api_url,
        "loaded runtime configuration"
    );
    let client = build_http_client()?;

    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        web::serve(client, cfg).await
    } else {
        let question = args.join(" ");
        let conversation = agent::answer_with(&client, &cfg, &question, report_progress).await?;
        println!("{}", conversation.answer().trim());
        Ok(())
    }
}
