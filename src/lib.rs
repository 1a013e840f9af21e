pub mod agent;
pub mod cli;
pub mod client;
pub mod config;
pub mod llm;
pub mod models;
pub mod rag;
pub mod server;

use agent::ChatAgent;
use cli::Args;
use config::Settings;
use log::info;
use server::{ Server, TlsPaths };
use std::error::Error;
use std::sync::Arc;

fn presence(value: &Option<String>) -> &'static str {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => "set",
        _ => "not set",
    }
}

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("Chat Model: {}", args.chat_model.as_deref().unwrap_or("not set"));
    info!("Chat API Key: {}", presence(&args.chat_api_key));
    info!("Chat Base URL: {}", args.chat_base_url.as_deref().unwrap_or("provider default"));
    info!("Retrieval URL: {}", args.retrieval_url.as_deref().unwrap_or("not set"));
    info!("Retrieval API Key: {}", presence(&args.retrieval_api_key));
    info!("Prompts Path: {}", args.prompts_path.as_deref().unwrap_or("built-in"));
    info!("Stream Protocol: {}", args.stream_protocol);
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    let settings = Settings::from_args(&args)?;
    let tls = TlsPaths::from_args(&args)?;

    let agent = Arc::new(ChatAgent::from_settings(&settings)?);
    info!("Starting server on: {}", args.server_addr);
    let server = Server::new(args.server_addr.clone(), agent, settings.stream_protocol, tls);
    server.run().await?;

    Ok(())
}
