use async_trait::async_trait;
use log::info;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;

use super::{http_stream_generate, sse_data, ChatClient, StreamLine, TokenStream};
use crate::llm::LlmConfig;
use crate::models::chat::ChatMessage;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicChatClient {
    http: HttpClient,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    system: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicEvent {
    ContentBlockDelta { delta: AnthropicDelta },
    MessageStop,
    Error { error: AnthropicError },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct AnthropicDelta {
    text: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicError {
    message: String,
}

pub(crate) fn parse_anthropic_line(line: &str) -> StreamLine {
    let Some(data) = sse_data(line) else {
        return StreamLine::Skip;
    };
    match serde_json::from_str::<AnthropicEvent>(data) {
        Ok(AnthropicEvent::ContentBlockDelta { delta }) => match delta.text {
            Some(text) if !text.is_empty() => StreamLine::Token(text),
            _ => StreamLine::Skip,
        },
        Ok(AnthropicEvent::MessageStop) => StreamLine::Done,
        Ok(AnthropicEvent::Error { error }) => StreamLine::Failed(error.message),
        Ok(AnthropicEvent::Other) => StreamLine::Skip,
        Err(e) => {
            info!("JSON parse error: {} for data: {}", e, data);
            StreamLine::Skip
        }
    }
}

impl AnthropicChatClient {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self { http: HttpClient::new(), api_key, model, base_url }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let api_key = config.api_key
            .clone()
            .ok_or_else(|| "Anthropic API key is required".to_string())?;

        Ok(Self::new(api_key, config.completion_model.clone(), config.base_url_or_default()))
    }
}

#[async_trait]
impl ChatClient for AnthropicChatClient {
    async fn stream_chat(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<TokenStream, Box<dyn StdError + Send + Sync>> {
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let req = AnthropicRequest {
            model: self.model.clone(),
            system: system.to_string(),
            messages: messages
                .iter()
                .map(|m| AnthropicMessage { role: m.role.to_string(), content: m.content.clone() })
                .collect(),
            max_tokens: DEFAULT_MAX_TOKENS,
            stream: true,
        };
        let headers = vec![
            ("x-api-key".to_string(), self.api_key.clone()),
            ("anthropic-version".to_string(), ANTHROPIC_VERSION.to_string()),
        ];

        Ok(http_stream_generate(self.http.clone(), url, req, parse_anthropic_line, headers))
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }
}
