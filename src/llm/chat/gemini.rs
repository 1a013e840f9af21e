use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use log::info;

use super::{http_stream_generate, sse_data, ChatClient, StreamLine, TokenStream};
use crate::llm::LlmConfig;
use crate::models::chat::{ChatMessage, Role};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiStreamRequest {
    system_instruction: GeminiContent,
    contents: Vec<GeminiContent>,
}

#[derive(Serialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Deserialize)]
struct GoogleChunk {
    #[serde(default)]
    candidates: Vec<GoogleCandidate>,
    error: Option<GoogleError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleCandidate {
    content: Option<GoogleContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GoogleContent {
    #[serde(default)]
    parts: Vec<GooglePart>,
}

#[derive(Deserialize)]
struct GooglePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct GoogleError {
    message: String,
}

pub(crate) fn parse_gemini_line(line: &str) -> StreamLine {
    let Some(data) = sse_data(line) else {
        return StreamLine::Skip;
    };
    match serde_json::from_str::<GoogleChunk>(data) {
        Ok(chunk) => {
            if let Some(err) = chunk.error {
                return StreamLine::Failed(err.message);
            }
            let Some(candidate) = chunk.candidates.into_iter().next() else {
                return StreamLine::Skip;
            };
            let text: String = candidate.content
                .into_iter()
                .flat_map(|c| c.parts)
                .filter_map(|p| p.text)
                .collect();
            // Gemini has no terminator line; the chunk carrying finishReason is the last one.
            match (text.is_empty(), candidate.finish_reason.is_some()) {
                (false, true) => StreamLine::Last(text),
                (true, true) => StreamLine::Done,
                (false, false) => StreamLine::Token(text),
                (true, false) => StreamLine::Skip,
            }
        }
        Err(e) => {
            info!("JSON parse error: {} for data: {}", e, data);
            StreamLine::Skip
        }
    }
}

pub struct GeminiChatClient {
    http: HttpClient,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiChatClient {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self { http: HttpClient::new(), api_key, model, base_url }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let api_key = config.api_key
            .clone()
            .ok_or_else(|| "Google API key is required for GeminiChatClient".to_string())?;

        Ok(Self::new(api_key, config.completion_model.clone(), config.base_url_or_default()))
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

#[async_trait]
impl ChatClient for GeminiChatClient {
    async fn stream_chat(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<TokenStream, Box<dyn StdError + Send + Sync>> {
        let contents = messages
            .iter()
            .map(|m| GeminiContent {
                role: Some(match m.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                }),
                parts: vec![GeminiPart { text: m.content.clone() }],
            })
            .collect();

        let payload = GeminiStreamRequest {
            system_instruction: GeminiContent {
                role: None,
                parts: vec![GeminiPart { text: system.to_string() }],
            },
            contents,
        };

        info!("GeminiChatClient::stream_chat() → model={} turns={}", self.model, messages.len());

        let headers = vec![("x-goog-api-key".to_string(), self.api_key.clone())];
        Ok(http_stream_generate(self.http.clone(), self.stream_url(), payload, parse_gemini_line, headers))
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }
}
