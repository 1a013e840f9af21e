use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };
use async_trait::async_trait;
use std::error::Error as StdError;
use super::{ http_stream_generate, ChatClient, StreamLine, TokenStream };
use crate::llm::{ LlmConfig, LlmType };
use crate::models::chat::ChatMessage;
use log::info;

#[derive(Debug)]
pub struct OllamaClient {
    http: HttpClient,
    base_url: String,
    completion_model: String,
}

#[derive(Serialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
}

#[derive(Deserialize)]
struct StreamResponse {
    message: Option<StreamMessage>,
    #[serde(default)]
    done: bool,
    error: Option<String>,
}

#[derive(Deserialize)]
struct StreamMessage {
    content: String,
}

pub(crate) fn parse_ollama_line(line: &str) -> StreamLine {
    let line = line.trim();
    if line.is_empty() {
        return StreamLine::Skip;
    }
    match serde_json::from_str::<StreamResponse>(line) {
        Ok(resp) => {
            if let Some(err) = resp.error {
                return StreamLine::Failed(err);
            }
            match (resp.message, resp.done) {
                (Some(m), true) if !m.content.is_empty() => StreamLine::Last(m.content),
                (_, true) => StreamLine::Done,
                (Some(m), false) if !m.content.is_empty() => StreamLine::Token(m.content),
                _ => StreamLine::Skip,
            }
        }
        Err(e) => {
            info!("JSON parse error: {} for line: {}", e, line);
            StreamLine::Skip
        }
    }
}

impl OllamaClient {
    pub fn new(base_url: String, completion_model: String) -> Self {
        Self {
            http: HttpClient::new(),
            base_url,
            completion_model,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        if config.llm_type != LlmType::Ollama {
            return Err("Invalid config type for OllamaClient".into());
        }

        Ok(Self::new(config.base_url_or_default(), config.completion_model.clone()))
    }
}

#[async_trait]
impl ChatClient for OllamaClient {
    async fn stream_chat(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<TokenStream, Box<dyn StdError + Send + Sync>> {
        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let mut wire = vec![OllamaMessage { role: "system".to_string(), content: system.to_string() }];
        wire.extend(messages.iter().map(|m| OllamaMessage {
            role: m.role.to_string(),
            content: m.content.clone(),
        }));

        let req = ChatRequest {
            model: self.completion_model.clone(),
            messages: wire,
            stream: true,
        };

        Ok(http_stream_generate(self.http.clone(), url, req, parse_ollama_line, Vec::new()))
    }

    fn get_model(&self) -> String {
        self.completion_model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_content_is_forwarded() {
        let line = r#"{"model":"llama3","message":{"role":"assistant","content":"Blood"},"done":false}"#;
        assert_eq!(parse_ollama_line(line), StreamLine::Token("Blood".into()));
    }

    #[test]
    fn final_line_ends_the_stream() {
        let line = r#"{"model":"llama3","message":{"role":"assistant","content":""},"done":true}"#;
        assert_eq!(parse_ollama_line(line), StreamLine::Done);
    }

    #[test]
    fn content_on_final_line_is_kept() {
        let line = r#"{"message":{"role":"assistant","content":"."},"done":true}"#;
        assert_eq!(parse_ollama_line(line), StreamLine::Last(".".into()));
    }

    #[test]
    fn error_line_fails_the_stream() {
        assert_eq!(
            parse_ollama_line(r#"{"error":"model 'x' not found"}"#),
            StreamLine::Failed("model 'x' not found".into())
        );
    }
}
