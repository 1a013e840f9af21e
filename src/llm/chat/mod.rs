pub mod ollama;
pub mod openai;
pub mod gemini;
pub mod anthropic;

use async_trait::async_trait;
use futures::{Stream, StreamExt, Future};
use log::{debug, warn};
use reqwest::Client as HttpClient;
use std::error::Error as StdError;
use std::pin::Pin;
use std::sync::Arc;
use super::{ LlmConfig, LlmType };
use self::ollama::OllamaClient;
use self::openai::OpenAIChatClient;
use self::gemini::GeminiChatClient;
use self::anthropic::AnthropicChatClient;
use crate::models::chat::ChatMessage;
use crate::models::stream::LineBuffer;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Incremental answer text, in the order the provider produced it.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, Box<dyn StdError + Send + Sync>>> + Send>>;

const STREAM_CHANNEL_CAPACITY: usize = 32;

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Starts a streamed completion of `messages` under the `system` instruction.
    ///
    /// Transport and provider failures that happen after the call returns are
    /// delivered as an `Err` item, after which the stream ends.
    async fn stream_chat(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<TokenStream, Box<dyn StdError + Send + Sync>>;

    fn get_model(&self) -> String;
    fn get_base_url(&self) -> Option<String>;
}

/// What a provider-specific parser made of one line of a streamed body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamLine {
    Token(String),
    /// A final token carried on the line that also ends the stream.
    Last(String),
    Done,
    Skip,
    Failed(String),
}

pub fn create_streaming_response<F, Fut>(
    response_fn: F
) -> TokenStream
where
    F: FnOnce(mpsc::Sender<Result<String, Box<dyn StdError + Send + Sync>>>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        response_fn(tx).await;
    });

    Box::pin(ReceiverStream::new(rx))
}

pub fn new_client(
    config: &LlmConfig
) -> Result<Arc<dyn ChatClient>, Box<dyn StdError + Send + Sync>> {
    let client: Arc<dyn ChatClient> = match config.llm_type {
        LlmType::Ollama => {
            let specific_client = OllamaClient::from_config(config)?;
            Arc::new(specific_client)
        }
        LlmType::OpenAI | LlmType::DeepSeek | LlmType::XAI | LlmType::Groq => {
            let specific_client = OpenAIChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
        LlmType::Gemini => {
            let specific_client = GeminiChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
        LlmType::Anthropic => {
            let specific_client = AnthropicChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
    };
    Ok(client)
}

/// POSTs `payload` to `url` and turns the line-oriented response body into a
/// [`TokenStream`] using `line_parser`.
///
/// The request runs on a spawned task feeding a bounded channel; when the
/// consumer drops the stream the task stops and the upstream response is
/// dropped with it.
pub fn http_stream_generate(
    http: HttpClient,
    url: String,
    payload: impl serde::Serialize + Send + 'static,
    line_parser: fn(&str) -> StreamLine,
    headers: Vec<(String, String)>,
) -> TokenStream {
    create_streaming_response(move |tx| async move {
        let mut req = http.post(&url).json(&payload);
        for (name, value) in headers {
            req = req.header(name, value);
        }

        let resp = match req.send().await {
            Ok(r) => r,
            Err(e) => {
                let _ = tx.send(Err(Box::new(e) as _)).await;
                return;
            }
        };

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let msg = format!("Generation provider returned HTTP {}: {}", status, body.trim());
            let _ = tx.send(Err(msg.into())).await;
            return;
        }

        let mut lines = LineBuffer::new();
        let mut bytes = resp.bytes_stream();
        while let Some(chunk) = bytes.next().await {
            let buf = match chunk {
                Ok(buf) => buf,
                Err(e) => {
                    let _ = tx.send(Err(Box::new(e) as _)).await;
                    return;
                }
            };
            for line in lines.push(&buf) {
                if let Forwarded::Stop = forward_line(&tx, line_parser(&line)).await {
                    return;
                }
            }
        }
        if let Some(line) = lines.finish() {
            if let Forwarded::Stop = forward_line(&tx, line_parser(&line)).await {
                return;
            }
        }
        warn!("Generation stream from {} ended without an end marker", url);
        let _ = tx.send(Err(TRUNCATED_STREAM.into())).await;
    })
}

const TRUNCATED_STREAM: &str = "generation stream ended before completion";

enum Forwarded {
    Continue,
    /// Completed, failed, or the consumer went away.
    Stop,
}

async fn forward_line(
    tx: &mpsc::Sender<Result<String, Box<dyn StdError + Send + Sync>>>,
    parsed: StreamLine,
) -> Forwarded {
    match parsed {
        StreamLine::Token(tok) => {
            if tx.send(Ok(tok)).await.is_ok() { Forwarded::Continue } else { Forwarded::Stop }
        }
        StreamLine::Last(tok) => {
            let _ = tx.send(Ok(tok)).await;
            debug!("Generation stream finished");
            Forwarded::Stop
        }
        StreamLine::Skip => Forwarded::Continue,
        StreamLine::Done => {
            debug!("Generation stream finished");
            Forwarded::Stop
        }
        StreamLine::Failed(msg) => {
            warn!("Generation provider reported an error mid-stream: {}", msg);
            let _ = tx.send(Err(msg.into())).await;
            Forwarded::Stop
        }
    }
}

/// Payload of a server-sent-events `data:` line, if `line` is one.
pub(crate) fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}
