//! Library side of the terminal chat client.

use crate::models::chat::{ ChatMessage, ChatRequest, Role };
use crate::models::stream::{ LineBuffer, StreamPart, StreamProtocol };
use crate::rag;

use futures::StreamExt;
use log::{ debug, warn };
use reqwest::Client as HttpClient;
use thiserror::Error;
use url::Url;

/// Quick-start questions offered while the conversation is empty.
pub const SUGGESTIONS: [&str; 4] = [
    "What is Hypertension?",
    "What are the early symptoms of type 2 diabetes?",
    "How much sleep do adults need?",
    "When should I see a doctor about a persistent cough?",
];

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid chat endpoint '{url}': {source}")]
    InvalidEndpoint {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Chat request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Chat endpoint returned {status}: {body}")]
    Status {
        status: u16,
        body: String,
    },
    #[error("Suggestions are only available in an empty conversation")]
    SuggestionsUnavailable,
    #[error("No suggestion numbered {0}")]
    UnknownSuggestion(usize),
    #[error("No turn numbered {0}")]
    UnknownTurn(usize),
    #[error("Failed to render turn: {0}")]
    Render(#[from] serde_json::Error),
}

/// How a streamed answer ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    Complete,
    /// The stream broke off; the partial answer stays in the conversation.
    Interrupted(String),
}

pub struct ChatSession {
    http: HttpClient,
    endpoint: Url,
    protocol: StreamProtocol,
    messages: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new(endpoint: &str, protocol: StreamProtocol) -> Result<Self, ClientError> {
        let endpoint = Url::parse(endpoint).map_err(|source| ClientError::InvalidEndpoint {
            url: endpoint.to_string(),
            source,
        })?;
        Ok(Self {
            http: HttpClient::new(),
            endpoint,
            protocol,
            messages: Vec::new(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Empty once the conversation has started.
    pub fn suggestions(&self) -> &'static [&'static str] {
        if self.messages.is_empty() { &SUGGESTIONS } else { &[] }
    }

    pub fn new_chat(&mut self) {
        self.messages.clear();
    }

    /// Pretty-printed JSON of the turn at `index` (zero-based).
    pub fn inspect(&self, index: usize) -> Result<String, ClientError> {
        let turn = self.messages.get(index).ok_or(ClientError::UnknownTurn(index))?;
        Ok(serde_json::to_string_pretty(turn)?)
    }

    pub fn citations(text: &str) -> Vec<(usize, String)> {
        rag::citations(text)
    }

    /// Sends the suggestion at `index` (zero-based) as the first user turn.
    pub async fn send_suggestion<F>(
        &mut self,
        index: usize,
        on_fragment: F
    ) -> Result<StreamOutcome, ClientError>
        where F: FnMut(&str)
    {
        if !self.messages.is_empty() {
            return Err(ClientError::SuggestionsUnavailable);
        }
        let question = SUGGESTIONS.get(index).ok_or(ClientError::UnknownSuggestion(index))?;
        self.send(question, on_fragment).await
    }

    /// Appends `content` as a user turn, submits the whole conversation and
    /// grows an assistant turn as fragments arrive. `on_fragment` sees each
    /// fragment in arrival order.
    pub async fn send<F>(&mut self, content: &str, mut on_fragment: F) -> Result<StreamOutcome, ClientError>
        where F: FnMut(&str)
    {
        self.messages.push(ChatMessage::user(content));
        let request = ChatRequest { messages: self.messages.clone() };

        let response = self.http.post(self.endpoint.clone()).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Chat endpoint returned {}: {}", status, body);
            return Err(ClientError::Status { status: status.as_u16(), body });
        }

        self.messages.push(ChatMessage::assistant(String::new()));
        let mut bytes = response.bytes_stream();
        let mut decoder = Decoder::new(self.protocol);

        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    return Ok(StreamOutcome::Interrupted(e.to_string()));
                }
            };
            for event in decoder.push(&chunk) {
                match event {
                    Event::Fragment(text) => {
                        on_fragment(&text);
                        self.append_to_answer(&text);
                    }
                    Event::End(outcome) => {
                        return Ok(outcome);
                    }
                }
            }
        }

        for event in decoder.finish() {
            match event {
                Event::Fragment(text) => {
                    on_fragment(&text);
                    self.append_to_answer(&text);
                }
                Event::End(outcome) => {
                    return Ok(outcome);
                }
            }
        }
        Ok(decoder.eof_outcome())
    }

    fn append_to_answer(&mut self, text: &str) {
        if let Some(last) = self.messages.last_mut() {
            if last.role == Role::Assistant {
                last.content.push_str(text);
            }
        }
    }
}

/// Length of the prefix that can be decoded now. Only an unfinished
/// character at the very end is held back; invalid bytes are let through
/// and become replacement characters.
fn decodable_len(bytes: &[u8]) -> usize {
    let mut start = 0;
    loop {
        match std::str::from_utf8(&bytes[start..]) {
            Ok(_) => return bytes.len(),
            Err(e) => match e.error_len() {
                Some(invalid) => start += e.valid_up_to() + invalid,
                None => return start + e.valid_up_to(),
            },
        }
    }
}

enum Event {
    Fragment(String),
    End(StreamOutcome),
}

/// Turns response bytes into fragments according to the stream protocol.
struct Decoder {
    protocol: StreamProtocol,
    lines: LineBuffer,
    utf8_tail: Vec<u8>,
}

impl Decoder {
    fn new(protocol: StreamProtocol) -> Self {
        Self {
            protocol,
            lines: LineBuffer::new(),
            utf8_tail: Vec::new(),
        }
    }

    fn push(&mut self, bytes: &[u8]) -> Vec<Event> {
        match self.protocol {
            StreamProtocol::Data => self.lines.push(bytes).iter().filter_map(|l| Self::part(l)).collect(),
            StreamProtocol::Text => {
                self.utf8_tail.extend_from_slice(bytes);
                let valid = decodable_len(&self.utf8_tail);
                if valid == 0 {
                    return Vec::new();
                }
                let head: Vec<u8> = self.utf8_tail.drain(..valid).collect();
                vec![Event::Fragment(String::from_utf8_lossy(&head).into_owned())]
            }
        }
    }

    fn finish(&mut self) -> Vec<Event> {
        match self.protocol {
            StreamProtocol::Data => self.lines.finish().and_then(|l| Self::part(&l)).into_iter().collect(),
            StreamProtocol::Text => {
                if self.utf8_tail.is_empty() {
                    return Vec::new();
                }
                let tail = std::mem::take(&mut self.utf8_tail);
                vec![Event::Fragment(String::from_utf8_lossy(&tail).into_owned())]
            }
        }
    }

    /// Outcome when the body ends without an explicit finish or error part.
    fn eof_outcome(&self) -> StreamOutcome {
        match self.protocol {
            StreamProtocol::Data => StreamOutcome::Interrupted("stream ended before finish".to_string()),
            StreamProtocol::Text => StreamOutcome::Complete,
        }
    }

    fn part(line: &str) -> Option<Event> {
        match StreamPart::decode(line) {
            Ok(Some(StreamPart::Text(text))) => Some(Event::Fragment(text)),
            Ok(Some(StreamPart::Error(message))) => Some(Event::End(StreamOutcome::Interrupted(message))),
            Ok(Some(StreamPart::Finish)) => Some(Event::End(StreamOutcome::Complete)),
            Ok(None) => None,
            Err(e) => {
                debug!("Skipping undecodable stream line: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{ http::StatusCode, routing::post, Json, Router };
    use serde_json::Value;
    use std::sync::{ Arc, Mutex };

    async fn fake_endpoint(status: StatusCode, body: &'static str) -> (String, Arc<Mutex<Vec<Value>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let app = Router::new().route(
            "/api/chat",
            post(move |Json(req): Json<Value>| {
                let recorder = Arc::clone(&recorder);
                async move {
                    recorder.lock().unwrap().push(req);
                    (status, body)
                }
            })
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/api/chat", addr), seen)
    }

    #[tokio::test]
    async fn data_stream_builds_assistant_turn() {
        let (url, seen) = fake_endpoint(
            StatusCode::OK,
            "0:\"Hypertension is \"\n0:\"high blood pressure [1](https://a.org/x).\"\nd:{\"finishReason\":\"stop\"}\n"
        ).await;
        let mut session = ChatSession::new(&url, StreamProtocol::Data).unwrap();
        let mut fragments = Vec::new();

        let outcome = session.send("What is Hypertension?", |f| fragments.push(f.to_string())).await.unwrap();

        assert_eq!(outcome, StreamOutcome::Complete);
        assert_eq!(fragments.len(), 2);
        assert_eq!(session.messages().len(), 2);
        assert_eq!(session.messages()[1].content, "Hypertension is high blood pressure [1](https://a.org/x).");
        assert!(session.suggestions().is_empty());

        let sent = seen.lock().unwrap();
        assert_eq!(sent[0]["messages"][0]["role"], "user");
        assert_eq!(sent[0]["messages"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn error_part_keeps_partial_answer() {
        let (url, _) = fake_endpoint(StatusCode::OK, "0:\"partial\"\n3:\"upstream died\"\n").await;
        let mut session = ChatSession::new(&url, StreamProtocol::Data).unwrap();

        let outcome = session.send("hi", |_| {}).await.unwrap();

        assert_eq!(outcome, StreamOutcome::Interrupted("upstream died".to_string()));
        assert_eq!(session.messages()[1].content, "partial");
    }

    #[tokio::test]
    async fn text_stream_completes_at_eof() {
        let (url, _) = fake_endpoint(StatusCode::OK, "plain answer").await;
        let mut session = ChatSession::new(&url, StreamProtocol::Text).unwrap();

        let outcome = session.send("hi", |_| {}).await.unwrap();

        assert_eq!(outcome, StreamOutcome::Complete);
        assert_eq!(session.messages()[1].content, "plain answer");
    }

    #[tokio::test]
    async fn error_status_leaves_no_assistant_turn() {
        let (url, _) = fake_endpoint(StatusCode::BAD_GATEWAY, "{\"error\":\"retrieval down\"}").await;
        let mut session = ChatSession::new(&url, StreamProtocol::Data).unwrap();

        let err = session.send("hi", |_| {}).await.unwrap_err();

        match err {
            ClientError::Status { status, body } => {
                assert_eq!(status, 502);
                assert!(body.contains("retrieval down"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(session.messages().len(), 1);
        assert_eq!(session.messages()[0].role, Role::User);
    }

    #[tokio::test]
    async fn suggestions_only_in_empty_conversation() {
        let (url, seen) = fake_endpoint(StatusCode::OK, "d:{\"finishReason\":\"stop\"}\n").await;
        let mut session = ChatSession::new(&url, StreamProtocol::Data).unwrap();
        assert_eq!(session.suggestions().len(), SUGGESTIONS.len());

        session.send_suggestion(0, |_| {}).await.unwrap();
        assert_eq!(seen.lock().unwrap()[0]["messages"][0]["content"], SUGGESTIONS[0]);
        assert!(matches!(
            session.send_suggestion(1, |_| {}).await,
            Err(ClientError::SuggestionsUnavailable)
        ));

        session.new_chat();
        assert!(session.messages().is_empty());
        assert!(matches!(
            session.send_suggestion(99, |_| {}).await,
            Err(ClientError::UnknownSuggestion(99))
        ));
    }

    #[test]
    fn inspect_renders_turn_json() {
        let mut session = ChatSession::new("http://127.0.0.1:1/api/chat", StreamProtocol::Data).unwrap();
        session.messages.push(ChatMessage::user("What is Hypertension?"));

        let json: Value = serde_json::from_str(&session.inspect(0).unwrap()).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"], "What is Hypertension?");
        assert!(matches!(session.inspect(1), Err(ClientError::UnknownTurn(1))));
    }

    #[test]
    fn decoder_reassembles_split_lines_and_chars() {
        let mut data = Decoder::new(StreamProtocol::Data);
        assert!(data.push(b"0:\"Hyp").is_empty());
        let events = data.push(b"er\"\n");
        assert!(matches!(&events[..], [Event::Fragment(t)] if t == "Hyper"));

        let mut text = Decoder::new(StreamProtocol::Text);
        let bytes = "é".as_bytes();
        assert!(text.push(&bytes[..1]).is_empty());
        let events = text.push(&bytes[1..]);
        assert!(matches!(&events[..], [Event::Fragment(t)] if t == "é"));
    }

    #[test]
    fn invalid_bytes_do_not_stall_text_output() {
        let mut text = Decoder::new(StreamProtocol::Text);
        let events = text.push(&[0xFF, b'h', b'i']);
        assert!(matches!(&events[..], [Event::Fragment(t)] if t == "\u{FFFD}hi"));

        let bytes = "é".as_bytes();
        let events = text.push(&[b'o', 0xC0, b'k', bytes[0]]);
        assert!(matches!(&events[..], [Event::Fragment(t)] if t == "o\u{FFFD}k"));
        let events = text.push(&bytes[1..]);
        assert!(matches!(&events[..], [Event::Fragment(t)] if t == "é"));
    }

    #[test]
    fn rejects_malformed_endpoint() {
        assert!(matches!(
            ChatSession::new("not a url", StreamProtocol::Data),
            Err(ClientError::InvalidEndpoint { .. })
        ));
    }
}
