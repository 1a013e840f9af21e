use async_trait::async_trait;
use log::{ debug, warn };
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE } };
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::models::chat::ChatMessage;

/// Number of chunks requested per question.
pub const RETRIEVAL_NUM_RESULTS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalRequest {
    pub question: String,
    pub num_results: u32,
    pub rerank: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<RetrievalContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalContext {
    pub messages: Vec<ChatMessage>,
}

impl RetrievalRequest {
    /// Reranked top-5 request; `prior` turns are attached only when there are any.
    pub fn new(question: &str, prior: &[ChatMessage]) -> Self {
        Self {
            question: question.to_string(),
            num_results: RETRIEVAL_NUM_RESULTS,
            rerank: true,
            context: if prior.is_empty() {
                None
            } else {
                Some(RetrievalContext { messages: prior.to_vec() })
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Retrieval service responded with HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Retrieval request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Retrieval service returned invalid JSON: {0}")]
    InvalidBody(#[from] serde_json::Error),
    #[error("Invalid retrieval credential: {0}")]
    InvalidCredential(String),
}

#[async_trait]
pub trait Retriever: Send + Sync {
    /// Returns the raw retrieval result. `Value::Null` means nothing was found.
    async fn retrieve(&self, request: &RetrievalRequest) -> Result<Value, RetrievalError>;
}

pub struct HttpRetriever {
    http: HttpClient,
    endpoint: Url,
}

impl HttpRetriever {
    pub fn new(endpoint: Url, api_key: &str) -> Result<Self, RetrievalError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|e| RetrievalError::InvalidCredential(e.to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = HttpClient::builder().default_headers(headers).build()?;
        Ok(Self { http, endpoint })
    }
}

#[async_trait]
impl Retriever for HttpRetriever {
    async fn retrieve(&self, request: &RetrievalRequest) -> Result<Value, RetrievalError> {
        debug!(
            "Retrieving context from {} (context turns: {})",
            self.endpoint,
            request.context.as_ref().map_or(0, |c| c.messages.len())
        );
        let resp = self.http.post(self.endpoint.clone()).json(request).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("Retrieval service at {} returned {}", self.endpoint, status);
            return Err(RetrievalError::Status { status: status.as_u16(), body });
        }

        let body = resp.text().await?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }
}
