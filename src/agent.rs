use crate::config::prompt::{ self, PromptConfig };
use crate::config::Settings;
use crate::llm::chat::{ new_client as new_chat_client, ChatClient, TokenStream };
use crate::models::chat::ChatMessage;
use crate::rag::{ Augmenter, HttpRetriever, RetrievalError, Retriever };

use futures::{ stream, StreamExt };
use log::info;
use std::error::Error;
use std::sync::Arc;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum AgentError {
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    #[error("Generation request failed: {0}")]
    Generation(String),
}

/// Answers one conversation: retrieval, prompt rewrite, then streamed generation.
///
/// Holds only shared, immutable handles, so one instance serves every request.
#[derive(Clone)]
pub struct ChatAgent {
    augmenter: Augmenter,
    chat_client: Arc<dyn ChatClient>,
    prompt_config: Arc<PromptConfig>,
}

impl ChatAgent {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        chat_client: Arc<dyn ChatClient>,
        prompt_config: Arc<PromptConfig>
    ) -> Self {
        Self {
            augmenter: Augmenter::new(retriever, Arc::clone(&prompt_config)),
            chat_client,
            prompt_config,
        }
    }

    /// Builds the HTTP-backed collaborators described by `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let prompt_config = match &settings.prompts_path {
            Some(path) => prompt::load_prompts(path)?,
            None => {
                info!("No prompts file configured, using built-in prompts");
                Arc::new(PromptConfig::default())
            }
        };

        let retriever = HttpRetriever::new(
            settings.retrieval_url.clone(),
            &settings.retrieval_api_key
        )?;
        info!("Retrieval client configured: URL={}", settings.retrieval_url);

        let chat_client = new_chat_client(&settings.llm)?;
        info!(
            "Chat client configured: Type={}, Model={}, BaseURL={}",
            settings.llm.llm_type,
            chat_client.get_model(),
            chat_client.get_base_url().as_deref().unwrap_or("adapter default")
        );

        Ok(Self::new(Arc::new(retriever), chat_client, prompt_config))
    }

    pub fn model(&self) -> String {
        self.chat_client.get_model()
    }

    /// Augments `messages` and starts generation. Retrieval always completes
    /// before the generation request is issued.
    ///
    /// The first stream item is awaited here, so a provider that rejects the
    /// request surfaces as `AgentError::Generation` instead of a stream error.
    pub async fn respond(&self, messages: Vec<ChatMessage>) -> Result<TokenStream, AgentError> {
        let messages = self.augmenter.augment(messages).await?;
        let mut tokens = self.chat_client
            .stream_chat(&self.prompt_config.system_instruction, &messages).await
            .map_err(|e| AgentError::Generation(e.to_string()))?;

        match tokens.next().await {
            Some(Ok(first)) => Ok(Box::pin(stream::once(async move { Ok(first) }).chain(tokens))),
            Some(Err(e)) => Err(AgentError::Generation(e.to_string())),
            None => Ok(Box::pin(stream::empty())),
        }
    }
}
