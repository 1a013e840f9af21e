use crate::config::prompt::{ build_rag_prompt, PromptConfig };
use crate::models::chat::ChatMessage;
use crate::rag::context::RetrievedContext;
use crate::rag::retrieval::{ RetrievalError, RetrievalRequest, Retriever };

use log::{ debug, info };
use std::sync::Arc;

/// Grounds the latest turn of a conversation in retrieved context.
#[derive(Clone)]
pub struct Augmenter {
    retriever: Arc<dyn Retriever>,
    prompt_config: Arc<PromptConfig>,
}

impl Augmenter {
    pub fn new(retriever: Arc<dyn Retriever>, prompt_config: Arc<PromptConfig>) -> Self {
        Self { retriever, prompt_config }
    }

    /// Rewrites the last turn with the retrieved sources.
    ///
    /// An empty conversation is returned untouched without calling the
    /// retriever, and so is a conversation for which retrieval found nothing.
    /// The role of the last turn is not checked.
    pub async fn augment(
        &self,
        mut messages: Vec<ChatMessage>
    ) -> Result<Vec<ChatMessage>, RetrievalError> {
        let request = match messages.split_last() {
            Some((last, prior)) => RetrievalRequest::new(&last.content, prior),
            None => {
                debug!("Empty conversation, skipping retrieval");
                return Ok(messages);
            }
        };

        let result = self.retriever.retrieve(&request).await?;
        let Some(context) = RetrievedContext::from_value(result) else {
            info!("Retrieval returned no context, forwarding conversation unchanged");
            return Ok(messages);
        };
        info!("Retrieved {} source(s) for the latest turn", context.len());

        if let Some(last) = messages.last_mut() {
            last.content = build_rag_prompt(
                &self.prompt_config.rag_template,
                &request.question,
                &context.render()
            );
        }
        Ok(messages)
    }
}
