use crate::models::{ChatTurn, ScoredChunk};
use crate::prompt::{format_context, format_history, PromptTemplate};
use crate::retriever::Retriever;
use crate::traits::CompletionModel;
use crate::QaError;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ChainOutput {
    pub answer: String,
    pub context: Vec<ScoredChunk>,
}

/// Retrieves context for a question, stuffs it into the prompt and asks the model.
pub struct RetrievalChain {
    retriever: Retriever,
    llm: Arc<dyn CompletionModel>,
    prompt: PromptTemplate,
}

impl RetrievalChain {
    pub fn new(retriever: Retriever, llm: Arc<dyn CompletionModel>, prompt: PromptTemplate) -> Self {
        Self {
            retriever,
            llm,
            prompt,
        }
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub async fn invoke(&self, input: &str, chat_history: &[ChatTurn]) -> Result<ChainOutput, QaError> {
        let context = self.retriever.retrieve(input).await?;
        let prompt = self.prompt.render(
            &format_context(&context),
            input,
            &format_history(chat_history),
        );
        debug!(
            documents = context.len(),
            history_turns = chat_history.len(),
            prompt_chars = prompt.len(),
            "invoking completion"
        );

        let answer = self.llm.complete(&prompt).await?;
        if answer.trim().is_empty() {
            return Err(QaError::Completion("model returned an empty completion".to_string()));
        }

        Ok(ChainOutput { answer, context })
    }
}
