use crate::QaError;
use async_trait::async_trait;

#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Embeds every text, returning vectors in input order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, QaError>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, QaError> {
        let mut vectors = self.embed_documents(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| QaError::Embedding("no vector returned for query".to_string()))
    }
}

#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, QaError>;
}
