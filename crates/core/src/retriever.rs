use crate::models::{RetrieverConfig, ScoredChunk, SearchType};
use crate::store::MemoryVectorStore;
use crate::traits::EmbeddingModel;
use crate::QaError;
use std::sync::Arc;

/// Maps a question to its `k` nearest stored chunks.
pub struct Retriever {
    store: MemoryVectorStore,
    embedder: Arc<dyn EmbeddingModel>,
    config: RetrieverConfig,
}

impl Retriever {
    pub fn new(
        store: MemoryVectorStore,
        embedder: Arc<dyn EmbeddingModel>,
        config: RetrieverConfig,
    ) -> Result<Self, QaError> {
        validate(&config)?;
        Ok(Self {
            store,
            embedder,
            config,
        })
    }

    pub fn config(&self) -> RetrieverConfig {
        self.config
    }

    pub async fn retrieve(&self, query: &str) -> Result<Vec<ScoredChunk>, QaError> {
        let query_vector = self.embedder.embed_query(query).await?;

        match self.config.search_type {
            SearchType::Similarity => self.store.similarity_search(&query_vector, self.config.k),
            SearchType::Mmr { fetch_k, lambda } => self.store.max_marginal_relevance_search(
                &query_vector,
                self.config.k,
                fetch_k,
                lambda,
            ),
        }
    }
}

pub fn validate(config: &RetrieverConfig) -> Result<(), QaError> {
    if config.k == 0 {
        return Err(QaError::InvalidArgument("retriever k must be at least 1".to_string()));
    }

    if let SearchType::Mmr { lambda, .. } = config.search_type {
        if !(0.0..=1.0).contains(&lambda) {
            return Err(QaError::InvalidArgument(format!(
                "mmr lambda {lambda} must be within 0.0..=1.0"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::models::DocumentChunk;

    fn store(embedder: &CharacterNgramEmbedder, texts: &[&str]) -> MemoryVectorStore {
        let chunks: Vec<DocumentChunk> = texts
            .iter()
            .enumerate()
            .map(|(index, text)| DocumentChunk {
                chunk_id: index.to_string(),
                source_path: "/tmp/tank.pdf".to_string(),
                page: index as u32 + 1,
                chunk_index: index as u64,
                text: text.to_string(),
            })
            .collect();
        let vectors = texts.iter().map(|text| embedder.embed(text)).collect();
        MemoryVectorStore::from_embeddings(chunks, vectors).unwrap()
    }

    #[tokio::test]
    async fn retrieves_most_similar_chunk_first() {
        let embedder = CharacterNgramEmbedder::default();
        let store = store(
            &embedder,
            &[
                "Quarterly revenue grew in the northern region",
                "Manual scrubbing of the tank is tedious and slow",
                "Nozzles spray detergent automatically",
            ],
        );
        let retriever = Retriever::new(store, Arc::new(embedder), RetrieverConfig { k: 2, ..Default::default() }).unwrap();

        let hits = retriever.retrieve("What is manual scrubbing?").await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.page, 2);
    }

    #[tokio::test]
    async fn mmr_returns_at_most_k() {
        let embedder = CharacterNgramEmbedder::default();
        let store = store(&embedder, &["one", "two", "three", "four"]);
        let config = RetrieverConfig {
            k: 3,
            search_type: SearchType::Mmr {
                fetch_k: 10,
                lambda: 0.5,
            },
        };
        let retriever = Retriever::new(store, Arc::new(embedder), config).unwrap();
        assert_eq!(retriever.retrieve("two").await.unwrap().len(), 3);
    }

    #[test]
    fn invalid_configs_are_rejected() {
        assert!(validate(&RetrieverConfig {
            k: 0,
            search_type: SearchType::Similarity
        })
        .is_err());
        assert!(validate(&RetrieverConfig {
            k: 3,
            search_type: SearchType::Mmr {
                fetch_k: 20,
                lambda: 1.5
            }
        })
        .is_err());
        assert!(validate(&RetrieverConfig::default()).is_ok());
    }
}
