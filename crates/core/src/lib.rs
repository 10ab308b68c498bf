pub mod chain;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod models;
pub mod prompt;
pub mod providers;
pub mod retriever;
pub mod session;
pub mod splitting;
pub mod store;
pub mod traits;

pub use chain::{ChainOutput, RetrievalChain};
pub use embeddings::{CharacterNgramEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{QaError, Result, Stage};
pub use extractor::{extract_page_texts, LopdfExtractor, PdfExtractor};
pub use models::{
    ChatTurn, DocumentChunk, DocumentFingerprint, HistoryPolicy, PageText, QaOptions,
    QueryAnswer, RetrieverConfig, ScoredChunk, SearchType, Source, SplitterConfig,
};
pub use prompt::{PromptTemplate, DEFAULT_TEMPLATE};
pub use providers::{
    CompletionConfig, EmbeddingConfig, MistralChat, MistralClient, MistralConfig,
    MistralEmbeddings,
};
pub use retriever::Retriever;
pub use session::QaSession;
pub use splitting::{normalize_preserving, normalize_whitespace, split_pages, split_text};
pub use store::{cosine_similarity, MemoryVectorStore};
pub use traits::{CompletionModel, EmbeddingModel};
