pub mod mistral;

pub use mistral::{
    CompletionConfig, EmbeddingConfig, MistralChat, MistralClient, MistralConfig,
    MistralEmbeddings,
};
