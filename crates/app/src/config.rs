use clap::{Args, ValueEnum};
use pdf_qa_core::providers::mistral::DEFAULT_BASE_URL;
use pdf_qa_core::{
    CharacterNgramEmbedder, CompletionConfig, CompletionModel, EmbeddingConfig, EmbeddingModel,
    HistoryPolicy, MistralChat, MistralClient, MistralConfig, MistralEmbeddings, QaOptions,
    QaSession, RetrieverConfig, SearchType, SplitterConfig, DEFAULT_TEMPLATE,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmbeddingProvider {
    /// Hosted Mistral embeddings API.
    Mistral,
    /// Offline character-trigram hashing, no network needed.
    Ngram,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SearchKind {
    Similarity,
    Mmr,
}

/// Pipeline settings shared by every subcommand.
#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// API key for the Mistral-compatible endpoint
    #[arg(long, env = "MISTRAL_API_KEY", hide_env_values = true)]
    pub mistral_api_key: Option<String>,

    /// Base URL of the Mistral-compatible API
    #[arg(long, env = "MISTRAL_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub mistral_base_url: String,

    /// Chat model that answers questions
    #[arg(long, env = "PDF_QA_CHAT_MODEL", default_value = "codestral-latest")]
    pub chat_model: String,

    /// Embedding model used for chunks and questions
    #[arg(long, env = "PDF_QA_EMBEDDING_MODEL", default_value = "mistral-embed")]
    pub embedding_model: String,

    #[arg(long, value_enum, default_value_t = EmbeddingProvider::Mistral)]
    pub embedding_provider: EmbeddingProvider,

    /// Sampling temperature for answers
    #[arg(long, default_value_t = 0.1)]
    pub temperature: f32,

    /// Upper bound on answer tokens
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Extra attempts for a failed completion request
    #[arg(long, default_value_t = 3)]
    pub max_retries: u32,

    /// Extra attempts for a failed embedding request
    #[arg(long, default_value_t = 0)]
    pub embedding_max_retries: u32,

    /// Texts sent per embedding request
    #[arg(long, default_value_t = 512)]
    pub embedding_batch_size: usize,

    /// Characters sent per embedding request
    #[arg(long, default_value_t = 40_000)]
    pub embedding_max_batch_chars: usize,

    /// Per-request timeout for API calls, in seconds
    #[arg(long, default_value_t = 60)]
    pub request_timeout_secs: u64,

    #[arg(long, default_value_t = 1000)]
    pub chunk_size: usize,

    #[arg(long, default_value_t = 200)]
    pub chunk_overlap: usize,

    #[arg(long, default_value = " ")]
    pub separator: String,

    /// Chunks retrieved per question
    #[arg(long, default_value_t = 3)]
    pub top_k: usize,

    #[arg(long, value_enum, default_value_t = SearchKind::Similarity)]
    pub search_type: SearchKind,

    /// Candidates considered by mmr search
    #[arg(long, default_value_t = 20)]
    pub fetch_k: usize,

    /// Relevance weight for mmr search, 1.0 disables diversity
    #[arg(long, default_value_t = 0.5)]
    pub mmr_lambda: f32,

    /// Keep only this many chat turns; unbounded when unset
    #[arg(long)]
    pub max_history_turns: Option<usize>,

    /// Clear the chat history whenever a new PDF is processed
    #[arg(long, default_value_t = false)]
    pub reset_history_on_reprocess: bool,

    /// Send one test completion while processing a PDF
    #[arg(long, default_value_t = false)]
    pub probe_llm: bool,

    /// Prompt template with {context}, {input} and {chat_history} placeholders
    #[arg(long, env = "PDF_QA_PROMPT_TEMPLATE", default_value = DEFAULT_TEMPLATE, hide_default_value = true)]
    pub prompt_template: String,
}

impl Settings {
    pub fn qa_options(&self) -> QaOptions {
        let search_type = match self.search_type {
            SearchKind::Similarity => SearchType::Similarity,
            SearchKind::Mmr => SearchType::Mmr {
                fetch_k: self.fetch_k,
                lambda: self.mmr_lambda,
            },
        };

        QaOptions {
            splitter: SplitterConfig {
                chunk_size: self.chunk_size,
                chunk_overlap: self.chunk_overlap,
                separator: self.separator.clone(),
            },
            retriever: RetrieverConfig {
                k: self.top_k,
                search_type,
            },
            history: HistoryPolicy {
                max_turns: self.max_history_turns,
                reset_on_reprocess: self.reset_history_on_reprocess,
            },
            prompt_template: self.prompt_template.clone(),
            probe_llm: self.probe_llm,
        }
    }

    pub fn completion_config(&self) -> CompletionConfig {
        CompletionConfig {
            model: self.chat_model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            max_retries: self.max_retries,
        }
    }

    pub fn build_session(&self) -> anyhow::Result<QaSession> {
        if self.mistral_api_key.as_deref().map_or(true, |key| key.trim().is_empty()) {
            warn!("MISTRAL_API_KEY is not set; API requests will be sent without credentials");
        }

        let client = MistralClient::new(&MistralConfig {
            base_url: self.mistral_base_url.clone(),
            api_key: self.mistral_api_key.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
        })?;

        let embedder: Arc<dyn EmbeddingModel> = match self.embedding_provider {
            EmbeddingProvider::Mistral => Arc::new(MistralEmbeddings::new(
                client.clone(),
                EmbeddingConfig {
                    model: self.embedding_model.clone(),
                    batch_size: self.embedding_batch_size,
                    max_batch_chars: self.embedding_max_batch_chars,
                    max_retries: self.embedding_max_retries,
                },
            )),
            EmbeddingProvider::Ngram => Arc::new(CharacterNgramEmbedder::default()),
        };
        let llm: Arc<dyn CompletionModel> =
            Arc::new(MistralChat::new(client, self.completion_config()));

        Ok(QaSession::new(self.qa_options(), embedder, llm)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        settings: Settings,
    }

    fn parse(args: &[&str]) -> Settings {
        let mut argv = vec!["pdf-qa-server"];
        argv.extend_from_slice(args);
        Harness::parse_from(argv).settings
    }

    #[test]
    fn defaults_match_the_reference_pipeline() {
        let settings = parse(&[]);
        let options = settings.qa_options();

        assert_eq!(options.splitter, SplitterConfig::default());
        assert_eq!(options.retriever.k, 3);
        assert_eq!(options.retriever.search_type, SearchType::Similarity);
        assert_eq!(options.history, HistoryPolicy::default());
        assert_eq!(options.prompt_template, DEFAULT_TEMPLATE);

        let completion = settings.completion_config();
        assert_eq!(completion.model, "codestral-latest");
        assert_eq!(completion.max_retries, 3);
        assert!((completion.temperature - 0.1).abs() < f32::EPSILON);
    }

    #[test]
    fn mmr_flags_build_mmr_search() {
        let settings = parse(&["--search-type", "mmr", "--fetch-k", "8", "--mmr-lambda", "0.25", "--top-k", "4"]);
        let options = settings.qa_options();
        assert_eq!(options.retriever.k, 4);
        assert_eq!(
            options.retriever.search_type,
            SearchType::Mmr {
                fetch_k: 8,
                lambda: 0.25
            }
        );
    }

    #[test]
    fn invalid_chunking_fails_session_construction() {
        let settings = parse(&[
            "--chunk-size",
            "100",
            "--chunk-overlap",
            "150",
            "--embedding-provider",
            "ngram",
            "--mistral-api-key",
            "key",
        ]);
        assert!(settings.build_session().is_err());
    }

    #[test]
    fn offline_embeddings_build_a_session() {
        let settings = parse(&["--embedding-provider", "ngram", "--mistral-api-key", "key"]);
        assert!(settings.build_session().is_ok());
    }
}
