use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub chunk_id: String,
    pub source_path: String,
    pub page: u32,
    pub chunk_index: u64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub page: u32,
    pub content: String,
}

impl From<&ScoredChunk> for Source {
    fn from(value: &ScoredChunk) -> Self {
        Self {
            page: value.chunk.page,
            content: value.chunk.text.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryAnswer {
    pub answer: String,
    pub sources: Vec<Source>,
}

/// Describes the document currently loaded into a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentFingerprint {
    pub document_id: String,
    pub title: String,
    pub source_path: String,
    pub checksum: String,
    pub page_count: usize,
    pub chunk_count: usize,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitterConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub separator: String,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1_000,
            chunk_overlap: 200,
            separator: " ".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    Similarity,
    Mmr { fetch_k: usize, lambda: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrieverConfig {
    pub k: usize,
    pub search_type: SearchType,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            k: 3,
            search_type: SearchType::Similarity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HistoryPolicy {
    /// Oldest turns are dropped once the log exceeds this length.
    pub max_turns: Option<usize>,
    pub reset_on_reprocess: bool,
}

#[derive(Debug, Clone)]
pub struct QaOptions {
    pub splitter: SplitterConfig,
    pub retriever: RetrieverConfig,
    pub history: HistoryPolicy,
    pub prompt_template: String,
    /// Issue one completion after building the chain so bad credentials fail the upload.
    pub probe_llm: bool,
}

impl Default for QaOptions {
    fn default() -> Self {
        Self {
            splitter: SplitterConfig::default(),
            retriever: RetrieverConfig::default(),
            history: HistoryPolicy::default(),
            prompt_template: crate::prompt::DEFAULT_TEMPLATE.to_string(),
            probe_llm: false,
        }
    }
}
