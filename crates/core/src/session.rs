use crate::chain::RetrievalChain;
use crate::error::Stage;
use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::models::{ChatTurn, DocumentFingerprint, QaOptions, QueryAnswer, Source};
use crate::prompt::PromptTemplate;
use crate::retriever::{self, Retriever};
use crate::splitting::{self, split_pages};
use crate::store::MemoryVectorStore;
use crate::traits::{CompletionModel, EmbeddingModel};
use crate::QaError;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info};

const PROBE_PROMPT: &str = "what's up?";

struct LoadedDocument {
    chain: RetrievalChain,
    document: DocumentFingerprint,
}

/// One loaded document plus its chat history.
///
/// `process_pdf` calls are serialised; queries keep using the previously
/// loaded chain until a new one is swapped in.
pub struct QaSession {
    options: QaOptions,
    prompt: PromptTemplate,
    extractor: Arc<dyn PdfExtractor>,
    embedder: Arc<dyn EmbeddingModel>,
    llm: Arc<dyn CompletionModel>,
    loaded: RwLock<Option<Arc<LoadedDocument>>>,
    history: RwLock<Vec<ChatTurn>>,
    processing: Mutex<()>,
}

impl QaSession {
    pub fn new(
        options: QaOptions,
        embedder: Arc<dyn EmbeddingModel>,
        llm: Arc<dyn CompletionModel>,
    ) -> Result<Self, QaError> {
        splitting::validate(&options.splitter)?;
        retriever::validate(&options.retriever)?;
        let prompt = PromptTemplate::parse(&options.prompt_template)?;

        Ok(Self {
            options,
            prompt,
            extractor: Arc::new(LopdfExtractor),
            embedder,
            llm,
            loaded: RwLock::new(None),
            history: RwLock::new(Vec::new()),
            processing: Mutex::new(()),
        })
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn PdfExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub async fn is_ready(&self) -> bool {
        self.loaded.read().await.is_some()
    }

    pub async fn document(&self) -> Option<DocumentFingerprint> {
        self.loaded
            .read()
            .await
            .as_ref()
            .map(|loaded| loaded.document.clone())
    }

    pub async fn history(&self) -> Vec<ChatTurn> {
        self.history.read().await.clone()
    }

    pub async fn clear_history(&self) {
        self.history.write().await.clear();
    }

    /// Loads, splits, embeds and indexes `path`, replacing any previous document.
    ///
    /// On failure the session is left without a document.
    pub async fn process_pdf(&self, path: &Path) -> Result<DocumentFingerprint, QaError> {
        let _guard = self.processing.lock().await;
        let started = Instant::now();
        info!(path = %path.display(), "processing pdf");

        match self.build(path).await {
            Ok(loaded) => {
                let document = loaded.document.clone();
                *self.loaded.write().await = Some(Arc::new(loaded));
                if self.options.history.reset_on_reprocess {
                    self.history.write().await.clear();
                }

                info!(
                    path = %path.display(),
                    page_count = document.page_count,
                    chunk_count = document.chunk_count,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "pdf ready for questions"
                );
                Ok(document)
            }
            Err(failure) => {
                *self.loaded.write().await = None;
                error!(path = %path.display(), error = %failure, "pdf processing failed");
                Err(failure)
            }
        }
    }

    async fn build(&self, path: &Path) -> Result<LoadedDocument, QaError> {
        let extractor = self.extractor.clone();
        let owned_path = path.to_path_buf();
        let pages = tokio::task::spawn_blocking(move || extractor.extract_pages(&owned_path))
            .await
            .map_err(|join| QaError::Load(format!("extraction task failed: {join}")))
            .and_then(|result| result)
            .map_err(|source| QaError::at_stage(Stage::Load, source))?;
        let checksum = digest_file(path)
            .await
            .map_err(|source| QaError::at_stage(Stage::Load, source))?;
        info!(page_count = pages.len(), "loaded pages");

        let source_path = path.to_string_lossy().to_string();
        let chunks = split_pages(&pages, &source_path, &self.options.splitter)
            .map_err(|source| QaError::at_stage(Stage::Split, source))?;
        if chunks.is_empty() {
            return Err(QaError::at_stage(
                Stage::Split,
                QaError::Split("document produced no chunks".to_string()),
            ));
        }
        info!(
            chunk_count = chunks.len(),
            chunk_size = self.options.splitter.chunk_size,
            chunk_overlap = self.options.splitter.chunk_overlap,
            "split document"
        );

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self
            .embedder
            .embed_documents(&texts)
            .await
            .map_err(|source| QaError::at_stage(Stage::Embed, source))?;

        let chunk_count = chunks.len();
        let store = MemoryVectorStore::from_embeddings(chunks, embeddings)
            .map_err(|source| QaError::at_stage(Stage::Index, source))?;
        info!(entries = store.len(), dimensions = store.dimensions(), "built vector store");

        let retriever = Retriever::new(store, self.embedder.clone(), self.options.retriever)
            .map_err(|source| QaError::at_stage(Stage::Chain, source))?;
        if self.options.probe_llm {
            self.llm
                .complete(PROBE_PROMPT)
                .await
                .map_err(|source| QaError::at_stage(Stage::Chain, source))?;
        }
        let chain = RetrievalChain::new(retriever, self.llm.clone(), self.prompt.clone());

        let title = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(source_path.as_str())
            .to_string();

        Ok(LoadedDocument {
            chain,
            document: DocumentFingerprint {
                document_id: generate_document_id(&source_path),
                title,
                source_path,
                checksum,
                page_count: pages.len(),
                chunk_count,
                ingested_at: Utc::now(),
            },
        })
    }

    /// Answers `question` from the loaded document and records the turn.
    pub async fn query_pdf(&self, question: &str) -> Result<QueryAnswer, QaError> {
        let loaded = self
            .loaded
            .read()
            .await
            .clone()
            .ok_or(QaError::NotInitialized)?;

        let question = question.trim();
        if question.is_empty() {
            return Err(QaError::InvalidArgument("question is empty".to_string()));
        }

        let history = self.history.read().await.clone();
        let started = Instant::now();
        let output = loaded.chain.invoke(question, &history).await?;

        self.push_turn(ChatTurn {
            question: question.to_string(),
            answer: output.answer.clone(),
        })
        .await;

        info!(
            k = loaded.chain.retriever().config().k,
            sources = output.context.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "answered question"
        );

        Ok(QueryAnswer {
            answer: output.answer,
            sources: output.context.iter().map(Source::from).collect(),
        })
    }

    async fn push_turn(&self, turn: ChatTurn) {
        let mut history = self.history.write().await;
        history.push(turn);
        if let Some(max_turns) = self.options.history.max_turns {
            let excess = history.len().saturating_sub(max_turns);
            history.drain(..excess);
        }
    }
}

async fn digest_file(path: &Path) -> Result<String, QaError> {
    let bytes = tokio::fs::read(path).await?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

fn generate_document_id(source_path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_path.as_bytes());
    format!("{:x}", hasher.finalize())
}
