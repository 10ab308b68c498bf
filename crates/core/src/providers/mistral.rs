use crate::traits::{CompletionModel, EmbeddingModel};
use crate::QaError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.mistral.ai";

/// Statuses that cannot succeed on a second attempt.
const NON_RETRYABLE: [u16; 8] = [400, 401, 403, 404, 405, 406, 407, 409];

#[derive(Debug, Clone)]
pub struct MistralConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for MistralConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub max_retries: u32,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: "codestral-latest".to_string(),
            temperature: 0.1,
            max_tokens: None,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub model: String,
    pub batch_size: usize,
    /// Character budget for one request; a single longer text is still sent alone.
    pub max_batch_chars: usize,
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "mistral-embed".to_string(),
            batch_size: 512,
            max_batch_chars: 40_000,
            max_retries: 0,
        }
    }
}

#[derive(Debug)]
enum RequestFailure {
    Status { status: StatusCode, body: String },
    Transport(reqwest::Error),
    Decode(String),
}

impl RequestFailure {
    fn retryable(&self) -> bool {
        match self {
            RequestFailure::Status { status, .. } => !NON_RETRYABLE.contains(&status.as_u16()),
            RequestFailure::Transport(_) => true,
            RequestFailure::Decode(_) => false,
        }
    }
}

impl fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestFailure::Status { status, body } if body.is_empty() => write!(f, "{status}"),
            RequestFailure::Status { status, body } => write!(f, "{status}: {body}"),
            RequestFailure::Transport(error) => write!(f, "{error}"),
            RequestFailure::Decode(details) => write!(f, "invalid response body: {details}"),
        }
    }
}

/// Shared HTTP plumbing for the Mistral-compatible REST API.
#[derive(Debug, Clone)]
pub struct MistralClient {
    base: Url,
    api_key: Option<String>,
    http: Client,
}

impl MistralClient {
    pub fn new(config: &MistralConfig) -> Result<Self, QaError> {
        let mut base = Url::parse(&config.base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|error| QaError::InvalidArgument(format!("http client: {error}")))?;

        Ok(Self {
            base,
            api_key: config.api_key.clone().filter(|key| !key.trim().is_empty()),
            http,
        })
    }

    async fn post_json<B, T>(&self, path: &str, body: &B, max_retries: u32) -> Result<T, RequestFailure>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = self
            .base
            .join(path)
            .map_err(|error| RequestFailure::Decode(error.to_string()))?;

        let mut attempt = 0u32;
        loop {
            match self.send_once(&url, body).await {
                Ok(parsed) => return Ok(parsed),
                Err(failure) if failure.retryable() && attempt < max_retries => {
                    attempt += 1;
                    warn!(%url, attempt, max_retries, error = %failure, "retrying request");
                }
                Err(failure) => return Err(failure),
            }
        }
    }

    async fn send_once<B, T>(&self, url: &Url, body: &B) -> Result<T, RequestFailure>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let mut request = self.http.post(url.clone()).json(body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(RequestFailure::Transport)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RequestFailure::Status {
                status,
                body: body.trim().to_string(),
            });
        }

        let bytes = response.bytes().await.map_err(RequestFailure::Transport)?;
        serde_json::from_slice(&bytes).map_err(|error| RequestFailure::Decode(error.to_string()))
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct MistralEmbeddings {
    client: MistralClient,
    config: EmbeddingConfig,
}

impl MistralEmbeddings {
    pub fn new(client: MistralClient, config: EmbeddingConfig) -> Self {
        Self { client, config }
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, QaError> {
        let request = EmbeddingRequest {
            model: &self.config.model,
            input: batch,
        };

        let mut response: EmbeddingResponse = self
            .client
            .post_json("v1/embeddings", &request, self.config.max_retries)
            .await
            .map_err(|failure| QaError::Embedding(failure.to_string()))?;

        if response.data.len() != batch.len() {
            return Err(QaError::Embedding(format!(
                "requested {} embeddings but received {}",
                batch.len(),
                response.data.len()
            )));
        }

        response.data.sort_by_key(|datum| datum.index);
        Ok(response.data.into_iter().map(|datum| datum.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingModel for MistralEmbeddings {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, QaError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in batches(texts, self.config.batch_size, self.config.max_batch_chars) {
            debug!(model = %self.config.model, batch = batch.len(), "embedding batch");
            vectors.extend(self.embed_batch(batch).await?);
        }
        Ok(vectors)
    }
}

/// Groups consecutive texts so each group stays within both the count and the
/// character limit.
fn batches(texts: &[String], max_count: usize, max_chars: usize) -> Vec<&[String]> {
    let max_count = max_count.max(1);
    let mut groups = Vec::new();
    let mut start = 0usize;
    let mut chars = 0usize;

    for (index, text) in texts.iter().enumerate() {
        let length = text.chars().count();
        let count = index - start;
        if count > 0 && (count == max_count || chars + length > max_chars) {
            groups.push(&texts[start..index]);
            start = index;
            chars = 0;
        }
        chars += length;
    }
    if start < texts.len() {
        groups.push(&texts[start..]);
    }

    groups
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MistralChat {
    client: MistralClient,
    config: CompletionConfig,
}

impl MistralChat {
    pub fn new(client: MistralClient, config: CompletionConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl CompletionModel for MistralChat {
    async fn complete(&self, prompt: &str) -> Result<String, QaError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response: ChatResponse = self
            .client
            .post_json("v1/chat/completions", &request, self.config.max_retries)
            .await
            .map_err(|failure| QaError::Completion(failure.to_string()))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| QaError::Completion("model returned an empty completion".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone)]
    struct Stub {
        hits: Arc<AtomicUsize>,
        fail_first: usize,
        failure: AxumStatus,
        max_input_chars: usize,
    }

    impl Stub {
        fn new(fail_first: usize, failure: AxumStatus) -> Self {
            Self {
                hits: Arc::new(AtomicUsize::new(0)),
                fail_first,
                failure,
                max_input_chars: usize::MAX,
            }
        }
    }

    async fn chat(State(stub): State<Stub>, headers: HeaderMap, Json(body): Json<Value>) -> impl IntoResponse {
        let hit = stub.hits.fetch_add(1, Ordering::SeqCst);
        if headers.get("authorization").and_then(|value| value.to_str().ok()) != Some("Bearer test-key") {
            return (AxumStatus::UNAUTHORIZED, Json(json!({"message": "Unauthorized"})));
        }
        if hit < stub.fail_first {
            return (stub.failure, Json(json!({"message": "try later"})));
        }

        let prompt = body["messages"][0]["content"].as_str().unwrap_or_default();
        let reply = format!("echo: {prompt} @ {}", body["temperature"]);
        (
            AxumStatus::OK,
            Json(json!({"choices": [{"message": {"role": "assistant", "content": reply}}]})),
        )
    }

    async fn embeddings(State(stub): State<Stub>, Json(body): Json<Value>) -> impl IntoResponse {
        stub.hits.fetch_add(1, Ordering::SeqCst);
        let inputs = body["input"].as_array().cloned().unwrap_or_default();
        let total: usize = inputs
            .iter()
            .map(|text| text.as_str().unwrap_or_default().chars().count())
            .sum();
        if total > stub.max_input_chars {
            return (
                AxumStatus::BAD_REQUEST,
                Json(json!({"message": "Too many tokens in batch"})),
            );
        }
        let data: Vec<Value> = inputs
            .iter()
            .enumerate()
            .rev()
            .map(|(index, text)| {
                let length = text.as_str().unwrap_or_default().len() as f32;
                json!({"object": "embedding", "index": index, "embedding": [length, 1.0]})
            })
            .collect();
        (AxumStatus::OK, Json(json!({"data": data, "model": body["model"]})))
    }

    async fn spawn(stub: Stub) -> String {
        let router = Router::new()
            .route("/v1/chat/completions", post(chat))
            .route("/v1/embeddings", post(embeddings))
            .with_state(stub);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{address}")
    }

    fn client(base_url: String, api_key: &str) -> MistralClient {
        MistralClient::new(&MistralConfig {
            base_url,
            api_key: Some(api_key.to_string()),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn completion_retries_transient_failures() {
        let stub = Stub::new(2, AxumStatus::SERVICE_UNAVAILABLE);
        let hits = stub.hits.clone();
        let base = spawn(stub).await;

        let chat = MistralChat::new(client(base, "test-key"), CompletionConfig::default());
        let answer = chat.complete("hello").await.unwrap();

        assert_eq!(answer, "echo: hello @ 0.1");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn completion_gives_up_after_max_retries() {
        let stub = Stub::new(usize::MAX, AxumStatus::INTERNAL_SERVER_ERROR);
        let hits = stub.hits.clone();
        let base = spawn(stub).await;

        let config = CompletionConfig {
            max_retries: 2,
            ..CompletionConfig::default()
        };
        let chat = MistralChat::new(client(base, "test-key"), config);
        let error = chat.complete("hello").await.unwrap_err();

        assert!(matches!(error, QaError::Completion(_)));
        assert!(error.to_string().contains("500"));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn unauthorized_is_not_retried() {
        let stub = Stub::new(0, AxumStatus::OK);
        let hits = stub.hits.clone();
        let base = spawn(stub).await;

        let chat = MistralChat::new(client(base, "wrong-key"), CompletionConfig::default());
        let error = chat.complete("hello").await.unwrap_err();

        assert!(error.to_string().contains("401"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn embeddings_are_batched_and_reordered_by_index() {
        let stub = Stub::new(0, AxumStatus::OK);
        let hits = stub.hits.clone();
        let base = spawn(stub).await;

        let config = EmbeddingConfig {
            batch_size: 2,
            ..EmbeddingConfig::default()
        };
        let embedder = MistralEmbeddings::new(client(base, "test-key"), config);
        let texts = vec!["a".to_string(), "bb".to_string(), "ccc".to_string()];
        let vectors = embedder.embed_documents(&texts).await.unwrap();

        assert_eq!(vectors, vec![vec![1.0, 1.0], vec![2.0, 1.0], vec![3.0, 1.0]]);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn long_inputs_are_split_to_fit_the_request_budget() {
        let stub = Stub {
            max_input_chars: 300,
            ..Stub::new(0, AxumStatus::OK)
        };
        let hits = stub.hits.clone();
        let base = spawn(stub).await;

        let config = EmbeddingConfig {
            max_batch_chars: 250,
            ..EmbeddingConfig::default()
        };
        let embedder = MistralEmbeddings::new(client(base, "test-key"), config);
        let texts: Vec<String> = (0..30).map(|_| "x".repeat(100)).collect();
        let vectors = embedder.embed_documents(&texts).await.unwrap();

        assert_eq!(vectors.len(), 30);
        assert!(vectors.iter().all(|vector| vector == &vec![100.0, 1.0]));
        assert_eq!(hits.load(Ordering::SeqCst), 15);
    }

    #[tokio::test]
    async fn oversized_batch_is_rejected_without_retry() {
        let stub = Stub {
            max_input_chars: 300,
            ..Stub::new(0, AxumStatus::OK)
        };
        let hits = stub.hits.clone();
        let base = spawn(stub).await;

        let config = EmbeddingConfig {
            max_batch_chars: usize::MAX,
            max_retries: 3,
            ..EmbeddingConfig::default()
        };
        let embedder = MistralEmbeddings::new(client(base, "test-key"), config);
        let texts: Vec<String> = (0..30).map(|_| "x".repeat(100)).collect();
        let error = embedder.embed_documents(&texts).await.unwrap_err();

        assert!(error.to_string().contains("400"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn batches_respect_count_and_character_limits() {
        let texts: Vec<String> = ["aaaa", "bb", "cccccccc", "d", "e", "f"]
            .iter()
            .map(|text| text.to_string())
            .collect();

        let lengths = |groups: Vec<&[String]>| groups.iter().map(|group| group.len()).collect::<Vec<_>>();
        assert_eq!(lengths(batches(&texts, 512, 6)), vec![2, 1, 3]);
        assert_eq!(lengths(batches(&texts, 2, usize::MAX)), vec![2, 2, 2]);
        assert_eq!(lengths(batches(&texts, 0, 1)), vec![1, 1, 1, 1, 1, 1]);
        assert!(batches(&[], 512, 100).is_empty());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_embedding_failure() {
        let embedder = MistralEmbeddings::new(
            client("http://127.0.0.1:9".to_string(), "test-key"),
            EmbeddingConfig::default(),
        );
        let error = embedder.embed_query("hello").await.unwrap_err();
        assert!(matches!(error, QaError::Embedding(_)));
    }

    #[test]
    fn base_url_path_is_preserved_when_joining() {
        let client = client("http://localhost:8080/proxy".to_string(), "k");
        assert_eq!(
            client.base.join("v1/embeddings").unwrap().as_str(),
            "http://localhost:8080/proxy/v1/embeddings"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let result = MistralClient::new(&MistralConfig {
            base_url: "not a url".to_string(),
            ..MistralConfig::default()
        });
        assert!(matches!(result, Err(QaError::Url(_))));
    }
}
