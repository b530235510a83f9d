use crate::embeddings::{Embedder, Embedding};
use crate::generation::Generator;
use anyhow::{Context, Result};
use futures::stream::{self, StreamExt, TryStreamExt};
use log::debug;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_CHAT_MODEL: &str = "gpt-4o";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 64;
const DEFAULT_EMBEDDING_CONCURRENCY: usize = 4;

/// Configuration for the OpenAI API
#[derive(Clone, Debug)]
pub struct OpenAIConfig {
    pub api_key: String,
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    /// Requested vector length; the model's native length when unset
    pub embedding_dimensions: Option<usize>,
    /// Texts sent per embeddings request
    pub embedding_batch_size: usize,
    /// Embeddings requests allowed in flight at once
    pub embedding_concurrency: usize,
    pub temperature: f32,
}

impl OpenAIConfig {
    /// Create a new configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY").context("OPENAI_API_KEY not set")?;

        let base_url = env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let chat_model =
            env::var("OPENAI_CHAT_MODEL").unwrap_or_else(|_| DEFAULT_CHAT_MODEL.to_string());
        let embedding_model = env::var("OPENAI_EMBEDDING_MODEL")
            .unwrap_or_else(|_| DEFAULT_EMBEDDING_MODEL.to_string());

        let embedding_dimensions = parse_var::<usize>("OPENAI_EMBEDDING_DIMENSIONS")?;
        let embedding_batch_size = parse_var::<usize>("OPENAI_EMBEDDING_BATCH_SIZE")?
            .unwrap_or(DEFAULT_EMBEDDING_BATCH_SIZE)
            .max(1);
        let embedding_concurrency = parse_var::<usize>("OPENAI_EMBEDDING_CONCURRENCY")?
            .unwrap_or(DEFAULT_EMBEDDING_CONCURRENCY)
            .max(1);

        Ok(OpenAIConfig {
            api_key,
            base_url,
            chat_model,
            embedding_model,
            embedding_dimensions,
            embedding_batch_size,
            embedding_concurrency,
            temperature: 0.0,
        })
    }
}

fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("{} has an invalid value: {}", name, value)),
        Err(_) => Ok(None),
    }
}

/// Native vector length of the known OpenAI embedding models
fn native_dimension(model: &str) -> usize {
    match model {
        "text-embedding-3-large" => 3072,
        _ => 1536,
    }
}

/// Client for interacting with the OpenAI API
#[derive(Clone)]
pub struct OpenAIClient {
    config: OpenAIConfig,
    client: reqwest::Client,
}

impl OpenAIClient {
    /// Create a new OpenAI client sharing the process-wide HTTP client
    pub fn new(config: OpenAIConfig, client: reqwest::Client) -> Self {
        OpenAIClient { config, client }
    }

    /// Send one embeddings request for a batch of texts
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let request = EmbeddingRequest {
            model: &self.config.embedding_model,
            input: texts,
            dimensions: self.config.embedding_dimensions,
        };

        let url = format!("{}/embeddings", self.config.base_url);
        debug!("Requesting embeddings for {} texts", texts.len());

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow::anyhow!(
                "API request failed: {} {}",
                status,
                error_text
            ));
        }

        let response_data: EmbeddingResponse = response.json().await?;
        response_data.into_embeddings(texts.len())
    }

    /// Send a chat completion request with a single user message
    pub async fn complete(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.chat_model,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
            temperature: self.config.temperature,
        };

        let url = format!("{}/chat/completions", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow::anyhow!(
                "API request failed: {} {}",
                status,
                error_text
            ));
        }

        let response_data: ChatResponse = response.json().await?;
        response_data.into_answer()
    }
}

impl Embedder for OpenAIClient {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let batches: Vec<&[String]> = texts.chunks(self.config.embedding_batch_size).collect();
        debug!(
            "Embedding {} texts in {} batches ({} in flight)",
            texts.len(),
            batches.len(),
            self.config.embedding_concurrency
        );

        // `buffered` keeps results in batch order
        let embeddings: Vec<Vec<Embedding>> = stream::iter(batches)
            .map(|batch| self.embed_batch(batch))
            .buffered(self.config.embedding_concurrency)
            .try_collect()
            .await?;

        Ok(embeddings.into_iter().flatten().collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Embedding> {
        let mut embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .pop()
            .ok_or_else(|| anyhow::anyhow!("No embedding returned for query"))
    }

    fn dimension(&self) -> usize {
        self.config
            .embedding_dimensions
            .unwrap_or_else(|| native_dimension(&self.config.embedding_model))
    }

    fn model_name(&self) -> &str {
        &self.config.embedding_model
    }
}

impl Generator for OpenAIClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.complete(prompt).await
    }

    fn model_name(&self) -> &str {
        &self.config.chat_model
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize, Debug)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize, Debug)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl EmbeddingResponse {
    /// Order items by their `index` and check one came back per input
    fn into_embeddings(mut self, expected: usize) -> Result<Vec<Embedding>> {
        if self.data.len() != expected {
            return Err(anyhow::anyhow!(
                "Expected {} embeddings, received {}",
                expected,
                self.data.len()
            ));
        }
        self.data.sort_by_key(|item| item.index);
        Ok(self
            .data
            .into_iter()
            .map(|item| Embedding::new(item.embedding))
            .collect())
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize, Debug)]
struct ResponseMessage {
    content: Option<String>,
}

impl ChatResponse {
    fn into_answer(self) -> Result<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| anyhow::anyhow!("No response generated"))
    }
}
