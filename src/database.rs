use crate::chunking::TextChunk;
use crate::embeddings::Embedding;
use anyhow::{Context, Result};
use log::{debug, info};
use qdrant_client::qdrant::{
    with_payload_selector, CreateCollectionBuilder, Distance, PointStruct, SearchPoints,
    UpsertPointsBuilder, Value, VectorParams, WithPayloadSelector,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::json;
use std::collections::HashMap;
use std::env;

const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";

/// An indexed collection, as returned by [`VectorStore::build`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionHandle {
    /// Name of the collection in the backing store
    pub name: String,
    /// Number of points stored
    pub points: usize,
    /// Length of every stored vector
    pub dimension: usize,
}

/// A retrieved chunk with its similarity to the query (higher is closer)
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: TextChunk,
    pub score: f32,
}

/// Storage for chunk embeddings supporting nearest-neighbour search
#[allow(async_fn_in_trait)]
pub trait VectorStore {
    /// Create a fresh collection holding `chunks` and their `embeddings`.
    ///
    /// Any existing collection with the same name is dropped first, so the
    /// result only ever contains the data of this call.
    async fn build(
        &self,
        name: &str,
        dimension: usize,
        chunks: Vec<TextChunk>,
        embeddings: Vec<Embedding>,
    ) -> Result<CollectionHandle>;

    /// Top `limit` chunks by descending similarity to `query`
    async fn search(
        &self,
        collection: &CollectionHandle,
        query: &Embedding,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>>;

    /// Check if a collection exists
    async fn collection_exists(&self, name: &str) -> Result<bool>;
}

/// Check that every chunk has a vector of the collection's dimension
pub(crate) fn validate_points(
    dimension: usize,
    chunks: &[TextChunk],
    embeddings: &[Embedding],
) -> Result<()> {
    if chunks.len() != embeddings.len() {
        return Err(anyhow::anyhow!(
            "Got {} chunks but {} embeddings",
            chunks.len(),
            embeddings.len()
        ));
    }
    if let Some(bad) = embeddings.iter().find(|e| e.dimension() != dimension) {
        return Err(anyhow::anyhow!(
            "Embedding has {} dimensions, collection expects {}",
            bad.dimension(),
            dimension
        ));
    }
    Ok(())
}

/// Configuration for Qdrant
pub struct QdrantConfig {
    pub url: String,
    pub api_key: Option<String>,
}

impl QdrantConfig {
    /// Create a new configuration from environment variables
    pub fn from_env() -> Self {
        let url = env::var("QDRANT_URL").unwrap_or_else(|_| DEFAULT_QDRANT_URL.to_string());
        let api_key = env::var("QDRANT_API_KEY").ok().filter(|key| !key.is_empty());

        QdrantConfig { url, api_key }
    }
}

/// Client for interacting with Qdrant
pub struct QdrantClient {
    client: Qdrant,
}

impl QdrantClient {
    /// Create a new Qdrant client
    pub fn new(config: QdrantConfig) -> Result<Self> {
        let config_builder = Qdrant::from_url(&config.url);
        let config_builder = if let Some(api_key) = config.api_key {
            config_builder.api_key(api_key)
        } else {
            config_builder
        };

        let client = config_builder
            .build()
            .with_context(|| format!("Failed to connect to Qdrant at {}", config.url))?;

        Ok(QdrantClient { client })
    }

    /// Create a new collection
    async fn create_collection(&self, collection_name: &str, dimension: usize) -> Result<()> {
        let create_collection = CreateCollectionBuilder::new(collection_name).vectors_config(
            VectorParams {
                size: dimension as u64,
                distance: Distance::Cosine.into(),
                ..Default::default()
            },
        );

        self.client
            .create_collection(create_collection)
            .await
            .with_context(|| format!("Failed to create collection {}", collection_name))?;

        Ok(())
    }

    /// Delete a collection
    async fn delete_collection(&self, collection_name: &str) -> Result<()> {
        self.client
            .delete_collection(collection_name.to_string())
            .await
            .with_context(|| format!("Failed to delete collection {}", collection_name))?;

        Ok(())
    }
}

impl VectorStore for QdrantClient {
    async fn build(
        &self,
        name: &str,
        dimension: usize,
        chunks: Vec<TextChunk>,
        embeddings: Vec<Embedding>,
    ) -> Result<CollectionHandle> {
        validate_points(dimension, &chunks, &embeddings)?;
        let collection_name = get_collection_name(name);

        if self.collection_exists(&collection_name).await? {
            info!("Dropping existing collection {}", collection_name);
            self.delete_collection(&collection_name).await?;
        }
        self.create_collection(&collection_name, dimension).await?;

        let points_count = chunks.len();
        if points_count > 0 {
            // Convert chunks and embeddings to points
            let points = chunks
                .into_iter()
                .zip(embeddings)
                .map(|(chunk, embedding)| {
                    let payload = Payload::try_from(json!({
                        "text": chunk.text,
                        "document_id": chunk.document_id,
                        "page": chunk.page,
                        "chunk_index": chunk.chunk_index,
                        "start_position": chunk.start_position,
                    }))?;

                    Ok(PointStruct::new(
                        chunk.chunk_index as u64,
                        embedding.values,
                        payload,
                    ))
                })
                .collect::<Result<Vec<PointStruct>>>()?;

            // Wait for the points to be indexed so the following search sees them
            let upsert_request =
                UpsertPointsBuilder::new(collection_name.clone(), points).wait(true);

            self.client
                .upsert_points(upsert_request)
                .await
                .with_context(|| {
                    format!("Failed to upsert points in collection {}", collection_name)
                })?;
        }

        debug!("Stored {} points in {}", points_count, collection_name);

        Ok(CollectionHandle {
            name: collection_name,
            points: points_count,
            dimension,
        })
    }

    #[allow(deprecated)]
    async fn search(
        &self,
        collection: &CollectionHandle,
        query: &Embedding,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let search_request = SearchPoints {
            collection_name: collection.name.clone(),
            vector: query.values.clone(),
            limit: limit as u64,
            with_payload: Some(WithPayloadSelector {
                selector_options: Some(with_payload_selector::SelectorOptions::Enable(true)),
            }),
            ..Default::default()
        };

        let search_response = self
            .client
            .search_points(search_request)
            .await
            .with_context(|| format!("Failed to search collection {}", collection.name))?;

        // Convert search results back to chunks
        let chunks = search_response
            .result
            .into_iter()
            .filter_map(|scored_point| {
                let chunk = chunk_from_payload(&scored_point.payload)?;
                Some(ScoredChunk {
                    chunk,
                    score: scored_point.score,
                })
            })
            .collect();

        Ok(chunks)
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let collection_name = get_collection_name(name);

        self.client
            .collection_exists(collection_name.clone())
            .await
            .with_context(|| {
                format!("Failed to check collection existence: {}", collection_name)
            })
    }
}

/// Rebuild a chunk from a point payload; points without text are skipped
fn chunk_from_payload(payload: &HashMap<String, Value>) -> Option<TextChunk> {
    let text = payload.get("text")?.as_str()?.to_string();
    let integer = |key: &str| {
        payload
            .get(key)
            .and_then(|v| v.as_integer())
            .map(|v| v as usize)
    };

    Some(TextChunk {
        token_count: crate::chunking::estimate_token_count(&text),
        document_id: payload
            .get("document_id")
            .and_then(|v| v.as_str())
            .cloned()
            .unwrap_or_default(),
        page: integer("page"),
        chunk_index: integer("chunk_index").unwrap_or(0),
        start_position: integer("start_position").unwrap_or(0),
        text,
    })
}

/// Normalize a collection name to lowercase alphanumerics and underscores
pub fn get_collection_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .to_lowercase()
}
