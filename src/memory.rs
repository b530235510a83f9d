use crate::chunking::TextChunk;
use crate::database::{
    get_collection_name, validate_points, CollectionHandle, ScoredChunk, VectorStore,
};
use crate::embeddings::Embedding;
use anyhow::Result;
use log::{debug, info};
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-process vector store using brute-force cosine similarity.
///
/// Lives only as long as the process, which matches the rebuild-per-run
/// lifecycle of collections and lets the pipeline run without a Qdrant server.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<(TextChunk, Embedding)>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of points in a collection, if it exists
    pub async fn len(&self, name: &str) -> Option<usize> {
        let collections = self.collections.read().await;
        collections.get(&get_collection_name(name)).map(Vec::len)
    }
}

impl VectorStore for MemoryStore {
    async fn build(
        &self,
        name: &str,
        dimension: usize,
        chunks: Vec<TextChunk>,
        embeddings: Vec<Embedding>,
    ) -> Result<CollectionHandle> {
        validate_points(dimension, &chunks, &embeddings)?;
        let collection_name = get_collection_name(name);

        let points: Vec<(TextChunk, Embedding)> = chunks.into_iter().zip(embeddings).collect();
        let points_count = points.len();

        let mut collections = self.collections.write().await;
        if collections.insert(collection_name.clone(), points).is_some() {
            info!("Dropped existing collection {}", collection_name);
        }
        debug!("Stored {} points in {}", points_count, collection_name);

        Ok(CollectionHandle {
            name: collection_name,
            points: points_count,
            dimension,
        })
    }

    async fn search(
        &self,
        collection: &CollectionHandle,
        query: &Embedding,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let collections = self.collections.read().await;
        let points = collections
            .get(&collection.name)
            .ok_or_else(|| anyhow::anyhow!("Collection {} does not exist", collection.name))?;

        if query.dimension() != collection.dimension {
            return Err(anyhow::anyhow!(
                "Query has {} dimensions, collection {} expects {}",
                query.dimension(),
                collection.name,
                collection.dimension
            ));
        }

        let mut results: Vec<ScoredChunk> = points
            .iter()
            .map(|(chunk, embedding)| ScoredChunk {
                chunk: chunk.clone(),
                score: query.cosine_similarity(embedding),
            })
            .collect();

        // Highest score first, earlier chunks win ties
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
        });
        results.truncate(limit);

        Ok(results)
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let collections = self.collections.read().await;
        Ok(collections.contains_key(&get_collection_name(name)))
    }
}
