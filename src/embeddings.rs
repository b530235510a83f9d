use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Representation of a vector embedding
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Embedding { values }
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Cosine similarity in [-1, 1]; zero when either vector has no length
    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        debug_assert_eq!(self.values.len(), other.values.len());

        let dot: f32 = self.values.iter().zip(&other.values).map(|(x, y)| x * y).sum();
        let norm_a: f32 = self.values.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = other.values.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        dot / (norm_a * norm_b)
    }
}

/// A text embedding model.
///
/// Indexing and querying must go through the same implementation, otherwise
/// similarity scores between chunks and queries are meaningless.
#[allow(async_fn_in_trait)]
pub trait Embedder {
    /// Embed chunk texts for indexing, preserving input order
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    /// Embed a single query for searching
    async fn embed_query(&self, text: &str) -> Result<Embedding>;

    /// Length of the vectors this model produces
    fn dimension(&self) -> usize;

    fn model_name(&self) -> &str;
}
