use crate::chunking::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::document::Source;
use crate::prompt::DEFAULT_MAX_CONTEXT_TOKENS;

/// PDF read when no path is given
pub const DEFAULT_PDF_PATH: &str = "data/course_catalog.pdf";
pub const DEFAULT_PDF_QUESTION: &str = "If I have completed Linear Algebra Honors and Multivariable Calculus courses at Choate Rosemary Hall, what other Math courses am I eligible to take?";

/// Web page read when no URL is given
pub const DEFAULT_WEB_URL: &str = "https://www.choate.edu/ai/gen";
pub const DEFAULT_WEB_QUESTION: &str =
    "What AI tools are formally approved by Choate Rosemary Hall?";

pub const DEFAULT_TOPIC: &str = "lawn";
pub const DEFAULT_COLLECTION: &str = "contextual_search";
pub const DEFAULT_TOP_K: usize = 4;

/// Everything one pipeline run needs to know about its input and tuning
#[derive(Debug, Clone)]
pub struct RagConfig {
    pub source: Source,
    pub question: String,
    /// Maximum chunk length, in characters
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks
    pub chunk_overlap: usize,
    /// Chunks retrieved per question
    pub top_k: usize,
    /// Estimated token budget for retrieved context in the prompt
    pub max_context_tokens: usize,
    /// Collection rebuilt by this run
    pub collection: String,
}

impl RagConfig {
    /// Configuration with default tuning for a source and question
    pub fn new(source: Source, question: impl Into<String>) -> Self {
        RagConfig {
            source,
            question: question.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            top_k: DEFAULT_TOP_K,
            max_context_tokens: DEFAULT_MAX_CONTEXT_TOKENS,
            collection: DEFAULT_COLLECTION.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_defaults() {
        let config = RagConfig::new(Source::Pdf(PathBuf::from(DEFAULT_PDF_PATH)), "q");
        assert_eq!(config.chunk_size, 2000);
        assert_eq!(config.chunk_overlap, 200);
        assert_eq!(config.top_k, 4);
        assert_eq!(config.collection, "contextual_search");
        assert_eq!(config.question, "q");
    }
}
