use crate::chunking::{TextChunk, TextSplitter};
use crate::config::RagConfig;
use crate::database::{CollectionHandle, ScoredChunk, VectorStore};
use crate::document::Document;
use crate::embeddings::Embedder;
use crate::error::{RagError, Result, Stage};
use crate::generation::Generator;
use crate::prompt::{assemble, Prompt};
use log::{debug, info, warn};

/// The answer to a question together with what it was generated from
#[derive(Debug, Clone)]
pub struct RagAnswer {
    pub answer: String,
    /// Retrieved chunks, in retrieval order
    pub sources: Vec<ScoredChunk>,
    pub prompt: Prompt,
}

/// RAG (Retrieval-Augmented Generation) engine
pub struct RagEngine<E, S, G> {
    embedder: E,
    store: S,
    generator: G,
    http: reqwest::Client,
}

impl<E, S, G> RagEngine<E, S, G>
where
    E: Embedder,
    S: VectorStore,
    G: Generator,
{
    /// Create a new RAG engine
    pub fn new(embedder: E, store: S, generator: G) -> Self {
        RagEngine {
            embedder,
            store,
            generator,
            http: reqwest::Client::new(),
        }
    }

    /// Fetch web sources with an existing HTTP client instead of a new one
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run the whole pipeline for a configuration: load, split, index,
    /// retrieve, prompt and generate. Stops at the first failing stage.
    pub async fn run(&self, config: &RagConfig) -> Result<RagAnswer> {
        let splitter = TextSplitter::new(config.chunk_size, config.chunk_overlap)
            .map_err(RagError::Config)?;

        enter(Stage::Loading);
        let documents = Document::load(&config.source, &self.http)
            .await
            .map_err(RagError::Load)?;
        info!(
            "Loaded {} documents from {}",
            documents.len(),
            config.source.location()
        );

        enter(Stage::Splitting);
        let chunks = splitter.split_documents(&documents);
        if chunks.is_empty() {
            warn!("No text to index in {}", config.source.location());
        }
        info!(
            "Split into {} chunks ({} chars, {} overlap)",
            chunks.len(),
            splitter.chunk_size(),
            splitter.chunk_overlap()
        );
        drop(documents);

        let collection = self.index(chunks, &config.collection).await?;

        let answer = self
            .answer(
                &collection,
                &config.question,
                config.top_k,
                config.max_context_tokens,
            )
            .await?;

        enter(Stage::Done);
        Ok(answer)
    }

    /// Embed chunks and rebuild the named collection from them
    pub async fn index(
        &self,
        chunks: Vec<TextChunk>,
        collection: &str,
    ) -> Result<CollectionHandle> {
        enter(Stage::Indexing);

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self
            .embedder
            .embed_documents(&texts)
            .await
            .map_err(|cause| RagError::Embedding {
                stage: Stage::Indexing,
                cause,
            })?;

        let dimension = embeddings
            .first()
            .map(|embedding| embedding.dimension())
            .unwrap_or_else(|| self.embedder.dimension());

        let handle = self
            .store
            .build(collection, dimension, chunks, embeddings)
            .await
            .map_err(|cause| RagError::Store {
                stage: Stage::Indexing,
                cause,
            })?;

        info!(
            "Indexed {} chunks into {} with {}",
            handle.points,
            handle.name,
            self.embedder.model_name()
        );
        Ok(handle)
    }

    /// Find the chunks closest to a question, embedded with the indexing model
    pub async fn retrieve(
        &self,
        collection: &CollectionHandle,
        question: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        enter(Stage::Retrieving);

        let query = self
            .embedder
            .embed_query(question)
            .await
            .map_err(|cause| RagError::Embedding {
                stage: Stage::Retrieving,
                cause,
            })?;

        let chunks = self
            .store
            .search(collection, &query, top_k)
            .await
            .map_err(|cause| RagError::Store {
                stage: Stage::Retrieving,
                cause,
            })?;

        info!("Retrieved {} chunks", chunks.len());
        for scored in &chunks {
            debug!(
                "  #{} score={:.4} source={} page={:?}",
                scored.chunk.chunk_index, scored.score, scored.chunk.document_id, scored.chunk.page
            );
        }

        Ok(chunks)
    }

    /// Answer a question from an indexed collection
    pub async fn answer(
        &self,
        collection: &CollectionHandle,
        question: &str,
        top_k: usize,
        max_context_tokens: usize,
    ) -> Result<RagAnswer> {
        let sources = self.retrieve(collection, question, top_k).await?;

        enter(Stage::Prompting);
        let prompt = assemble(&sources, question, max_context_tokens);
        debug!(
            "Prompt uses {} chunks (~{} tokens of context)",
            prompt.chunks_used, prompt.context_tokens
        );

        let answer = self.generate(&prompt.text).await?;

        Ok(RagAnswer {
            answer,
            sources,
            prompt,
        })
    }

    /// Send a prompt straight to the generator, without retrieval
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        enter(Stage::Generating);
        debug!("Generating with {}", self.generator.model_name());

        self.generator
            .generate(prompt)
            .await
            .map_err(RagError::Generation)
    }
}

fn enter(stage: Stage) {
    info!("Pipeline stage: {}", stage);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Source;
    use crate::embeddings::Embedding;
    use crate::memory::MemoryStore;
    use std::cell::{Cell, RefCell};
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    use std::io::Write;
    use std::path::PathBuf;
    use url::Url;

    const DIMENSION: usize = 1 << 16;

    /// Bag-of-words embedder: each word bumps one hashed bucket
    #[derive(Default)]
    struct HashEmbedder {
        calls: Cell<usize>,
        fail: bool,
    }

    impl HashEmbedder {
        fn embed(text: &str) -> Embedding {
            let mut values = vec![0.0; DIMENSION];
            for word in text
                .split(|c: char| !c.is_alphanumeric())
                .filter(|w| !w.is_empty())
            {
                let mut hasher = DefaultHasher::new();
                word.to_lowercase().hash(&mut hasher);
                values[(hasher.finish() % DIMENSION as u64) as usize] += 1.0;
            }
            Embedding::new(values)
        }
    }

    impl Embedder for HashEmbedder {
        async fn embed_documents(&self, texts: &[String]) -> anyhow::Result<Vec<Embedding>> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(anyhow::anyhow!("service unavailable"));
            }
            Ok(texts.iter().map(|t| Self::embed(t)).collect())
        }

        async fn embed_query(&self, text: &str) -> anyhow::Result<Embedding> {
            self.calls.set(self.calls.get() + 1);
            Ok(Self::embed(text))
        }

        fn dimension(&self) -> usize {
            DIMENSION
        }

        fn model_name(&self) -> &str {
            "hash-bow"
        }
    }

    /// Answers with the context section of the prompt it receives
    #[derive(Default)]
    struct EchoGenerator {
        prompts: RefCell<Vec<String>>,
        fail: bool,
    }

    impl Generator for EchoGenerator {
        async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
            self.prompts.borrow_mut().push(prompt.to_string());
            if self.fail {
                return Err(anyhow::anyhow!("model overloaded"));
            }
            let context = prompt
                .split("<context>")
                .nth(1)
                .and_then(|rest| rest.split("</context>").next())
                .unwrap_or("")
                .trim();
            if context.is_empty() {
                Ok("I don't know.".to_string())
            } else {
                Ok(format!("According to the document: {}", context))
            }
        }

        fn model_name(&self) -> &str {
            "echo"
        }
    }

    type TestEngine = RagEngine<HashEmbedder, MemoryStore, EchoGenerator>;

    fn engine() -> TestEngine {
        RagEngine::new(
            HashEmbedder::default(),
            MemoryStore::new(),
            EchoGenerator::default(),
        )
    }

    fn chunk(index: usize, text: &str) -> TextChunk {
        TextChunk {
            text: text.to_string(),
            token_count: crate::chunking::estimate_token_count(text),
            document_id: "catalog".to_string(),
            page: Some(0),
            chunk_index: index,
            start_position: 0,
        }
    }

    fn catalog_chunks() -> Vec<TextChunk> {
        vec![
            chunk(0, "Math courses: Calculus II, Linear Algebra II, Differential Equations."),
            chunk(1, "Art courses: Ceramics, Drawing and Painting, Photography."),
            chunk(2, "Science courses: Organic Chemistry, Physics with lab work."),
        ]
    }

    #[tokio::test]
    async fn test_end_to_end_answers_from_document() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        write!(
            file,
            "Math courses: Calculus II, Linear Algebra II, Differential Equations."
        )
        .unwrap();

        let engine = engine();
        let config = RagConfig::new(
            Source::Text(file.path().to_path_buf()),
            "What math courses are available?",
        );

        let result = engine.run(&config).await.unwrap();

        assert_eq!(result.sources.len(), 1);
        assert!(result.sources[0].chunk.text.contains("Calculus II"));
        assert!(!result.answer.is_empty());
        assert!(!result.answer.contains("don't know"));
        assert!(result.answer.contains("Linear Algebra II"));
        assert_eq!(result.prompt.chunks_used, 1);
    }

    #[tokio::test]
    async fn test_missing_file_stops_before_indexing() {
        let engine = engine();
        let config = RagConfig::new(
            Source::Pdf(PathBuf::from("data/no-such-catalog.pdf")),
            "What math courses are available?",
        );

        let err = engine.run(&config).await.unwrap_err();

        assert!(matches!(err, RagError::Load(_)));
        assert_eq!(err.stage(), Stage::Loading);
        assert_eq!(engine.embedder.calls.get(), 0);
        assert!(engine.generator.prompts.borrow().is_empty());
        assert!(!engine
            .store()
            .collection_exists(&config.collection)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_unreachable_url_stops_before_indexing() {
        let engine = engine();
        let config = RagConfig::new(
            Source::Web(Url::parse("http://127.0.0.1:1/").unwrap()),
            "Which generative AI tools are approved?",
        );

        let err = engine.run(&config).await.unwrap_err();

        assert!(matches!(err, RagError::Load(_)));
        assert_eq!(err.stage(), Stage::Loading);
        assert_eq!(engine.embedder.calls.get(), 0);
        assert!(engine.generator.prompts.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_splitter_settings_fail_before_loading() {
        let engine = engine();
        let mut config = RagConfig::new(Source::Pdf(PathBuf::from("missing.pdf")), "q");
        config.chunk_overlap = config.chunk_size;

        let err = engine.run(&config).await.unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
    }

    #[tokio::test]
    async fn test_retrieval_is_deterministic() {
        let engine = engine();
        let handle = engine.index(catalog_chunks(), "catalog").await.unwrap();

        let first = engine.retrieve(&handle, "Which math courses?", 2).await.unwrap();
        let second = engine.retrieve(&handle, "Which math courses?", 2).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first[0].chunk.chunk_index, 0);
    }

    #[tokio::test]
    async fn test_reindexing_drops_previous_data() {
        let engine = engine();
        engine.index(catalog_chunks(), "catalog").await.unwrap();

        let replacement = vec![chunk(0, "History courses: World History, Economics.")];
        let handle = engine.index(replacement, "catalog").await.unwrap();

        assert_eq!(handle.points, 1);
        assert_eq!(engine.store().len("catalog").await, Some(1));

        let results = engine.retrieve(&handle, "math courses", 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].chunk.text.starts_with("History courses"));
    }

    #[tokio::test]
    async fn test_embedding_failure_reports_indexing_stage() {
        let engine = RagEngine::new(
            HashEmbedder {
                fail: true,
                ..Default::default()
            },
            MemoryStore::new(),
            EchoGenerator::default(),
        );

        let err = engine.index(catalog_chunks(), "catalog").await.unwrap_err();
        assert_eq!(err.stage(), Stage::Indexing);
        assert!(!engine.store().collection_exists("catalog").await.unwrap());
    }

    #[tokio::test]
    async fn test_generation_failure_is_reported() {
        let engine = RagEngine::new(
            HashEmbedder::default(),
            MemoryStore::new(),
            EchoGenerator {
                fail: true,
                ..Default::default()
            },
        );
        let handle = engine.index(catalog_chunks(), "catalog").await.unwrap();

        let err = engine
            .answer(&handle, "Which art courses?", 2, 1000)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Generation(_)));
        assert_eq!(err.stage(), Stage::Generating);
    }

    #[tokio::test]
    async fn test_answer_respects_context_budget() {
        let engine = engine();
        let handle = engine.index(catalog_chunks(), "catalog").await.unwrap();

        let result = engine
            .answer(&handle, "Which science courses?", 3, 15)
            .await
            .unwrap();

        assert_eq!(result.sources.len(), 3);
        assert_eq!(result.prompt.chunks_used, 1);
        assert_eq!(result.prompt.chunks_dropped, 2);
        assert!(result.answer.contains("Organic Chemistry"));
    }
}
