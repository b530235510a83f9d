use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dotenv::dotenv;
use log::info;
use std::path::PathBuf;
use url::Url;

use contextual_search::config::{
    RagConfig, DEFAULT_COLLECTION, DEFAULT_PDF_PATH, DEFAULT_PDF_QUESTION, DEFAULT_TOPIC,
    DEFAULT_TOP_K, DEFAULT_WEB_QUESTION, DEFAULT_WEB_URL,
};
use contextual_search::chunking::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use contextual_search::database::{QdrantClient, QdrantConfig, VectorStore};
use contextual_search::document::Source;
use contextual_search::generation::Generator;
use contextual_search::memory::MemoryStore;
use contextual_search::openai::{OpenAIClient, OpenAIConfig};
use contextual_search::prompt::{topic_prompt, DEFAULT_MAX_CONTEXT_TOKENS};
use contextual_search::rag::RagEngine;

/// Answer questions about a PDF, text file or web page with retrieval-augmented generation
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    tuning: Tuning,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ask a question about a PDF document
    Pdf {
        /// Path to the PDF file
        #[arg(default_value = DEFAULT_PDF_PATH)]
        path: PathBuf,
        #[arg(short, long, default_value = DEFAULT_PDF_QUESTION)]
        question: String,
    },
    /// Ask a question about a web page
    Web {
        /// URL of the page to load
        #[arg(default_value = DEFAULT_WEB_URL)]
        url: Url,
        #[arg(short, long, default_value = DEFAULT_WEB_QUESTION)]
        question: String,
    },
    /// Ask a question about a text or PDF file, detected from its extension
    File {
        path: PathBuf,
        #[arg(short, long)]
        question: String,
    },
    /// Ask the model directly, without any document
    Simple {
        #[arg(short, long, default_value = DEFAULT_TOPIC)]
        topic: String,
    },
}

#[derive(Args, Debug)]
struct Tuning {
    /// Maximum chunk length in characters
    #[arg(long, global = true, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Characters shared by consecutive chunks
    #[arg(long, global = true, default_value_t = DEFAULT_CHUNK_OVERLAP)]
    chunk_overlap: usize,

    /// Number of chunks retrieved for the question
    #[arg(long, global = true, default_value_t = DEFAULT_TOP_K)]
    top_k: usize,

    /// Token budget for retrieved context in the prompt
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_CONTEXT_TOKENS)]
    max_context_tokens: usize,

    /// Collection dropped and rebuilt by this run
    #[arg(long, global = true, default_value = DEFAULT_COLLECTION)]
    collection: String,

    /// Keep vectors in memory instead of Qdrant
    #[arg(long, global = true)]
    in_memory: bool,

    /// Print the retrieved chunks after the answer
    #[arg(long, global = true)]
    show_sources: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    info!("Running contextual search...");

    run(cli).await
}

async fn run(cli: Cli) -> Result<()> {
    let (source, question) = match cli.command {
        Command::Pdf { path, question } => (Source::Pdf(path), question),
        Command::Web { url, question } => (Source::Web(url), question),
        Command::File { path, question } => (Source::File(path), question),
        Command::Simple { topic } => return run_simple(&topic).await,
    };

    let tuning = cli.tuning;
    let config = RagConfig {
        source,
        question,
        chunk_size: tuning.chunk_size,
        chunk_overlap: tuning.chunk_overlap,
        top_k: tuning.top_k,
        max_context_tokens: tuning.max_context_tokens,
        collection: tuning.collection,
    };

    let openai_config = OpenAIConfig::from_env().context("Missing OpenAI settings")?;
    let http = reqwest::Client::new();
    let openai = OpenAIClient::new(openai_config, http.clone());

    if tuning.in_memory {
        let engine =
            RagEngine::new(openai.clone(), MemoryStore::new(), openai).with_http_client(http);
        ask(engine, &config, tuning.show_sources).await
    } else {
        let qdrant = QdrantClient::new(QdrantConfig::from_env())
            .context("Failed to initialize Qdrant client")?;
        let engine = RagEngine::new(openai.clone(), qdrant, openai).with_http_client(http);
        ask(engine, &config, tuning.show_sources).await
    }
}

async fn ask<S: VectorStore>(
    engine: RagEngine<OpenAIClient, S, OpenAIClient>,
    config: &RagConfig,
    show_sources: bool,
) -> Result<()> {
    info!("Question: {}", config.question);

    let result = engine.run(config).await.context("Pipeline failed")?;

    println!("{}", result.answer);

    if show_sources {
        println!();
        for scored in &result.sources {
            let page = scored
                .chunk
                .page
                .map(|p| format!(" page {}", p))
                .unwrap_or_default();
            println!(
                "[{:.3}] {}{} (chunk {})",
                scored.score, scored.chunk.document_id, page, scored.chunk.chunk_index
            );
        }
    }

    Ok(())
}

async fn run_simple(topic: &str) -> Result<()> {
    let openai_config = OpenAIConfig::from_env().context("Missing OpenAI settings")?;
    let openai = OpenAIClient::new(openai_config, reqwest::Client::new());

    let answer = openai
        .generate(&topic_prompt(topic))
        .await
        .context("Failed to generate answer")?;
    println!("{}", answer);

    Ok(())
}
