pub mod chunking;
pub mod config;
pub mod database;
pub mod document;
pub mod embeddings;
pub mod error;
pub mod generation;
pub mod memory;
pub mod openai;
pub mod prompt;
pub mod rag;
