pub mod config;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod output;
pub mod pipeline;
