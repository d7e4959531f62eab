//! Local hybrid-search memory for AI coding sessions.
//!
//! Cairn persists observations from coding sessions (decisions, bugfixes,
//! discoveries, ...) and retrieves them by keyword and by meaning. It runs as
//! an [MCP](https://modelcontextprotocol.io/) server or from the command line.
//!
//! # Architecture
//!
//! - **Storage**: SQLite with FTS5 external-content indexes over observations
//!   and session summaries
//! - **Embeddings**: local ONNX Runtime with all-MiniLM-L6-v2 (384 dimensions),
//!   or an OpenAI-compatible / Ollama endpoint
//! - **Vectors**: brute-force cosine scan in a SQLite file, or Qdrant
//! - **Search**: BM25 and cosine scores fused as a weighted sum, degrading to
//!   keyword-only when the vector path is unavailable
//!
//! # Modules
//!
//! - [`config`]: TOML configuration with environment overrides
//! - [`db`]: SQLite connection setup, schema and migrations
//! - [`embedding`]: text-to-vector providers and the WordPiece tokenizer
//! - [`error`]: the typed error taxonomy
//! - [`memory`]: observation and summary records
//! - [`search`]: keyword search, hybrid fusion, timelines, background indexing
//! - [`vector`]: the vector store contract and its backends

pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod memory;
pub mod search;
pub mod vector;
