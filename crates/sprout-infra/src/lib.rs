//! Infrastructure implementations for Sprout.
//!
//! Concrete adapters behind the ports defined in `sprout-core`: the SQLite
//! conversation repository, the DeepSeek chat/summarization client, and the
//! TOML configuration loader.

pub mod config;
pub mod llm;
pub mod sqlite;
