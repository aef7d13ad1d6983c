//! LLM collaborator implementations.

pub mod deepseek;

pub use deepseek::DeepSeekClient;
