//! Service configuration for Sprout.
//!
//! Every field has a serde default so a partial `config.toml` only overrides
//! what it names. The keyword lists are ordered: boundary rules match them
//! first-to-last, so configuration order is evaluation order.

use serde::{Deserialize, Serialize};

/// Runtime configuration for the conversation lifecycle and its collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Seconds of inactivity (or time since the last completed conversation)
    /// after which a conversation boundary is assumed.
    #[serde(default = "default_conversation_timeout_secs")]
    pub conversation_timeout_secs: u64,

    /// Keyword-overlap ratio below which a topic shift is declared.
    #[serde(default = "default_topic_overlap_threshold")]
    pub topic_overlap_threshold: f64,

    /// Bounded capacity of the finalize queue.
    #[serde(default = "default_finalize_queue_capacity")]
    pub finalize_queue_capacity: usize,

    /// How many stored summaries feed the chat context string.
    #[serde(default = "default_context_summary_limit")]
    pub context_summary_limit: u32,

    /// Responder timeout for short messages, in seconds.
    #[serde(default = "default_simple_timeout_secs")]
    pub simple_timeout_secs: u64,

    /// Responder timeout for long messages, in seconds.
    #[serde(default = "default_complex_timeout_secs")]
    pub complex_timeout_secs: u64,

    /// Word count above which a message uses the complex timeout.
    #[serde(default = "default_complex_word_threshold")]
    pub complex_word_threshold: usize,

    /// Ordered greeting keywords; first substring match wins.
    #[serde(default = "default_greeting_keywords")]
    pub greeting_keywords: Vec<String>,

    /// Ordered farewell keywords; first substring match wins.
    #[serde(default = "default_farewell_keywords")]
    pub farewell_keywords: Vec<String>,

    /// Token the assistant appends to signal end of conversation.
    #[serde(default = "default_end_marker")]
    pub end_marker: String,
}

fn default_conversation_timeout_secs() -> u64 {
    30 * 60
}

fn default_topic_overlap_threshold() -> f64 {
    0.3
}

fn default_finalize_queue_capacity() -> usize {
    32
}

fn default_context_summary_limit() -> u32 {
    3
}

fn default_simple_timeout_secs() -> u64 {
    15
}

fn default_complex_timeout_secs() -> u64 {
    30
}

fn default_complex_word_threshold() -> usize {
    8
}

fn default_greeting_keywords() -> Vec<String> {
    [
        "hello",
        "hi",
        "hey",
        "good morning",
        "good afternoon",
        "good evening",
        "start",
        "new chat",
        "begin",
    ]
    .map(String::from)
    .to_vec()
}

fn default_farewell_keywords() -> Vec<String> {
    [
        "goodbye",
        "bye",
        "see you",
        "gotta go",
        "done talking",
        "let's end",
        "finish this",
    ]
    .map(String::from)
    .to_vec()
}

fn default_end_marker() -> String {
    "CHAT-ENDED".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            conversation_timeout_secs: default_conversation_timeout_secs(),
            topic_overlap_threshold: default_topic_overlap_threshold(),
            finalize_queue_capacity: default_finalize_queue_capacity(),
            context_summary_limit: default_context_summary_limit(),
            simple_timeout_secs: default_simple_timeout_secs(),
            complex_timeout_secs: default_complex_timeout_secs(),
            complex_word_threshold: default_complex_word_threshold(),
            greeting_keywords: default_greeting_keywords(),
            farewell_keywords: default_farewell_keywords(),
            end_marker: default_end_marker(),
        }
    }
}
