//! Conversation message and record types for Sprout.
//!
//! These types model the data that flows through the conversation lifecycle:
//! individual chat messages, the reason a conversation ended, and the
//! finalized record handed to the persistence layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Who authored a message within a conversation.
///
/// Maps to the CHECK constraint in the SQLite schema via its lowercase
/// string form: `child` or `assistant`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    Child,
    Assistant,
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::Child => write!(f, "child"),
            Sender::Assistant => write!(f, "assistant"),
        }
    }
}

impl FromStr for Sender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "child" => Ok(Sender::Child),
            "assistant" => Ok(Sender::Assistant),
            other => Err(format!("invalid sender: '{other}'")),
        }
    }
}

/// A single message within a conversation. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub sender: Sender,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationMessage {
    /// Create a child message stamped with the current time.
    pub fn child(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Child,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create an assistant message stamped with the current time.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Assistant,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Why a conversation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The topic-shift rule closed the conversation.
    SubjectChange,
    /// The assistant embedded the end-of-conversation marker in its reply.
    AssistantSignal,
    /// The child said goodbye.
    UserFarewell,
    /// The conversation was idle past the configured timeout.
    Timeout,
    /// The client navigated away (out-of-band end signal).
    PageClose,
    /// An operator or caller ended the conversation explicitly.
    Manual,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::SubjectChange => write!(f, "subject_change"),
            EndReason::AssistantSignal => write!(f, "assistant_signal"),
            EndReason::UserFarewell => write!(f, "user_farewell"),
            EndReason::Timeout => write!(f, "timeout"),
            EndReason::PageClose => write!(f, "page_close"),
            EndReason::Manual => write!(f, "manual"),
        }
    }
}

impl FromStr for EndReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "subject_change" => Ok(EndReason::SubjectChange),
            "assistant_signal" => Ok(EndReason::AssistantSignal),
            "user_farewell" => Ok(EndReason::UserFarewell),
            "timeout" => Ok(EndReason::Timeout),
            "page_close" => Ok(EndReason::PageClose),
            "manual" => Ok(EndReason::Manual),
            other => Err(format!("invalid end reason: '{other}'")),
        }
    }
}

/// A finalized (or in-flight) conversation, as persisted.
///
/// At most one record per user may be incomplete (`complete == false`) at
/// any time; the finalize pipeline closes lingering incomplete records when
/// it writes a new one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: Uuid,
    pub user_id: String,
    pub messages: Vec<ConversationMessage>,
    pub summary: String,
    pub topics: Vec<String>,
    /// Whether this conversation opened a new exchange.
    pub is_start: bool,
    /// Whether this record was written by an end transition.
    pub is_end: bool,
    pub end_reason: Option<EndReason>,
    /// A complete record can no longer accumulate messages.
    pub complete: bool,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub last_activity: DateTime<Utc>,
    /// Secondary summary spanning the whole session, set at session close.
    pub session_summary: Option<String>,
    pub session_message_count: Option<u32>,
}

impl ConversationRecord {
    /// Build the record for a finalized conversation.
    pub fn finalized(
        user_id: impl Into<String>,
        messages: Vec<ConversationMessage>,
        summary: String,
        topics: Vec<String>,
        is_start: bool,
        end_reason: EndReason,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            user_id: user_id.into(),
            messages,
            summary,
            topics,
            is_start,
            is_end: true,
            end_reason: Some(end_reason),
            complete: true,
            created_at: now,
            ended_at: Some(now),
            last_activity: now,
            session_summary: None,
            session_message_count: None,
        }
    }
}
