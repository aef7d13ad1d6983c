//! Test doubles shared by the dispatcher and orchestrator test modules.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use uuid::Uuid;

use sprout_types::conversation::{ConversationMessage, ConversationRecord, EndReason};
use sprout_types::error::{RepositoryError, UpstreamError};

use crate::boundary::keywords;
use crate::conversation::repository::ConversationRepository;
use crate::summarize::Summarizer;

/// Poll `condition` until it holds, panicking after two seconds.
pub async fn wait_for(condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}

/// In-memory repository capturing every call for assertions.
#[derive(Default)]
pub struct MockRepository {
    pub saved: Mutex<Vec<ConversationRecord>>,
    pub incomplete: Mutex<Vec<ConversationRecord>>,
    pub ended: Mutex<Vec<(String, EndReason)>>,
    pub session_summaries: Mutex<Vec<(String, String, u32)>>,
    pub touched: Mutex<Vec<String>>,
    /// When set, every call fails with a query error.
    pub fail: AtomicBool,
}

impl MockRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_incomplete(&self, user_id: &str, messages: Vec<ConversationMessage>) {
        let mut record = ConversationRecord::finalized(
            user_id,
            messages,
            String::new(),
            Vec::new(),
            true,
            EndReason::Manual,
        );
        record.is_end = false;
        record.end_reason = None;
        record.complete = false;
        record.ended_at = None;
        self.incomplete.lock().unwrap().push(record);
    }

    fn check(&self) -> Result<(), RepositoryError> {
        if self.fail.load(Ordering::SeqCst) {
            Err(RepositoryError::Query("mock failure".to_string()))
        } else {
            Ok(())
        }
    }
}

impl ConversationRepository for MockRepository {
    async fn save(&self, record: &ConversationRecord) -> Result<Uuid, RepositoryError> {
        self.check()?;
        self.saved.lock().unwrap().push(record.clone());
        Ok(record.id)
    }

    async fn get_last(&self, user_id: &str) -> Result<Option<ConversationRecord>, RepositoryError> {
        self.check()?;
        let incomplete = self.incomplete.lock().unwrap();
        if let Some(record) = incomplete.iter().rev().find(|r| r.user_id == user_id) {
            return Ok(Some(record.clone()));
        }
        drop(incomplete);
        Ok(self
            .saved
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.user_id == user_id)
            .cloned())
    }

    async fn get_last_completed(
        &self,
        user_id: &str,
    ) -> Result<Option<ConversationRecord>, RepositoryError> {
        self.check()?;
        Ok(self
            .saved
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.user_id == user_id && r.complete)
            .cloned())
    }

    async fn has_incomplete(&self, user_id: &str) -> Result<bool, RepositoryError> {
        self.check()?;
        Ok(self
            .incomplete
            .lock()
            .unwrap()
            .iter()
            .any(|r| r.user_id == user_id))
    }

    async fn get_incomplete(
        &self,
        user_id: &str,
    ) -> Result<Vec<ConversationRecord>, RepositoryError> {
        self.check()?;
        Ok(self
            .incomplete
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn mark_ended(&self, user_id: &str, reason: EndReason) -> Result<bool, RepositoryError> {
        self.check()?;
        self.ended
            .lock()
            .unwrap()
            .push((user_id.to_string(), reason));
        let mut incomplete = self.incomplete.lock().unwrap();
        let before = incomplete.len();
        incomplete.retain(|r| r.user_id != user_id);
        Ok(incomplete.len() != before)
    }

    async fn touch_activity(&self, user_id: &str) -> Result<(), RepositoryError> {
        self.check()?;
        self.touched.lock().unwrap().push(user_id.to_string());
        Ok(())
    }

    async fn recent_summaries(
        &self,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<String>, RepositoryError> {
        self.check()?;
        Ok(self
            .saved
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|r| r.user_id == user_id)
            .take(limit as usize)
            .map(|r| r.summary.clone())
            .collect())
    }

    async fn update_session_summary(
        &self,
        user_id: &str,
        summary: &str,
        message_count: u32,
    ) -> Result<(), RepositoryError> {
        self.check()?;
        self.session_summaries.lock().unwrap().push((
            user_id.to_string(),
            summary.to_string(),
            message_count,
        ));
        Ok(())
    }

    async fn list_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<ConversationRecord>, RepositoryError> {
        self.check()?;
        Ok(self
            .saved
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn count_conversations(&self) -> Result<u64, RepositoryError> {
        self.check()?;
        Ok(self.saved.lock().unwrap().len() as u64)
    }
}

/// Summarizer returning fixed text immediately.
pub struct InstantSummarizer;

impl Summarizer for InstantSummarizer {
    async fn summarize(&self, _transcript: &str) -> Result<String, UpstreamError> {
        Ok("a tidy summary".to_string())
    }

    async fn summarize_session(&self, _transcript: &str) -> Result<String, UpstreamError> {
        Ok("a whole-session summary".to_string())
    }

    async fn extract_topics(&self, transcript: &str) -> Result<Vec<String>, UpstreamError> {
        Ok(keywords::topics(transcript, 3))
    }
}

/// Summarizer that always times out.
pub struct FailingSummarizer;

impl Summarizer for FailingSummarizer {
    async fn summarize(&self, _transcript: &str) -> Result<String, UpstreamError> {
        Err(UpstreamError::Timeout(1))
    }

    async fn summarize_session(&self, _transcript: &str) -> Result<String, UpstreamError> {
        Err(UpstreamError::Timeout(1))
    }

    async fn extract_topics(&self, _transcript: &str) -> Result<Vec<String>, UpstreamError> {
        Err(UpstreamError::Timeout(1))
    }
}

/// Summarizer that parks inside `summarize` until released, signalling entry
/// via `started`. Lets tests hold the worker mid-pipeline deterministically.
pub struct BlockingSummarizer {
    pub started: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl BlockingSummarizer {
    pub fn new() -> Self {
        Self {
            started: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        }
    }
}

impl Summarizer for BlockingSummarizer {
    async fn summarize(&self, _transcript: &str) -> Result<String, UpstreamError> {
        self.started.notify_one();
        self.release.notified().await;
        Ok("an unhurried summary".to_string())
    }

    async fn summarize_session(&self, _transcript: &str) -> Result<String, UpstreamError> {
        Ok("a whole-session summary".to_string())
    }

    async fn extract_topics(&self, _transcript: &str) -> Result<Vec<String>, UpstreamError> {
        Ok(Vec::new())
    }
}
