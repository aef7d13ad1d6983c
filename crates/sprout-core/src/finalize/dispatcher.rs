//! Bounded background runner for the finalize pipeline.
//!
//! On an end transition the orchestrator submits a [`FinalizeJob`]; a worker
//! task summarizes the snapshot, persists the conversation record, and clears
//! the session store, all off the request path. Submission uses a bounded
//! `mpsc` queue with `try_send`: a full queue surfaces as the typed
//! [`DispatchError::QueueFull`] instead of growing an unbounded backlog.
//!
//! Failure handling: summarizer failures degrade to a placeholder summary;
//! persistence failures are logged and the record is dropped (no retry).
//! Jobs run to completion; no cancellation token is applied.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use sprout_types::conversation::{ConversationMessage, ConversationRecord, EndReason};

use crate::conversation::repository::ConversationRepository;
use crate::session::SessionStore;
use crate::summarize::{self, Summarizer, SUMMARY_FALLBACK};

/// One ended conversation handed off for summarization and persistence.
#[derive(Debug, Clone)]
pub struct FinalizeJob {
    pub user_id: String,
    /// Snapshot taken at submission time.
    pub messages: Vec<ConversationMessage>,
    pub is_start: bool,
    pub end_reason: EndReason,
    /// Run the secondary full-session summarization after persisting.
    pub session_close: bool,
    /// The submitter already detached these messages from the store (or they
    /// came from a persisted record); the worker must not re-snapshot.
    pub detached: bool,
}

/// Errors surfaced on the submission path.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Bounded capacity reached; the caller decides whether to retry later.
    #[error("finalize queue full")]
    QueueFull,

    /// The worker task has stopped and no further jobs can be accepted.
    #[error("finalize dispatcher stopped")]
    Closed,
}

/// Handle for submitting finalize jobs to the background worker.
#[derive(Clone)]
pub struct FinalizeDispatcher {
    tx: mpsc::Sender<FinalizeJob>,
}

impl FinalizeDispatcher {
    /// Spawn the worker task and return the submission handle.
    pub fn spawn<R, S>(
        store: Arc<SessionStore>,
        repo: Arc<R>,
        summarizer: Arc<S>,
        capacity: usize,
    ) -> Self
    where
        R: ConversationRepository + 'static,
        S: Summarizer + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<FinalizeJob>(capacity.max(1));

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                finalize(&store, repo.as_ref(), summarizer.as_ref(), job).await;
            }
            debug!("finalize worker stopped");
        });

        Self { tx }
    }

    /// Submit a job without blocking the request path.
    pub fn submit(&self, job: FinalizeJob) -> Result<(), DispatchError> {
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DispatchError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DispatchError::Closed,
        })
    }
}

/// Run the finalize pipeline for one job.
///
/// Pipeline order: summarize the submitted snapshot, atomically take the
/// session out of the store, persist the fuller of the two snapshots, close
/// any lingering incomplete record, and optionally run the session-level
/// summarization.
async fn finalize<R, S>(store: &SessionStore, repo: &R, summarizer: &S, job: FinalizeJob)
where
    R: ConversationRepository,
    S: Summarizer,
{
    let user_id = job.user_id.as_str();
    let transcript = summarize::format_transcript(&job.messages);

    let summary = if job.messages.is_empty() {
        String::new()
    } else {
        match summarizer.summarize(&transcript).await {
            Ok(summary) => summary,
            Err(err) => {
                warn!(user_id, %err, "summarization failed, storing placeholder");
                SUMMARY_FALLBACK.to_string()
            }
        }
    };

    let topics = match summarizer.extract_topics(&transcript).await {
        Ok(topics) => topics,
        Err(err) => {
            warn!(user_id, %err, "topic extraction failed, storing none");
            Vec::new()
        }
    };

    // Take the session out of the store. Messages appended while we were
    // summarizing make the cleared snapshot authoritative; the summary then
    // lags the transcript by those messages, which is logged as an anomaly.
    let messages = if job.detached {
        job.messages
    } else {
        let cleared = store.snapshot_and_clear(user_id);
        if cleared.len() > job.messages.len() {
            warn!(
                user_id,
                summarized = job.messages.len(),
                cleared = cleared.len(),
                "messages appended during finalize; persisting fuller snapshot"
            );
            cleared
        } else {
            job.messages
        }
    };

    if messages.is_empty() {
        // Nothing accumulated: just close whatever incomplete record lingers.
        if let Err(err) = repo.mark_ended(user_id, job.end_reason).await {
            warn!(user_id, %err, "failed to close incomplete record");
        }
        return;
    }

    let message_count = messages.len();
    let record = ConversationRecord::finalized(
        user_id,
        messages,
        summary,
        topics,
        job.is_start,
        job.end_reason,
    );

    if let Err(err) = repo.save(&record).await {
        error!(user_id, %err, "persistence failed, conversation record dropped");
    } else {
        debug!(user_id, message_count, reason = %job.end_reason, "conversation finalized");
    }

    if job.session_close {
        summarize_session(repo, summarizer, user_id).await;
    }

    if let Err(err) = repo.mark_ended(user_id, job.end_reason).await {
        warn!(user_id, %err, "failed to close incomplete record");
    }
}

/// Secondary summarization across every incomplete record for the user,
/// attached to the newest ended record.
async fn summarize_session<R, S>(repo: &R, summarizer: &S, user_id: &str)
where
    R: ConversationRepository,
    S: Summarizer,
{
    let incomplete = match repo.get_incomplete(user_id).await {
        Ok(records) => records,
        Err(err) => {
            warn!(user_id, %err, "could not load incomplete records for session summary");
            return;
        }
    };

    let all_messages: Vec<ConversationMessage> = incomplete
        .iter()
        .flat_map(|record| record.messages.iter().cloned())
        .collect();
    if all_messages.is_empty() {
        return;
    }

    let transcript = summarize::format_transcript(&all_messages);
    match summarizer.summarize_session(&transcript).await {
        Ok(summary) => {
            if let Err(err) = repo
                .update_session_summary(user_id, &summary, all_messages.len() as u32)
                .await
            {
                warn!(user_id, %err, "failed to store session summary");
            }
        }
        Err(err) => warn!(user_id, %err, "session summarization failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        wait_for, BlockingSummarizer, FailingSummarizer, InstantSummarizer, MockRepository,
    };
    use sprout_types::conversation::Sender;

    fn exchange() -> Vec<ConversationMessage> {
        vec![
            ConversationMessage::child("do sharks sleep?"),
            ConversationMessage::assistant("Sort of! They rest while swimming."),
        ]
    }

    fn job(user_id: &str, messages: Vec<ConversationMessage>) -> FinalizeJob {
        FinalizeJob {
            user_id: user_id.to_string(),
            messages,
            is_start: true,
            end_reason: EndReason::UserFarewell,
            session_close: false,
            detached: false,
        }
    }

    #[tokio::test]
    async fn finalize_persists_record_and_clears_store() {
        let store = Arc::new(SessionStore::new());
        let repo = Arc::new(MockRepository::new());
        store.append("u1", exchange());

        let dispatcher = FinalizeDispatcher::spawn(
            Arc::clone(&store),
            Arc::clone(&repo),
            Arc::new(InstantSummarizer),
            8,
        );
        dispatcher.submit(job("u1", store.snapshot("u1"))).unwrap();

        wait_for(|| repo.saved.lock().unwrap().len() == 1).await;

        let saved = repo.saved.lock().unwrap();
        assert_eq!(saved[0].messages.len(), 2);
        assert!(saved[0].is_end);
        assert_eq!(saved[0].end_reason, Some(EndReason::UserFarewell));
        assert_eq!(saved[0].summary, "a tidy summary");
        assert!(saved[0].topics.contains(&"sharks".to_string()));
        drop(saved);

        assert!(store.snapshot("u1").is_empty());
    }

    #[tokio::test]
    async fn summarizer_failure_stores_placeholder() {
        let store = Arc::new(SessionStore::new());
        let repo = Arc::new(MockRepository::new());
        store.append("u1", exchange());

        let dispatcher = FinalizeDispatcher::spawn(
            Arc::clone(&store),
            Arc::clone(&repo),
            Arc::new(FailingSummarizer),
            8,
        );
        dispatcher.submit(job("u1", store.snapshot("u1"))).unwrap();

        wait_for(|| repo.saved.lock().unwrap().len() == 1).await;

        let saved = repo.saved.lock().unwrap();
        assert_eq!(saved[0].summary, SUMMARY_FALLBACK);
        assert!(saved[0].topics.is_empty());
    }

    #[tokio::test]
    async fn late_appends_are_not_lost() {
        let store = Arc::new(SessionStore::new());
        let repo = Arc::new(MockRepository::new());
        let summarizer = Arc::new(BlockingSummarizer::new());
        store.append("u1", exchange());

        let dispatcher = FinalizeDispatcher::spawn(
            Arc::clone(&store),
            Arc::clone(&repo),
            Arc::clone(&summarizer),
            8,
        );
        dispatcher.submit(job("u1", store.snapshot("u1"))).unwrap();

        // While the worker sits in the summarizer, another message lands
        summarizer.started.notified().await;
        store.append(
            "u1",
            vec![ConversationMessage::child("one more thing!")],
        );
        summarizer.release.notify_one();

        wait_for(|| repo.saved.lock().unwrap().len() == 1).await;

        let saved = repo.saved.lock().unwrap();
        assert_eq!(saved[0].messages.len(), 3);
        assert_eq!(saved[0].messages[2].sender, Sender::Child);
        drop(saved);
        assert!(store.snapshot("u1").is_empty());
    }

    #[tokio::test]
    async fn empty_job_only_closes_incomplete_record() {
        let store = Arc::new(SessionStore::new());
        let repo = Arc::new(MockRepository::new());

        let dispatcher = FinalizeDispatcher::spawn(
            Arc::clone(&store),
            Arc::clone(&repo),
            Arc::new(InstantSummarizer),
            8,
        );
        dispatcher.submit(job("u1", Vec::new())).unwrap();

        wait_for(|| !repo.ended.lock().unwrap().is_empty()).await;
        assert!(repo.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn session_close_runs_secondary_summary() {
        let store = Arc::new(SessionStore::new());
        let repo = Arc::new(MockRepository::new());
        repo.seed_incomplete("u1", exchange());

        let dispatcher = FinalizeDispatcher::spawn(
            Arc::clone(&store),
            Arc::clone(&repo),
            Arc::new(InstantSummarizer),
            8,
        );
        let mut close = job("u1", exchange());
        close.session_close = true;
        close.detached = true;
        dispatcher.submit(close).unwrap();

        wait_for(|| !repo.session_summaries.lock().unwrap().is_empty()).await;

        let summaries = repo.session_summaries.lock().unwrap();
        assert_eq!(summaries[0].0, "u1");
        assert_eq!(summaries[0].1, "a whole-session summary");
        assert_eq!(summaries[0].2, 2);
    }

    #[tokio::test]
    async fn full_queue_rejects_with_typed_error() {
        let store = Arc::new(SessionStore::new());
        let repo = Arc::new(MockRepository::new());
        let summarizer = Arc::new(BlockingSummarizer::new());

        let dispatcher = FinalizeDispatcher::spawn(
            Arc::clone(&store),
            Arc::clone(&repo),
            Arc::clone(&summarizer),
            1,
        );

        // First job occupies the worker inside the blocked summarizer
        dispatcher.submit(job("u1", exchange())).unwrap();
        summarizer.started.notified().await;

        // Second job fills the single queue slot
        dispatcher.submit(job("u2", exchange())).unwrap();

        // Third submission must be rejected, not silently queued
        let result = dispatcher.submit(job("u3", exchange()));
        assert!(matches!(result, Err(DispatchError::QueueFull)));

        // Draining the worker frees capacity again
        summarizer.release.notify_one();
        summarizer.release.notify_one();
        wait_for(|| repo.saved.lock().unwrap().len() == 2).await;
        dispatcher.submit(job("u3", exchange())).unwrap();
    }
}
