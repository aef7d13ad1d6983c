//! Lifecycle orchestrator composing the store, detector, and dispatcher.
//!
//! `ConversationService` exposes the two caller-facing operations: the
//! per-message path and the explicit out-of-band end. Repository failures on
//! the per-message path never abort it -- they degrade toward "no active
//! conversation" and are logged. Dispatcher errors stay in the background;
//! the response returns regardless of finalize completion.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use sprout_types::conversation::{ConversationMessage, EndReason};

use crate::boundary::{BoundaryDetector, ConversationSignals};
use crate::finalize::{DispatchError, FinalizeDispatcher, FinalizeJob};
use crate::session::SessionStore;

use super::repository::ConversationRepository;

/// Result of the per-message operation.
#[derive(Debug, Clone)]
pub struct MessageOutcome {
    /// Assistant reply with the end marker stripped.
    pub reply: String,
    pub started: bool,
    pub ended: bool,
}

/// Result of the explicit-end operation.
#[derive(Debug, Clone, Copy)]
pub struct EndOutcome {
    pub ended: bool,
    pub message_count: usize,
}

/// Orchestrates one conversation turn: boundary evaluation, session
/// accumulation, and finalize hand-off.
///
/// Generic over [`ConversationRepository`] so the core never depends on the
/// infrastructure layer.
pub struct ConversationService<R: ConversationRepository> {
    store: Arc<SessionStore>,
    detector: BoundaryDetector,
    repo: Arc<R>,
    dispatcher: FinalizeDispatcher,
    end_marker: String,
}

impl<R: ConversationRepository> ConversationService<R> {
    pub fn new(
        store: Arc<SessionStore>,
        detector: BoundaryDetector,
        repo: Arc<R>,
        dispatcher: FinalizeDispatcher,
    ) -> Self {
        let end_marker = detector.rules().end_marker.clone();
        Self {
            store,
            detector,
            repo,
            dispatcher,
            end_marker,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    /// Process one message turn.
    ///
    /// The assistant reply is produced by the caller (the responder runs
    /// before the lifecycle, off any lock); this method evaluates the
    /// boundary rules, appends the child/assistant pair, and hands an ended
    /// conversation to the dispatcher without blocking on it.
    pub async fn handle_message(
        &self,
        user_id: &str,
        text: &str,
        assistant_reply: &str,
        force_start: bool,
    ) -> MessageOutcome {
        let signals = self.gather_signals(user_id).await;
        let decision =
            self.detector
                .evaluate(user_id, text, assistant_reply, force_start, &signals, Utc::now());

        if decision.ended_previous {
            // Topic shift: detach the old conversation atomically before the
            // new one's messages land, so the finalize worker cannot grab them.
            let previous = self.store.snapshot_and_clear(user_id);
            self.dispatch(FinalizeJob {
                user_id: user_id.to_string(),
                messages: previous,
                is_start: false,
                end_reason: EndReason::SubjectChange,
                session_close: false,
                detached: true,
            });
        }

        let reply = strip_marker(assistant_reply, &self.end_marker);
        self.store.append(
            user_id,
            vec![
                ConversationMessage::child(text),
                ConversationMessage::assistant(reply.clone()),
            ],
        );

        if decision.is_start {
            info!(user_id, "conversation started");
        }

        if decision.is_end {
            info!(user_id, reason = ?decision.end_reason, "conversation ended");
            self.dispatch(FinalizeJob {
                user_id: user_id.to_string(),
                messages: self.store.snapshot(user_id),
                is_start: decision.is_start,
                end_reason: decision.end_reason.unwrap_or(EndReason::Manual),
                session_close: false,
                detached: false,
            });
        } else {
            debug!(
                user_id,
                session_messages = self.store.message_count(user_id),
                "conversation ongoing"
            );
        }

        MessageOutcome {
            reply,
            started: decision.is_start,
            ended: decision.is_end,
        }
    }

    /// End the conversation without a new message (client navigated away,
    /// operator action). Falls back to the last incomplete record's messages
    /// when the in-memory session is empty.
    pub async fn handle_explicit_end(&self, user_id: &str, reason: EndReason) -> EndOutcome {
        let mut messages = self.store.snapshot(user_id);
        let mut detached = false;

        if messages.is_empty() {
            match self.repo.get_incomplete(user_id).await {
                Ok(records) => {
                    if let Some(last) = records.last() {
                        messages = last.messages.clone();
                        detached = true;
                    }
                }
                Err(err) => {
                    warn!(user_id, %err, "could not load incomplete records for explicit end");
                }
            }
        }

        if messages.is_empty() {
            return EndOutcome {
                ended: false,
                message_count: 0,
            };
        }

        self.detector.reset_topics(user_id);
        let message_count = messages.len();
        info!(user_id, %reason, message_count, "explicit conversation end");

        self.dispatch(FinalizeJob {
            user_id: user_id.to_string(),
            messages,
            is_start: false,
            end_reason: reason,
            session_close: true,
            detached,
        });

        EndOutcome {
            ended: true,
            message_count,
        }
    }

    /// Whether the user currently has an active conversation, in memory or
    /// persisted. The store takes precedence for freshness.
    pub async fn is_active(&self, user_id: &str) -> bool {
        if self.store.has_session(user_id) {
            return true;
        }
        match self.repo.has_incomplete(user_id).await {
            Ok(active) => active,
            Err(err) => {
                warn!(user_id, %err, "treating repository failure as no active conversation");
                false
            }
        }
    }

    /// Gather the detector's inputs. Repository failures degrade to the
    /// conservative default: no active conversation, no history.
    async fn gather_signals(&self, user_id: &str) -> ConversationSignals {
        let session_active = self.store.has_session(user_id);

        let incomplete_record = match self.repo.has_incomplete(user_id).await {
            Ok(active) => active,
            Err(err) => {
                warn!(user_id, %err, "treating repository failure as no incomplete record");
                false
            }
        };

        let last_completed_at = match self.repo.get_last_completed(user_id).await {
            Ok(record) => record.map(|r| r.created_at),
            Err(err) => {
                warn!(user_id, %err, "treating repository failure as no conversation history");
                None
            }
        };

        ConversationSignals {
            session_active,
            incomplete_record,
            last_completed_at,
            last_activity: self.store.last_activity(user_id),
        }
    }

    fn dispatch(&self, job: FinalizeJob) {
        match self.dispatcher.submit(job) {
            Ok(()) => {}
            Err(DispatchError::QueueFull) => {
                // Session stays in the store; a later end trigger retries.
                warn!("finalize queue full, conversation finalize deferred");
            }
            Err(DispatchError::Closed) => {
                warn!("finalize dispatcher stopped, conversation not finalized");
            }
        }
    }
}

/// Remove the end-of-conversation marker from a reply for display/storage.
fn strip_marker(reply: &str, marker: &str) -> String {
    reply.replace(marker, "").trim().to_string()
}
