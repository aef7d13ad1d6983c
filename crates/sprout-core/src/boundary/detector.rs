//! Per-user conversation boundary state machine.
//!
//! The detector is pure and synchronous: the orchestrator gathers a
//! [`ConversationSignals`] snapshot (store state plus persisted-record
//! state) and passes it in together with an explicit `now`, so no I/O or
//! clock reads happen inside the rules and every decision is reproducible
//! in tests.
//!
//! Rule priority, highest first:
//! 1. forced start
//! 2-4. start detection when no conversation is active: first-ever message,
//!      greeting keyword, or conversation timeout elapsed since the last
//!      completed conversation
//! 5. topic shift against the cached keyword set (ends the previous
//!    conversation and starts a new one in the same step)
//! 6. assistant end marker
//! 7. farewell keyword
//! 8. inactivity timeout

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::{debug, info};

use sprout_types::config::ServiceConfig;
use sprout_types::conversation::EndReason;

use super::keywords;

/// Fixed configuration slice the detector evaluates against.
#[derive(Debug, Clone)]
pub struct BoundaryRules {
    pub conversation_timeout: Duration,
    pub overlap_threshold: f64,
    pub greeting_keywords: Vec<String>,
    pub farewell_keywords: Vec<String>,
    pub end_marker: String,
}

impl BoundaryRules {
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            conversation_timeout: Duration::seconds(config.conversation_timeout_secs as i64),
            overlap_threshold: config.topic_overlap_threshold,
            greeting_keywords: config.greeting_keywords.clone(),
            farewell_keywords: config.farewell_keywords.clone(),
            end_marker: config.end_marker.clone(),
        }
    }
}

/// Snapshot of the user's conversation state, gathered by the orchestrator
/// before evaluation. The in-memory session takes precedence for freshness;
/// the incomplete persisted record is the durable notion of "active".
#[derive(Debug, Clone, Default)]
pub struct ConversationSignals {
    /// The session store holds messages for this user.
    pub session_active: bool,
    /// An incomplete persisted record exists for this user.
    pub incomplete_record: bool,
    /// When the user's most recent *completed* conversation was recorded.
    pub last_completed_at: Option<DateTime<Utc>>,
    /// Last append on the in-flight session, if any.
    pub last_activity: Option<DateTime<Utc>>,
}

/// Outcome of one boundary evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundaryDecision {
    pub is_start: bool,
    pub is_end: bool,
    pub end_reason: Option<EndReason>,
    /// A topic shift closed the prior conversation in this same step; the
    /// caller finalizes it with `subject_change` before appending.
    pub ended_previous: bool,
}

/// Deterministic boundary rule engine with a per-user topic-keyword cache.
pub struct BoundaryDetector {
    rules: BoundaryRules,
    /// Lowercase stopword-filtered tokens of each user's most recent message.
    topic_cache: DashMap<String, HashSet<String>>,
}

impl BoundaryDetector {
    pub fn new(rules: BoundaryRules) -> Self {
        Self {
            rules,
            topic_cache: DashMap::new(),
        }
    }

    pub fn rules(&self) -> &BoundaryRules {
        &self.rules
    }

    /// Evaluate one message against the boundary rules.
    ///
    /// Side effect: the topic cache is updated to the message's keyword set
    /// (and dropped when the conversation ends).
    pub fn evaluate(
        &self,
        user_id: &str,
        message: &str,
        assistant_reply: &str,
        force_start: bool,
        signals: &ConversationSignals,
        now: DateTime<Utc>,
    ) -> BoundaryDecision {
        let mut decision = BoundaryDecision::default();
        let active = signals.session_active || signals.incomplete_record;
        let new_keywords = keywords::extract_keywords(message);

        if force_start {
            decision.is_start = true;
        } else if !active {
            let greeting = keywords::first_match(message, &self.rules.greeting_keywords);
            let timed_out = signals
                .last_completed_at
                .map(|t| now - t > self.rules.conversation_timeout)
                .unwrap_or(true);
            let no_history = signals.last_completed_at.is_none();

            decision.is_start = greeting.is_some() || timed_out || no_history;
            if decision.is_start {
                debug!(
                    user_id,
                    greeting = greeting.unwrap_or(""),
                    timed_out,
                    no_history,
                    "conversation start detected"
                );
            }
        } else if signals.incomplete_record {
            // Topic shift is armed only by a durable active conversation;
            // an in-memory-only session never splits on topic.
            if let Some(previous) = self.topic_cache.get(user_id) {
                if !previous.is_empty() {
                    let ratio = keywords::overlap_ratio(&new_keywords, &previous);
                    if ratio < self.rules.overlap_threshold {
                        info!(user_id, ratio, "topic shift: ending previous conversation");
                        decision.is_start = true;
                        decision.ended_previous = true;
                    }
                }
            }
        }

        self.topic_cache.insert(user_id.to_string(), new_keywords);

        // End detection for the conversation that is active after the start
        // rules ran. Marker beats farewell beats inactivity.
        if assistant_reply.contains(&self.rules.end_marker) {
            decision.is_end = true;
            decision.end_reason = Some(EndReason::AssistantSignal);
        } else if keywords::first_match(message, &self.rules.farewell_keywords).is_some() {
            decision.is_end = true;
            decision.end_reason = Some(EndReason::UserFarewell);
        } else if active && !decision.ended_previous {
            let idle = signals
                .last_activity
                .map(|t| now - t > self.rules.conversation_timeout)
                .unwrap_or(false);
            if idle {
                decision.is_end = true;
                decision.end_reason = Some(EndReason::Timeout);
            }
        }

        if decision.is_end {
            self.topic_cache.remove(user_id);
        }

        decision
    }

    /// Drop the user's cached keywords (used on out-of-band ends).
    pub fn reset_topics(&self, user_id: &str) {
        self.topic_cache.remove(user_id);
    }

    #[cfg(test)]
    fn cached_keywords(&self, user_id: &str) -> Option<HashSet<String>> {
        self.topic_cache.get(user_id).map(|set| set.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> BoundaryDetector {
        BoundaryDetector::new(BoundaryRules::from_config(&ServiceConfig::default()))
    }

    fn no_history() -> ConversationSignals {
        ConversationSignals::default()
    }

    fn active_session(now: DateTime<Utc>) -> ConversationSignals {
        ConversationSignals {
            session_active: true,
            incomplete_record: false,
            last_completed_at: None,
            last_activity: Some(now),
        }
    }

    #[test]
    fn first_message_ever_starts() {
        let d = detector();
        let now = Utc::now();
        let decision = d.evaluate("u1", "hello", "Hi there!", false, &no_history(), now);
        assert!(decision.is_start);
        assert!(!decision.is_end);
        assert!(decision.end_reason.is_none());
    }

    #[test]
    fn first_message_without_greeting_still_starts() {
        let d = detector();
        let decision = d.evaluate(
            "u1",
            "what do volcanoes eat",
            "Nothing, they are mountains!",
            false,
            &no_history(),
            Utc::now(),
        );
        assert!(decision.is_start);
        assert!(!decision.is_end);
    }

    #[test]
    fn recent_completed_conversation_without_greeting_is_not_a_start() {
        let d = detector();
        let now = Utc::now();
        let signals = ConversationSignals {
            last_completed_at: Some(now - Duration::minutes(5)),
            ..Default::default()
        };
        let decision = d.evaluate("u1", "and what else?", "More facts!", false, &signals, now);
        assert!(!decision.is_start);
        assert!(!decision.is_end);
    }

    #[test]
    fn greeting_after_completed_conversation_starts() {
        let d = detector();
        let now = Utc::now();
        let signals = ConversationSignals {
            last_completed_at: Some(now - Duration::minutes(5)),
            ..Default::default()
        };
        let decision = d.evaluate("u1", "hey, are you there?", "Yes!", false, &signals, now);
        assert!(decision.is_start);
    }

    #[test]
    fn timeout_since_last_completed_conversation_starts() {
        let d = detector();
        let now = Utc::now();
        let signals = ConversationSignals {
            last_completed_at: Some(now - Duration::minutes(31)),
            ..Default::default()
        };
        let decision = d.evaluate("u1", "and what else?", "More facts!", false, &signals, now);
        assert!(decision.is_start);
    }

    #[test]
    fn forced_start_wins_even_when_active() {
        let d = detector();
        let now = Utc::now();
        let decision = d.evaluate("u1", "keep going", "Sure!", true, &active_session(now), now);
        assert!(decision.is_start);
        assert!(!decision.ended_previous);
    }

    #[test]
    fn active_session_does_not_restart() {
        let d = detector();
        let now = Utc::now();
        let decision = d.evaluate(
            "u1",
            "tell me more",
            "Gladly!",
            false,
            &active_session(now),
            now,
        );
        assert!(!decision.is_start);
        assert!(!decision.is_end);
    }

    #[test]
    fn topic_shift_fires_on_incomplete_record_with_disjoint_keywords() {
        let d = detector();
        let now = Utc::now();
        let signals = ConversationSignals {
            session_active: true,
            incomplete_record: true,
            last_completed_at: None,
            last_activity: Some(now),
        };

        // Seed the cache: dinosaurs
        let first = d.evaluate("u1", "dinosaur fossil hunting", "Cool!", false, &signals, now);
        assert!(!first.is_start);

        // Disjoint keywords: overlap 0 < 0.3 -> shift
        let second = d.evaluate("u1", "rocket space launch", "Blast off!", false, &signals, now);
        assert!(second.is_start);
        assert!(second.ended_previous);
        assert!(!second.is_end);

        // Cache reset to the new message's keywords
        let cached = d.cached_keywords("u1").unwrap();
        assert!(cached.contains("rocket"));
        assert!(!cached.contains("dinosaur"));
    }

    #[test]
    fn topic_overlap_at_half_does_not_shift() {
        let d = detector();
        let now = Utc::now();
        let signals = ConversationSignals {
            session_active: true,
            incomplete_record: true,
            last_completed_at: None,
            last_activity: Some(now),
        };

        d.evaluate("u1", "dinosaur fossil", "Neat!", false, &signals, now);
        // {dinosaur, teeth} vs {dinosaur, fossil}: ratio 0.5 >= 0.3
        let decision = d.evaluate("u1", "dinosaur teeth", "Sharp!", false, &signals, now);
        assert!(!decision.is_start);
        assert!(!decision.ended_previous);
    }

    #[test]
    fn in_memory_session_alone_never_topic_shifts() {
        let d = detector();
        let now = Utc::now();
        let signals = active_session(now);

        d.evaluate("u1", "hello", "Hi!", false, &no_history(), now);
        let decision = d.evaluate("u1", "I like dinosaurs", "Me too!", false, &signals, now);
        assert!(!decision.is_start);
        assert!(!decision.ended_previous);
        assert!(!decision.is_end);
    }

    #[test]
    fn assistant_marker_ends_conversation() {
        let d = detector();
        let now = Utc::now();
        let decision = d.evaluate(
            "u1",
            "I want to stop now",
            "Okay, goodbye! CHAT-ENDED",
            false,
            &active_session(now),
            now,
        );
        assert!(decision.is_end);
        assert_eq!(decision.end_reason, Some(EndReason::AssistantSignal));
    }

    #[test]
    fn marker_takes_priority_over_farewell() {
        let d = detector();
        let now = Utc::now();
        let decision = d.evaluate(
            "u1",
            "bye bye!",
            "See you soon! CHAT-ENDED",
            false,
            &active_session(now),
            now,
        );
        assert_eq!(decision.end_reason, Some(EndReason::AssistantSignal));
    }

    #[test]
    fn farewell_ends_active_conversation() {
        let d = detector();
        let now = Utc::now();
        let decision = d.evaluate(
            "u1",
            "bye, thanks!",
            "Goodbye!",
            false,
            &active_session(now),
            now,
        );
        assert!(decision.is_end);
        assert_eq!(decision.end_reason, Some(EndReason::UserFarewell));
        // Cache dropped on end
        assert!(d.cached_keywords("u1").is_none());
    }

    #[test]
    fn idle_active_conversation_times_out() {
        let d = detector();
        let now = Utc::now();
        let signals = ConversationSignals {
            session_active: true,
            incomplete_record: false,
            last_completed_at: None,
            last_activity: Some(now - Duration::minutes(31)),
        };
        let decision = d.evaluate("u1", "are you still there", "Yes!", false, &signals, now);
        assert!(decision.is_end);
        assert_eq!(decision.end_reason, Some(EndReason::Timeout));
    }

    #[test]
    fn fresh_activity_does_not_time_out() {
        let d = detector();
        let now = Utc::now();
        let signals = ConversationSignals {
            session_active: true,
            incomplete_record: false,
            last_completed_at: None,
            last_activity: Some(now - Duration::minutes(5)),
        };
        let decision = d.evaluate("u1", "still here", "Good!", false, &signals, now);
        assert!(!decision.is_end);
    }
}
