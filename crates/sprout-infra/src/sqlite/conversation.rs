//! SQLite conversation repository implementation.
//!
//! Implements `ConversationRepository` from `sprout-core` using sqlx with
//! split read/write pools: raw queries, a private Row struct, reader pool for
//! SELECTs and writer pool for mutations. Messages and topics are stored as
//! JSON text columns since a record's messages are written once at finalize
//! time and never edited.

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use sprout_core::conversation::repository::ConversationRepository;
use sprout_types::conversation::{ConversationMessage, ConversationRecord, EndReason};
use sprout_types::error::RepositoryError;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `ConversationRepository`.
pub struct SqliteConversationRepository {
    pool: DatabasePool,
}

impl SqliteConversationRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private Row type for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct ConversationRow {
    id: String,
    user_id: String,
    messages: String,
    summary: String,
    topics: String,
    is_start: i64,
    is_end: i64,
    end_reason: Option<String>,
    complete: i64,
    created_at: String,
    ended_at: Option<String>,
    last_activity: String,
    session_summary: Option<String>,
    session_message_count: Option<i64>,
}

impl ConversationRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            messages: row.try_get("messages")?,
            summary: row.try_get("summary")?,
            topics: row.try_get("topics")?,
            is_start: row.try_get("is_start")?,
            is_end: row.try_get("is_end")?,
            end_reason: row.try_get("end_reason")?,
            complete: row.try_get("complete")?,
            created_at: row.try_get("created_at")?,
            ended_at: row.try_get("ended_at")?,
            last_activity: row.try_get("last_activity")?,
            session_summary: row.try_get("session_summary")?,
            session_message_count: row.try_get("session_message_count")?,
        })
    }

    fn into_record(self) -> Result<ConversationRecord, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid conversation id: {e}")))?;
        let messages: Vec<ConversationMessage> = serde_json::from_str(&self.messages)
            .map_err(|e| RepositoryError::Query(format!("invalid messages json: {e}")))?;
        let topics: Vec<String> = serde_json::from_str(&self.topics)
            .map_err(|e| RepositoryError::Query(format!("invalid topics json: {e}")))?;
        let end_reason = self
            .end_reason
            .as_deref()
            .map(|s| s.parse::<EndReason>())
            .transpose()
            .map_err(RepositoryError::Query)?;
        let created_at = parse_datetime(&self.created_at)?;
        let ended_at = self.ended_at.as_deref().map(parse_datetime).transpose()?;
        let last_activity = parse_datetime(&self.last_activity)?;

        Ok(ConversationRecord {
            id,
            user_id: self.user_id,
            messages,
            summary: self.summary,
            topics,
            is_start: self.is_start != 0,
            is_end: self.is_end != 0,
            end_reason,
            complete: self.complete != 0,
            created_at,
            ended_at,
            last_activity,
            session_summary: self.session_summary,
            session_message_count: self.session_message_count.map(|n| n as u32),
        })
    }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn map_sqlx(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

const SELECT_COLUMNS: &str = "id, user_id, messages, summary, topics, is_start, is_end, \
     end_reason, complete, created_at, ended_at, last_activity, session_summary, \
     session_message_count";

// ---------------------------------------------------------------------------
// ConversationRepository implementation
// ---------------------------------------------------------------------------

impl ConversationRepository for SqliteConversationRepository {
    async fn save(&self, record: &ConversationRecord) -> Result<Uuid, RepositoryError> {
        let messages = serde_json::to_string(&record.messages)
            .map_err(|e| RepositoryError::Query(format!("messages serialization: {e}")))?;
        let topics = serde_json::to_string(&record.topics)
            .map_err(|e| RepositoryError::Query(format!("topics serialization: {e}")))?;

        sqlx::query(
            r#"INSERT INTO conversations
               (id, user_id, messages, summary, topics, is_start, is_end, end_reason,
                complete, created_at, ended_at, last_activity, session_summary,
                session_message_count)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(record.id.to_string())
        .bind(&record.user_id)
        .bind(messages)
        .bind(&record.summary)
        .bind(topics)
        .bind(record.is_start as i64)
        .bind(record.is_end as i64)
        .bind(record.end_reason.map(|r| r.to_string()))
        .bind(record.complete as i64)
        .bind(format_datetime(&record.created_at))
        .bind(record.ended_at.as_ref().map(format_datetime))
        .bind(format_datetime(&record.last_activity))
        .bind(&record.session_summary)
        .bind(record.session_message_count.map(|n| n as i64))
        .execute(&self.pool.writer)
        .await
        .map_err(map_sqlx)?;

        Ok(record.id)
    }

    async fn get_last(&self, user_id: &str) -> Result<Option<ConversationRecord>, RepositoryError> {
        let query = format!(
            "SELECT {SELECT_COLUMNS} FROM conversations WHERE user_id = ? \
             ORDER BY created_at DESC LIMIT 1"
        );
        let row = sqlx::query(&query)
            .bind(user_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(map_sqlx)?;

        row.map(|r| ConversationRow::from_row(&r).map_err(map_sqlx)?.into_record())
            .transpose()
    }

    async fn get_last_completed(
        &self,
        user_id: &str,
    ) -> Result<Option<ConversationRecord>, RepositoryError> {
        let query = format!(
            "SELECT {SELECT_COLUMNS} FROM conversations WHERE user_id = ? AND complete = 1 \
             ORDER BY created_at DESC LIMIT 1"
        );
        let row = sqlx::query(&query)
            .bind(user_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(map_sqlx)?;

        row.map(|r| ConversationRow::from_row(&r).map_err(map_sqlx)?.into_record())
            .transpose()
    }

    async fn has_incomplete(&self, user_id: &str) -> Result<bool, RepositoryError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM conversations WHERE user_id = ? AND complete = 0",
        )
        .bind(user_id)
        .fetch_one(&self.pool.reader)
        .await
        .map_err(map_sqlx)?;

        Ok(count.0 > 0)
    }

    async fn get_incomplete(
        &self,
        user_id: &str,
    ) -> Result<Vec<ConversationRecord>, RepositoryError> {
        let query = format!(
            "SELECT {SELECT_COLUMNS} FROM conversations WHERE user_id = ? AND complete = 0 \
             ORDER BY created_at ASC"
        );
        let rows = sqlx::query(&query)
            .bind(user_id)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(map_sqlx)?;

        rows.iter()
            .map(|r| ConversationRow::from_row(r).map_err(map_sqlx)?.into_record())
            .collect()
    }

    async fn mark_ended(&self, user_id: &str, reason: EndReason) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE conversations SET complete = 1, ended_at = ?, end_reason = ? \
             WHERE user_id = ? AND complete = 0",
        )
        .bind(format_datetime(&Utc::now()))
        .bind(reason.to_string())
        .bind(user_id)
        .execute(&self.pool.writer)
        .await
        .map_err(map_sqlx)?;

        Ok(result.rows_affected() > 0)
    }

    async fn touch_activity(&self, user_id: &str) -> Result<(), RepositoryError> {
        // No incomplete record to refresh is not an error
        sqlx::query(
            "UPDATE conversations SET last_activity = ? WHERE user_id = ? AND complete = 0",
        )
        .bind(format_datetime(&Utc::now()))
        .bind(user_id)
        .execute(&self.pool.writer)
        .await
        .map_err(map_sqlx)?;

        Ok(())
    }

    async fn recent_summaries(
        &self,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<String>, RepositoryError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT summary FROM conversations WHERE user_id = ? \
             ORDER BY created_at DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(map_sqlx)?;

        Ok(rows.into_iter().map(|(summary,)| summary).collect())
    }

    async fn update_session_summary(
        &self,
        user_id: &str,
        summary: &str,
        message_count: u32,
    ) -> Result<(), RepositoryError> {
        // Find the newest ended record first, then update by id
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT id FROM conversations WHERE user_id = ? AND is_end = 1 \
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(map_sqlx)?;

        let Some((id,)) = row else {
            return Err(RepositoryError::NotFound);
        };

        sqlx::query(
            "UPDATE conversations SET session_summary = ?, session_message_count = ? \
             WHERE id = ?",
        )
        .bind(summary)
        .bind(message_count as i64)
        .bind(id)
        .execute(&self.pool.writer)
        .await
        .map_err(map_sqlx)?;

        Ok(())
    }

    async fn list_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<ConversationRecord>, RepositoryError> {
        let query = format!(
            "SELECT {SELECT_COLUMNS} FROM conversations WHERE user_id = ? \
             ORDER BY created_at DESC"
        );
        let rows = sqlx::query(&query)
            .bind(user_id)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(map_sqlx)?;

        rows.iter()
            .map(|r| ConversationRow::from_row(r).map_err(map_sqlx)?.into_record())
            .collect()
    }

    async fn count_conversations(&self) -> Result<u64, RepositoryError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM conversations")
            .fetch_one(&self.pool.reader)
            .await
            .map_err(map_sqlx)?;

        Ok(count.0 as u64)
    }
}
