use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use solace_schema::{AnalysisRecord, Conversation, MessageRole, StoredMessage};
use tokio::task;
use uuid::Uuid;

use crate::migrations::run_migrations;

/// Outcome of the atomic usage check-and-increment.
#[derive(Debug, Clone, PartialEq)]
pub enum UsageDecision {
    Granted { remaining: i64 },
    Denied { limit: i64, resets_at: DateTime<Utc> },
}

#[derive(Clone)]
pub struct ConversationStore {
    db: Arc<Mutex<Connection>>,
}

/// Fixed-width UTC timestamps so lexicographic order in SQL matches
/// chronological order.
fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

impl ConversationStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        run_migrations(&conn)?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        run_migrations(&conn)?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|_| anyhow!("failed to lock sqlite connection"))?;
            f(&conn)
        })
        .await?
    }

    pub async fn create_conversation(
        &self,
        user_id: Uuid,
        title: Option<String>,
    ) -> Result<Conversation> {
        let conversation = Conversation {
            id: Uuid::new_v4(),
            user_id,
            title,
            crisis_flagged: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let row = conversation.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO conversations (id, user_id, title, crisis_flagged, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    row.id.to_string(),
                    row.user_id.to_string(),
                    row.title,
                    row.crisis_flagged as i64,
                    ts(row.created_at),
                    ts(row.updated_at),
                ],
            )?;
            Ok(())
        })
        .await?;
        Ok(conversation)
    }

    /// Fetch a conversation only if it belongs to `user_id`. A conversation
    /// owned by someone else is indistinguishable from a missing one.
    pub async fn get_owned(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Conversation>> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, user_id, title, crisis_flagged, created_at, updated_at
                 FROM conversations WHERE id = ?1 AND user_id = ?2",
                params![conversation_id.to_string(), user_id.to_string()],
                conversation_from_row,
            )
            .optional()
            .map_err(Into::into)
        })
        .await
    }

    pub async fn flag_crisis(&self, conversation_id: Uuid) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE conversations SET crisis_flagged = 1, updated_at = ?2 WHERE id = ?1",
                params![conversation_id.to_string(), ts(Utc::now())],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn touch(&self, conversation_id: Uuid) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE conversations SET updated_at = ?2 WHERE id = ?1",
                params![conversation_id.to_string(), ts(Utc::now())],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn append_message(
        &self,
        conversation_id: Uuid,
        role: MessageRole,
        text: &str,
    ) -> Result<StoredMessage> {
        let message = StoredMessage {
            id: Uuid::new_v4(),
            conversation_id,
            role,
            text: text.to_string(),
            created_at: Utc::now(),
        };
        let row = message.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO messages (id, conversation_id, role, text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    row.id.to_string(),
                    row.conversation_id.to_string(),
                    row.role.as_str(),
                    row.text,
                    ts(row.created_at),
                ],
            )?;
            Ok(())
        })
        .await?;
        Ok(message)
    }

    /// The last `limit` messages, most-recent-last.
    pub async fn recent_messages(
        &self,
        conversation_id: Uuid,
        limit: usize,
    ) -> Result<Vec<StoredMessage>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, role, text, created_at FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
            )?;
            let mut messages: Vec<StoredMessage> = stmt
                .query_map(
                    params![conversation_id.to_string(), limit as i64],
                    message_from_row,
                )?
                .collect::<std::result::Result<_, _>>()?;
            messages.reverse();
            Ok(messages)
        })
        .await
    }

    pub async fn message_count(&self, conversation_id: Uuid) -> Result<usize> {
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
                params![conversation_id.to_string()],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await
    }

    pub async fn load_analysis(&self, conversation_id: Uuid) -> Result<Option<AnalysisRecord>> {
        self.with_conn(move |conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT record FROM analysis_records WHERE conversation_id = ?1",
                    params![conversation_id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            match raw {
                Some(json) => Ok(Some(serde_json::from_str(&json)?)),
                None => Ok(None),
            }
        })
        .await
    }

    pub async fn save_analysis(
        &self,
        conversation_id: Uuid,
        record: &AnalysisRecord,
    ) -> Result<()> {
        let json = serde_json::to_string(record)?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO analysis_records (conversation_id, record, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(conversation_id) DO UPDATE SET
                   record = excluded.record, updated_at = excluded.updated_at",
                params![conversation_id.to_string(), json, ts(Utc::now())],
            )?;
            Ok(())
        })
        .await
    }

    /// Atomic check-and-increment over the user's usage window.
    ///
    /// The limit guard lives in the conditional UPDATE itself, so two
    /// concurrent requests near the boundary can never both observe "under
    /// limit" and both be let through. An expired window is reset lazily in
    /// the same transaction.
    pub async fn try_consume_usage(
        &self,
        user_id: Uuid,
        limit: i64,
        period: Duration,
    ) -> Result<UsageDecision> {
        self.with_conn(move |conn| {
            let now = Utc::now();
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO usage_counters (user_id, period_start, period_end, count)
                 VALUES (?1, ?2, ?3, 0)
                 ON CONFLICT(user_id) DO NOTHING",
                params![user_id.to_string(), ts(now), ts(now + period)],
            )?;
            tx.execute(
                "UPDATE usage_counters SET period_start = ?2, period_end = ?3, count = 0
                 WHERE user_id = ?1 AND period_end <= ?2",
                params![user_id.to_string(), ts(now), ts(now + period)],
            )?;
            let granted = tx.execute(
                "UPDATE usage_counters SET count = count + 1
                 WHERE user_id = ?1 AND count < ?2",
                params![user_id.to_string(), limit],
            )?;
            let decision = if granted == 1 {
                let count: i64 = tx.query_row(
                    "SELECT count FROM usage_counters WHERE user_id = ?1",
                    params![user_id.to_string()],
                    |row| row.get(0),
                )?;
                UsageDecision::Granted {
                    remaining: limit - count,
                }
            } else {
                let period_end: String = tx.query_row(
                    "SELECT period_end FROM usage_counters WHERE user_id = ?1",
                    params![user_id.to_string()],
                    |row| row.get(0),
                )?;
                UsageDecision::Denied {
                    limit,
                    resets_at: parse_ts(&period_end)?,
                }
            };
            tx.commit()?;
            Ok(decision)
        })
        .await
    }
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let created_at: String = row.get(4)?;
    let updated_at: String = row.get(5)?;
    Ok(Conversation {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        user_id: Uuid::parse_str(&user_id).unwrap_or_default(),
        title: row.get(2)?,
        crisis_flagged: row.get::<_, i64>(3)? != 0,
        created_at: parse_ts(&created_at).unwrap_or_default(),
        updated_at: parse_ts(&updated_at).unwrap_or_default(),
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<StoredMessage> {
    let id: String = row.get(0)?;
    let conversation_id: String = row.get(1)?;
    let role: String = row.get(2)?;
    let created_at: String = row.get(4)?;
    Ok(StoredMessage {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        conversation_id: Uuid::parse_str(&conversation_id).unwrap_or_default(),
        role: MessageRole::parse(&role).unwrap_or(MessageRole::User),
        text: row.get(3)?,
        created_at: parse_ts(&created_at).unwrap_or_default(),
    })
}
