// src/session/store.rs
// Persistence for case-chat sessions. Every transition into a terminal state
// is a compare-and-set: the UPDATE only matches while the row is still live,
// so a heartbeat racing the sweeper (or two completions racing each other)
// resolves at the database, not in handler code.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::status::SessionStatus;
use crate::db::now_ts;
use crate::error::ChatError;

#[derive(Debug, Clone)]
pub struct ChatSession {
    pub id: String,
    pub student_id: String,
    pub case_id: String,
    pub scenario_id: Option<String>,
    pub section_id: Option<String>,
    pub status: SessionStatus,
    pub persona: String,
    pub chat_model: String,
    pub hints_used: i64,
    pub time_limit_minutes: Option<i64>,
    pub time_started: Option<i64>,
    pub start_time: i64,
    pub last_activity: i64,
    pub end_time: Option<i64>,
    pub transcript: Option<String>,
    pub evaluation_id: Option<String>,
    pub initial_position: Option<String>,
    pub final_position: Option<String>,
    pub position_method: Option<String>,
}

impl ChatSession {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let raw_status: String = row.try_get("status")?;
        let status = SessionStatus::parse(&raw_status).ok_or_else(|| {
            sqlx::Error::Decode(format!("unknown session status '{}'", raw_status).into())
        })?;
        Ok(Self {
            id: row.try_get("id")?,
            student_id: row.try_get("student_id")?,
            case_id: row.try_get("case_id")?,
            scenario_id: row.try_get("scenario_id")?,
            section_id: row.try_get("section_id")?,
            status,
            persona: row.try_get("persona")?,
            chat_model: row.try_get("chat_model")?,
            hints_used: row.try_get("hints_used")?,
            time_limit_minutes: row.try_get("time_limit_minutes")?,
            time_started: row.try_get("time_started")?,
            start_time: row.try_get("start_time")?,
            last_activity: row.try_get("last_activity")?,
            end_time: row.try_get("end_time")?,
            transcript: row.try_get("transcript")?,
            evaluation_id: row.try_get("evaluation_id")?,
            initial_position: row.try_get("initial_position")?,
            final_position: row.try_get("final_position")?,
            position_method: row.try_get("position_method")?,
        })
    }
}

/// Inputs for creating a session. The time limit is snapshotted from the
/// scenario by the caller; the row never re-reads scenario config.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub student_id: String,
    pub case_id: String,
    pub scenario_id: Option<String>,
    pub section_id: Option<String>,
    pub persona: String,
    pub chat_model: String,
    pub time_limit_minutes: Option<i64>,
}

pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn insert(&self, new: NewSession) -> Result<ChatSession, ChatError> {
        let id = Uuid::new_v4().to_string();
        let now = now_ts();
        sqlx::query(
            r#"
            INSERT INTO case_chats
                (id, student_id, case_id, scenario_id, section_id, status,
                 persona, chat_model, time_limit_minutes, start_time, last_activity)
            VALUES ($1, $2, $3, $4, $5, 'started', $6, $7, $8, $9, $9)
            "#,
        )
        .bind(&id)
        .bind(&new.student_id)
        .bind(&new.case_id)
        .bind(&new.scenario_id)
        .bind(&new.section_id)
        .bind(&new.persona)
        .bind(&new.chat_model)
        .bind(new.time_limit_minutes)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get(&id).await
    }

    pub async fn get(&self, id: &str) -> Result<ChatSession, ChatError> {
        let row = sqlx::query("SELECT * FROM case_chats WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(ChatSession::from_row(&row).map_err(anyhow::Error::from)?),
            None => Err(ChatError::NotFound(format!("session {}", id))),
        }
    }

    /// Refresh last_activity and promote started → in_progress, but only
    /// while the row is still live. Returns the refreshed row or the typed
    /// error explaining why the heartbeat was rejected.
    pub async fn heartbeat(&self, id: &str) -> Result<ChatSession, ChatError> {
        let now = now_ts();
        let result = sqlx::query(
            r#"
            UPDATE case_chats
            SET last_activity = $1,
                status = CASE WHEN status = 'started' THEN 'in_progress' ELSE status END
            WHERE id = $2 AND status IN ('started', 'in_progress')
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let session = self.get(id).await?;
            return Err(ChatError::InvalidState(format!(
                "session {} is {}; heartbeat rejected",
                id, session.status
            )));
        }
        self.get(id).await
    }

    /// Compare-and-set transition into a terminal state (or back to
    /// in_progress). Fails if the row already left the live set.
    pub async fn transition(
        &self,
        id: &str,
        target: SessionStatus,
    ) -> Result<ChatSession, ChatError> {
        let current = self.get(id).await?;
        if !current.status.can_transition_to(target) {
            return Err(ChatError::InvalidState(format!(
                "session {} is {}; cannot move to {}",
                id, current.status, target
            )));
        }

        let now = now_ts();
        let end_time: Option<i64> = target.is_terminal().then_some(now);
        let result = sqlx::query(
            r#"
            UPDATE case_chats
            SET status = $1, end_time = $2, last_activity = $3
            WHERE id = $4 AND status IN ('started', 'in_progress')
            "#,
        )
        .bind(target.as_str())
        .bind(end_time)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Lost the race with another terminal transition
            let session = self.get(id).await?;
            return Err(ChatError::InvalidState(format!(
                "session {} is {}; cannot move to {}",
                id, session.status, target
            )));
        }
        self.get(id).await
    }

    /// The only write that produces `completed`. Conditioned on the row not
    /// already being terminal, so a duplicate completion surfaces as Conflict
    /// and leaves the original evaluation link untouched.
    pub async fn complete(
        &self,
        id: &str,
        evaluation_id: &str,
        transcript: Option<&str>,
    ) -> Result<ChatSession, ChatError> {
        let now = now_ts();
        let result = sqlx::query(
            r#"
            UPDATE case_chats
            SET status = 'completed', end_time = $1, last_activity = $1,
                evaluation_id = $2, transcript = COALESCE($3, transcript)
            WHERE id = $4 AND status IN ('started', 'in_progress')
            "#,
        )
        .bind(now)
        .bind(evaluation_id)
        .bind(transcript)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let session = self.get(id).await?;
            return match session.status {
                SessionStatus::Completed => Err(ChatError::Conflict(format!(
                    "session {} already completed",
                    id
                ))),
                other => Err(ChatError::InvalidState(format!(
                    "session {} is {}; cannot complete",
                    id, other
                ))),
            };
        }
        self.get(id).await
    }

    /// Idempotent countdown start: only the first call writes time_started,
    /// every call returns the stored value.
    pub async fn start_timer(&self, id: &str) -> Result<i64, ChatError> {
        let now = now_ts();
        sqlx::query(
            "UPDATE case_chats SET time_started = $1 WHERE id = $2 AND time_started IS NULL",
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        let session = self.get(id).await?;
        session
            .time_started
            .ok_or_else(|| ChatError::Internal(anyhow::anyhow!("time_started missing after start")))
    }

    /// Cancel the old attempt and open a fresh one in a single transaction,
    /// so a crash between the two writes cannot leave the student with zero
    /// or two live sessions.
    pub async fn restart(
        &self,
        old_id: &str,
        new: NewSession,
    ) -> Result<ChatSession, ChatError> {
        let old = self.get(old_id).await?;
        if old.status.is_terminal() {
            return Err(ChatError::InvalidState(format!(
                "session {} is {}; cannot restart",
                old_id, old.status
            )));
        }

        let mut tx = self.pool.begin().await?;
        let now = now_ts();

        let canceled = sqlx::query(
            r#"
            UPDATE case_chats
            SET status = 'canceled', end_time = $1, last_activity = $1
            WHERE id = $2 AND status IN ('started', 'in_progress')
            "#,
        )
        .bind(now)
        .bind(old_id)
        .execute(&mut *tx)
        .await?;

        if canceled.rows_affected() == 0 {
            tx.rollback().await?;
            let session = self.get(old_id).await?;
            return Err(ChatError::InvalidState(format!(
                "session {} is {}; cannot restart",
                old_id, session.status
            )));
        }

        let new_id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO case_chats
                (id, student_id, case_id, scenario_id, section_id, status,
                 persona, chat_model, time_limit_minutes, start_time, last_activity)
            VALUES ($1, $2, $3, $4, $5, 'started', $6, $7, $8, $9, $9)
            "#,
        )
        .bind(&new_id)
        .bind(&new.student_id)
        .bind(&new.case_id)
        .bind(&new.scenario_id)
        .bind(&new.section_id)
        .bind(&new.persona)
        .bind(&new.chat_model)
        .bind(new.time_limit_minutes)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.get(&new_id).await
    }

    /// Bulk abandonment sweep: one conditional UPDATE, so overlapping
    /// invocations and concurrent heartbeats cannot double-count or resurrect
    /// a row. Returns the number of sessions abandoned.
    pub async fn sweep_abandoned(&self, inactive_cutoff: i64) -> Result<u64, ChatError> {
        let now = now_ts();
        let result = sqlx::query(
            r#"
            UPDATE case_chats
            SET status = 'abandoned', end_time = $1
            WHERE status IN ('started', 'in_progress') AND last_activity < $2
            "#,
        )
        .bind(now)
        .bind(inactive_cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Hard delete. The evaluation (external entity) is referenced by id only,
    /// so removing the session leaves grading data intact.
    pub async fn delete(&self, id: &str) -> Result<(), ChatError> {
        // Existence check first so the caller can tell delete-of-nothing apart
        self.get(id).await?;

        sqlx::query("DELETE FROM position_log WHERE session_id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM case_chats WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn increment_hints(&self, id: &str) -> Result<i64, ChatError> {
        let result = sqlx::query(
            r#"
            UPDATE case_chats SET hints_used = hints_used + 1
            WHERE id = $1 AND status IN ('started', 'in_progress')
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let session = self.get(id).await?;
            return Err(ChatError::InvalidState(format!(
                "session {} is {}; cannot use hints",
                id, session.status
            )));
        }
        Ok(self.get(id).await?.hints_used)
    }

    /// Update the denormalized latest-position cache on the session row.
    /// The append-only position_log remains the source of truth.
    pub async fn cache_position(
        &self,
        id: &str,
        position_type: &str,
        value: &str,
        method: &str,
    ) -> Result<(), ChatError> {
        let column = match position_type {
            "initial" => "initial_position",
            "final" => "final_position",
            other => {
                return Err(ChatError::Validation(format!(
                    "unknown position type '{}'",
                    other
                )))
            }
        };
        let sql = format!(
            "UPDATE case_chats SET {} = $1, position_method = $2 WHERE id = $3",
            column
        );
        sqlx::query(&sql)
            .bind(value)
            .bind(method)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
