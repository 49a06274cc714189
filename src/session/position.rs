// src/session/position.rs
// Debate-position capture. The append-only position_log is the source of
// truth; the session row's initial/final fields are a denormalized cache of
// the latest entry. AI inference runs after completion as a best-effort
// fallback and is never allowed to fail the completion itself.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::options::{self, PositionTracking};
use super::store::{ChatSession, SessionStore};
use crate::content::load_case_context;
use crate::db::now_ts;
use crate::error::ChatError;
use crate::llm::router::ModelRouter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionType {
    Initial,
    Final,
}

impl PositionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionType::Initial => "initial",
            PositionType::Final => "final",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordedBy {
    Student,
    Ai,
    Instructor,
}

impl RecordedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordedBy::Student => "student",
            RecordedBy::Ai => "ai",
            RecordedBy::Instructor => "instructor",
        }
    }

    /// position_method value cached on the session row
    pub fn method(&self) -> &'static str {
        match self {
            RecordedBy::Student => "explicit",
            RecordedBy::Ai => "ai_inferred",
            RecordedBy::Instructor => "instructor_manual",
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PositionLogEntry {
    pub id: String,
    pub session_id: String,
    pub position_type: String,
    pub value: Option<String>,
    pub recorded_by: String,
    pub confidence: Option<f64>,
    pub notes: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: i64,
}

/// Outcome of parsing a model's inference reply against the allowed labels.
#[derive(Debug)]
pub struct ParsedInference {
    pub label: String,
    pub confidence: f64,
}

#[derive(Deserialize)]
struct InferenceJson {
    position: String,
    confidence: Option<f64>,
}

/// Match the model reply to an allowed label. Prefers the structured JSON the
/// prompt asks for, falls back to scanning the raw text for a label.
pub fn parse_inference(reply: &str, allowed: &[String]) -> Result<ParsedInference, String> {
    let trimmed = reply.trim().trim_start_matches("```json").trim_matches('`').trim();

    if let Ok(parsed) = serde_json::from_str::<InferenceJson>(trimmed) {
        let wanted = parsed.position.trim().to_lowercase();
        if let Some(label) = allowed.iter().find(|l| l.to_lowercase() == wanted) {
            return Ok(ParsedInference {
                label: label.clone(),
                confidence: parsed.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
            });
        }
        return Err(format!("model returned unlisted position '{}'", parsed.position));
    }

    let lowered = reply.to_lowercase();
    if let Some(label) = allowed.iter().find(|l| lowered.contains(&l.to_lowercase())) {
        return Ok(ParsedInference {
            label: label.clone(),
            confidence: 0.5,
        });
    }

    Err("no allowed label found in model reply".to_string())
}

pub struct PositionTracker {
    pool: SqlitePool,
    store: Arc<SessionStore>,
    router: Arc<ModelRouter>,
    inference_model: String,
}

impl PositionTracker {
    pub fn new(
        pool: SqlitePool,
        store: Arc<SessionStore>,
        router: Arc<ModelRouter>,
        inference_model: String,
    ) -> Self {
        Self {
            pool,
            store,
            router,
            inference_model,
        }
    }

    /// Append a position entry and refresh the session's cached fields.
    pub async fn record(
        &self,
        session_id: &str,
        position_type: PositionType,
        value: &str,
        recorded_by: RecordedBy,
        confidence: Option<f64>,
        notes: Option<&str>,
    ) -> Result<PositionLogEntry, ChatError> {
        if value.trim().is_empty() {
            return Err(ChatError::Validation("position value is empty".into()));
        }
        // Session must exist; terminal sessions still accept instructor edits
        self.store.get(session_id).await?;

        let entry = self
            .append(
                session_id,
                position_type,
                Some(value),
                recorded_by,
                confidence,
                notes,
                None,
            )
            .await?;

        self.store
            .cache_position(session_id, position_type.as_str(), value, recorded_by.method())
            .await?;

        Ok(entry)
    }

    pub async fn history(&self, session_id: &str) -> Result<Vec<PositionLogEntry>, ChatError> {
        self.store.get(session_id).await?;
        let entries = sqlx::query_as::<_, PositionLogEntry>(
            // rowid preserves insertion order; created_at is second-precision
            // and ties within one second
            "SELECT * FROM position_log WHERE session_id = $1 ORDER BY rowid",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    /// Post-completion fallback: infer the final position from the transcript
    /// when the scenario asks for ai_inferred capture and nothing was
    /// recorded. Failures land in the log with a reason and are otherwise
    /// swallowed — completion and scoring never depend on this.
    pub async fn maybe_infer_final(&self, session: &ChatSession) {
        let Some(scenario_id) = session.scenario_id.as_deref() else {
            return;
        };
        let scenario = match options::load_scenario(&self.pool, scenario_id).await {
            Ok(s) => s,
            Err(e) => {
                warn!("position inference skipped, scenario load failed: {}", e);
                return;
            }
        };
        if scenario.position_tracking != PositionTracking::AiInferred {
            return;
        }
        if session.final_position.is_some() {
            return;
        }
        let transcript = match session.transcript.as_deref() {
            Some(t) if !t.trim().is_empty() => t,
            _ => return,
        };
        if scenario.position_labels.is_empty() {
            warn!("position inference skipped for session {}: no labels configured", session.id);
            return;
        }

        let prompt = self
            .build_inference_prompt(session, transcript, &scenario.position_labels)
            .await;

        let outcome = self
            .router
            .evaluate(&self.inference_model, &prompt, Some(&session.case_id))
            .await;

        match outcome {
            Ok(outcome) => match parse_inference(&outcome.text, &scenario.position_labels) {
                Ok(parsed) => {
                    info!(
                        "inferred final position '{}' (confidence {:.2}) for session {}",
                        parsed.label, parsed.confidence, session.id
                    );
                    let recorded = self
                        .record(
                            &session.id,
                            PositionType::Final,
                            &parsed.label,
                            RecordedBy::Ai,
                            Some(parsed.confidence),
                            None,
                        )
                        .await;
                    if let Err(e) = recorded {
                        warn!("failed to store inferred position for {}: {}", session.id, e);
                    }
                }
                Err(reason) => self.log_inference_failure(&session.id, &reason).await,
            },
            Err(e) => {
                self.log_inference_failure(&session.id, &e.to_string()).await;
            }
        }
    }

    async fn build_inference_prompt(
        &self,
        session: &ChatSession,
        transcript: &str,
        labels: &[String],
    ) -> String {
        let case_context = load_case_context(&self.pool, &session.case_id)
            .await
            .unwrap_or_default();

        format!(
            "You are reviewing a student's conversation about a business case.\n\
             Case context:\n{}\n\n\
             Transcript:\n{}\n\n\
             Which of these positions did the student ultimately take? \
             Allowed positions: {}.\n\
             Reply with JSON only: {{\"position\": \"<one allowed position>\", \"confidence\": <0.0-1.0>}}",
            case_context,
            transcript,
            labels.join(", ")
        )
    }

    async fn log_inference_failure(&self, session_id: &str, reason: &str) {
        warn!("position inference failed for session {}: {}", session_id, reason);
        let appended = self
            .append(
                session_id,
                PositionType::Final,
                None,
                RecordedBy::Ai,
                None,
                None,
                Some(reason),
            )
            .await;
        if let Err(e) = appended {
            warn!("failed to log inference failure for {}: {}", session_id, e);
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn append(
        &self,
        session_id: &str,
        position_type: PositionType,
        value: Option<&str>,
        recorded_by: RecordedBy,
        confidence: Option<f64>,
        notes: Option<&str>,
        failure_reason: Option<&str>,
    ) -> Result<PositionLogEntry, ChatError> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO position_log
                (id, session_id, position_type, value, recorded_by,
                 confidence, notes, failure_reason, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&id)
        .bind(session_id)
        .bind(position_type.as_str())
        .bind(value)
        .bind(recorded_by.as_str())
        .bind(confidence)
        .bind(notes)
        .bind(failure_reason)
        .bind(now_ts())
        .execute(&self.pool)
        .await?;

        let entry = sqlx::query_as::<_, PositionLogEntry>(
            "SELECT * FROM position_log WHERE id = $1",
        )
        .bind(&id)
        .fetch_one(&self.pool)
        .await?;
        Ok(entry)
    }
}
