// src/session/options.rs
// Read-only views of collaborator configuration: scenarios and per-assignment
// chat options are written by the case-management surface, consumed here.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::ChatError;

/// How a scenario captures the student's debate position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionTracking {
    None,
    Explicit,
    AiInferred,
}

impl PositionTracking {
    pub fn parse(s: &str) -> Self {
        match s {
            "explicit" => PositionTracking::Explicit,
            "ai_inferred" => PositionTracking::AiInferred,
            _ => PositionTracking::None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Scenario {
    pub id: String,
    pub case_id: String,
    pub title: Option<String>,
    pub time_limit_minutes: Option<i64>,
    pub enabled: bool,
    pub position_tracking: PositionTracking,
    /// Allowed position labels for AI inference
    pub position_labels: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatOptions {
    pub hints_allowed: i64,
    pub chat_repeats: i64,
    pub timeout_chat: bool,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            hints_allowed: 0,
            chat_repeats: 0,
            timeout_chat: false,
        }
    }
}

pub async fn load_scenario(pool: &SqlitePool, id: &str) -> Result<Scenario, ChatError> {
    let row: Option<(String, String, Option<String>, Option<i64>, i64, String, Option<String>)> =
        sqlx::query_as(
            r#"
            SELECT id, case_id, title, time_limit_minutes, enabled,
                   position_tracking, position_labels
            FROM scenarios WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

    let (id, case_id, title, time_limit_minutes, enabled, tracking, labels) =
        row.ok_or_else(|| ChatError::NotFound(format!("scenario {}", id)))?;

    let position_labels = labels
        .as_deref()
        .and_then(|raw| serde_json::from_str::<Vec<String>>(raw).ok())
        .unwrap_or_default();

    Ok(Scenario {
        id,
        case_id,
        title,
        time_limit_minutes,
        enabled: enabled != 0,
        position_tracking: PositionTracking::parse(&tracking),
        position_labels,
    })
}

/// Chat options for a case; missing row falls back to defaults (one attempt,
/// no hints, advisory timeout).
pub async fn load_chat_options(pool: &SqlitePool, case_id: &str) -> Result<ChatOptions, ChatError> {
    let row: Option<(i64, i64, i64)> = sqlx::query_as(
        "SELECT hints_allowed, chat_repeats, timeout_chat FROM chat_options WHERE case_id = $1",
    )
    .bind(case_id)
    .fetch_optional(pool)
    .await?;

    Ok(row
        .map(|(hints_allowed, chat_repeats, timeout_chat)| ChatOptions {
            hints_allowed,
            chat_repeats,
            timeout_chat: timeout_chat != 0,
        })
        .unwrap_or_default())
}

/// Admin-granted rechat override for one (student, case) pair.
pub async fn has_rechat_override(
    pool: &SqlitePool,
    student_id: &str,
    case_id: &str,
) -> Result<bool, ChatError> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT 1 FROM rechat_overrides WHERE student_id = $1 AND case_id = $2",
    )
    .bind(student_id)
    .bind(case_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.is_some())
}
