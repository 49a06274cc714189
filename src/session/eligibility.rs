// src/session/eligibility.rs
// Repeat policy: may this student open a new attempt? Computed per request,
// never persisted. When scenarios subdivide a case, completion counting is
// scoped to the scenario; live-session exclusivity stays per (student, case).

use serde::Serialize;
use sqlx::SqlitePool;

use super::options;
use crate::error::ChatError;

#[derive(Debug, Clone, Serialize)]
pub struct EligibilityDecision {
    pub allowed: bool,
    pub completed_count: i64,
    pub max_allowed: i64,
    pub has_active_session: bool,
    pub allow_rechat: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioCompletionStatus {
    pub scenario_id: String,
    pub title: Option<String>,
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioCompletion {
    pub all_completed: bool,
    pub completed_count: i64,
    pub total_scenarios: i64,
    pub scenarios: Vec<ScenarioCompletionStatus>,
}

/// Pure decision rule: `chat_repeats` extra attempts on top of the first,
/// a live session always blocks, and an admin rechat override lifts the
/// completed-count ceiling (but never the live-session rule).
pub fn decide(
    completed_count: i64,
    has_active_session: bool,
    chat_repeats: i64,
    allow_rechat: bool,
) -> EligibilityDecision {
    let max_allowed = chat_repeats + 1;
    let under_ceiling = allow_rechat || completed_count < max_allowed;
    EligibilityDecision {
        allowed: !has_active_session && under_ceiling,
        completed_count,
        max_allowed,
        has_active_session,
        allow_rechat,
    }
}

pub struct EligibilityPolicy {
    pool: SqlitePool,
}

impl EligibilityPolicy {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn can_start_new(
        &self,
        student_id: &str,
        case_id: &str,
        scenario_id: Option<&str>,
    ) -> Result<EligibilityDecision, ChatError> {
        let opts = options::load_chat_options(&self.pool, case_id).await?;
        let allow_rechat = options::has_rechat_override(&self.pool, student_id, case_id).await?;

        // Completion count is per scenario when one is given
        let completed_count: (i64,) = match scenario_id {
            Some(scenario) => {
                sqlx::query_as(
                    r#"
                    SELECT COUNT(*) FROM case_chats
                    WHERE student_id = $1 AND case_id = $2 AND scenario_id = $3
                      AND status = 'completed'
                    "#,
                )
                .bind(student_id)
                .bind(case_id)
                .bind(scenario)
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT COUNT(*) FROM case_chats
                    WHERE student_id = $1 AND case_id = $2 AND status = 'completed'
                    "#,
                )
                .bind(student_id)
                .bind(case_id)
                .fetch_one(&self.pool)
                .await?
            }
        };

        // At most one live session per (student, case), scenario or not
        let active: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM case_chats
            WHERE student_id = $1 AND case_id = $2
              AND status IN ('started', 'in_progress')
            "#,
        )
        .bind(student_id)
        .bind(case_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(decide(
            completed_count.0,
            active.0 > 0,
            opts.chat_repeats,
            allow_rechat,
        ))
    }

    /// A multi-scenario case is complete only when every enabled scenario has
    /// at least one completed session for this student.
    pub async fn check_scenario_completion(
        &self,
        student_id: &str,
        case_id: &str,
    ) -> Result<ScenarioCompletion, ChatError> {
        let rows: Vec<(String, Option<String>, i64)> = sqlx::query_as(
            r#"
            SELECT s.id, s.title,
                   EXISTS (
                       SELECT 1 FROM case_chats c
                       WHERE c.student_id = $1 AND c.scenario_id = s.id
                         AND c.status = 'completed'
                   ) AS completed
            FROM scenarios s
            WHERE s.case_id = $2 AND s.enabled = 1
            ORDER BY s.id
            "#,
        )
        .bind(student_id)
        .bind(case_id)
        .fetch_all(&self.pool)
        .await?;

        let scenarios: Vec<ScenarioCompletionStatus> = rows
            .into_iter()
            .map(|(scenario_id, title, completed)| ScenarioCompletionStatus {
                scenario_id,
                title,
                completed: completed != 0,
            })
            .collect();

        let total_scenarios = scenarios.len() as i64;
        let completed_count = scenarios.iter().filter(|s| s.completed).count() as i64;

        Ok(ScenarioCompletion {
            all_completed: total_scenarios > 0 && completed_count == total_scenarios,
            completed_count,
            total_scenarios,
            scenarios,
        })
    }
}
