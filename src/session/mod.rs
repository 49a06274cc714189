// src/session/mod.rs
// Lifecycle of one case-chat attempt: created when a student opens a case or
// scenario, mutated by heartbeat/status/completion/kill, ended by the student,
// an admin, an evaluation, or the abandonment sweeper. The audit trail is
// permanent; only an explicit admin delete removes a row.

pub mod eligibility;
pub mod options;
pub mod position;
pub mod status;
pub mod store;
pub mod sweeper;
pub mod timer;

use std::sync::Arc;
use tracing::info;

use crate::db::now_ts;
use crate::error::ChatError;
pub use status::SessionStatus;
pub use store::{ChatSession, NewSession, SessionStore};
pub use timer::TimeStatus;

/// Inputs for opening an attempt. The scenario's time limit is snapshotted
/// onto the session; later scenario edits never reach an in-flight attempt.
#[derive(Debug, Clone)]
pub struct CreateSession {
    pub student_id: String,
    pub case_id: String,
    pub scenario_id: Option<String>,
    pub section_id: Option<String>,
    pub persona: String,
    pub chat_model: String,
}

pub struct SessionService {
    store: Arc<SessionStore>,
    eligibility: Arc<eligibility::EligibilityPolicy>,
}

impl SessionService {
    pub fn new(store: Arc<SessionStore>, eligibility: Arc<eligibility::EligibilityPolicy>) -> Self {
        Self { store, eligibility }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub async fn create(&self, req: CreateSession) -> Result<ChatSession, ChatError> {
        for (field, value) in [
            ("student_id", &req.student_id),
            ("case_id", &req.case_id),
            ("persona", &req.persona),
            ("chat_model", &req.chat_model),
        ] {
            if value.trim().is_empty() {
                return Err(ChatError::Validation(format!("{} is required", field)));
            }
        }

        let decision = self
            .eligibility
            .can_start_new(&req.student_id, &req.case_id, req.scenario_id.as_deref())
            .await?;
        if !decision.allowed {
            let reason = if decision.has_active_session {
                "an active session already exists for this case"
            } else {
                "attempt limit reached for this case"
            };
            return Err(ChatError::Conflict(reason.to_string()));
        }

        let new = self.prepare(&req).await?;
        let session = self.store.insert(new).await?;
        info!(
            "session {} created for student {} on case {}",
            session.id, session.student_id, session.case_id
        );
        Ok(session)
    }

    /// Keep-alive from the UI. Promotes started → in_progress, refreshes
    /// last_activity, and starts the countdown on a timed session's first
    /// heartbeat. Rejected from terminal states so the caller learns its
    /// session already ended.
    pub async fn heartbeat(&self, id: &str) -> Result<ChatSession, ChatError> {
        let session = self.store.heartbeat(id).await?;
        if session.time_limit_minutes.is_some() && session.time_started.is_none() {
            self.store.start_timer(id).await?;
            return self.store.get(id).await;
        }
        Ok(session)
    }

    /// Student-initiated explicit transition (exit → canceled, or back to
    /// in_progress). Completion and kill have their own entry points.
    pub async fn set_status(
        &self,
        id: &str,
        target: SessionStatus,
    ) -> Result<ChatSession, ChatError> {
        match target {
            SessionStatus::Completed => Err(ChatError::Validation(
                "completion requires an evaluation; use the complete operation".into(),
            )),
            SessionStatus::Killed => Err(ChatError::Validation(
                "kill is an operator action; use the kill operation".into(),
            )),
            SessionStatus::Started => Err(ChatError::Validation(
                "sessions cannot return to started".into(),
            )),
            _ => self.store.transition(id, target).await,
        }
    }

    /// The only path to `completed`. A duplicate completion surfaces as
    /// Conflict: it means two evaluation submissions raced.
    pub async fn complete(
        &self,
        id: &str,
        evaluation_id: &str,
        transcript: Option<&str>,
    ) -> Result<ChatSession, ChatError> {
        if evaluation_id.trim().is_empty() {
            return Err(ChatError::Validation("evaluation_id is required".into()));
        }
        let session = self.store.complete(id, evaluation_id, transcript).await?;
        info!("session {} completed with evaluation {}", id, evaluation_id);
        Ok(session)
    }

    /// Operator-initiated termination; same effect as a cancel but attributed
    /// to an admin for the audit trail.
    pub async fn kill(&self, id: &str, operator: &str) -> Result<ChatSession, ChatError> {
        let session = self.store.transition(id, SessionStatus::Killed).await?;
        info!("session {} killed by operator {}", id, operator);
        Ok(session)
    }

    /// Admin hard delete. The referenced evaluation is an external entity and
    /// survives; only the session row and its position log go.
    pub async fn delete(&self, id: &str, operator: &str) -> Result<(), ChatError> {
        self.store.delete(id).await?;
        info!("session {} deleted by operator {}", id, operator);
        Ok(())
    }

    /// Cancel the current attempt and open a fresh one atomically.
    pub async fn restart(&self, id: &str) -> Result<ChatSession, ChatError> {
        let old = self.store.get(id).await?;
        let req = CreateSession {
            student_id: old.student_id.clone(),
            case_id: old.case_id.clone(),
            scenario_id: old.scenario_id.clone(),
            section_id: old.section_id.clone(),
            persona: old.persona.clone(),
            chat_model: old.chat_model.clone(),
        };
        // Re-snapshot the scenario limit: a restart is a new attempt
        let new = self.prepare(&req).await?;
        let session = self.store.restart(id, new).await?;
        info!("session {} restarted as {}", id, session.id);
        Ok(session)
    }

    /// Idempotent countdown start; duplicate calls return the original
    /// time_started.
    pub async fn start_timer(&self, id: &str) -> Result<TimeStatus, ChatError> {
        let session = self.store.get(id).await?;
        if session.status.is_terminal() {
            return Err(ChatError::InvalidState(format!(
                "session {} is {}; timer cannot start",
                id, session.status
            )));
        }
        self.store.start_timer(id).await?;
        let session = self.store.get(id).await?;
        Ok(timer::time_status(&session, now_ts()))
    }

    pub async fn time_remaining(&self, id: &str) -> Result<TimeStatus, ChatError> {
        let session = self.store.get(id).await?;
        Ok(timer::time_status(&session, now_ts()))
    }

    pub async fn use_hint(&self, id: &str) -> Result<i64, ChatError> {
        self.store.increment_hints(id).await
    }

    pub async fn get(&self, id: &str) -> Result<ChatSession, ChatError> {
        self.store.get(id).await
    }

    async fn prepare(&self, req: &CreateSession) -> Result<NewSession, ChatError> {
        let time_limit_minutes = match req.scenario_id.as_deref() {
            Some(scenario_id) => {
                let scenario = options::load_scenario(self.store.pool(), scenario_id).await?;
                if !scenario.enabled {
                    return Err(ChatError::Validation(format!(
                        "scenario {} is disabled",
                        scenario_id
                    )));
                }
                scenario.time_limit_minutes
            }
            None => None,
        };

        Ok(NewSession {
            student_id: req.student_id.clone(),
            case_id: req.case_id.clone(),
            scenario_id: req.scenario_id.clone(),
            section_id: req.section_id.clone(),
            persona: req.persona.clone(),
            chat_model: req.chat_model.clone(),
            time_limit_minutes,
        })
    }
}
