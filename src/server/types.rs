// src/server/types.rs
// Wire DTOs for the orchestration API.

use serde::{Deserialize, Serialize};

use crate::llm::provider::{ChatMessage, Usage};
use crate::session::status::SessionStatus;
use crate::session::store::ChatSession;

pub const API_VERSION: &str = "1";

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub student_id: String,
    pub case_id: String,
    pub scenario_id: Option<String>,
    pub section_id: Option<String>,
    pub persona: String,
    pub chat_model: String,
}

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub status: SessionStatus,
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub evaluation_id: String,
    pub transcript: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetPositionRequest {
    pub position_type: crate::session::position::PositionType,
    pub value: String,
    pub recorded_by: crate::session::position::RecordedBy,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EligibilityQuery {
    pub student_id: String,
    pub case_id: String,
    pub scenario_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScenarioCompletionQuery {
    pub student_id: String,
    pub case_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub model_id: String,
    pub system_prompt: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    pub message: String,
    pub session_id: Option<String>,
    pub persona: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    /// Assistant messages in transcript order (retry splicing included)
    pub messages: Vec<String>,
    pub usage: Option<Usage>,
    pub retried: bool,
    pub degraded: bool,
}

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    pub model_id: String,
    pub prompt: String,
    pub case_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EvaluateResponse {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub swept: u64,
}

#[derive(Debug, Serialize)]
pub struct HintsResponse {
    pub hints_used: i64,
}

#[derive(Debug, Serialize)]
pub struct TimeRemainingResponse {
    #[serde(flatten)]
    pub time: crate::session::TimeStatus,
    /// Whether expiry auto-submits (advisory to the UI; assignment config)
    pub timeout_chat: bool,
}

/// Session row as exposed over the wire
#[derive(Debug, Serialize)]
pub struct SessionView {
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
    pub evaluation_id: Option<String>,
    pub initial_position: Option<String>,
    pub final_position: Option<String>,
    pub position_method: Option<String>,
}

impl From<ChatSession> for SessionView {
    fn from(s: ChatSession) -> Self {
        Self {
            id: s.id,
            student_id: s.student_id,
            case_id: s.case_id,
            scenario_id: s.scenario_id,
            section_id: s.section_id,
            status: s.status,
            persona: s.persona,
            chat_model: s.chat_model,
            hints_used: s.hints_used,
            time_limit_minutes: s.time_limit_minutes,
            time_started: s.time_started,
            start_time: s.start_time,
            last_activity: s.last_activity,
            end_time: s.end_time,
            evaluation_id: s.evaluation_id,
            initial_position: s.initial_position,
            final_position: s.final_position,
            position_method: s.position_method,
        }
    }
}
