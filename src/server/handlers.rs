// src/server/handlers.rs
// Thin axum handlers: extract, delegate to services, map domain errors
// through ChatError's IntoResponse.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};
use tracing::debug;

use super::types::*;
use crate::error::ChatError;
use crate::session::eligibility::{EligibilityDecision, ScenarioCompletion};
use crate::session::options;
use crate::session::position::PositionLogEntry;
use crate::session::{CreateSession, TimeStatus};
use crate::state::AppState;

/// Caller identity/role arrive from the external auth collaborator as
/// headers on the internal network.
fn caller_role(headers: &HeaderMap) -> &str {
    headers
        .get("x-caller-role")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("student")
}

fn caller_id(headers: &HeaderMap) -> String {
    headers
        .get("x-caller-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

fn require_admin(headers: &HeaderMap) -> Result<String, ChatError> {
    if caller_role(headers) != "admin" {
        return Err(ChatError::Forbidden("admin role required".into()));
    }
    Ok(caller_id(headers))
}

pub async fn status_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "casechat",
        "api_version": API_VERSION,
    }))
}

// ── Session lifecycle ──────────────────────────────────────────────────

pub async fn create_session_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<SessionView>, ChatError> {
    let session = state
        .sessions
        .create(CreateSession {
            student_id: req.student_id,
            case_id: req.case_id,
            scenario_id: req.scenario_id,
            section_id: req.section_id,
            persona: req.persona,
            chat_model: req.chat_model,
        })
        .await?;
    Ok(Json(session.into()))
}

pub async fn get_session_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, ChatError> {
    Ok(Json(state.sessions.get(&id).await?.into()))
}

pub async fn heartbeat_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, ChatError> {
    Ok(Json(state.sessions.heartbeat(&id).await?.into()))
}

pub async fn set_status_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SetStatusRequest>,
) -> Result<Json<SessionView>, ChatError> {
    Ok(Json(state.sessions.set_status(&id, req.status).await?.into()))
}

pub async fn complete_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CompleteRequest>,
) -> Result<Json<SessionView>, ChatError> {
    let session = state
        .sessions
        .complete(&id, &req.evaluation_id, req.transcript.as_deref())
        .await?;

    // Best-effort position inference; completion never waits on success
    state.positions.maybe_infer_final(&session).await;

    Ok(Json(state.sessions.get(&id).await?.into()))
}

pub async fn kill_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, ChatError> {
    let operator = require_admin(&headers)?;
    Ok(Json(state.sessions.kill(&id, &operator).await?.into()))
}

pub async fn delete_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, ChatError> {
    let operator = require_admin(&headers)?;
    state.sessions.delete(&id, &operator).await?;
    Ok(Json(json!({ "deleted": id })))
}

pub async fn restart_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, ChatError> {
    Ok(Json(state.sessions.restart(&id).await?.into()))
}

// ── Timer ──────────────────────────────────────────────────────────────

pub async fn start_timer_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TimeStatus>, ChatError> {
    Ok(Json(state.sessions.start_timer(&id).await?))
}

pub async fn time_remaining_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TimeRemainingResponse>, ChatError> {
    let session = state.sessions.get(&id).await?;
    let time = state.sessions.time_remaining(&id).await?;
    let opts = options::load_chat_options(&state.pool, &session.case_id).await?;
    Ok(Json(TimeRemainingResponse {
        time,
        timeout_chat: opts.timeout_chat,
    }))
}

pub async fn hints_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<HintsResponse>, ChatError> {
    let hints_used = state.sessions.use_hint(&id).await?;
    Ok(Json(HintsResponse { hints_used }))
}

// ── Eligibility ────────────────────────────────────────────────────────

pub async fn eligibility_handler(
    State(state): State<AppState>,
    Query(q): Query<EligibilityQuery>,
) -> Result<Json<EligibilityDecision>, ChatError> {
    let decision = state
        .eligibility
        .can_start_new(&q.student_id, &q.case_id, q.scenario_id.as_deref())
        .await?;
    Ok(Json(decision))
}

pub async fn scenario_completion_handler(
    State(state): State<AppState>,
    Query(q): Query<ScenarioCompletionQuery>,
) -> Result<Json<ScenarioCompletion>, ChatError> {
    let completion = state
        .eligibility
        .check_scenario_completion(&q.student_id, &q.case_id)
        .await?;
    Ok(Json(completion))
}

// ── Positions ──────────────────────────────────────────────────────────

pub async fn set_position_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SetPositionRequest>,
) -> Result<Json<PositionLogEntry>, ChatError> {
    let entry = state
        .positions
        .record(
            &id,
            req.position_type,
            &req.value,
            req.recorded_by,
            None,
            req.notes.as_deref(),
        )
        .await?;
    Ok(Json(entry))
}

pub async fn position_history_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<PositionLogEntry>>, ChatError> {
    Ok(Json(state.positions.history(&id).await?))
}

// ── Model calls ────────────────────────────────────────────────────────

pub async fn chat_handler(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ChatError> {
    let mut case_id = None;
    let mut persona = req.persona.clone().unwrap_or_else(|| "default".to_string());

    // Keep the session warm while the student talks. A terminal session no
    // longer accepts heartbeats, but the in-flight reply is still delivered;
    // the compare-and-set transitions guarantee it cannot be resurrected.
    if let Some(session_id) = &req.session_id {
        match state.sessions.heartbeat(session_id).await {
            Ok(session) => {
                persona = session.persona.clone();
                case_id = Some(session.case_id);
            }
            Err(ChatError::InvalidState(msg)) => {
                debug!("chat on ended session {}: {}", session_id, msg);
                let session = state.sessions.get(session_id).await?;
                persona = session.persona.clone();
                case_id = Some(session.case_id);
            }
            Err(e) => return Err(e),
        }
    }

    let exchange = state
        .chat
        .chat(
            &req.model_id,
            &req.system_prompt,
            &req.history,
            &req.message,
            case_id.as_deref(),
            &persona,
        )
        .await?;

    Ok(Json(ChatResponse {
        messages: exchange.messages,
        usage: exchange.usage,
        retried: exchange.retried,
        degraded: exchange.degraded,
    }))
}

pub async fn evaluate_handler(
    State(state): State<AppState>,
    Json(req): Json<EvaluateRequest>,
) -> Result<Json<EvaluateResponse>, ChatError> {
    let text = state
        .chat
        .evaluate(&req.model_id, &req.prompt, req.case_id.as_deref())
        .await?;
    Ok(Json(EvaluateResponse { text }))
}

// ── Admin / telemetry ──────────────────────────────────────────────────

pub async fn sweep_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SweepResponse>, ChatError> {
    require_admin(&headers)?;
    let swept = state.sweeper.run_once().await?;
    Ok(Json(SweepResponse { swept }))
}

pub async fn usage_summary_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<crate::llm::router::UsageSummaryRow>>, ChatError> {
    Ok(Json(state.chat.router().usage_summary().await?))
}
