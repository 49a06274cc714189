// tests/session_lifecycle_test.rs
// Service-level lifecycle tests: create → heartbeat → complete/cancel, the
// repeat policy, restart, and the hints counter. Everything runs against an
// in-memory database.

use std::sync::Arc;

use casechat::db::connect_memory;
use casechat::error::ChatError;
use casechat::session::eligibility::EligibilityPolicy;
use casechat::session::{CreateSession, SessionService, SessionStatus, SessionStore};
use sqlx::SqlitePool;

// ============================================================================
// Test Utilities
// ============================================================================

async fn service() -> (SessionService, SqlitePool) {
    let pool = connect_memory().await.unwrap();
    let store = Arc::new(SessionStore::new(pool.clone()));
    let eligibility = Arc::new(EligibilityPolicy::new(pool.clone()));
    (SessionService::new(store, eligibility), pool)
}

fn create_req(student: &str, case: &str) -> CreateSession {
    CreateSession {
        student_id: student.into(),
        case_id: case.into(),
        scenario_id: None,
        section_id: None,
        persona: "default".into(),
        chat_model: "gpt-4o".into(),
    }
}

async fn seed_timed_scenario(pool: &SqlitePool, id: &str, case_id: &str, minutes: i64) {
    sqlx::query(
        "INSERT INTO scenarios (id, case_id, time_limit_minutes, position_tracking)
         VALUES ($1, $2, $3, 'none')",
    )
    .bind(id)
    .bind(case_id)
    .bind(minutes)
    .execute(pool)
    .await
    .unwrap();
}

async fn seed_chat_options(pool: &SqlitePool, case_id: &str, repeats: i64) {
    sqlx::query(
        "INSERT INTO chat_options (case_id, hints_allowed, chat_repeats, timeout_chat)
         VALUES ($1, 3, $2, 0)",
    )
    .bind(case_id)
    .bind(repeats)
    .execute(pool)
    .await
    .unwrap();
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_full_lifecycle_to_completed() {
    let (service, _pool) = service().await;

    let session = service.create(create_req("s1", "c1")).await.unwrap();
    assert_eq!(session.status, SessionStatus::Started);
    assert!(session.end_time.is_none());

    let session = service.heartbeat(&session.id).await.unwrap();
    assert_eq!(session.status, SessionStatus::InProgress);

    let done = service
        .complete(&session.id, "eval-1", Some("full transcript"))
        .await
        .unwrap();
    assert_eq!(done.status, SessionStatus::Completed);
    assert_eq!(done.evaluation_id.as_deref(), Some("eval-1"));
    assert!(done.end_time.is_some());
    assert_eq!(done.transcript.as_deref(), Some("full transcript"));
}

#[tokio::test]
async fn test_cancel_then_no_further_activity() {
    let (service, _pool) = service().await;
    let session = service.create(create_req("s1", "c1")).await.unwrap();

    let canceled = service
        .set_status(&session.id, SessionStatus::Canceled)
        .await
        .unwrap();
    assert_eq!(canceled.status, SessionStatus::Canceled);

    let err = service.heartbeat(&session.id).await.unwrap_err();
    assert!(matches!(err, ChatError::InvalidState(_)));

    let err = service.complete(&session.id, "eval-1", None).await.unwrap_err();
    assert!(matches!(err, ChatError::InvalidState(_)));
}

#[tokio::test]
async fn test_completed_is_guarded_against_duplicates() {
    let (service, _pool) = service().await;
    let session = service.create(create_req("s1", "c1")).await.unwrap();
    service.complete(&session.id, "eval-1", None).await.unwrap();

    let err = service.complete(&session.id, "eval-2", None).await.unwrap_err();
    assert!(matches!(err, ChatError::Conflict(_)));

    let still = service.get(&session.id).await.unwrap();
    assert_eq!(still.evaluation_id.as_deref(), Some("eval-1"));
}

#[tokio::test]
async fn test_set_status_rejects_privileged_targets() {
    let (service, _pool) = service().await;
    let session = service.create(create_req("s1", "c1")).await.unwrap();

    for target in [
        SessionStatus::Completed,
        SessionStatus::Killed,
        SessionStatus::Started,
    ] {
        let err = service.set_status(&session.id, target).await.unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)), "{:?}", target);
    }
}

#[tokio::test]
async fn test_kill_ends_a_live_session() {
    let (service, _pool) = service().await;
    let session = service.create(create_req("s1", "c1")).await.unwrap();
    let killed = service.kill(&session.id, "admin-1").await.unwrap();
    assert_eq!(killed.status, SessionStatus::Killed);
    assert!(killed.end_time.is_some());
}

#[tokio::test]
async fn test_create_rejects_blank_fields() {
    let (service, _pool) = service().await;
    let mut req = create_req("s1", "c1");
    req.persona = "  ".into();
    let err = service.create(req).await.unwrap_err();
    assert!(matches!(err, ChatError::Validation(_)));
}

// ============================================================================
// Timer
// ============================================================================

#[tokio::test]
async fn test_timed_scenario_snapshots_limit_and_starts_on_heartbeat() {
    let (service, pool) = service().await;
    seed_timed_scenario(&pool, "sc1", "c1", 30).await;

    let mut req = create_req("s1", "c1");
    req.scenario_id = Some("sc1".into());
    let session = service.create(req).await.unwrap();
    assert_eq!(session.time_limit_minutes, Some(30));
    assert!(session.time_started.is_none());

    // First heartbeat starts the countdown
    let session = service.heartbeat(&session.id).await.unwrap();
    assert!(session.time_started.is_some());
    let first_start = session.time_started;

    // Later heartbeats never move it
    let session = service.heartbeat(&session.id).await.unwrap();
    assert_eq!(session.time_started, first_start);

    let time = service.time_remaining(&session.id).await.unwrap();
    assert_eq!(time.time_limit_minutes, Some(30));
    assert!(time.remaining_secs.unwrap() <= 30 * 60);
    assert!(!time.expired);
}

#[tokio::test]
async fn test_scenario_edits_never_reach_running_session() {
    let (service, pool) = service().await;
    seed_timed_scenario(&pool, "sc1", "c1", 30).await;

    let mut req = create_req("s1", "c1");
    req.scenario_id = Some("sc1".into());
    let session = service.create(req).await.unwrap();

    sqlx::query("UPDATE scenarios SET time_limit_minutes = 5 WHERE id = 'sc1'")
        .execute(&pool)
        .await
        .unwrap();

    let time = service.time_remaining(&session.id).await.unwrap();
    assert_eq!(time.time_limit_minutes, Some(30), "limit was frozen at creation");
}

#[tokio::test]
async fn test_disabled_scenario_rejected_at_create() {
    let (service, pool) = service().await;
    sqlx::query(
        "INSERT INTO scenarios (id, case_id, enabled, position_tracking)
         VALUES ('sc-off', 'c1', 0, 'none')",
    )
    .execute(&pool)
    .await
    .unwrap();

    let mut req = create_req("s1", "c1");
    req.scenario_id = Some("sc-off".into());
    let err = service.create(req).await.unwrap_err();
    assert!(matches!(err, ChatError::Validation(_)));
}

#[tokio::test]
async fn test_timer_start_rejected_on_terminal_session() {
    let (service, _pool) = service().await;
    let session = service.create(create_req("s1", "c1")).await.unwrap();
    service
        .set_status(&session.id, SessionStatus::Canceled)
        .await
        .unwrap();
    let err = service.start_timer(&session.id).await.unwrap_err();
    assert!(matches!(err, ChatError::InvalidState(_)));
}

// ============================================================================
// Repeat policy
// ============================================================================

#[tokio::test]
async fn test_second_attempt_blocked_while_first_is_live() {
    let (service, _pool) = service().await;
    service.create(create_req("s1", "c1")).await.unwrap();

    let err = service.create(create_req("s1", "c1")).await.unwrap_err();
    assert!(matches!(err, ChatError::Conflict(_)));

    // Another student is unaffected
    service.create(create_req("s2", "c1")).await.unwrap();
}

#[tokio::test]
async fn test_attempt_limit_enforced_after_completion() {
    let (service, _pool) = service().await;

    // Default chat_repeats = 0: one attempt total
    let session = service.create(create_req("s1", "c1")).await.unwrap();
    service.complete(&session.id, "eval-1", None).await.unwrap();

    let err = service.create(create_req("s1", "c1")).await.unwrap_err();
    assert!(matches!(err, ChatError::Conflict(_)));
}

#[tokio::test]
async fn test_chat_repeats_grant_extra_attempts() {
    let (service, pool) = service().await;
    seed_chat_options(&pool, "c1", 1).await;

    let first = service.create(create_req("s1", "c1")).await.unwrap();
    service.complete(&first.id, "eval-1", None).await.unwrap();

    // chat_repeats = 1 means max two attempts
    let second = service.create(create_req("s1", "c1")).await.unwrap();
    service.complete(&second.id, "eval-2", None).await.unwrap();

    let err = service.create(create_req("s1", "c1")).await.unwrap_err();
    assert!(matches!(err, ChatError::Conflict(_)));
}

#[tokio::test]
async fn test_abandoned_attempts_do_not_count_against_limit() {
    let (service, _pool) = service().await;

    let session = service.create(create_req("s1", "c1")).await.unwrap();
    service
        .set_status(&session.id, SessionStatus::Canceled)
        .await
        .unwrap();

    // Canceled is not completed; the student gets another try
    service.create(create_req("s1", "c1")).await.unwrap();
}

#[tokio::test]
async fn test_rechat_override_bypasses_limit_but_not_live_session() {
    let (service, pool) = service().await;

    let session = service.create(create_req("s1", "c1")).await.unwrap();
    service.complete(&session.id, "eval-1", None).await.unwrap();

    sqlx::query("INSERT INTO rechat_overrides (student_id, case_id) VALUES ('s1', 'c1')")
        .execute(&pool)
        .await
        .unwrap();

    let _again = service.create(create_req("s1", "c1")).await.unwrap();

    // Even with the override, a live session still blocks
    let err = service.create(create_req("s1", "c1")).await.unwrap_err();
    assert!(matches!(err, ChatError::Conflict(_)));
}

#[tokio::test]
async fn test_scenario_scoped_completion_counting() {
    let (service, pool) = service().await;
    seed_timed_scenario(&pool, "sc-a", "c1", 30).await;
    seed_timed_scenario(&pool, "sc-b", "c1", 30).await;

    let mut req = create_req("s1", "c1");
    req.scenario_id = Some("sc-a".into());
    let a = service.create(req).await.unwrap();
    service.complete(&a.id, "eval-a", None).await.unwrap();

    // Scenario A is exhausted, scenario B is untouched
    let mut req = create_req("s1", "c1");
    req.scenario_id = Some("sc-a".into());
    let err = service.create(req).await.unwrap_err();
    assert!(matches!(err, ChatError::Conflict(_)));

    let mut req = create_req("s1", "c1");
    req.scenario_id = Some("sc-b".into());
    service.create(req).await.unwrap();
}

// ============================================================================
// Restart, hints, delete
// ============================================================================

#[tokio::test]
async fn test_restart_cancels_old_and_opens_fresh() {
    let (service, _pool) = service().await;
    let old = service.create(create_req("s1", "c1")).await.unwrap();
    service.heartbeat(&old.id).await.unwrap();

    let fresh = service.restart(&old.id).await.unwrap();
    assert_ne!(fresh.id, old.id);
    assert_eq!(fresh.status, SessionStatus::Started);
    assert_eq!(fresh.student_id, "s1");

    let old = service.get(&old.id).await.unwrap();
    assert_eq!(old.status, SessionStatus::Canceled);
}

#[tokio::test]
async fn test_restart_of_completed_session_fails() {
    let (service, _pool) = service().await;
    let session = service.create(create_req("s1", "c1")).await.unwrap();
    service.complete(&session.id, "eval-1", None).await.unwrap();

    let err = service.restart(&session.id).await.unwrap_err();
    assert!(matches!(err, ChatError::InvalidState(_)));
}

#[tokio::test]
async fn test_hints_counter_increments_only_while_live() {
    let (service, _pool) = service().await;
    let session = service.create(create_req("s1", "c1")).await.unwrap();

    assert_eq!(service.use_hint(&session.id).await.unwrap(), 1);
    assert_eq!(service.use_hint(&session.id).await.unwrap(), 2);

    service.complete(&session.id, "eval-1", None).await.unwrap();
    let err = service.use_hint(&session.id).await.unwrap_err();
    assert!(matches!(err, ChatError::InvalidState(_)));
}

#[tokio::test]
async fn test_delete_removes_session_and_unknown_id_is_not_found() {
    let (service, _pool) = service().await;
    let session = service.create(create_req("s1", "c1")).await.unwrap();

    service.delete(&session.id, "admin-1").await.unwrap();
    let err = service.get(&session.id).await.unwrap_err();
    assert!(matches!(err, ChatError::NotFound(_)));

    let err = service.delete("missing", "admin-1").await.unwrap_err();
    assert!(matches!(err, ChatError::NotFound(_)));
}
