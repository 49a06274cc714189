// src/db.rs
// Pool creation and schema bootstrap. Timestamps are unix seconds (UTC).

use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

/// Current unix timestamp in seconds
pub fn now_ts() -> i64 {
    Utc::now().timestamp()
}

/// Connect and ensure the schema exists
pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    init_schema(&pool).await?;
    Ok(pool)
}

/// Single-connection in-memory pool with the schema applied. An in-memory
/// SQLite database is per-connection, so the pool must never grow past one.
pub async fn connect_memory() -> anyhow::Result<SqlitePool> {
    connect("sqlite::memory:", 1).await
}

/// Create all tables the core owns or reads.
///
/// `scenarios`, `chat_options`, `rechat_overrides` and `case_content` are
/// collaborator tables: written by the (excluded) case-management surface,
/// only read here.
pub async fn init_schema(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS case_chats (
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            case_id TEXT NOT NULL,
            scenario_id TEXT,
            section_id TEXT,
            status TEXT NOT NULL,
            persona TEXT NOT NULL,
            chat_model TEXT NOT NULL,
            hints_used INTEGER NOT NULL DEFAULT 0,
            time_limit_minutes INTEGER,
            time_started INTEGER,
            start_time INTEGER NOT NULL,
            last_activity INTEGER NOT NULL,
            end_time INTEGER,
            transcript TEXT,
            evaluation_id TEXT,
            initial_position TEXT,
            final_position TEXT,
            position_method TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS position_log (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            position_type TEXT NOT NULL,
            value TEXT,
            recorded_by TEXT NOT NULL,
            confidence REAL,
            notes TEXT,
            failure_reason TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS model_usage (
            id TEXT PRIMARY KEY,
            provider TEXT NOT NULL,
            model_id TEXT NOT NULL,
            request_type TEXT NOT NULL,
            cache_hit INTEGER NOT NULL DEFAULT 0,
            input_tokens INTEGER NOT NULL DEFAULT 0,
            cached_tokens INTEGER NOT NULL DEFAULT 0,
            output_tokens INTEGER NOT NULL DEFAULT 0,
            succeeded INTEGER NOT NULL DEFAULT 1,
            case_id TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scenarios (
            id TEXT PRIMARY KEY,
            case_id TEXT NOT NULL,
            title TEXT,
            time_limit_minutes INTEGER,
            enabled INTEGER NOT NULL DEFAULT 1,
            position_tracking TEXT NOT NULL DEFAULT 'none',
            position_labels TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chat_options (
            case_id TEXT PRIMARY KEY,
            hints_allowed INTEGER NOT NULL DEFAULT 0,
            chat_repeats INTEGER NOT NULL DEFAULT 0,
            timeout_chat INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rechat_overrides (
            student_id TEXT NOT NULL,
            case_id TEXT NOT NULL,
            PRIMARY KEY (student_id, case_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS case_content (
            case_id TEXT NOT NULL,
            ord INTEGER NOT NULL,
            kind TEXT NOT NULL,
            body TEXT NOT NULL,
            PRIMARY KEY (case_id, ord)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_case_chats_live
         ON case_chats (status, last_activity)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_case_chats_student_case
         ON case_chats (student_id, case_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
