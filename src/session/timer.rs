// src/session/timer.rs
// Countdown reporting for timed sessions. The clock starts on the first
// heartbeat/message (students may read the case first), and this module only
// ever reports; whether expiry auto-submits is the caller's decision, driven
// by the assignment's timeout_chat flag.

use serde::Serialize;

use super::store::ChatSession;

#[derive(Debug, Clone, Serialize)]
pub struct TimeStatus {
    pub time_limit_minutes: Option<i64>,
    pub time_started: Option<i64>,
    pub elapsed_secs: i64,
    /// None when the session has no limit
    pub remaining_secs: Option<i64>,
    pub expired: bool,
}

/// Compute elapsed/remaining/expired for a session at `now` (unix seconds).
pub fn time_status(session: &ChatSession, now: i64) -> TimeStatus {
    let elapsed_secs = match session.time_started {
        Some(started) => (now - started).max(0),
        None => 0,
    };

    let remaining_secs = session.time_limit_minutes.map(|limit_minutes| {
        let limit_secs = limit_minutes * 60;
        (limit_secs - elapsed_secs).max(0)
    });

    TimeStatus {
        time_limit_minutes: session.time_limit_minutes,
        time_started: session.time_started,
        elapsed_secs,
        remaining_secs,
        expired: remaining_secs.is_some_and(|r| r <= 0),
    }
}
