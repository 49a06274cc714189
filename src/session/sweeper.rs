// src/session/sweeper.rs
// Background abandonment sweep. A student closing the tab leaves no other
// signal, so this is the one component allowed to end a session its owner is
// not talking to. run_once is shared by the scheduler and the admin trigger;
// the underlying bulk update makes overlapping runs harmless.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info};

use super::store::SessionStore;
use crate::db::now_ts;
use crate::error::ChatError;

pub struct AbandonmentSweeper {
    store: Arc<SessionStore>,
    interval: Duration,
    inactive_after_secs: i64,
}

impl AbandonmentSweeper {
    pub fn new(store: Arc<SessionStore>, interval: Duration, inactive_after_secs: i64) -> Self {
        Self {
            store,
            interval,
            inactive_after_secs,
        }
    }

    /// One sweep pass; returns how many sessions were forced to abandoned.
    pub async fn run_once(&self) -> Result<u64, ChatError> {
        let cutoff = now_ts() - self.inactive_after_secs;
        let swept = self.store.sweep_abandoned(cutoff).await?;
        if swept > 0 {
            info!("abandonment sweep ended {} stale sessions", swept);
        } else {
            debug!("abandonment sweep found no stale sessions");
        }
        Ok(swept)
    }

    /// Spawn the periodic task. The returned handle is abortable for
    /// shutdown; missed ticks are skipped rather than bursted.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        let interval = self.interval;
        tokio::spawn(async move {
            info!(
                "abandonment sweeper started (interval: {:?}, timeout: {}s)",
                interval, self.inactive_after_secs
            );
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if let Err(e) = self.run_once().await {
                    error!("abandonment sweep failed: {}", e);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::now_ts;
    use crate::session::status::SessionStatus;
    use crate::session::store::NewSession;

    async fn store() -> Arc<SessionStore> {
        let pool = crate::db::connect_memory().await.unwrap();
        Arc::new(SessionStore::new(pool))
    }

    fn new_session() -> NewSession {
        NewSession {
            student_id: "s1".into(),
            case_id: "c1".into(),
            scenario_id: None,
            section_id: None,
            persona: "default".into(),
            chat_model: "gpt-4o".into(),
            time_limit_minutes: None,
        }
    }

    async fn backdate(store: &SessionStore, id: &str, secs: i64) {
        sqlx::query("UPDATE case_chats SET last_activity = $1 WHERE id = $2")
            .bind(now_ts() - secs)
            .bind(id)
            .execute(store.pool())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_sweep_boundary() {
        let store = store().await;
        let sweeper = AbandonmentSweeper::new(store.clone(), Duration::from_secs(900), 3600);

        let stale = store.insert(new_session()).await.unwrap();
        let recent = store.insert(new_session()).await.unwrap();
        backdate(&store, &stale.id, 61 * 60).await;
        backdate(&store, &recent.id, 59 * 60).await;

        assert_eq!(sweeper.run_once().await.unwrap(), 1);
        assert_eq!(
            store.get(&stale.id).await.unwrap().status,
            SessionStatus::Abandoned
        );
        assert_eq!(
            store.get(&recent.id).await.unwrap().status,
            SessionStatus::Started
        );
    }

    #[tokio::test]
    async fn test_concurrent_sweeps_do_not_double_count() {
        let store = store().await;
        let sweeper = Arc::new(AbandonmentSweeper::new(
            store.clone(),
            Duration::from_secs(900),
            3600,
        ));

        for _ in 0..5 {
            let s = store.insert(new_session()).await.unwrap();
            backdate(&store, &s.id, 2 * 3600).await;
        }

        let a = sweeper.clone();
        let b = sweeper.clone();
        let (ra, rb) = tokio::join!(a.run_once(), b.run_once());
        let total = ra.unwrap() + rb.unwrap();
        assert_eq!(total, 5, "each stale session is counted exactly once");
    }

    #[tokio::test]
    async fn test_heartbeat_after_sweep_is_invalid_state() {
        let store = store().await;
        let sweeper = AbandonmentSweeper::new(store.clone(), Duration::from_secs(900), 3600);

        let s = store.insert(new_session()).await.unwrap();
        backdate(&store, &s.id, 2 * 3600).await;
        sweeper.run_once().await.unwrap();

        let err = store.heartbeat(&s.id).await.unwrap_err();
        assert!(matches!(err, ChatError::InvalidState(_)));
    }
}
