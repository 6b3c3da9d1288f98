use std::time::Duration;

use log::warn;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

use quiz_core::model::TickOutcome;

use crate::session::store::SharedSessionStore;

/// Cancellable periodic task delivering one `tick` per elapsed second.
///
/// The task stops itself as soon as the session is no longer active,
/// whatever caused the transition (submission, expiry, reset); a spuriously
/// delivered tick after that is absorbed by the session's idle-tick rule.
/// Time is tick-count-based: missed intervals are delayed, not burst, so a
/// suspended process does not lose allotment while suspended.
pub struct QuizTicker {
    handle: JoinHandle<()>,
}

impl QuizTicker {
    /// Spawn the ticker onto the current tokio runtime.
    #[must_use]
    pub fn spawn(store: SharedSessionStore) -> Self {
        let handle = tokio::spawn(async move {
            let mut timer = interval(Duration::from_secs(1));
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first interval tick resolves immediately; consume it so a
            // full second elapses before the countdown moves
            timer.tick().await;
            loop {
                timer.tick().await;
                let mut guard = store.lock().await;
                if !guard.session().is_active() {
                    break;
                }
                match guard.tick().await {
                    Ok(TickOutcome::Running(_)) => {}
                    Ok(TickOutcome::Expired | TickOutcome::Idle) => break,
                    Err(err) => {
                        // the in-memory countdown already moved; keep going
                        // and let the next write-through catch up
                        warn!("failed to persist tick: {err}");
                    }
                }
            }
        });
        Self { handle }
    }

    /// Cancel the task. Safe to call after it already finished.
    pub fn stop(&self) {
        self.handle.abort();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for QuizTicker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::{Difficulty, ParticipantEmail, Question, QuestionId};
    use quiz_core::time::fixed_clock;
    use std::sync::Arc;
    use storage::{InMemoryStateStore, SessionStateStore};

    use crate::session::store::SessionStore;

    fn build_question(id: u32) -> Question {
        Question::new(
            QuestionId::new(id),
            format!("Question {id}?"),
            vec!["a".into(), "b".into()],
            "a",
            "Misc",
            Difficulty::Easy,
        )
        .unwrap()
    }

    async fn shared_store_with_allotment(allotment: u32) -> SharedSessionStore {
        let state: Arc<dyn SessionStateStore> = Arc::new(InMemoryStateStore::new());
        let mut store = SessionStore::hydrate_with_allotment(fixed_clock(), state, allotment)
            .await
            .unwrap();
        store
            .start(
                ParticipantEmail::new("fan@example.com").unwrap(),
                vec![build_question(1), build_question(2)],
            )
            .await
            .unwrap();
        store.shared()
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_counts_down_and_stops_at_expiry() {
        let store = shared_store_with_allotment(3).await;
        let ticker = QuizTicker::spawn(Arc::clone(&store));

        // paused time auto-advances whenever the runtime is idle
        tokio::time::sleep(Duration::from_secs(5)).await;

        let guard = store.lock().await;
        assert!(guard.session().is_completed());
        assert_eq!(guard.session().remaining_seconds(), 0);
        drop(guard);
        assert!(ticker.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_stops_after_submission() {
        let store = shared_store_with_allotment(1_000).await;
        let ticker = QuizTicker::spawn(Arc::clone(&store));

        tokio::time::sleep(Duration::from_secs(2)).await;
        store.lock().await.submit().await.unwrap();
        let frozen = store.lock().await.session().remaining_seconds();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(store.lock().await.session().remaining_seconds(), frozen);
        assert!(ticker.is_finished());
        ticker.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_an_active_ticker() {
        let store = shared_store_with_allotment(1_000).await;
        let ticker = QuizTicker::spawn(Arc::clone(&store));

        tokio::time::sleep(Duration::from_secs(2)).await;
        ticker.stop();
        tokio::time::sleep(Duration::from_secs(5)).await;

        let remaining = store.lock().await.session().remaining_seconds();
        assert!(remaining >= 1_000 - 3, "ticks kept arriving after stop");
    }
}
