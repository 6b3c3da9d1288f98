use std::sync::Arc;

use quiz_core::Clock;
use quiz_core::model::{
    DEFAULT_ALLOTMENT_SECS, ParticipantEmail, Question, QuestionId, Session, TickOutcome,
};
use storage::{SessionField, SessionStateStore, load_session, save_fields, save_session};

use crate::error::SessionStoreError;

/// A session store shared between the quiz screen and the ticker task.
pub type SharedSessionStore = Arc<tokio::sync::Mutex<SessionStore>>;

/// Single source of truth for one quiz attempt.
///
/// Wraps the in-memory [`Session`] and writes every accepted mutation
/// through to the persistence surface, so hydrating after a reload
/// reconstructs the exact prior state. Each operation is one logical step:
/// the core mutation is applied first and a rejected mutation never reaches
/// storage; a no-op skips the storage write entirely.
pub struct SessionStore {
    clock: Clock,
    state: Arc<dyn SessionStateStore>,
    session: Session,
    allotment_secs: u32,
}

impl SessionStore {
    /// Reconstruct the store from whatever the persistence surface holds,
    /// defaulting to an empty pre-start session.
    ///
    /// # Errors
    ///
    /// Returns `SessionStoreError::Storage` if the backend cannot be read or
    /// holds corrupt state.
    pub async fn hydrate(
        clock: Clock,
        state: Arc<dyn SessionStateStore>,
    ) -> Result<Self, SessionStoreError> {
        Self::hydrate_with_allotment(clock, state, DEFAULT_ALLOTMENT_SECS).await
    }

    /// Like [`SessionStore::hydrate`] with a custom time allotment.
    ///
    /// # Errors
    ///
    /// Returns `SessionStoreError::Storage` if the backend cannot be read or
    /// holds corrupt state.
    pub async fn hydrate_with_allotment(
        clock: Clock,
        state: Arc<dyn SessionStateStore>,
        allotment_secs: u32,
    ) -> Result<Self, SessionStoreError> {
        let session = load_session(state.as_ref(), allotment_secs).await?;
        Ok(Self {
            clock,
            state,
            session,
            allotment_secs,
        })
    }

    /// Read model for screens; never hand out `&mut Session`.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub fn allotment_secs(&self) -> u32 {
        self.allotment_secs
    }

    /// Wrap the store for shared access (quiz screen + ticker).
    #[must_use]
    pub fn shared(self) -> SharedSessionStore {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    /// Begin a fresh attempt with a fetched batch, replacing any prior one.
    ///
    /// # Errors
    ///
    /// Returns `SessionStoreError::Session` for an empty batch (storage
    /// untouched) and `SessionStoreError::Storage` if the write-through
    /// fails.
    pub async fn start(
        &mut self,
        email: ParticipantEmail,
        questions: Vec<Question>,
    ) -> Result<(), SessionStoreError> {
        let now = self.clock.now();
        self.session.start(email, questions, now)?;
        save_session(self.state.as_ref(), &self.session).await?;
        Ok(())
    }

    /// Record (or overwrite) the selected choice for a question.
    ///
    /// # Errors
    ///
    /// Returns `SessionStoreError::Session` outside the active phase or for
    /// a foreign question id, `SessionStoreError::Storage` if the
    /// write-through fails.
    pub async fn record_answer(
        &mut self,
        id: QuestionId,
        choice: impl Into<String> + Send,
    ) -> Result<(), SessionStoreError> {
        self.session.record_answer(id, choice)?;
        save_fields(self.state.as_ref(), &self.session, &[SessionField::Answers]).await?;
        Ok(())
    }

    /// Jump to an arbitrary position.
    ///
    /// # Errors
    ///
    /// Returns `SessionStoreError::Session` outside the active phase or for
    /// an out-of-range position, `SessionStoreError::Storage` if the
    /// write-through fails.
    pub async fn go_to(&mut self, position: usize) -> Result<(), SessionStoreError> {
        self.session.go_to(position)?;
        save_fields(
            self.state.as_ref(),
            &self.session,
            &[SessionField::CurrentIndex, SessionField::Visited],
        )
        .await?;
        Ok(())
    }

    /// Step forward; staying put is not an error and writes nothing.
    ///
    /// # Errors
    ///
    /// Returns `SessionStoreError::Storage` if the write-through fails.
    pub async fn advance(&mut self) -> Result<bool, SessionStoreError> {
        if !self.session.advance() {
            return Ok(false);
        }
        save_fields(
            self.state.as_ref(),
            &self.session,
            &[SessionField::CurrentIndex, SessionField::Visited],
        )
        .await?;
        Ok(true)
    }

    /// Step back; staying put is not an error and writes nothing.
    ///
    /// # Errors
    ///
    /// Returns `SessionStoreError::Storage` if the write-through fails.
    pub async fn retreat(&mut self) -> Result<bool, SessionStoreError> {
        if !self.session.retreat() {
            return Ok(false);
        }
        save_fields(
            self.state.as_ref(),
            &self.session,
            &[SessionField::CurrentIndex],
        )
        .await?;
        Ok(true)
    }

    /// Consume one second of the allotment, persisting the new countdown
    /// (and the completed flag on expiry). Idle ticks write nothing.
    ///
    /// # Errors
    ///
    /// Returns `SessionStoreError::Storage` if the write-through fails.
    pub async fn tick(&mut self) -> Result<TickOutcome, SessionStoreError> {
        let outcome = self.session.tick();
        match outcome {
            TickOutcome::Idle => {}
            TickOutcome::Running(_) => {
                save_fields(
                    self.state.as_ref(),
                    &self.session,
                    &[SessionField::RemainingSeconds],
                )
                .await?;
            }
            TickOutcome::Expired => {
                save_fields(
                    self.state.as_ref(),
                    &self.session,
                    &[SessionField::RemainingSeconds, SessionField::Completed],
                )
                .await?;
            }
        }
        Ok(outcome)
    }

    /// Freeze the attempt for report rendering. No-op when not active.
    ///
    /// # Errors
    ///
    /// Returns `SessionStoreError::Storage` if the write-through fails.
    pub async fn submit(&mut self) -> Result<bool, SessionStoreError> {
        if !self.session.submit() {
            return Ok(false);
        }
        save_fields(
            self.state.as_ref(),
            &self.session,
            &[SessionField::Completed],
        )
        .await?;
        Ok(true)
    }

    /// Clear all persisted state and return to the pre-start condition.
    ///
    /// # Errors
    ///
    /// Returns `SessionStoreError::Storage` if the backend cannot be
    /// cleared.
    pub async fn reset(&mut self) -> Result<(), SessionStoreError> {
        self.session.reset();
        self.state.clear().await?;
        Ok(())
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
