use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

use crate::model::{ParticipantEmail, Question, QuestionId};

/// Default total time allotment for one attempt: 30 minutes.
pub const DEFAULT_ALLOTMENT_SECS: u32 = 30 * 60;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionError {
    #[error("cannot start a session with no questions")]
    EmptyBatch,

    #[error("session is not active")]
    NotActive,

    #[error("position {position} is out of range for {len} questions")]
    OutOfRange { position: usize, len: usize },

    #[error("question {0} is not part of this session")]
    UnknownQuestion(QuestionId),

    #[error("persisted session state is inconsistent: {0}")]
    InvalidPersistedState(String),
}

//
// ─── PHASE & TICK ──────────────────────────────────────────────────────────────
//

/// Lifecycle phase of a session.
///
/// `Empty --start--> Active --submit | tick-to-zero--> Completed --reset--> Empty`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Empty,
    Active,
    Completed,
}

/// Result of delivering one timer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The session was not active; nothing changed.
    Idle,
    /// One second consumed; this many remain.
    Running(u32),
    /// The allotment ran out; the session is now completed.
    Expired,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// One participant's attempt at a quiz batch.
///
/// Owns every piece of mutable attempt state: the fixed question set, the
/// answer record, the cursor, the visited set, and the countdown. All
/// mutation goes through the operations below; each one either applies fully
/// or rejects without touching anything, so the invariants hold even after a
/// failed call. Time only ever enters via an explicit `now` argument, so the
/// session itself never reads a clock.
#[derive(Clone, PartialEq)]
pub struct Session {
    participant_email: Option<ParticipantEmail>,
    questions: Vec<Question>,
    answers: BTreeMap<QuestionId, String>,
    current_index: usize,
    visited: BTreeSet<usize>,
    remaining_seconds: u32,
    started_at: Option<DateTime<Utc>>,
    completed: bool,
    allotment_secs: u32,
}

impl Default for Session {
    fn default() -> Self {
        Self::empty()
    }
}

impl Session {
    /// An empty pre-start session with the default time allotment.
    #[must_use]
    pub fn empty() -> Self {
        Self::with_allotment(DEFAULT_ALLOTMENT_SECS)
    }

    /// An empty pre-start session with a custom time allotment.
    #[must_use]
    pub fn with_allotment(allotment_secs: u32) -> Self {
        Self {
            participant_email: None,
            questions: Vec::new(),
            answers: BTreeMap::new(),
            current_index: 0,
            visited: BTreeSet::new(),
            remaining_seconds: allotment_secs,
            started_at: None,
            completed: false,
            allotment_secs,
        }
    }

    /// Rehydrate a session from persisted storage, re-checking every
    /// invariant so a corrupted store can never produce an inconsistent
    /// aggregate.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidPersistedState` when the stored fields
    /// contradict each other (cursor or visited positions out of bounds,
    /// answers for unknown questions, a completed flag without questions,
    /// a countdown at zero or above the allotment on an uncompleted
    /// attempt).
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        participant_email: Option<ParticipantEmail>,
        questions: Vec<Question>,
        answers: BTreeMap<QuestionId, String>,
        current_index: usize,
        visited: BTreeSet<usize>,
        remaining_seconds: u32,
        started_at: Option<DateTime<Utc>>,
        completed: bool,
        allotment_secs: u32,
    ) -> Result<Self, SessionError> {
        if questions.is_empty() {
            if completed || !answers.is_empty() || !visited.is_empty() || current_index != 0 {
                return Err(SessionError::InvalidPersistedState(
                    "attempt state without a question set".into(),
                ));
            }
        } else {
            let len = questions.len();
            if current_index >= len {
                return Err(SessionError::InvalidPersistedState(format!(
                    "current index {current_index} out of range for {len} questions"
                )));
            }
            if let Some(&pos) = visited.iter().find(|&&pos| pos >= len) {
                return Err(SessionError::InvalidPersistedState(format!(
                    "visited position {pos} out of range for {len} questions"
                )));
            }
            if !visited.contains(&0) {
                return Err(SessionError::InvalidPersistedState(
                    "start position missing from visited set".into(),
                ));
            }
            let ids: BTreeSet<QuestionId> = questions.iter().map(Question::id).collect();
            if let Some(&id) = answers.keys().find(|id| !ids.contains(id)) {
                return Err(SessionError::InvalidPersistedState(format!(
                    "answer recorded for unknown question {id}"
                )));
            }
            if remaining_seconds == 0 && !completed {
                return Err(SessionError::InvalidPersistedState(
                    "zero remaining time on an uncompleted attempt".into(),
                ));
            }
            if remaining_seconds > allotment_secs {
                return Err(SessionError::InvalidPersistedState(format!(
                    "remaining time {remaining_seconds} exceeds the allotment {allotment_secs}"
                )));
            }
        }

        Ok(Self {
            participant_email,
            questions,
            answers,
            current_index,
            visited,
            remaining_seconds,
            started_at,
            completed,
            allotment_secs,
        })
    }

    //
    // ─── READS ─────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        if self.questions.is_empty() {
            SessionPhase::Empty
        } else if self.completed {
            SessionPhase::Completed
        } else {
            SessionPhase::Active
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.phase() == SessionPhase::Active
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    #[must_use]
    pub fn participant_email(&self) -> Option<&ParticipantEmail> {
        self.participant_email.as_ref()
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// Total number of questions in the batch.
    #[must_use]
    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current_index)
    }

    #[must_use]
    pub fn answers(&self) -> &BTreeMap<QuestionId, String> {
        &self.answers
    }

    /// The choice recorded for a question, if any.
    #[must_use]
    pub fn answer_for(&self, id: QuestionId) -> Option<&str> {
        self.answers.get(&id).map(String::as_str)
    }

    #[must_use]
    pub fn visited(&self) -> &BTreeSet<usize> {
        &self.visited
    }

    #[must_use]
    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    #[must_use]
    pub fn allotment_secs(&self) -> u32 {
        self.allotment_secs
    }

    //
    // ─── TRANSITIONS ───────────────────────────────────────────────────────
    //

    /// Begin a fresh attempt, unconditionally replacing any prior one.
    ///
    /// The participant email is part of the start transition because the
    /// aggregate sets it exactly once per attempt.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::EmptyBatch` when `questions` is empty; the
    /// existing state is left untouched in that case.
    pub fn start(
        &mut self,
        email: ParticipantEmail,
        questions: Vec<Question>,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        if questions.is_empty() {
            return Err(SessionError::EmptyBatch);
        }

        self.participant_email = Some(email);
        self.questions = questions;
        self.answers.clear();
        self.current_index = 0;
        self.visited = BTreeSet::from([0]);
        self.remaining_seconds = self.allotment_secs;
        self.started_at = Some(now);
        self.completed = false;
        Ok(())
    }

    /// Record (or overwrite) the selected choice for a question.
    ///
    /// Last write wins; no history is kept. The choice text itself is not
    /// checked against the question's choices, since callers only ever offer
    /// valid ones, but the question id must belong to this session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotActive` outside the active phase and
    /// `SessionError::UnknownQuestion` for a foreign id.
    pub fn record_answer(
        &mut self,
        id: QuestionId,
        choice: impl Into<String>,
    ) -> Result<(), SessionError> {
        if !self.is_active() {
            return Err(SessionError::NotActive);
        }
        if !self.questions.iter().any(|q| q.id() == id) {
            return Err(SessionError::UnknownQuestion(id));
        }
        self.answers.insert(id, choice.into());
        Ok(())
    }

    /// Jump to an arbitrary position, marking it visited.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotActive` outside the active phase and
    /// `SessionError::OutOfRange` for a position past the end.
    pub fn go_to(&mut self, position: usize) -> Result<(), SessionError> {
        if !self.is_active() {
            return Err(SessionError::NotActive);
        }
        let len = self.questions.len();
        if position >= len {
            return Err(SessionError::OutOfRange { position, len });
        }
        self.current_index = position;
        self.visited.insert(position);
        Ok(())
    }

    /// Step to the next question. Returns whether the cursor moved; staying
    /// put (last position, or not active) is not an error.
    pub fn advance(&mut self) -> bool {
        if !self.is_active() || self.current_index + 1 >= self.questions.len() {
            return false;
        }
        self.current_index += 1;
        self.visited.insert(self.current_index);
        true
    }

    /// Step back to the previous question. Returns whether the cursor moved.
    /// Retreating revisits an already-visited position, so the visited set
    /// is untouched.
    pub fn retreat(&mut self) -> bool {
        if !self.is_active() || self.current_index == 0 {
            return false;
        }
        self.current_index -= 1;
        true
    }

    /// Consume one second of the allotment. Reaching zero completes the
    /// session (time-expiry submission). Ticks delivered outside the active
    /// phase are absorbed as `TickOutcome::Idle`; the timer may race a
    /// submission, and a late tick must not corrupt a frozen session.
    pub fn tick(&mut self) -> TickOutcome {
        if !self.is_active() {
            return TickOutcome::Idle;
        }
        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        if self.remaining_seconds == 0 {
            self.completed = true;
            TickOutcome::Expired
        } else {
            TickOutcome::Running(self.remaining_seconds)
        }
    }

    /// Freeze the attempt for report rendering. Partial submission is
    /// permitted; unanswered questions simply score nothing. Returns whether
    /// a transition happened (no-op when already completed or empty).
    pub fn submit(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }
        self.completed = true;
        true
    }

    /// Return to the pre-start empty condition. Always succeeds.
    pub fn reset(&mut self) {
        *self = Self::with_allotment(self.allotment_secs);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("phase", &self.phase())
            .field("questions_len", &self.questions.len())
            .field("answers_len", &self.answers.len())
            .field("current_index", &self.current_index)
            .field("visited_len", &self.visited.len())
            .field("remaining_seconds", &self.remaining_seconds)
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Difficulty, Question};
    use crate::time::fixed_now;

    fn build_question(id: u32) -> Question {
        Question::new(
            QuestionId::new(id),
            format!("Question {id}?"),
            vec!["a".into(), "b".into(), "c".into(), "d".into()],
            "a",
            "General Knowledge",
            Difficulty::Medium,
        )
        .unwrap()
    }

    fn email() -> ParticipantEmail {
        ParticipantEmail::new("fan@example.com").unwrap()
    }

    fn active_session(count: u32) -> Session {
        let questions = (1..=count).map(build_question).collect();
        let mut session = Session::empty();
        session.start(email(), questions, fixed_now()).unwrap();
        session
    }

    #[test]
    fn empty_session_has_no_attempt_state() {
        let session = Session::empty();
        assert_eq!(session.phase(), SessionPhase::Empty);
        assert_eq!(session.remaining_seconds(), DEFAULT_ALLOTMENT_SECS);
        assert!(session.visited().is_empty());
        assert!(session.started_at().is_none());
    }

    #[test]
    fn start_rejects_empty_batch() {
        let mut session = Session::empty();
        let err = session.start(email(), Vec::new(), fixed_now()).unwrap_err();
        assert_eq!(err, SessionError::EmptyBatch);
        assert_eq!(session.phase(), SessionPhase::Empty);
    }

    #[test]
    fn start_initializes_attempt() {
        let session = active_session(3);
        assert_eq!(session.phase(), SessionPhase::Active);
        assert_eq!(session.current_index(), 0);
        assert_eq!(session.visited().iter().copied().collect::<Vec<_>>(), vec![0]);
        assert_eq!(session.remaining_seconds(), DEFAULT_ALLOTMENT_SECS);
        assert_eq!(session.started_at(), Some(fixed_now()));
        assert!(session.answers().is_empty());
    }

    #[test]
    fn restart_discards_previous_attempt() {
        let mut session = active_session(3);
        session.record_answer(QuestionId::new(1), "b").unwrap();
        session.go_to(2).unwrap();

        let questions = (1..=5).map(build_question).collect();
        session.start(email(), questions, fixed_now()).unwrap();

        assert_eq!(session.total_questions(), 5);
        assert!(session.answers().is_empty());
        assert_eq!(session.current_index(), 0);
        assert_eq!(session.visited().len(), 1);
    }

    #[test]
    fn record_answer_is_last_write_wins() {
        let mut session = active_session(2);
        let id = QuestionId::new(1);
        session.record_answer(id, "b").unwrap();
        session.record_answer(id, "c").unwrap();
        assert_eq!(session.answer_for(id), Some("c"));
        assert_eq!(session.answers().len(), 1);
    }

    #[test]
    fn record_answer_rejects_unknown_question() {
        let mut session = active_session(2);
        let err = session.record_answer(QuestionId::new(99), "a").unwrap_err();
        assert_eq!(err, SessionError::UnknownQuestion(QuestionId::new(99)));
    }

    #[test]
    fn record_answer_rejected_when_empty_or_completed() {
        let mut session = Session::empty();
        assert_eq!(
            session.record_answer(QuestionId::new(1), "a").unwrap_err(),
            SessionError::NotActive
        );

        let mut session = active_session(2);
        session.submit();
        assert_eq!(
            session.record_answer(QuestionId::new(1), "a").unwrap_err(),
            SessionError::NotActive
        );
    }

    #[test]
    fn go_to_marks_visited_and_checks_bounds() {
        let mut session = active_session(4);
        session.go_to(2).unwrap();
        assert_eq!(session.current_index(), 2);
        assert!(session.visited().contains(&2));

        let err = session.go_to(4).unwrap_err();
        assert_eq!(err, SessionError::OutOfRange { position: 4, len: 4 });
        assert_eq!(session.current_index(), 2);
    }

    #[test]
    fn navigation_never_leaves_bounds() {
        let mut session = active_session(3);
        assert!(!session.retreat());
        assert_eq!(session.current_index(), 0);

        assert!(session.advance());
        assert!(session.advance());
        assert!(!session.advance());
        assert_eq!(session.current_index(), 2);

        assert!(session.retreat());
        assert_eq!(session.current_index(), 1);
    }

    #[test]
    fn retreat_does_not_grow_visited() {
        let mut session = active_session(3);
        session.advance();
        let before = session.visited().clone();
        session.retreat();
        assert_eq!(session.visited(), &before);
    }

    #[test]
    fn visited_always_contains_start_position() {
        let mut session = active_session(5);
        session.go_to(3).unwrap();
        session.advance();
        session.retreat();
        assert!(session.visited().contains(&0));
        assert!(session.visited().len() >= 1);
    }

    #[test]
    fn ticking_down_the_full_allotment_completes() {
        let mut session = Session::with_allotment(3);
        session
            .start(email(), vec![build_question(1), build_question(2)], fixed_now())
            .unwrap();

        assert_eq!(session.tick(), TickOutcome::Running(2));
        assert_eq!(session.tick(), TickOutcome::Running(1));
        assert_eq!(session.tick(), TickOutcome::Expired);
        assert_eq!(session.remaining_seconds(), 0);
        assert!(session.is_completed());
    }

    #[test]
    fn expiry_freezes_the_session() {
        let mut session = Session::with_allotment(1);
        session
            .start(email(), vec![build_question(1)], fixed_now())
            .unwrap();

        assert_eq!(session.tick(), TickOutcome::Expired);
        assert_eq!(
            session.record_answer(QuestionId::new(1), "a").unwrap_err(),
            SessionError::NotActive
        );
        assert_eq!(session.tick(), TickOutcome::Idle);
        assert_eq!(session.remaining_seconds(), 0);
    }

    #[test]
    fn tick_outside_active_is_idle() {
        let mut session = Session::empty();
        assert_eq!(session.tick(), TickOutcome::Idle);
        assert_eq!(session.remaining_seconds(), DEFAULT_ALLOTMENT_SECS);
    }

    #[test]
    fn submit_allows_partial_answers() {
        let mut session = active_session(3);
        session.record_answer(QuestionId::new(1), "a").unwrap();
        assert!(session.submit());
        assert_eq!(session.phase(), SessionPhase::Completed);
        assert!(!session.submit());
    }

    #[test]
    fn reset_returns_to_empty_with_full_allotment() {
        let mut session = Session::with_allotment(60);
        session
            .start(email(), vec![build_question(1), build_question(2)], fixed_now())
            .unwrap();
        session.tick();
        session.submit();

        session.reset();
        assert_eq!(session.phase(), SessionPhase::Empty);
        assert_eq!(session.remaining_seconds(), 60);
        assert!(session.participant_email().is_none());
        assert!(session.questions().is_empty());
    }

    #[test]
    fn from_persisted_round_trips_an_attempt() {
        let mut session = active_session(3);
        session.record_answer(QuestionId::new(2), "b").unwrap();
        session.go_to(1).unwrap();
        session.tick();

        let restored = Session::from_persisted(
            session.participant_email().cloned(),
            session.questions().to_vec(),
            session.answers().clone(),
            session.current_index(),
            session.visited().clone(),
            session.remaining_seconds(),
            session.started_at(),
            session.is_completed(),
            session.allotment_secs(),
        )
        .unwrap();

        assert_eq!(restored, session);
    }

    #[test]
    fn from_persisted_rejects_inconsistent_state() {
        let questions: Vec<_> = (1..=2).map(build_question).collect();

        // cursor out of range
        let err = Session::from_persisted(
            None,
            questions.clone(),
            BTreeMap::new(),
            5,
            BTreeSet::from([0]),
            10,
            None,
            false,
            DEFAULT_ALLOTMENT_SECS,
        )
        .unwrap_err();
        assert!(matches!(err, SessionError::InvalidPersistedState(_)));

        // completed flag without questions
        let err = Session::from_persisted(
            None,
            Vec::new(),
            BTreeMap::new(),
            0,
            BTreeSet::new(),
            0,
            None,
            true,
            DEFAULT_ALLOTMENT_SECS,
        )
        .unwrap_err();
        assert!(matches!(err, SessionError::InvalidPersistedState(_)));

        // start position missing from visited
        let err = Session::from_persisted(
            None,
            questions,
            BTreeMap::new(),
            1,
            BTreeSet::from([1]),
            10,
            None,
            false,
            DEFAULT_ALLOTMENT_SECS,
        )
        .unwrap_err();
        assert!(matches!(err, SessionError::InvalidPersistedState(_)));
    }

    #[test]
    fn from_persisted_rejects_contradictory_timer_state() {
        let questions: Vec<_> = (1..=2).map(build_question).collect();

        // zero remaining on an uncompleted attempt
        let err = Session::from_persisted(
            None,
            questions.clone(),
            BTreeMap::new(),
            0,
            BTreeSet::from([0]),
            0,
            None,
            false,
            DEFAULT_ALLOTMENT_SECS,
        )
        .unwrap_err();
        assert!(matches!(err, SessionError::InvalidPersistedState(_)));

        // countdown above the allotment
        let err = Session::from_persisted(
            None,
            questions.clone(),
            BTreeMap::new(),
            0,
            BTreeSet::from([0]),
            120,
            None,
            false,
            60,
        )
        .unwrap_err();
        assert!(matches!(err, SessionError::InvalidPersistedState(_)));

        // an expired attempt at zero is legitimate
        Session::from_persisted(
            None,
            questions,
            BTreeMap::new(),
            0,
            BTreeSet::from([0]),
            0,
            None,
            true,
            DEFAULT_ALLOTMENT_SECS,
        )
        .unwrap();
    }
}
