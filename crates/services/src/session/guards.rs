//! Screen-transition guard predicates.
//!
//! Screens evaluate these before switching, so the session state machine
//! stays the single source of truth for what is legal; there is no implicit
//! redirect logic scattered through rendering code.

use quiz_core::model::Session;

/// Whether the quiz-taking screen may be shown: an active attempt with a
/// participant and a question set.
#[must_use]
pub fn can_enter_quiz(session: &Session) -> bool {
    session.participant_email().is_some() && session.is_active()
}

/// Whether the report screen may be shown: a completed attempt with a
/// question set to review.
#[must_use]
pub fn can_view_report(session: &Session) -> bool {
    session.is_completed() && !session.questions().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::{Difficulty, ParticipantEmail, Question, QuestionId};
    use quiz_core::time::fixed_now;

    fn started() -> Session {
        let question = Question::new(
            QuestionId::new(1),
            "Q?",
            vec!["a".into(), "b".into()],
            "a",
            "Misc",
            Difficulty::Easy,
        )
        .unwrap();
        let mut session = Session::empty();
        session
            .start(
                ParticipantEmail::new("fan@example.com").unwrap(),
                vec![question],
                fixed_now(),
            )
            .unwrap();
        session
    }

    #[test]
    fn empty_session_enters_nothing() {
        let session = Session::empty();
        assert!(!can_enter_quiz(&session));
        assert!(!can_view_report(&session));
    }

    #[test]
    fn active_session_enters_quiz_only() {
        let session = started();
        assert!(can_enter_quiz(&session));
        assert!(!can_view_report(&session));
    }

    #[test]
    fn completed_session_views_report_only() {
        let mut session = started();
        session.submit();
        assert!(!can_enter_quiz(&session));
        assert!(can_view_report(&session));
    }
}
