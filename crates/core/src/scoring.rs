//! Pure scoring and navigation reads over a session snapshot.
//!
//! Nothing here mutates the session; the quiz and report screens call these
//! against whatever `Session` the store currently holds.

use std::collections::BTreeSet;

use crate::model::Session;

/// Minimum percentage counted as a pass. A policy constant, not derived.
pub const PASS_THRESHOLD_PERCENT: u32 = 50;

/// Positions whose question has a recorded answer.
#[must_use]
pub fn answered_positions(session: &Session) -> BTreeSet<usize> {
    session
        .questions()
        .iter()
        .enumerate()
        .filter(|(_, q)| session.answer_for(q.id()).is_some())
        .map(|(pos, _)| pos)
        .collect()
}

/// Count of questions answered with the correct choice. Unanswered questions
/// never count as correct.
#[must_use]
pub fn score(session: &Session) -> usize {
    session
        .questions()
        .iter()
        .filter(|q| session.answer_for(q.id()) == Some(q.correct_answer()))
        .count()
}

/// Score as a whole percentage, round half up.
///
/// `None` when the question set is empty; callers must guard before
/// rendering a report.
#[must_use]
pub fn percentage(session: &Session) -> Option<u32> {
    let total = session.total_questions();
    if total == 0 {
        return None;
    }
    let correct = score(session);
    let percent = (200 * correct + total) / (2 * total);
    u32::try_from(percent).ok()
}

/// Whether the attempt clears [`PASS_THRESHOLD_PERCENT`]. `None` on an empty
/// question set, like [`percentage`].
#[must_use]
pub fn passed(session: &Session) -> Option<bool> {
    percentage(session).map(|p| p >= PASS_THRESHOLD_PERCENT)
}

/// Number of questions in the set without a recorded answer.
#[must_use]
pub fn unanswered_count(session: &Session) -> usize {
    session
        .questions()
        .iter()
        .filter(|q| session.answer_for(q.id()).is_none())
        .count()
}
