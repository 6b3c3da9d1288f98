use quiz_core::model::{Difficulty, Session};
use quiz_core::scoring;

use crate::error::ReportError;
use crate::session::guards::can_view_report;

/// Outcome row for one question in the answer review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionOutcome {
    pub position: usize,
    pub prompt: String,
    pub category: String,
    pub difficulty: Difficulty,
    pub selected: Option<String>,
    pub correct_answer: String,
    pub is_correct: bool,
}

/// Presentation-agnostic final report for a completed attempt.
///
/// This is intentionally **not** a UI view-model: no pre-formatted strings
/// and no HTML-entity decoding; the rendering surface formats (and decodes)
/// as needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreReport {
    pub participant_email: Option<String>,
    pub score: usize,
    pub total: usize,
    pub percentage: u32,
    pub passed: bool,
    pub unanswered: usize,
    pub outcomes: Vec<QuestionOutcome>,
}

impl ScoreReport {
    /// Build the report from a completed session snapshot.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::NotCompleted` unless the session is completed
    /// with a non-empty question set.
    pub fn build(session: &Session) -> Result<Self, ReportError> {
        if !can_view_report(session) {
            return Err(ReportError::NotCompleted);
        }

        let outcomes = session
            .questions()
            .iter()
            .enumerate()
            .map(|(position, question)| {
                let selected = session.answer_for(question.id()).map(str::to_owned);
                let is_correct = selected.as_deref() == Some(question.correct_answer());
                QuestionOutcome {
                    position,
                    prompt: question.prompt().to_owned(),
                    category: question.category().to_owned(),
                    difficulty: question.difficulty(),
                    selected,
                    correct_answer: question.correct_answer().to_owned(),
                    is_correct,
                }
            })
            .collect();

        // guarded non-empty above
        let percentage = scoring::percentage(session).ok_or(ReportError::NotCompleted)?;
        Ok(Self {
            participant_email: session
                .participant_email()
                .map(|email| email.as_str().to_owned()),
            score: scoring::score(session),
            total: session.total_questions(),
            percentage,
            passed: percentage >= scoring::PASS_THRESHOLD_PERCENT,
            unanswered: scoring::unanswered_count(session),
            outcomes,
        })
    }
}
