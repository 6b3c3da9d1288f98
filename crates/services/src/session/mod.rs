mod guards;
mod report;
mod store;
mod ticker;

// Public API of the session subsystem.
pub use crate::error::SessionStoreError;
pub use guards::{can_enter_quiz, can_view_report};
pub use report::{QuestionOutcome, ScoreReport};
pub use store::{SessionStore, SharedSessionStore};
pub use ticker::QuizTicker;
