#![forbid(unsafe_code)]

pub mod error;
pub mod provider;
pub mod session;

pub use quiz_core::Clock;

pub use error::{ProviderError, ReportError, SessionStoreError};
pub use provider::{QuestionProvider, TriviaClient, TriviaConfig};
pub use session::{
    QuestionOutcome, QuizTicker, ScoreReport, SessionStore, SharedSessionStore, can_enter_quiz,
    can_view_report,
};
