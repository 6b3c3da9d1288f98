mod email;
mod ids;
mod question;
mod session;

pub use email::{EmailError, ParticipantEmail};
pub use ids::QuestionId;
pub use question::{Difficulty, Question, QuestionError};
pub use session::{
    DEFAULT_ALLOTMENT_SECS, Session, SessionError, SessionPhase, TickOutcome,
};
