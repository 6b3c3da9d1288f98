use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use quiz_core::model::{
    Difficulty, ParticipantEmail, Question, QuestionError, QuestionId, Session,
};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

//
// ─── KEY-VALUE SURFACE ─────────────────────────────────────────────────────────
//

/// Scoped key-value persistence for one session.
///
/// Each session field lives under its own stable key (see [`SessionField`]),
/// mirroring the per-field write-through the session store performs. `clear`
/// wipes the whole scope at `reset`.
#[async_trait]
pub trait SessionStateStore: Send + Sync {
    /// Read the value under a key, if present.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write (or overwrite) the value under a key.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be written.
    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a key. Removing an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be written.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Remove every key in the scope.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be written.
    async fn clear(&self) -> Result<(), StorageError>;
}

/// The persisted session fields and their stable keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionField {
    ParticipantEmail,
    Questions,
    Answers,
    CurrentIndex,
    Visited,
    RemainingSeconds,
    StartedAt,
    Completed,
}

impl SessionField {
    pub const ALL: [SessionField; 8] = [
        SessionField::ParticipantEmail,
        SessionField::Questions,
        SessionField::Answers,
        SessionField::CurrentIndex,
        SessionField::Visited,
        SessionField::RemainingSeconds,
        SessionField::StartedAt,
        SessionField::Completed,
    ];

    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            SessionField::ParticipantEmail => "participant_email",
            SessionField::Questions => "questions",
            SessionField::Answers => "answers",
            SessionField::CurrentIndex => "current_index",
            SessionField::Visited => "visited",
            SessionField::RemainingSeconds => "remaining_seconds",
            SessionField::StartedAt => "started_at",
            SessionField::Completed => "completed",
        }
    }
}

//
// ─── PERSISTED SHAPES ──────────────────────────────────────────────────────────
//

/// Persisted shape for a question.
///
/// Mirrors the domain `Question` so the store can serialize without leaking
/// storage concerns into the domain layer; `into_question` re-runs domain
/// validation on the way back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub id: u32,
    pub prompt: String,
    pub choices: Vec<String>,
    pub correct_answer: String,
    pub category: String,
    pub difficulty: Difficulty,
}

impl QuestionRecord {
    #[must_use]
    pub fn from_question(question: &Question) -> Self {
        Self {
            id: question.id().value(),
            prompt: question.prompt().to_owned(),
            choices: question.choices().to_vec(),
            correct_answer: question.correct_answer().to_owned(),
            category: question.category().to_owned(),
            difficulty: question.difficulty(),
        }
    }

    /// Convert the record back into a domain `Question`.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if the stored shape fails validation.
    pub fn into_question(self) -> Result<Question, QuestionError> {
        Question::new(
            QuestionId::new(self.id),
            self.prompt,
            self.choices,
            self.correct_answer,
            self.category,
            self.difficulty,
        )
    }
}

fn field_value(session: &Session, field: SessionField) -> Result<String, StorageError> {
    match field {
        SessionField::ParticipantEmail => {
            let email = session.participant_email().map(ParticipantEmail::as_str);
            serde_json::to_string(&email).map_err(ser)
        }
        SessionField::Questions => {
            let records: Vec<QuestionRecord> = session
                .questions()
                .iter()
                .map(QuestionRecord::from_question)
                .collect();
            serde_json::to_string(&records).map_err(ser)
        }
        SessionField::Answers => {
            let answers: BTreeMap<u32, &str> = session
                .answers()
                .iter()
                .map(|(id, choice)| (id.value(), choice.as_str()))
                .collect();
            serde_json::to_string(&answers).map_err(ser)
        }
        SessionField::CurrentIndex => serde_json::to_string(&session.current_index()).map_err(ser),
        SessionField::Visited => {
            let visited: Vec<usize> = session.visited().iter().copied().collect();
            serde_json::to_string(&visited).map_err(ser)
        }
        SessionField::RemainingSeconds => {
            serde_json::to_string(&session.remaining_seconds()).map_err(ser)
        }
        SessionField::StartedAt => serde_json::to_string(&session.started_at()).map_err(ser),
        SessionField::Completed => serde_json::to_string(&session.is_completed()).map_err(ser),
    }
}

async fn read_field<T: serde::de::DeserializeOwned>(
    store: &dyn SessionStateStore,
    field: SessionField,
) -> Result<Option<T>, StorageError> {
    match store.get(field.key()).await? {
        Some(raw) => serde_json::from_str(&raw).map(Some).map_err(ser),
        None => Ok(None),
    }
}

//
// ─── SAVE / LOAD ───────────────────────────────────────────────────────────────
//

/// Persist the named fields of a session, one key per field.
///
/// # Errors
///
/// Returns `StorageError` if serialization or the backend write fails.
pub async fn save_fields(
    store: &dyn SessionStateStore,
    session: &Session,
    fields: &[SessionField],
) -> Result<(), StorageError> {
    for &field in fields {
        let value = field_value(session, field)?;
        store.put(field.key(), &value).await?;
    }
    Ok(())
}

/// Persist every session field.
///
/// # Errors
///
/// Returns `StorageError` if serialization or the backend write fails.
pub async fn save_session(
    store: &dyn SessionStateStore,
    session: &Session,
) -> Result<(), StorageError> {
    save_fields(store, session, &SessionField::ALL).await
}

/// Hydrate a session from the store, applying defaults for missing keys.
///
/// A store with no session keys at all yields an empty pre-start session
/// with the given allotment; a missing `visited` key next to a surviving
/// question set defaults to the start position alone. Stored values are
/// re-validated on the way in; mutually inconsistent fields surface as
/// `StorageError::Serialization` rather than an invariant-violating
/// session.
///
/// # Errors
///
/// Returns `StorageError` if the backend cannot be read or the stored state
/// is corrupt.
pub async fn load_session(
    store: &dyn SessionStateStore,
    allotment_secs: u32,
) -> Result<Session, StorageError> {
    let email = match read_field::<Option<String>>(store, SessionField::ParticipantEmail).await? {
        Some(Some(raw)) => Some(ParticipantEmail::new(raw).map_err(ser)?),
        _ => None,
    };

    let questions = read_field::<Vec<QuestionRecord>>(store, SessionField::Questions)
        .await?
        .unwrap_or_default()
        .into_iter()
        .map(|record| record.into_question().map_err(ser))
        .collect::<Result<Vec<_>, _>>()?;

    let answers: BTreeMap<QuestionId, String> =
        read_field::<BTreeMap<u32, String>>(store, SessionField::Answers)
            .await?
            .unwrap_or_default()
            .into_iter()
            .map(|(id, choice)| (QuestionId::new(id), choice))
            .collect();

    let current_index = read_field::<usize>(store, SessionField::CurrentIndex)
        .await?
        .unwrap_or(0);

    let visited: BTreeSet<usize> = match read_field::<Vec<usize>>(store, SessionField::Visited).await? {
        Some(stored) => stored.into_iter().collect(),
        // the start position counts as visited from the first render on,
        // so a lost key defaults to exactly that
        None if !questions.is_empty() => BTreeSet::from([0]),
        None => BTreeSet::new(),
    };

    let remaining_seconds = read_field::<u32>(store, SessionField::RemainingSeconds)
        .await?
        .unwrap_or(allotment_secs);

    let started_at =
        read_field::<Option<DateTime<Utc>>>(store, SessionField::StartedAt)
            .await?
            .flatten();

    let completed = read_field::<bool>(store, SessionField::Completed)
        .await?
        .unwrap_or(false);

    Session::from_persisted(
        email,
        questions,
        answers,
        current_index,
        visited,
        remaining_seconds,
        started_at,
        completed,
        allotment_secs,
    )
    .map_err(ser)
}

//
// ─── IN-MEMORY STORE ───────────────────────────────────────────────────────────
//

/// Simple in-memory store implementation for testing and default wiring.
#[derive(Clone, Default)]
pub struct InMemoryStateStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl SessionStateStore for InMemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.clear();
        Ok(())
    }
}

/// Aggregates the persistence surface behind a trait object for easy backend
/// swapping.
#[derive(Clone)]
pub struct Storage {
    pub state: Arc<dyn SessionStateStore>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            state: Arc::new(InMemoryStateStore::new()),
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::DEFAULT_ALLOTMENT_SECS;
    use quiz_core::time::fixed_now;

    fn build_question(id: u32) -> Question {
        Question::new(
            QuestionId::new(id),
            format!("Question {id}?"),
            vec!["a".into(), "b".into(), "c".into()],
            "a",
            "History",
            Difficulty::Medium,
        )
        .unwrap()
    }

    fn active_session() -> Session {
        let mut session = Session::empty();
        session
            .start(
                ParticipantEmail::new("fan@example.com").unwrap(),
                vec![build_question(1), build_question(2), build_question(3)],
                fixed_now(),
            )
            .unwrap();
        session.record_answer(QuestionId::new(2), "b").unwrap();
        session.go_to(1).unwrap();
        session.tick();
        session
    }

    #[tokio::test]
    async fn round_trips_an_active_session() {
        let store = InMemoryStateStore::new();
        let session = active_session();

        save_session(&store, &session).await.unwrap();
        let restored = load_session(&store, DEFAULT_ALLOTMENT_SECS).await.unwrap();

        assert_eq!(restored, session);
    }

    #[tokio::test]
    async fn missing_keys_hydrate_to_empty_session() {
        let store = InMemoryStateStore::new();
        let session = load_session(&store, DEFAULT_ALLOTMENT_SECS).await.unwrap();

        assert!(session.questions().is_empty());
        assert!(!session.is_completed());
        assert_eq!(session.remaining_seconds(), DEFAULT_ALLOTMENT_SECS);
    }

    #[tokio::test]
    async fn saving_selected_fields_updates_only_those_keys() {
        let store = InMemoryStateStore::new();
        let mut session = active_session();
        save_session(&store, &session).await.unwrap();

        session.record_answer(QuestionId::new(1), "c").unwrap();
        save_fields(&store, &session, &[SessionField::Answers])
            .await
            .unwrap();

        let restored = load_session(&store, DEFAULT_ALLOTMENT_SECS).await.unwrap();
        assert_eq!(restored.answer_for(QuestionId::new(1)), Some("c"));
        // untouched keys keep the earlier snapshot
        assert_eq!(restored.current_index(), session.current_index());
    }

    #[tokio::test]
    async fn clear_wipes_the_scope() {
        let store = InMemoryStateStore::new();
        save_session(&store, &active_session()).await.unwrap();

        store.clear().await.unwrap();
        let session = load_session(&store, DEFAULT_ALLOTMENT_SECS).await.unwrap();
        assert!(session.questions().is_empty());
    }

    #[tokio::test]
    async fn missing_visited_key_defaults_to_start_position() {
        let store = InMemoryStateStore::new();
        let session = active_session();
        save_session(&store, &session).await.unwrap();

        store.remove(SessionField::Visited.key()).await.unwrap();

        let restored = load_session(&store, DEFAULT_ALLOTMENT_SECS).await.unwrap();
        assert_eq!(
            restored.visited().iter().copied().collect::<Vec<_>>(),
            vec![0]
        );
        // the other fields keep their stored values
        assert_eq!(restored.current_index(), session.current_index());
        assert_eq!(restored.answers(), session.answers());
    }

    #[tokio::test]
    async fn corrupt_state_is_rejected_not_hydrated() {
        let store = InMemoryStateStore::new();
        let session = active_session();
        save_session(&store, &session).await.unwrap();

        // cursor past the end of the stored question set
        store
            .put(SessionField::CurrentIndex.key(), "99")
            .await
            .unwrap();

        let err = load_session(&store, DEFAULT_ALLOTMENT_SECS)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }

    #[test]
    fn question_record_round_trip_revalidates() {
        let question = build_question(7);
        let record = QuestionRecord::from_question(&question);
        let json = serde_json::to_string(&record).unwrap();
        let back: QuestionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.into_question().unwrap(), question);
    }
}
