//! Question provider: fetches one batch of trivia questions per session.

use std::env;

use async_trait::async_trait;
use log::debug;
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;

use quiz_core::model::{Difficulty, Question, QuestionId};

use crate::error::ProviderError;

pub const DEFAULT_BASE_URL: &str = "https://opentdb.com";
pub const DEFAULT_BATCH_SIZE: u32 = 15;

/// Source of one fixed-size question batch, fetched once at session start.
#[async_trait]
pub trait QuestionProvider: Send + Sync {
    /// Fetch a batch of ready-to-display questions.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError` when the service cannot be reached or the
    /// payload fails validation. A failed fetch has no side effects.
    async fn fetch_batch(&self) -> Result<Vec<Question>, ProviderError>;
}

#[derive(Clone, Debug)]
pub struct TriviaConfig {
    pub base_url: String,
    pub batch_size: u32,
}

impl TriviaConfig {
    /// Read overrides from `QUIZ_API_BASE_URL` and `QUIZ_QUESTION_COUNT`.
    #[must_use]
    pub fn from_env() -> Self {
        let base_url =
            env::var("QUIZ_API_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        let batch_size = env::var("QUIZ_QUESTION_COUNT")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .filter(|amount| *amount > 0)
            .unwrap_or(DEFAULT_BATCH_SIZE);
        Self {
            base_url,
            batch_size,
        }
    }
}

impl Default for TriviaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Open Trivia DB client.
#[derive(Clone)]
pub struct TriviaClient {
    client: Client,
    config: TriviaConfig,
}

impl TriviaClient {
    #[must_use]
    pub fn new(config: TriviaConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    #[must_use]
    pub fn from_env() -> Self {
        Self::new(TriviaConfig::from_env())
    }

    #[must_use]
    pub fn config(&self) -> &TriviaConfig {
        &self.config
    }
}

#[async_trait]
impl QuestionProvider for TriviaClient {
    async fn fetch_batch(&self) -> Result<Vec<Question>, ProviderError> {
        let url = format!(
            "{}/api.php?amount={}",
            self.config.base_url.trim_end_matches('/'),
            self.config.batch_size
        );

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::HttpStatus(response.status()));
        }

        let payload: TriviaResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::Malformed(err.to_string()))?;
        if payload.response_code != 0 {
            return Err(ProviderError::ServiceCode(payload.response_code));
        }

        let batch = build_batch(payload.results, &mut rand::rng())?;
        debug!("fetched {} trivia questions from {url}", batch.len());
        Ok(batch)
    }
}

//
// ─── WIRE SHAPES ───────────────────────────────────────────────────────────────
//

#[derive(Debug, Deserialize)]
struct TriviaResponse {
    response_code: u8,
    results: Vec<TriviaRecord>,
}

#[derive(Debug, Deserialize)]
struct TriviaRecord {
    category: String,
    difficulty: String,
    question: String,
    correct_answer: String,
    incorrect_answers: Vec<String>,
}

//
// ─── BATCH ASSEMBLY ────────────────────────────────────────────────────────────
//

/// Turn raw provider records into domain questions: ids in fetch order
/// starting at 1, choices shuffled exactly once.
fn build_batch(
    records: Vec<TriviaRecord>,
    rng: &mut impl Rng,
) -> Result<Vec<Question>, ProviderError> {
    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            let difficulty: Difficulty = record
                .difficulty
                .parse()
                .map_err(|err: quiz_core::model::QuestionError| {
                    ProviderError::Malformed(err.to_string())
                })?;
            let id = u32::try_from(index + 1)
                .map_err(|_| ProviderError::Malformed("batch too large".into()))?;
            let choices = shuffled_choices(&record.correct_answer, record.incorrect_answers, rng);
            Question::new(
                QuestionId::new(id),
                record.question,
                choices,
                record.correct_answer,
                record.category,
                difficulty,
            )
            .map_err(|err| ProviderError::Malformed(err.to_string()))
        })
        .collect()
}

/// Merge the correct answer into the incorrect set and apply a uniform
/// Fisher–Yates permutation. The result is the question's display order for
/// the whole session; it is never re-shuffled, so report highlighting stays
/// stable.
fn shuffled_choices(correct: &str, incorrect: Vec<String>, rng: &mut impl Rng) -> Vec<String> {
    let mut choices = incorrect;
    choices.push(correct.to_owned());
    for i in (1..choices.len()).rev() {
        let j = rng.random_range(0..=i);
        choices.swap(i, j);
    }
    choices
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
