//! JSON wire schema.
//!
//! Field names follow the browser extension client (`tweetText`, `toxicity`)
//! and must not change.

use hatescore_core::{ScoreResult, TextItem};
use serde::{Deserialize, Serialize};

pub const ROOT_MESSAGE: &str = "Hate Speech Detection API is running!";
pub const LEGACY_MESSAGE: &str = "Successfully Recognized TweetText";

/// One element of an `/analyze_tweets` request. `tweetText` is optional on
/// the wire so a missing or null value reaches the adapter as
/// `MalformedRequest` instead of a generic decode failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TweetItem {
    pub id: i64,
    #[serde(rename = "tweetText", default)]
    pub tweet_text: Option<String>,
}

impl TweetItem {
    #[must_use]
    pub fn new(id: i64, text: impl Into<String>) -> Self {
        Self {
            id,
            tweet_text: Some(text.into()),
        }
    }
}

/// Body of `/analyze_tweet`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleTweet {
    #[serde(rename = "tweetText", default)]
    pub tweet_text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TweetScore {
    pub id: i64,
    pub toxicity: f32,
}

impl From<ScoreResult> for TweetScore {
    fn from(result: ScoreResult) -> Self {
        Self {
            id: result.id,
            toxicity: result.probability,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SingleScore {
    pub toxicity: f32,
}

/// Body of `/detect-toxicity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyRequest {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyResponse {
    pub message: String,
    pub result: LegacyResult,
}

/// Percentages rounded to two decimals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LegacyResult {
    pub hate_speech: f64,
    pub not_hate_speech: f64,
}

impl LegacyResult {
    #[must_use]
    pub fn from_score(score: &ScoreResult) -> Self {
        Self {
            hate_speech: percent(score.probability),
            not_hate_speech: percent(score.not_hate_probability()),
        }
    }
}

fn percent(probability: f32) -> f64 {
    round2(f64::from(probability) * 100.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error body, shaped like FastAPI's `HTTPException` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

/// Ids and texts that passed the presence check, ready for scoring.
pub(crate) fn to_text_items(
    items: Vec<TweetItem>,
) -> Result<Vec<TextItem>, hatescore_core::ScoreError> {
    items
        .into_iter()
        .enumerate()
        .map(|(pos, item)| match item.tweet_text {
            Some(text) => Ok(TextItem { id: item.id, text }),
            None => Err(hatescore_core::ScoreError::MalformedRequest(format!(
                "item {pos} (id {}) has no tweetText",
                item.id
            ))),
        })
        .collect()
}
