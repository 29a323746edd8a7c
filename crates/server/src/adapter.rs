//! Translates wire payloads into scorer calls and back.

use std::sync::Arc;

use hatescore_core::{score_items, ScoreError, Scorer, TextItem};
use tracing::debug;

use crate::protocol::{
    self, LegacyRequest, LegacyResponse, LegacyResult, SingleScore, SingleTweet, TweetItem,
    TweetScore,
};

/// Stateless apart from the shared scorer. Every method makes at most one
/// scorer call and makes none when the payload is malformed.
#[derive(Clone)]
pub struct RequestAdapter {
    scorer: Arc<dyn Scorer>,
}

impl RequestAdapter {
    #[must_use]
    pub fn new(scorer: Arc<dyn Scorer>) -> Self {
        Self { scorer }
    }

    #[must_use]
    pub fn scorer(&self) -> &dyn Scorer {
        self.scorer.as_ref()
    }

    /// Score a list of tweets, echoing ids back in request order.
    ///
    /// # Errors
    ///
    /// `MalformedRequest` if any item lacks `tweetText`, otherwise whatever
    /// the scorer reports.
    pub fn handle_batch(&self, items: Vec<TweetItem>) -> Result<Vec<TweetScore>, ScoreError> {
        let items = protocol::to_text_items(items)?;
        debug!(items = items.len(), "scoring batch");
        let results = score_items(self.scorer(), &items)?;
        Ok(results.into_iter().map(TweetScore::from).collect())
    }

    /// # Errors
    ///
    /// `MalformedRequest` if `tweetText` is missing, otherwise whatever the
    /// scorer reports.
    pub fn handle_single(&self, request: SingleTweet) -> Result<SingleScore, ScoreError> {
        let text = request
            .tweet_text
            .ok_or_else(|| ScoreError::MalformedRequest("tweetText is required".into()))?;
        let toxicity = self.scorer.predict_single(&text)?;
        Ok(SingleScore { toxicity })
    }

    /// Percentage pair for the older `/detect-toxicity` client.
    ///
    /// # Errors
    ///
    /// `MalformedRequest` if `text` is missing, otherwise whatever the scorer
    /// reports.
    pub fn handle_legacy(&self, request: LegacyRequest) -> Result<LegacyResponse, ScoreError> {
        let text = request
            .text
            .ok_or_else(|| ScoreError::MalformedRequest("text is required".into()))?;
        let scores = score_items(self.scorer(), &[TextItem { id: 0, text }])?;
        let score = scores
            .first()
            .ok_or_else(|| ScoreError::Inference("scorer returned no score".into()))?;
        Ok(LegacyResponse {
            message: protocol::LEGACY_MESSAGE.to_string(),
            result: LegacyResult::from_score(score),
        })
    }
}
