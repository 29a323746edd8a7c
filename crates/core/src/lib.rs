//! Core hatescore types: text items, score results, the `Scorer` seam,
//! calibration math and configuration. No ML or async dependencies.

pub mod calibrate;
pub mod config;
pub mod error;

pub use calibrate::Temperature;
pub use config::{BackendKind, Config, FileConfig};
pub use error::{Result, ScoreError};

/// A caller-supplied identifier paired with raw text. Ids are echoed back by
/// position and need not be unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextItem {
    pub id: i64,
    pub text: String,
}

/// Calibrated hate-class probability for the `TextItem` with the same id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreResult {
    pub id: i64,
    pub probability: f32,
}

impl ScoreResult {
    /// Complement of `probability`, derived rather than read from the model.
    #[must_use]
    pub fn not_hate_probability(&self) -> f32 {
        1.0 - self.probability
    }
}

/// Anything that turns texts into calibrated hate probabilities.
///
/// Implementations must be safe to call concurrently from several request
/// handlers and must return exactly one score per input, in input order.
pub trait Scorer: Send + Sync {
    fn is_loaded(&self) -> bool;

    /// Why the scorer is unavailable, if it is.
    fn load_error(&self) -> Option<&str> {
        None
    }

    /// Score a batch. Fails as a whole; there are no per-item errors.
    ///
    /// # Errors
    ///
    /// `NotLoaded` when unavailable, `InvalidInput` for an empty batch or a
    /// blank text, `Inference` if the model fails.
    fn predict_batch(&self, texts: &[&str]) -> std::result::Result<Vec<f32>, ScoreError>;

    /// Score one text through the batch path.
    ///
    /// # Errors
    ///
    /// Same as [`Scorer::predict_batch`].
    fn predict_single(&self, text: &str) -> std::result::Result<f32, ScoreError> {
        self.predict_batch(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| ScoreError::Inference("scorer returned no score".into()))
    }
}

/// Reject an empty batch or any blank text.
///
/// # Errors
///
/// Returns `InvalidInput` naming the first offending position.
pub fn validate_texts(texts: &[&str]) -> std::result::Result<(), ScoreError> {
    if texts.is_empty() {
        return Err(ScoreError::InvalidInput("batch is empty".into()));
    }
    if let Some(pos) = texts.iter().position(|t| t.trim().is_empty()) {
        return Err(ScoreError::InvalidInput(format!(
            "text at position {pos} is empty"
        )));
    }
    Ok(())
}

/// Score items and re-attach their ids by position.
///
/// # Errors
///
/// Propagates the scorer's error, or `Inference` if it returned the wrong
/// number of scores.
pub fn score_items(
    scorer: &dyn Scorer,
    items: &[TextItem],
) -> std::result::Result<Vec<ScoreResult>, ScoreError> {
    let texts: Vec<&str> = items.iter().map(|item| item.text.as_str()).collect();
    let scores = scorer.predict_batch(&texts)?;
    if scores.len() != items.len() {
        return Err(ScoreError::Inference(format!(
            "scorer returned {} scores for {} items",
            scores.len(),
            items.len()
        )));
    }
    Ok(items
        .iter()
        .zip(scores)
        .map(|(item, probability)| ScoreResult {
            id: item.id,
            probability,
        })
        .collect())
}
