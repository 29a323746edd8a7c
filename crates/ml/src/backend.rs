use hatescore_core::Result;

use crate::encode::TokenBatch;

/// A sequence classifier that maps a padded token batch to per-row logits.
///
/// Inference takes `&self`: concurrent calls must not share scratch state.
pub trait ClassifierBackend: Send + Sync {
    /// Raw class logits, one row per batch entry, in batch order.
    ///
    /// # Errors
    ///
    /// Returns an error if tensor construction or the forward pass fails.
    fn logits(&self, batch: &TokenBatch) -> Result<Vec<Vec<f32>>>;

    /// Longest token sequence the model accepts.
    fn max_sequence_length(&self) -> usize;
}
