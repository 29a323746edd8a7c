pub type Result<T> = eyre::Result<T>;

/// Failures surfaced by scoring calls. None of them are retried internally.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScoreError {
    /// The engine has no usable model or tokenizer.
    #[error("model or tokenizer not loaded: {0}")]
    NotLoaded(String),
    /// Empty batch or blank text item.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Request payload does not have the expected shape.
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    #[error("batch of {len} items exceeds the limit of {max}")]
    BatchTooLarge { len: usize, max: usize },
    /// Tokenization or forward pass failed on a loaded engine.
    #[error("inference failed: {0}")]
    Inference(String),
}

impl ScoreError {
    /// True for errors caused by the caller's input rather than the service.
    #[must_use]
    pub const fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_) | Self::MalformedRequest(_) | Self::BatchTooLarge { .. }
        )
    }
}
