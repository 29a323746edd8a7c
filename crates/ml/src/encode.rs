//! Batch tokenization with padding and truncation.

use eyre::WrapErr;
use hatescore_core::Result;
use tokenizers::{
    PaddingDirection, PaddingParams, PaddingStrategy, Tokenizer, TruncationParams,
};

/// Row-major `(batch_size, seq_len)` token tensors ready for a forward pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBatch {
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub token_type_ids: Vec<u32>,
    pub batch_size: usize,
    pub seq_len: usize,
}

impl TokenBatch {
    /// Attention mask of one row.
    #[must_use]
    pub fn mask_row(&self, row: usize) -> &[u32] {
        &self.attention_mask[row * self.seq_len..(row + 1) * self.seq_len]
    }

    /// Token ids of one row.
    #[must_use]
    pub fn ids_row(&self, row: usize) -> &[u32] {
        &self.input_ids[row * self.seq_len..(row + 1) * self.seq_len]
    }
}

/// Pad every batch to its longest entry (right side, masked out) and truncate
/// to `max_length` tokens including special tokens.
///
/// # Errors
///
/// Returns an error if the tokenizer rejects the truncation settings.
pub fn configure(tokenizer: &mut Tokenizer, max_length: usize) -> Result<()> {
    let pad_id = tokenizer
        .get_padding()
        .map(|p| p.pad_id)
        .or_else(|| tokenizer.token_to_id("[PAD]"))
        .or_else(|| tokenizer.token_to_id("<pad>"))
        .unwrap_or(0);
    let pad_token = tokenizer
        .id_to_token(pad_id)
        .unwrap_or_else(|| "[PAD]".to_string());

    tokenizer.with_padding(Some(PaddingParams {
        strategy: PaddingStrategy::BatchLongest,
        direction: PaddingDirection::Right,
        pad_id,
        pad_token,
        ..PaddingParams::default()
    }));
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length,
            ..TruncationParams::default()
        }))
        .map_err(|e| eyre::eyre!(e))
        .wrap_err("failed to configure truncation")?;
    Ok(())
}

/// Tokenize `texts` together into one padded batch.
///
/// # Errors
///
/// Returns an error if tokenization fails or rows come back with different
/// lengths (tokenizer not configured for padding).
pub fn encode_batch(tokenizer: &Tokenizer, texts: &[&str]) -> Result<TokenBatch> {
    let encodings = tokenizer
        .encode_batch(texts.to_vec(), true)
        .map_err(|e| eyre::eyre!(e))
        .wrap_err("tokenization failed")?;

    let seq_len = encodings.first().map_or(0, tokenizers::Encoding::len);
    let batch_size = encodings.len();
    let mut batch = TokenBatch {
        input_ids: Vec::with_capacity(batch_size * seq_len),
        attention_mask: Vec::with_capacity(batch_size * seq_len),
        token_type_ids: Vec::with_capacity(batch_size * seq_len),
        batch_size,
        seq_len,
    };

    for (row, encoding) in encodings.iter().enumerate() {
        if encoding.len() != seq_len {
            return Err(eyre::eyre!(
                "row {row} has {} tokens, expected {seq_len}",
                encoding.len()
            ));
        }
        batch.input_ids.extend_from_slice(encoding.get_ids());
        batch
            .attention_mask
            .extend_from_slice(encoding.get_attention_mask());
        batch.token_type_ids.extend_from_slice(encoding.get_type_ids());
    }

    Ok(batch)
}
