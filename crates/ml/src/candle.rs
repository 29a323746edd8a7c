//! Candle backend for BERT-family sequence classifiers - pure Rust, CPU.

use std::path::Path;

use candle_core::{Device, IndexOp, Module, Tensor};
use candle_nn::{Linear, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use hatescore_core::Result;

use crate::encode::TokenBatch;
use crate::model::ClassifierConfig;

/// `BertModel` encoder, `tanh` pooler over `[CLS]`, linear classifier.
pub struct CandleBackend {
    bert: BertModel,
    pooler: Linear,
    classifier: Linear,
    device: Device,
    max_len: usize,
}

impl CandleBackend {
    /// # Errors
    ///
    /// Returns an error if the weights or config cannot be loaded, or the
    /// checkpoint is not a two-label classifier.
    ///
    /// # Safety
    ///
    /// Safetensors weights are memory-mapped via `VarBuilder::from_mmaped_safetensors`.
    pub fn load(weights_path: &Path, config_path: &Path) -> Result<Self> {
        let device = Device::Cpu;

        let config_str = std::fs::read_to_string(config_path)?;
        let head: ClassifierConfig = serde_json::from_str(&config_str)?;
        let num_labels = head.ensure_binary()?;
        let config: BertConfig = serde_json::from_str(&config_str)?;

        let vb = if weights_path.extension().is_some_and(|e| e == "safetensors") {
            unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], DTYPE, &device)? }
        } else {
            VarBuilder::from_pth(weights_path, DTYPE, &device)?
        };

        let bert = BertModel::load(vb.pp("bert"), &config)?;
        let pooler = candle_nn::linear(
            head.hidden_size,
            head.hidden_size,
            vb.pp("bert.pooler.dense"),
        )?;
        let classifier = candle_nn::linear(head.hidden_size, num_labels, vb.pp("classifier"))?;

        Ok(Self {
            bert,
            pooler,
            classifier,
            device,
            max_len: head.max_position_embeddings,
        })
    }
}

impl crate::backend::ClassifierBackend for CandleBackend {
    fn logits(&self, batch: &TokenBatch) -> Result<Vec<Vec<f32>>> {
        let shape = (batch.batch_size, batch.seq_len);
        let input_ids = Tensor::from_slice(&batch.input_ids, shape, &self.device)?;
        let token_type_ids = Tensor::from_slice(&batch.token_type_ids, shape, &self.device)?;
        let attention_mask = Tensor::from_slice(&batch.attention_mask, shape, &self.device)?;

        let hidden = self
            .bert
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let cls = hidden.i((.., 0, ..))?.contiguous()?;
        let pooled = self.pooler.forward(&cls)?.tanh()?;
        let logits = self.classifier.forward(&pooled)?;

        Ok(logits.to_vec2::<f32>()?)
    }

    fn max_sequence_length(&self) -> usize {
        self.max_len
    }
}
