use std::path::Path;
use std::sync::Mutex;

use hatescore_core::Result;
use ort::session::Session;
use ort::value::Tensor;

use crate::encode::TokenBatch;

/// ONNX Runtime backend. `Session::run` needs `&mut`, so calls are
/// serialized through a mutex; each call still builds its own tensors.
pub struct OnnxBackend {
    session: Mutex<Session>,
    wants_token_types: bool,
    max_len: usize,
}

impl OnnxBackend {
    /// # Errors
    ///
    /// Returns an error if the ONNX session cannot be loaded.
    pub fn load(model_path: &Path, max_len: usize) -> Result<Self> {
        let session = Session::builder()?.commit_from_file(model_path)?;
        let wants_token_types = session
            .inputs
            .iter()
            .any(|input| input.name == "token_type_ids");
        Ok(Self {
            session: Mutex::new(session),
            wants_token_types,
            max_len,
        })
    }
}

fn widen(values: &[u32]) -> Vec<i64> {
    values.iter().map(|&v| i64::from(v)).collect()
}

impl crate::backend::ClassifierBackend for OnnxBackend {
    fn logits(&self, batch: &TokenBatch) -> Result<Vec<Vec<f32>>> {
        let shape = vec![
            i64::try_from(batch.batch_size)?,
            i64::try_from(batch.seq_len)?,
        ];
        let input_ids = Tensor::from_array((shape.clone(), widen(&batch.input_ids)))?;
        let attention_mask = Tensor::from_array((shape.clone(), widen(&batch.attention_mask)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| eyre::eyre!("ONNX session lock poisoned"))?;

        let outputs = if self.wants_token_types {
            let token_type_ids = Tensor::from_array((shape, widen(&batch.token_type_ids)))?;
            session.run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
                "token_type_ids" => token_type_ids,
            ])?
        } else {
            session.run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
            ])?
        };

        let logits = outputs[0].try_extract_array::<f32>()?;
        if logits.ndim() != 2 {
            return Err(eyre::eyre!(
                "expected 2-D logits, got shape {:?}",
                logits.shape()
            ));
        }

        Ok(logits
            .outer_iter()
            .map(|row| row.iter().copied().collect())
            .collect())
    }

    fn max_sequence_length(&self) -> usize {
        self.max_len
    }
}
