//! Hate-speech scoring engine: tokenizer + sequence classifier +
//! temperature-scaled calibration.

#[cfg(not(any(feature = "candle", feature = "onnx")))]
compile_error!("At least one ML backend must be enabled: 'candle' (default) or 'onnx'");

pub mod backend;
#[cfg(feature = "candle")]
pub mod candle;
pub mod encode;
pub mod model;
#[cfg(feature = "onnx")]
pub mod onnx;

pub use backend::ClassifierBackend;
pub use encode::TokenBatch;

use hatescore_core::config::{BackendKind, Config};
use hatescore_core::{calibrate, validate_texts, Result, ScoreError, Scorer, Temperature};
use model::ArtifactSource;
use tokenizers::Tokenizer;
use tracing::{debug, info, instrument, trace, warn};

enum EngineState {
    Loaded {
        tokenizer: Tokenizer,
        backend: Box<dyn ClassifierBackend>,
    },
    Unloaded {
        reason: String,
    },
}

/// Owns the tokenizer and classifier. Either fully loaded or unloaded with a
/// recorded reason; read-only once built.
pub struct ScoringEngine {
    state: EngineState,
    temperature: Temperature,
}

impl ScoringEngine {
    /// Load tokenizer and classifier named in `config`.
    ///
    /// Never fails: on any error (or a panic inside a loader) the engine is
    /// returned unloaded and every prediction reports `NotLoaded`.
    #[instrument(skip(config), fields(model = %config.model, tokenizer = %config.tokenizer, backend = ?config.backend))]
    pub fn load(config: &Config) -> Self {
        debug!("loading scoring engine");
        let loaded = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let tokenizer = model::load_tokenizer(config)?;
            debug!("tokenizer loaded");
            let backend = load_backend(config)?;
            Self::from_parts(tokenizer, backend, config.temperature)
        }));

        match loaded {
            Ok(Ok(engine)) => {
                info!(temperature = %config.temperature, "scoring engine loaded");
                engine
            }
            Ok(Err(e)) => {
                let reason = format!("{e:#}");
                warn!(%reason, "scoring engine failed to load");
                Self::unloaded(reason, config.temperature)
            }
            Err(_) => {
                warn!("scoring engine panicked during load");
                Self::unloaded("model loader panicked".into(), config.temperature)
            }
        }
    }

    /// Build a loaded engine from an already constructed tokenizer and backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the tokenizer cannot be configured for padding and
    /// truncation.
    pub fn from_parts(
        mut tokenizer: Tokenizer,
        backend: Box<dyn ClassifierBackend>,
        temperature: Temperature,
    ) -> Result<Self> {
        encode::configure(&mut tokenizer, backend.max_sequence_length())?;
        Ok(Self {
            state: EngineState::Loaded { tokenizer, backend },
            temperature,
        })
    }

    /// An engine that rejects every prediction with `NotLoaded(reason)`.
    #[must_use]
    pub fn unloaded(reason: String, temperature: Temperature) -> Self {
        Self {
            state: EngineState::Unloaded { reason },
            temperature,
        }
    }
}

impl Scorer for ScoringEngine {
    fn is_loaded(&self) -> bool {
        matches!(self.state, EngineState::Loaded { .. })
    }

    fn load_error(&self) -> Option<&str> {
        match &self.state {
            EngineState::Loaded { .. } => None,
            EngineState::Unloaded { reason } => Some(reason),
        }
    }

    #[instrument(skip(self, texts), fields(batch = texts.len()))]
    fn predict_batch(&self, texts: &[&str]) -> std::result::Result<Vec<f32>, ScoreError> {
        let (tokenizer, backend) = match &self.state {
            EngineState::Loaded { tokenizer, backend } => (tokenizer, backend),
            EngineState::Unloaded { reason } => {
                return Err(ScoreError::NotLoaded(reason.clone()));
            }
        };
        validate_texts(texts)?;

        let batch = encode::encode_batch(tokenizer, texts).map_err(inference_error)?;
        trace!(seq_len = batch.seq_len, "batch encoded");

        let logits = backend.logits(&batch).map_err(inference_error)?;
        if logits.len() != texts.len() {
            return Err(ScoreError::Inference(format!(
                "backend returned {} rows for {} texts",
                logits.len(),
                texts.len()
            )));
        }

        let scores = logits
            .iter()
            .map(|row| {
                calibrate::hate_probability(row, self.temperature).ok_or_else(|| {
                    ScoreError::Inference(format!(
                        "expected two class logits, got {}",
                        row.len()
                    ))
                })
            })
            .collect::<std::result::Result<Vec<f32>, ScoreError>>()?;

        debug!(items = scores.len(), "batch scored");
        Ok(scores)
    }
}

fn inference_error(e: eyre::Report) -> ScoreError {
    ScoreError::Inference(format!("{e:#}"))
}

fn load_backend(config: &Config) -> Result<Box<dyn ClassifierBackend>> {
    let source = ArtifactSource::resolve(&config.model, config)?;
    let backend = match config.backend {
        BackendKind::Auto => load_auto_backend(&source)?,
        BackendKind::Candle => load_candle_backend(&source)?,
        BackendKind::Onnx => load_onnx_backend(&source)?,
    };
    info!(backend = ?config.backend, "classifier backend initialized");
    Ok(backend)
}

#[allow(clippy::needless_return, unreachable_code)]
fn load_auto_backend(source: &ArtifactSource) -> Result<Box<dyn ClassifierBackend>> {
    #[cfg(feature = "candle")]
    return load_candle_backend(source);

    #[cfg(not(feature = "candle"))]
    return load_onnx_backend(source);
}

#[cfg(feature = "candle")]
fn load_candle_backend(source: &ArtifactSource) -> Result<Box<dyn ClassifierBackend>> {
    let weights_path = source.get_any(&["model.safetensors", "pytorch_model.bin"])?;
    let config_path = source.get("config.json")?;
    Ok(Box::new(candle::CandleBackend::load(
        &weights_path,
        &config_path,
    )?))
}

#[cfg(not(feature = "candle"))]
fn load_candle_backend(_source: &ArtifactSource) -> Result<Box<dyn ClassifierBackend>> {
    Err(eyre::eyre!(
        "candle backend not compiled in (enable 'candle' feature)"
    ))
}

#[cfg(feature = "onnx")]
fn load_onnx_backend(source: &ArtifactSource) -> Result<Box<dyn ClassifierBackend>> {
    let config = model::ClassifierConfig::from_file(&source.get("config.json")?)?;
    config.ensure_binary()?;
    let model_path = source.get_any(&["onnx/model.onnx", "model.onnx"])?;
    Ok(Box::new(onnx::OnnxBackend::load(
        &model_path,
        config.max_position_embeddings,
    )?))
}

#[cfg(not(feature = "onnx"))]
fn load_onnx_backend(_source: &ArtifactSource) -> Result<Box<dyn ClassifierBackend>> {
    Err(eyre::eyre!(
        "onnx backend not compiled in (enable 'onnx' feature)"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Logits from the mean of unmasked token ids, so padding that leaked
    /// past the mask would change the score.
    struct MeanIdBackend {
        calls: Arc<AtomicUsize>,
    }

    impl ClassifierBackend for MeanIdBackend {
        fn logits(&self, batch: &TokenBatch) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((0..batch.batch_size)
                .map(|row| {
                    let (sum, count) = batch
                        .ids_row(row)
                        .iter()
                        .zip(batch.mask_row(row))
                        .filter(|(_, m)| **m == 1)
                        .fold((0.0f32, 0.0f32), |(s, c), (&id, _)| {
                            #[allow(clippy::cast_precision_loss)]
                            let id = id as f32;
                            (s + id, c + 1.0)
                        });
                    vec![0.0, sum / count - 8.0]
                })
                .collect())
        }

        fn max_sequence_length(&self) -> usize {
            16
        }
    }

    struct WrongShapeBackend;

    impl ClassifierBackend for WrongShapeBackend {
        fn logits(&self, _batch: &TokenBatch) -> Result<Vec<Vec<f32>>> {
            Ok(vec![vec![0.5]])
        }

        fn max_sequence_length(&self) -> usize {
            16
        }
    }

    fn fixture_tokenizer() -> Tokenizer {
        Tokenizer::from_str(include_str!("../tests/fixtures/tokenizer.json")).unwrap()
    }

    fn engine() -> (ScoringEngine, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let backend = MeanIdBackend {
            calls: Arc::clone(&calls),
        };
        let engine =
            ScoringEngine::from_parts(fixture_tokenizer(), Box::new(backend), Temperature::DEFAULT)
                .unwrap();
        (engine, calls)
    }

    #[test]
    fn output_matches_input_length() {
        let (engine, _) = engine();
        for texts in [
            vec!["ok"],
            vec!["ok", "hello world"],
            vec!["you are awful people", "great movie", "ok2", "the weather is nice today"],
        ] {
            assert_eq!(engine.predict_batch(&texts).unwrap().len(), texts.len());
        }
    }

    #[test]
    fn one_forward_pass_per_batch() {
        let (engine, calls) = engine();
        engine
            .predict_batch(&["ok", "hello world", "great movie"])
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn single_equals_batch_of_one() {
        let (engine, _) = engine();
        let single = engine.predict_single("bagus banget filmnya!").unwrap();
        let batch = engine.predict_batch(&["bagus banget filmnya!"]).unwrap();
        assert_eq!(single.to_bits(), batch[0].to_bits());
    }

    #[test]
    fn padding_does_not_change_scores() {
        let (engine, _) = engine();
        let alone = engine.predict_batch(&["ok"]).unwrap()[0];
        let batched = engine
            .predict_batch(&["ok", "you are awful people the weather is nice today"])
            .unwrap();
        assert!((alone - batched[0]).abs() < 1e-4);

        let long_alone = engine
            .predict_batch(&["you are awful people the weather is nice today"])
            .unwrap()[0];
        assert!((long_alone - batched[1]).abs() < 1e-4);
    }

    #[test]
    fn scores_are_probabilities() {
        let (engine, _) = engine();
        let scores = engine
            .predict_batch(&["zzz", "hate those terrible people", "love this"])
            .unwrap();
        assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
    }

    #[test]
    fn empty_batch_is_invalid() {
        let (engine, calls) = engine();
        assert!(matches!(
            engine.predict_batch(&[]),
            Err(ScoreError::InvalidInput(_))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn blank_text_is_invalid() {
        let (engine, calls) = engine();
        assert!(matches!(
            engine.predict_batch(&["ok", "   "]),
            Err(ScoreError::InvalidInput(_))
        ));
        assert!(matches!(
            engine.predict_single(""),
            Err(ScoreError::InvalidInput(_))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unloaded_engine_rejects_predictions() {
        let engine = ScoringEngine::unloaded("weights missing".into(), Temperature::DEFAULT);
        assert!(!engine.is_loaded());
        assert_eq!(engine.load_error(), Some("weights missing"));
        assert_eq!(
            engine.predict_batch(&["ok"]),
            Err(ScoreError::NotLoaded("weights missing".into()))
        );
        assert!(matches!(
            engine.predict_single("ok"),
            Err(ScoreError::NotLoaded(_))
        ));
    }

    #[test]
    fn unloaded_check_precedes_input_validation() {
        let engine = ScoringEngine::unloaded("down".into(), Temperature::DEFAULT);
        assert!(matches!(
            engine.predict_batch(&[]),
            Err(ScoreError::NotLoaded(_))
        ));
    }

    #[test]
    fn loaded_engine_reports_loaded() {
        let (engine, _) = engine();
        assert!(engine.is_loaded());
        assert!(engine.load_error().is_none());
    }

    #[test]
    fn malformed_backend_output_is_inference_error() {
        let engine = ScoringEngine::from_parts(
            fixture_tokenizer(),
            Box::new(WrongShapeBackend),
            Temperature::DEFAULT,
        )
        .unwrap();
        assert!(matches!(
            engine.predict_batch(&["ok"]),
            Err(ScoreError::Inference(_))
        ));
        assert!(matches!(
            engine.predict_batch(&["ok", "ok2"]),
            Err(ScoreError::Inference(_))
        ));
    }

    #[test]
    fn load_from_empty_directory_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let name = dir.path().to_string_lossy().into_owned();
        let config = Config {
            model: name.clone(),
            tokenizer: name,
            ..Config::default()
        };
        let engine = ScoringEngine::load(&config);
        assert!(!engine.is_loaded());
        assert!(engine.load_error().unwrap().contains("tokenizer.json"));
        assert!(matches!(
            engine.predict_single("ok"),
            Err(ScoreError::NotLoaded(_))
        ));
    }

    #[test]
    fn concurrent_calls_are_independent() {
        let (engine, _) = engine();
        let engine = Arc::new(engine);
        let expected = engine.predict_batch(&["ok", "great movie"]).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || engine.predict_batch(&["ok", "great movie"]).unwrap())
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    }

    #[cfg(not(feature = "onnx"))]
    #[test]
    fn backend_not_compiled_in_degrades() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("tokenizer.json"),
            include_str!("../tests/fixtures/tokenizer.json"),
        )
        .unwrap();
        let name = dir.path().to_string_lossy().into_owned();
        let engine = ScoringEngine::load(&Config {
            model: name.clone(),
            tokenizer: name,
            backend: BackendKind::Onnx,
            ..Config::default()
        });
        assert!(!engine.is_loaded());
        assert!(engine.load_error().unwrap().contains("not compiled in"));
    }
}
