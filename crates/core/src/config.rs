//! Runtime configuration for hatescore.

use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::calibrate::Temperature;

pub const DEFAULT_MODEL: &str = "Exqrch/IndoBERTweet-HateSpeech";
pub const DEFAULT_TOKENIZER: &str = "indolem/indobertweet-base-uncased";
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Which inference backend runs the classifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Candle when compiled in, otherwise ONNX.
    #[default]
    Auto,
    Candle,
    Onnx,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "candle" => Ok(Self::Candle),
            "onnx" => Ok(Self::Onnx),
            other => Err(format!(
                "unknown backend '{other}' (expected auto, candle or onnx)"
            )),
        }
    }
}

/// Runtime configuration for the scoring engine.
#[derive(Debug, Clone)]
pub struct Config {
    /// Hub repo id or local directory of the classifier checkpoint.
    pub model: String,
    /// Hub repo id or local directory holding `tokenizer.json`.
    pub tokenizer: String,
    pub temperature: Temperature,
    pub backend: BackendKind,
    pub hf_token: Option<String>,
    /// Probability above which a text counts as toxic (CLI `score` only).
    pub threshold: f32,
}

impl Config {
    /// Overlay values present in a config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file's threshold is outside `0.0..=1.0`.
    pub fn apply_file(&mut self, file: &FileConfig) -> crate::Result<()> {
        if let Some(ref model) = file.model {
            self.model.clone_from(model);
        }
        if let Some(ref tokenizer) = file.tokenizer {
            self.tokenizer.clone_from(tokenizer);
        }
        if let Some(temperature) = file.temperature {
            self.temperature = temperature;
        }
        if let Some(backend) = file.backend {
            self.backend = backend;
        }
        if let Some(threshold) = file.threshold {
            self.threshold = validate_threshold(threshold).map_err(|e| eyre::eyre!(e))?;
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            tokenizer: DEFAULT_TOKENIZER.to_string(),
            temperature: Temperature::DEFAULT,
            backend: BackendKind::default(),
            hf_token: None,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

/// Check that a toxicity threshold lies in `0.0..=1.0`.
///
/// # Errors
///
/// Returns a message describing the out-of-range value.
pub fn validate_threshold(value: f32) -> Result<f32, String> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("threshold must be between 0.0 and 1.0, got {value}"))
    }
}

/// TOML config file (`--config hatescore.toml`). Every field is optional;
/// command-line flags take precedence.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub model: Option<String>,
    pub tokenizer: Option<String>,
    pub temperature: Option<Temperature>,
    pub backend: Option<BackendKind>,
    pub threshold: Option<f32>,
    #[serde(default)]
    pub server: ServerSection,
}

/// `[server]` table of the config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    pub bind: Option<SocketAddr>,
    pub max_batch_size: Option<usize>,
}

impl FileConfig {
    /// Read and parse a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid config TOML.
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("failed to read {}: {e}", path.display()))?;

        toml::from_str(&content).map_err(|e| eyre::eyre!("failed to parse {}: {e}", path.display()))
    }
}
