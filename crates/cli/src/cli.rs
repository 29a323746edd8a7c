//! CLI argument parsing and settings resolution.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use eyre::WrapErr;
use hatescore_core::config::validate_threshold;
use hatescore_core::{BackendKind, Config, FileConfig, Temperature};
use hatescore_server::ServerConfig;

#[derive(Parser)]
#[command(name = "hatescore", version, about = "Hate-speech scoring service")]
pub struct Cli {
    /// TOML config file; flags override its values
    #[arg(long, env = "HATESCORE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Classifier checkpoint: Hub repo id or local directory
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Tokenizer: Hub repo id or local directory
    #[arg(long, global = true)]
    pub tokenizer: Option<String>,

    /// Softmax temperature applied to the logits (> 0)
    #[arg(long, global = true)]
    pub temperature: Option<Temperature>,

    /// Inference backend: auto, candle or onnx
    #[arg(long, global = true)]
    pub backend: Option<BackendKind>,

    /// `HuggingFace` token (direct value)
    #[arg(long, env = "HF_TOKEN", global = true, hide_env_values = true)]
    pub hf_token: Option<String>,

    /// Path to `HuggingFace` token file
    #[arg(long, env = "HF_TOKEN_PATH", global = true)]
    pub hf_token_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Serve the HTTP API (default)
    Serve(ServeArgs),
    /// Score stdin lines; exit 1 if any line is toxic, 2 if the model is unavailable
    Score {
        /// Probability above which a line counts as toxic (0.0-1.0)
        #[arg(long, value_parser = threshold_in_range)]
        threshold: Option<f32>,
    },
}

#[derive(Args)]
pub struct ServeArgs {
    /// Listen address [default: 127.0.0.1:8000]
    #[arg(long)]
    pub bind: Option<SocketAddr>,

    /// Largest accepted /analyze_tweets batch [default: 256]
    #[arg(long)]
    pub max_batch_size: Option<usize>,
}

fn threshold_in_range(s: &str) -> Result<f32, String> {
    let val: f32 = s.parse().map_err(|e| format!("{e}"))?;
    validate_threshold(val)
}

/// Fully resolved settings: defaults, then the config file, then flags.
#[derive(Debug)]
pub struct Settings {
    pub engine: Config,
    pub server: ServerConfig,
}

impl Cli {
    /// # Errors
    ///
    /// Returns an error if the config file cannot be loaded or holds an
    /// invalid value.
    pub fn resolve(&self) -> eyre::Result<Settings> {
        let mut engine = Config::default();
        let mut server = ServerConfig::default();

        if let Some(ref path) = self.config {
            let file = FileConfig::load(path)?;
            engine
                .apply_file(&file)
                .wrap_err_with(|| format!("invalid value in {}", path.display()))?;
            if let Some(bind) = file.server.bind {
                server.bind = bind;
            }
            if let Some(max) = file.server.max_batch_size {
                server.max_batch_size = max;
            }
        }

        if let Some(ref model) = self.model {
            engine.model.clone_from(model);
        }
        if let Some(ref tokenizer) = self.tokenizer {
            engine.tokenizer.clone_from(tokenizer);
        }
        if let Some(temperature) = self.temperature {
            engine.temperature = temperature;
        }
        if let Some(backend) = self.backend {
            engine.backend = backend;
        }
        engine.hf_token = self.resolve_hf_token();

        match &self.command {
            Some(Command::Serve(args)) => {
                if let Some(bind) = args.bind {
                    server.bind = bind;
                }
                if let Some(max) = args.max_batch_size {
                    server.max_batch_size = max;
                }
            }
            Some(Command::Score {
                threshold: Some(threshold),
            }) => engine.threshold = *threshold,
            Some(Command::Score { threshold: None }) | None => {}
        }

        if server.max_batch_size == 0 {
            return Err(eyre::eyre!("max_batch_size must be at least 1"));
        }

        Ok(Settings { engine, server })
    }

    /// Resolve the HF token from `--hf-token`, then `--hf-token-path`.
    /// Without either, hf-hub falls back to its own cached token.
    #[must_use]
    pub fn resolve_hf_token(&self) -> Option<String> {
        if let Some(ref token) = self.hf_token {
            let trimmed = token.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }

        self.hf_token_path.as_deref().and_then(read_token_file)
    }
}

fn read_token_file(path: &Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
