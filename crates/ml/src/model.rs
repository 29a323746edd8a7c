//! Locating checkpoint files: a local directory or a `HuggingFace` Hub repo.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use eyre::WrapErr;
use hatescore_core::{Config, Result};
use serde::Deserialize;
use tokenizers::Tokenizer;
use tracing::debug;

/// Fields of a sequence-classification `config.json` shared by all backends.
#[derive(Debug, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub hidden_size: usize,
    #[serde(default = "default_max_positions")]
    pub max_position_embeddings: usize,
    #[serde(default)]
    pub num_labels: Option<usize>,
    #[serde(default)]
    pub id2label: HashMap<String, String>,
}

const fn default_max_positions() -> usize {
    512
}

impl ClassifierConfig {
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .wrap_err_with(|| format!("failed to parse {}", path.display()))
    }

    /// Explicit `num_labels`, else the size of `id2label`, else 2.
    #[must_use]
    pub fn num_labels(&self) -> usize {
        self.num_labels.unwrap_or(match self.id2label.len() {
            0 => 2,
            n => n,
        })
    }

    /// # Errors
    ///
    /// Returns an error unless the checkpoint has exactly two labels.
    pub fn ensure_binary(&self) -> Result<usize> {
        match self.num_labels() {
            2 => Ok(2),
            n => Err(eyre::eyre!(
                "expected a two-label classifier, checkpoint has {n} labels"
            )),
        }
    }
}

/// Where the files of one checkpoint come from.
pub enum ArtifactSource {
    Local(PathBuf),
    Hub {
        repo_id: String,
        repo: hf_hub::api::sync::ApiRepo,
    },
}

impl ArtifactSource {
    /// Treat `name` as a local directory if one exists, otherwise as a Hub
    /// repo id.
    ///
    /// # Errors
    ///
    /// Returns an error if the `HuggingFace` API client cannot be built.
    pub fn resolve(name: &str, config: &Config) -> Result<Self> {
        let path = Path::new(name);
        if path.is_dir() {
            debug!(path = %path.display(), "using local checkpoint directory");
            return Ok(Self::Local(path.to_path_buf()));
        }

        let api = hf_api(config)?;
        debug!(repo = name, "HuggingFace repo handle created");
        Ok(Self::Hub {
            repo_id: name.to_string(),
            repo: api.model(name.to_string()),
        })
    }

    /// Path to `filename`, downloading it into the Hub cache if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing locally or the download fails.
    pub fn get(&self, filename: &str) -> Result<PathBuf> {
        match self {
            Self::Local(dir) => {
                let path = dir.join(filename);
                if path.is_file() {
                    Ok(path)
                } else {
                    Err(eyre::eyre!("{} not found", path.display()))
                }
            }
            Self::Hub { repo_id, repo } => repo
                .get(filename)
                .map_err(|e| eyre::eyre!("download of {filename} from {repo_id} failed: {e}")),
        }
    }

    /// First of `filenames` that is available.
    ///
    /// # Errors
    ///
    /// Returns the last lookup error if none of them is.
    pub fn get_any(&self, filenames: &[&str]) -> Result<PathBuf> {
        let mut last = eyre::eyre!("no candidate files given");
        for filename in filenames {
            match self.get(filename) {
                Ok(path) => return Ok(path),
                Err(e) => {
                    debug!(filename, %e, "candidate unavailable");
                    last = e;
                }
            }
        }
        Err(last)
    }
}

fn hf_api(config: &Config) -> Result<hf_hub::api::sync::Api> {
    use hf_hub::api::sync::ApiBuilder;

    let mut builder = ApiBuilder::new();
    if let Some(ref token) = config.hf_token {
        debug!("using HuggingFace token from config");
        builder = builder.with_token(Some(token.clone()));
    } else {
        debug!("no HuggingFace token configured");
    }
    builder
        .build()
        .wrap_err("failed to build HuggingFace API client")
}

/// The only field of `tokenizer_config.json` needed to rebuild a BERT
/// tokenizer from its vocabulary.
#[derive(Debug, Default, Deserialize)]
struct TokenizerConfig {
    do_lower_case: Option<bool>,
}

/// Load the configured tokenizer: `tokenizer.json` when the source has one,
/// otherwise a BERT WordPiece pipeline built from `vocab.txt`.
///
/// # Errors
///
/// Returns an error if neither file can be fetched or the one found cannot
/// be parsed.
pub fn load_tokenizer(config: &Config) -> Result<Tokenizer> {
    let source = ArtifactSource::resolve(&config.tokenizer, config)?;
    match source.get("tokenizer.json") {
        Ok(path) => Tokenizer::from_file(&path)
            .map_err(|e| eyre::eyre!(e))
            .wrap_err_with(|| format!("failed to load tokenizer from {}", path.display())),
        Err(e) => {
            debug!(%e, "no tokenizer.json, falling back to vocab.txt");
            let vocab = source
                .get("vocab.txt")
                .wrap_err("neither tokenizer.json nor vocab.txt is available")?;
            let lowercase = match source.get("tokenizer_config.json") {
                Ok(path) => read_tokenizer_config(&path)?.do_lower_case,
                Err(_) => None,
            };
            wordpiece_tokenizer(&vocab, lowercase.unwrap_or(true))
        }
    }
}

fn read_tokenizer_config(path: &Path) -> Result<TokenizerConfig> {
    let content = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).wrap_err_with(|| format!("failed to parse {}", path.display()))
}

/// BERT tokenizer from a WordPiece vocabulary: BERT normalizer and
/// pre-tokenizer, `[CLS] ... [SEP]` post-processing.
fn wordpiece_tokenizer(vocab: &Path, lowercase: bool) -> Result<Tokenizer> {
    use tokenizers::models::wordpiece::WordPiece;
    use tokenizers::normalizers::BertNormalizer;
    use tokenizers::pre_tokenizers::bert::BertPreTokenizer;
    use tokenizers::processors::bert::BertProcessing;

    let vocab_str = vocab
        .to_str()
        .ok_or_else(|| eyre::eyre!("vocabulary path {} is not UTF-8", vocab.display()))?;
    let wordpiece = WordPiece::from_file(vocab_str)
        .unk_token("[UNK]".to_string())
        .build()
        .map_err(|e| eyre::eyre!(e))
        .wrap_err_with(|| format!("failed to build WordPiece model from {}", vocab.display()))?;

    let mut tokenizer = Tokenizer::new(wordpiece);
    tokenizer.with_normalizer(Some(BertNormalizer::new(true, true, None, lowercase)));
    tokenizer.with_pre_tokenizer(Some(BertPreTokenizer));

    let special = |token: &str| {
        tokenizer
            .token_to_id(token)
            .ok_or_else(|| eyre::eyre!("{} has no {token} token", vocab.display()))
    };
    let sep = ("[SEP]".to_string(), special("[SEP]")?);
    let cls = ("[CLS]".to_string(), special("[CLS]")?);
    tokenizer.with_post_processor(Some(BertProcessing::new(sep, cls)));

    debug!(lowercase, vocab_size = tokenizer.get_vocab_size(true), "built WordPiece tokenizer");
    Ok(tokenizer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifier_config_counts_labels() {
        let config: ClassifierConfig = serde_json::from_str(
            r#"{"hidden_size": 768, "id2label": {"0": "LABEL_0", "1": "LABEL_1"}}"#,
        )
        .unwrap();
        assert_eq!(config.num_labels(), 2);
        assert_eq!(config.max_position_embeddings, 512);
        assert!(config.ensure_binary().is_ok());
    }

    #[test]
    fn classifier_config_prefers_explicit_num_labels() {
        let config: ClassifierConfig = serde_json::from_str(
            r#"{"hidden_size": 8, "num_labels": 3, "max_position_embeddings": 128}"#,
        )
        .unwrap();
        assert_eq!(config.num_labels(), 3);
        assert_eq!(config.max_position_embeddings, 128);
        assert!(config.ensure_binary().is_err());
    }

    #[test]
    fn existing_directory_resolves_locally() {
        let dir = tempfile::tempdir().unwrap();
        let name = dir.path().to_string_lossy().into_owned();
        let source = ArtifactSource::resolve(&name, &Config::default()).unwrap();
        assert!(matches!(source, ArtifactSource::Local(_)));
    }

    #[test]
    fn local_lookup_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = ArtifactSource::Local(dir.path().to_path_buf());
        let err = source.get("config.json").unwrap_err();
        assert!(err.to_string().contains("config.json"));
    }

    #[test]
    fn get_any_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pytorch_model.bin"), b"").unwrap();
        let source = ArtifactSource::Local(dir.path().to_path_buf());
        let path = source
            .get_any(&["model.safetensors", "pytorch_model.bin"])
            .unwrap();
        assert!(path.ends_with("pytorch_model.bin"));
    }

    #[test]
    fn local_tokenizer_loads() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("tokenizer.json"),
            include_str!("../tests/fixtures/tokenizer.json"),
        )
        .unwrap();
        let config = Config {
            tokenizer: dir.path().to_string_lossy().into_owned(),
            ..Config::default()
        };
        let tokenizer = load_tokenizer(&config).unwrap();
        assert_eq!(tokenizer.token_to_id("[CLS]"), Some(2));
    }

    const VOCAB: &str = "[PAD]\n[UNK]\n[CLS]\n[SEP]\nhello\nworld\n##s\nok\n";

    fn vocab_only_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("vocab.txt"), VOCAB).unwrap();
        dir
    }

    fn tokenizer_config(dir: &tempfile::TempDir) -> Config {
        Config {
            tokenizer: dir.path().to_string_lossy().into_owned(),
            ..Config::default()
        }
    }

    #[test]
    fn vocab_only_directory_builds_wordpiece_tokenizer() {
        let dir = vocab_only_dir();
        let tokenizer = load_tokenizer(&tokenizer_config(&dir)).unwrap();
        let encoding = tokenizer.encode("Hello worlds", true).unwrap();
        assert_eq!(encoding.get_ids(), &[2, 4, 5, 6, 3]);
        assert_eq!(tokenizer.token_to_id("[PAD]"), Some(0));
    }

    #[test]
    fn tokenizer_config_can_disable_lowercasing() {
        let dir = vocab_only_dir();
        std::fs::write(
            dir.path().join("tokenizer_config.json"),
            r#"{"do_lower_case": false, "model_max_length": 128}"#,
        )
        .unwrap();
        let tokenizer = load_tokenizer(&tokenizer_config(&dir)).unwrap();
        let encoding = tokenizer.encode("Hello world", true).unwrap();
        assert_eq!(encoding.get_ids(), &[2, 1, 5, 3]);
    }

    #[test]
    fn vocab_without_special_tokens_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("vocab.txt"), "[UNK]\nhello\n").unwrap();
        let err = load_tokenizer(&tokenizer_config(&dir)).err().unwrap();
        assert!(format!("{err:#}").contains("[SEP]"));
    }

    #[test]
    fn missing_tokenizer_files_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_tokenizer(&tokenizer_config(&dir)).err().unwrap();
        let message = format!("{err:#}");
        assert!(message.contains("tokenizer.json"));
        assert!(message.contains("vocab.txt"));
    }

    #[test]
    fn classifier_config_read_error_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let err = ClassifierConfig::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("config.json"));
    }
}
