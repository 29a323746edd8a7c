//! hatescore CLI: serve the scoring API or score stdin lines.

mod cli;

use std::io::Read;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use hatescore_core::{Config, Scorer};
use hatescore_ml::ScoringEngine;
use hatescore_server::ServerConfig;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Exit code of `score` when the model is unavailable or scoring fails.
const ENGINE_FAILURE: u8 = 2;

fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("HATESCORE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    init_tracing();

    let cli = cli::Cli::parse();
    let settings = match cli.resolve() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("hatescore: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Some(cli::Command::Score { .. }) => run_score(&settings.engine),
        Some(cli::Command::Serve(_)) | None => run_serve(&settings.engine, &settings.server),
    }
}

fn run_serve(config: &Config, server_config: &ServerConfig) -> ExitCode {
    info!(model = %config.model, "loading model");
    let engine: Arc<dyn Scorer> = Arc::new(ScoringEngine::load(config));

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            warn!(%e, "failed to build tokio runtime");
            eprintln!("runtime error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(hatescore_server::run(engine, server_config)) {
        Ok(()) => {
            info!("server shutdown cleanly");
            ExitCode::SUCCESS
        }
        Err(e) => {
            warn!(%e, "server error");
            eprintln!("server error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run_score(config: &Config) -> ExitCode {
    debug!("starting score mode");
    let mut input = String::new();
    if let Err(e) = std::io::stdin().read_to_string(&mut input) {
        eprintln!("hatescore: failed to read stdin: {e}");
        return ExitCode::FAILURE;
    }

    let lines: Vec<&str> = input
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.is_empty() {
        debug!("empty input, nothing to score");
        return ExitCode::SUCCESS;
    }

    let engine = ScoringEngine::load(config);
    if let Some(reason) = engine.load_error() {
        eprintln!("hatescore: model unavailable: {reason}");
        return ExitCode::from(ENGINE_FAILURE);
    }

    let scores = match engine.predict_batch(&lines) {
        Ok(scores) => scores,
        Err(e) => {
            eprintln!("hatescore: {e}");
            return ExitCode::from(ENGINE_FAILURE);
        }
    };

    let mut toxic = 0usize;
    for (line, score) in lines.iter().zip(&scores) {
        let label = if *score > config.threshold {
            toxic += 1;
            "toxic"
        } else {
            "clean"
        };
        println!("{label}\t{score:.4}\t{line}");
    }
    info!(lines = lines.len(), toxic, threshold = config.threshold, "scored stdin");

    if toxic > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
