use crate::experiment::ExperimentOptions;
use anyhow::{Context, Result};
use clap::Parser;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// seqbench: sequence classification benchmark on DeFungi
#[derive(Parser, Debug)]
#[command(name = "seqbench")]
#[command(about = "Train a sequence classifier and keep the best checkpoint")]
#[command(version)]
pub struct Cli {
    /// Model architecture (CDIL, DIL, TCN, CNN, Deformable, LSTM, GRU)
    #[arg(long, default_value = "CDIL")]
    pub model: String,

    /// Random seed
    #[arg(long, default_value = "1")]
    pub seed: u64,

    /// JSON configuration replacing the built-in one
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory holding the train, dev and test files
    #[arg(long, default_value = "./defungi_datasets")]
    pub data_dir: PathBuf,

    /// Directory for logs, checkpoints and the result marker
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Device to use (cpu, cuda, wgpu)
    #[arg(short, long, default_value = "cpu")]
    pub device: String,

    /// Fail instead of falling back to cpu
    #[arg(long)]
    pub strict_device: bool,

    /// Hide the batch progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn options(&self) -> ExperimentOptions {
        ExperimentOptions {
            model: self.model.clone(),
            seed: self.seed,
            config: self.config.clone(),
            data_dir: self.data_dir.clone(),
            output_dir: self.output_dir.clone(),
            device: self.device.clone(),
            strict_device: self.strict_device,
            show_progress: !self.no_progress,
        }
    }
}

/// Parse CLI arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

fn filter(verbose: bool) -> EnvFilter {
    let level = if verbose { "debug" } else { "info" };
    EnvFilter::new(format!("warn,seqbench={level}"))
}

/// Log to the console and, when given, append to `log_file`
pub fn setup_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let console = fmt::layer().with_target(false);

    let file = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                crate::utils::ensure_dir(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {path:?}"))?;
            Some(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter(verbose))
        .with(console)
        .with(file)
        .try_init()
        .context("Failed to install the log subscriber")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["seqbench"]);
        assert_eq!(cli.model, "CDIL");
        assert_eq!(cli.seed, 1);
        assert_eq!(cli.data_dir, PathBuf::from("./defungi_datasets"));
        assert_eq!(cli.output_dir, PathBuf::from("."));
        assert!(!cli.verbose);

        let options = cli.options();
        assert!(options.show_progress);
        assert!(options.config.is_none());
    }

    #[test]
    fn test_cli_parse() {
        let cli = Cli::parse_from([
            "seqbench",
            "--model",
            "LSTM",
            "--seed",
            "3",
            "-o",
            "runs",
            "--device",
            "cuda",
            "--strict-device",
            "--no-progress",
            "-v",
        ]);
        assert_eq!(cli.model, "LSTM");
        assert_eq!(cli.seed, 3);
        assert!(cli.verbose);

        let options = cli.options();
        assert_eq!(options.output_dir, PathBuf::from("runs"));
        assert_eq!(options.device, "cuda");
        assert!(options.strict_device);
        assert!(!options.show_progress);
    }

    #[test]
    fn test_setup_logging_creates_log_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("logs").join("run.txt");
        setup_logging(false, Some(&path)).unwrap();
        assert!(path.exists());
    }
}
