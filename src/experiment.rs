//! Experiment wiring: names, output paths and the end-to-end run.
//!
//! A run is split in two steps. [`prepare`] resolves everything that can fail
//! without touching the filesystem (model name, configuration, device) and
//! builds the backbone, so the log file can be named after its parameter
//! count. [`PreparedRun::execute`] then loads the data, trains and writes the
//! result marker.

use crate::config::ExperimentConfig;
use crate::data::{DataSplits, RecordLayout, SequenceBatcher};
use crate::device::{resolve_device, DeviceTarget, ResolvedDevice};
use crate::model::checkpoint::CheckpointManager;
use crate::model::conv::ConvBackbone;
use crate::model::loss::SummedCrossEntropy;
use crate::model::rnn::RnnBackbone;
use crate::model::{Architecture, Backbone, BackboneSpec};
use crate::training::callbacks::{CallbackManager, EpochLogger, MetricsHistory, TimerCallback};
use crate::training::trainer::Trainer;
use crate::training::TrainingResult;
use crate::utils::{ensure_dir, format_duration};
use anyhow::{Context, Result};
use burn::optim::AdamConfig;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const LOG_DIR: &str = "DeFungi_log";
pub const MODEL_DIR: &str = "DeFungi_model";
pub const RESULT_MARKER: &str = "fungi_classifier.json";
pub const RESULT_LABEL: &str = "DeFungi CDIL-CNN";

/// Options a run is started with
#[derive(Debug, Clone)]
pub struct ExperimentOptions {
    pub model: String,
    pub seed: u64,
    /// JSON configuration replacing the built-in one
    pub config: Option<PathBuf>,
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub device: String,
    pub strict_device: bool,
    pub show_progress: bool,
}

impl Default for ExperimentOptions {
    fn default() -> Self {
        Self {
            model: Architecture::Cdil.name().to_string(),
            seed: 1,
            config: None,
            data_dir: PathBuf::from("./defungi_datasets"),
            output_dir: PathBuf::from("."),
            device: DeviceTarget::Cpu.name().to_string(),
            strict_device: false,
            show_progress: true,
        }
    }
}

/// `P{params}_{MODEL}_S{seed}_L{layers}_H{hidden}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunName {
    pub num_params: usize,
    pub architecture: Architecture,
    pub seed: u64,
    pub layers: usize,
    pub hidden: usize,
}

impl RunName {
    pub fn new(spec: &BackboneSpec, num_params: usize, seed: u64) -> Self {
        Self {
            num_params,
            architecture: spec.architecture(),
            seed,
            layers: spec.layers(),
            hidden: spec.hidden_size(),
        }
    }
}

impl fmt::Display for RunName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "P{}_{}_S{}_L{}_H{}",
            self.num_params,
            self.architecture.name(),
            self.seed,
            self.layers,
            self.hidden
        )
    }
}

/// Files a run writes under the output directory
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentPaths {
    pub log_file: PathBuf,
    pub metrics_file: PathBuf,
    /// Checkpoint path without extension
    pub checkpoint_base: PathBuf,
    pub result_marker: PathBuf,
}

impl ExperimentPaths {
    pub fn new<P: AsRef<Path>>(output_dir: P, name: &RunName) -> Self {
        let output_dir = output_dir.as_ref();
        let log_dir = output_dir.join(LOG_DIR);
        Self {
            log_file: log_dir.join(format!("{name}.txt")),
            metrics_file: log_dir.join(format!("{name}.metrics.json")),
            checkpoint_base: output_dir.join(MODEL_DIR).join(name.to_string()),
            result_marker: output_dir.join(RESULT_MARKER),
        }
    }

    pub fn create_dirs(&self) -> Result<()> {
        for path in [&self.log_file, &self.checkpoint_base] {
            if let Some(parent) = path.parent() {
                ensure_dir(parent)?;
            }
        }
        Ok(())
    }
}

/// Summary written once a run completes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMarker {
    pub label: String,
    pub model: String,
    pub seed: u64,
    pub best_val_accuracy: f64,
    pub checkpoint: Option<PathBuf>,
}

pub fn write_result_marker(path: &Path, marker: &ResultMarker) -> Result<()> {
    let json = serde_json::to_string_pretty(marker)?;
    fs::write(path, json).with_context(|| format!("Failed to write result marker {path:?}"))?;
    Ok(())
}

pub fn read_result_marker(path: &Path) -> Result<ResultMarker> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read result marker {path:?}"))?;
    serde_json::from_str(&json).context("Failed to parse result marker")
}

/// A fully configured run that has not touched the filesystem yet
pub struct PreparedRun<B: AutodiffBackend> {
    options: ExperimentOptions,
    config: ExperimentConfig,
    spec: BackboneSpec,
    device: ResolvedDevice<B>,
    backbone: Backbone<B>,
    name: RunName,
    paths: ExperimentPaths,
}

/// What a completed run produced
#[derive(Debug)]
pub struct ExperimentOutcome {
    pub name: RunName,
    pub paths: ExperimentPaths,
    pub result: TrainingResult,
}

/// Resolve the model, configuration and device, seed and build the backbone.
///
/// Fails on an unknown model name before reading any configuration.
pub fn prepare<B: AutodiffBackend>(options: ExperimentOptions) -> Result<PreparedRun<B>> {
    let architecture: Architecture = options.model.parse()?;

    let config = match &options.config {
        Some(path) => ExperimentConfig::load(path)?,
        None => ExperimentConfig::defungi(),
    };
    config.validate()?;

    let target: DeviceTarget = options.device.parse()?;
    let device = resolve_device::<B>(target, options.strict_device)?;

    B::seed(options.seed);

    let spec = BackboneSpec::from_config(architecture, &config.models);
    let backbone = spec.init::<B>(&device.device);
    let name = RunName::new(&spec, backbone.num_params(), options.seed);
    let paths = ExperimentPaths::new(&options.output_dir, &name);

    Ok(PreparedRun {
        options,
        config,
        spec,
        device,
        backbone,
        name,
        paths,
    })
}

impl<B: AutodiffBackend> PreparedRun<B> {
    pub fn name(&self) -> &RunName {
        &self.name
    }

    pub fn paths(&self) -> &ExperimentPaths {
        &self.paths
    }

    pub fn num_params(&self) -> usize {
        self.name.num_params
    }

    /// Load the data, train and write the result marker
    pub fn execute(self) -> Result<ExperimentOutcome> {
        let Self {
            options,
            config,
            spec,
            device,
            backbone,
            name,
            paths,
        } = self;
        let models = &config.models;
        let architecture = spec.architecture();

        info!("Run {}", name);
        info!(
            "Model {} with {} parameters, {} layers, hidden {}",
            architecture,
            name.num_params,
            spec.layers(),
            spec.hidden_size()
        );
        if device.fell_back {
            warn!("Running on {}", device.describe());
        } else {
            info!("Device: {}", device.describe());
        }

        if let Some(field) = spec.receptive_field(models.n_length) {
            info!(
                "Receptive field {} over sequence length {}",
                field.size, field.seq_length
            );
            if !field.covers {
                match field.layers_needed {
                    Some(layers) => warn!(
                        "Receptive field does not cover the whole sequence; {} layers would",
                        layers
                    ),
                    None => warn!("Receptive field cannot cover the sequence at any depth"),
                }
            }
        }

        paths.create_dirs()?;

        let mut layout = RecordLayout::new(models.data_channels(), models.fix_length);
        if models.use_embedding {
            layout = layout.with_vocab_size(models.vocab_size);
        }
        let data = DataSplits::load(&options.data_dir, layout)
            .with_context(|| format!("Failed to load datasets from {:?}", options.data_dir))?;
        data.validate(models.n_class)?;

        let batcher = if models.fix_length {
            SequenceBatcher::fixed(models.data_channels(), models.n_length)
        } else {
            SequenceBatcher::variable(models.data_channels())
        };

        let checkpoint = CheckpointManager::new(&paths.checkpoint_base)?;
        let mut trainer = Trainer::<B>::new(
            config.training.clone(),
            batcher,
            device.device.clone(),
            options.seed,
        )
        .with_checkpoint(checkpoint, architecture.name())
        .with_progress(options.show_progress);

        let mut callbacks = CallbackManager::new()
            .with_callback(TimerCallback::new())
            .with_callback(EpochLogger)
            .with_callback(MetricsHistory::new(&paths.metrics_file));
        let loss = SummedCrossEntropy::new();

        let result = match backbone {
            Backbone::Conv(model) => {
                let optimizer = AdamConfig::new().init::<B, ConvBackbone<B>>();
                trainer.run(model, optimizer, &loss, &data, &mut callbacks)?
            }
            Backbone::Recurrent(model) => {
                let optimizer = AdamConfig::new().init::<B, RnnBackbone<B>>();
                trainer.run(model, optimizer, &loss, &data, &mut callbacks)?
            }
        };

        let marker = ResultMarker {
            label: RESULT_LABEL.to_string(),
            model: architecture.name().to_string(),
            seed: options.seed,
            best_val_accuracy: result.best_val_accuracy(),
            checkpoint: result.record.best_checkpoint.clone(),
        };
        write_result_marker(&paths.result_marker, &marker)?;

        info!(
            "Best val acc {:.4} at epoch {:?}, finished in {}",
            marker.best_val_accuracy,
            result.record.best_epoch,
            format_duration(result.duration_secs)
        );

        Ok(ExperimentOutcome {
            name,
            paths,
            result,
        })
    }
}
