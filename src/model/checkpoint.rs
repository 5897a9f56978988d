use anyhow::{anyhow, Context, Result};
use burn::prelude::*;
use burn::record::{FileRecorder, FullPrecisionSettings, NamedMpkFileRecorder};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Recorder used for checkpoints
pub type CheckpointRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// Sidecar describing the saved model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Crate version
    pub version: String,
    /// Architecture name
    pub model: String,
    /// Run seed
    pub seed: u64,
    /// Epoch the parameters come from
    pub epoch: usize,
    /// Validation accuracy at that epoch
    pub val_accuracy: f64,
    /// Trainable parameter count
    pub num_params: usize,
}

/// Writes the best model to a single, atomically replaced checkpoint
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    /// Checkpoint path without recorder extension
    base: PathBuf,
    writes: usize,
}

impl CheckpointManager {
    /// Create a manager writing `<base>.<ext>`; creates the parent directory
    pub fn new<P: AsRef<Path>>(base: P) -> Result<Self> {
        let base = base.as_ref().to_path_buf();
        if let Some(parent) = base.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).context("Failed to create checkpoint directory")?;
        }
        Ok(Self { base, writes: 0 })
    }

    /// Final checkpoint file for backend `B`
    pub fn checkpoint_path<B: Backend>(&self) -> PathBuf {
        with_suffix(&self.base, "", <CheckpointRecorder as FileRecorder<B>>::file_extension())
    }

    /// Metadata sidecar path
    pub fn metadata_path(&self) -> PathBuf {
        with_suffix(&self.base, "", "json")
    }

    /// Completed checkpoint writes
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Persist `model`, replacing any earlier checkpoint.
    ///
    /// Parameters and metadata are written to `-partial` files first and
    /// renamed into place, so the final names only ever hold complete files.
    pub fn save<B: Backend, M: Module<B>>(
        &mut self,
        model: &M,
        metadata: &CheckpointMetadata,
    ) -> Result<PathBuf> {
        let ext = <CheckpointRecorder as FileRecorder<B>>::file_extension();
        let partial_base = with_suffix(&self.base, "-partial", "");
        let partial = with_suffix(&self.base, "-partial", ext);
        let target = self.checkpoint_path::<B>();

        model
            .clone()
            .save_file(partial_base, &CheckpointRecorder::new())
            .map_err(|e| anyhow!("Failed to save model checkpoint: {e:?}"))?;
        fs::rename(&partial, &target)
            .with_context(|| format!("Failed to move checkpoint into place at {target:?}"))?;

        let metadata_json =
            serde_json::to_string_pretty(metadata).context("Failed to serialize metadata")?;
        let partial_metadata = with_suffix(&self.base, "-partial", "json");
        fs::write(&partial_metadata, metadata_json).context("Failed to write metadata file")?;
        fs::rename(&partial_metadata, self.metadata_path())
            .context("Failed to move metadata into place")?;

        self.writes += 1;
        debug!("Checkpoint write #{} at epoch {}", self.writes, metadata.epoch);
        info!("Saved best model: {:?}", target);
        Ok(target)
    }
}

/// Load parameters into `model` from a checkpoint file
pub fn load_checkpoint<B: Backend, M: Module<B>>(
    model: M,
    checkpoint_path: &Path,
    device: &B::Device,
) -> Result<M> {
    info!("Loading checkpoint from {:?}", checkpoint_path);
    model
        .load_file(checkpoint_path.to_path_buf(), &CheckpointRecorder::new(), device)
        .map_err(|e| anyhow!("Failed to load model checkpoint {checkpoint_path:?}: {e:?}"))
}

/// Read a checkpoint's metadata sidecar
pub fn load_metadata(checkpoint_path: &Path) -> Result<CheckpointMetadata> {
    let metadata_path = checkpoint_path.with_extension("json");
    let metadata_json = fs::read_to_string(&metadata_path)
        .with_context(|| format!("Failed to read metadata file {metadata_path:?}"))?;
    serde_json::from_str(&metadata_json).context("Failed to parse metadata")
}

/// `<base><suffix>.<ext>`, without touching dots already in the file name
fn with_suffix(base: &Path, suffix: &str, ext: &str) -> PathBuf {
    let mut name = base
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    if !ext.is_empty() {
        name.push(".");
        name.push(ext);
    }
    base.with_file_name(name)
}
