pub mod batcher;
pub mod loader;

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

pub use batcher::{BatchPlan, SequenceBatch, SequenceBatcher};
pub use loader::{RecordLayout, SplitLoader};

/// File stems of the three dataset splits
pub const TRAIN_SPLIT: &str = "train";
pub const DEV_SPLIT: &str = "dev";
pub const TEST_SPLIT: &str = "test";

/// Errors raised while reading or checking dataset files
#[derive(Debug, Error)]
pub enum DataError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("dataset file missing: no {split} split under {dir}")]
    Missing { split: String, dir: PathBuf },
    #[error("unsupported dataset format: {path}")]
    UnsupportedFormat { path: PathBuf },
    #[error("corrupt record at {path}:{line}: {reason}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        reason: String,
    },
    #[error("label {label} of sample {index} is outside [0, {n_class})")]
    LabelOutOfRange {
        index: usize,
        label: usize,
        n_class: usize,
    },
    #[error("{split} split is empty")]
    Empty { split: String },
}

/// One labeled sequence
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Time-major values, `steps * channels` entries
    pub values: Vec<f32>,
    /// True length in time steps
    pub length: usize,
    /// Class label
    pub label: usize,
}

impl Sample {
    pub fn new(values: Vec<f32>, length: usize, label: usize) -> Self {
        Self {
            values,
            length,
            label,
        }
    }

    /// Number of stored time steps for the given channel width
    pub fn steps(&self, channels: usize) -> usize {
        self.values.len() / channels.max(1)
    }
}

/// A loaded dataset split with a fixed sample count
#[derive(Debug, Clone, Default)]
pub struct SequenceDataset {
    name: String,
    samples: Vec<Sample>,
}

impl SequenceDataset {
    pub fn new(name: impl Into<String>, samples: Vec<Sample>) -> Self {
        Self {
            name: name.into(),
            samples,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Sample> {
        self.samples.get(index)
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Check every label lies in `[0, n_class)`
    pub fn validate_labels(&self, n_class: usize) -> Result<(), DataError> {
        match self
            .samples
            .iter()
            .enumerate()
            .find(|(_, s)| s.label >= n_class)
        {
            Some((index, sample)) => Err(DataError::LabelOutOfRange {
                index,
                label: sample.label,
                n_class,
            }),
            None => Ok(()),
        }
    }

    /// Per-class sample counts
    pub fn class_counts(&self, n_class: usize) -> Vec<usize> {
        let mut counts = vec![0; n_class];
        for sample in &self.samples {
            if let Some(c) = counts.get_mut(sample.label) {
                *c += 1;
            }
        }
        counts
    }
}

/// Train, validation and test splits
#[derive(Debug, Clone)]
pub struct DataSplits {
    pub train: SequenceDataset,
    pub val: SequenceDataset,
    pub test: SequenceDataset,
}

impl DataSplits {
    /// Load `train`, `dev` and `test` from a dataset directory
    pub fn load<P: AsRef<Path>>(dir: P, layout: RecordLayout) -> Result<Self, DataError> {
        let dir = dir.as_ref();
        let loader = SplitLoader::new(layout);

        let train = loader.load_split(dir, TRAIN_SPLIT)?;
        let val = loader.load_split(dir, DEV_SPLIT)?;
        let test = loader.load_split(dir, TEST_SPLIT)?;

        let splits = Self { train, val, test };
        info!(
            "Dataset sizes: train {}, dev {}, test {} ({} samples)",
            splits.train.len(),
            splits.val.len(),
            splits.test.len(),
            splits.total_samples()
        );

        Ok(splits)
    }

    /// Check labels in every split and that training and validation have samples
    pub fn validate(&self, n_class: usize) -> Result<(), DataError> {
        for split in [&self.train, &self.val] {
            if split.is_empty() {
                return Err(DataError::Empty {
                    split: split.name().to_string(),
                });
            }
        }
        self.train.validate_labels(n_class)?;
        self.val.validate_labels(n_class)?;
        self.test.validate_labels(n_class)?;
        info!("Training class counts: {:?}", self.train.class_counts(n_class));
        Ok(())
    }

    pub fn total_samples(&self) -> usize {
        self.train.len() + self.val.len() + self.test.len()
    }
}
