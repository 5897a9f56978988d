pub mod callbacks;
pub mod trainer;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// The `training` section of the experiment configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Batch size
    pub batch_size: usize,
    /// Number of training epochs
    pub epoch: usize,
    /// Adam learning rate
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
}

fn default_learning_rate() -> f64 {
    1e-3
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            epoch: 50,
            learning_rate: default_learning_rate(),
        }
    }
}

/// Driver state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Init,
    /// Optimizer updates the parameters
    Train,
    /// Parameters are only read
    Eval,
    Done,
}

/// Scalars reported once per epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    /// Summed loss over every training sample
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub val_accuracy: f64,
    pub test_accuracy: f64,
    pub val_loss: f64,
    pub test_loss: f64,
}

impl fmt::Display for EpochMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Epoch {}: train loss {:.4}, train acc {:.4}, val acc {:.4}, test acc {:.4}",
            self.epoch, self.train_loss, self.train_accuracy, self.val_accuracy, self.test_accuracy
        )
    }
}

/// Progress of a run
#[derive(Debug, Clone)]
pub struct TrainingRecord {
    pub phase: Phase,
    /// Completed epochs
    pub epoch: usize,
    /// Optimizer steps taken
    pub global_step: usize,
    /// Best validation accuracy so far, never decreases
    pub best_val_accuracy: f64,
    pub best_epoch: Option<usize>,
    pub checkpoint_writes: usize,
    pub best_checkpoint: Option<PathBuf>,
    pub history: Vec<EpochMetrics>,
}

impl TrainingRecord {
    pub fn new() -> Self {
        Self {
            phase: Phase::Init,
            epoch: 0,
            global_step: 0,
            best_val_accuracy: f64::NEG_INFINITY,
            best_epoch: None,
            checkpoint_writes: 0,
            best_checkpoint: None,
            history: Vec::new(),
        }
    }

    /// Record an evaluated epoch; true when it strictly beats the best so far
    pub fn update_epoch(&mut self, metrics: EpochMetrics) -> bool {
        let improved = metrics.val_accuracy > self.best_val_accuracy;
        if improved {
            self.best_val_accuracy = metrics.val_accuracy;
            self.best_epoch = Some(metrics.epoch);
        }
        self.epoch = metrics.epoch + 1;
        self.history.push(metrics);
        improved
    }

    pub fn train_accuracies(&self) -> Vec<f64> {
        self.history.iter().map(|m| m.train_accuracy).collect()
    }

    pub fn val_accuracies(&self) -> Vec<f64> {
        self.history.iter().map(|m| m.val_accuracy).collect()
    }
}

impl Default for TrainingRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// Training result
#[derive(Debug, Clone)]
pub struct TrainingResult {
    /// Final record
    pub record: TrainingRecord,
    /// Training duration in seconds
    pub duration_secs: f64,
}

impl TrainingResult {
    /// Best validation accuracy, 0 when no epoch ran
    pub fn best_val_accuracy(&self) -> f64 {
        if self.record.best_epoch.is_some() {
            self.record.best_val_accuracy
        } else {
            0.0
        }
    }
}
