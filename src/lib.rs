//! # seqbench: sequence classification benchmark
//!
//! Trains one of seven sequence backbones (circular, zero-padded and causal
//! dilated convolutions, plain and deformable convolutions, LSTM and GRU) on
//! fixed train, dev and test splits, logs per-epoch accuracy and keeps the
//! checkpoint with the best validation accuracy.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use seqbench::experiment::{prepare, ExperimentOptions};
//! use seqbench::TrainBackend;
//!
//! let options = ExperimentOptions {
//!     model: "CDIL".to_string(),
//!     ..ExperimentOptions::default()
//! };
//! let run = prepare::<TrainBackend>(options).unwrap();
//! let outcome = run.execute().unwrap();
//! println!("best val acc {:.4}", outcome.result.best_val_accuracy());
//! ```

pub mod cli;
pub mod config;
pub mod data;
pub mod device;
pub mod experiment;
pub mod model;
pub mod training;
pub mod utils;

use burn::backend::Autodiff;
use burn_ndarray::NdArray;

/// Default backend type
pub type DefaultBackend = NdArray<f32>;

/// Backend used for training
pub type TrainBackend = Autodiff<DefaultBackend>;

/// Re-export commonly used types
pub use config::{ConfigError, ExperimentConfig};
pub use data::{DataError, DataSplits, SequenceDataset};
pub use model::{Architecture, Backbone, BackboneSpec, ModelsConfig};
pub use training::{TrainingConfig, TrainingResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn info() -> String {
    format!("{} v{} - sequence classification benchmark", NAME, VERSION)
}
