//! Experiment configuration: a `training` section and a `models` section.
//!
//! The built-in [`ExperimentConfig::defungi`] mapping is used unless a JSON
//! document is supplied. Loaded documents must carry every field.

use crate::model::ModelsConfig;
use crate::training::TrainingConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Problems detected before any model, log or dataset is touched
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no model named {0:?}; expected one of CDIL, DIL, TCN, CNN, Deformable, LSTM, GRU")]
    UnknownModel(String),
    #[error("invalid configuration: {field} {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("configuration parse error in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("io error reading configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Complete experiment configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub training: TrainingConfig,
    pub models: ModelsConfig,
}

impl ExperimentConfig {
    /// Built-in configuration for the DeFungi experiment
    pub fn defungi() -> Self {
        Self {
            training: TrainingConfig::default(),
            models: ModelsConfig::default(),
        }
    }

    /// Load and validate a JSON configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check every value needed for model construction and training
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.training;
        let m = &self.models;

        positive("training.batch_size", t.batch_size)?;
        if !(t.learning_rate.is_finite() && t.learning_rate > 0.0) {
            return Err(invalid("training.learning_rate", "must be a positive number"));
        }
        positive("models.n_class", m.n_class)?;
        positive("models.n_length", m.n_length)?;
        positive("models.dim", m.dim)?;
        positive("models.cnn_layer", m.cnn_layer)?;
        positive("models.cnn_hidden", m.cnn_hidden)?;
        positive("models.cnn_ks", m.cnn_ks)?;
        positive("models.rnn_layer", m.rnn_layer)?;
        positive("models.rnn_hidden", m.rnn_hidden)?;
        if m.use_embedding {
            positive("models.vocab_size", m.vocab_size)?;
        }
        if m.cnn_layer >= usize::BITS as usize - 1 {
            return Err(invalid("models.cnn_layer", "is too deep for doubling dilation"));
        }
        Ok(())
    }
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self::defungi()
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

fn positive(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(invalid(field, "must be greater than zero"));
    }
    Ok(())
}
