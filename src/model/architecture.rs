use crate::config::ConfigError;
use crate::model::conv::{ConvBackbone, ConvBackboneConfig, ConvKind};
use crate::model::receptive_field::ReceptiveField;
use crate::model::rnn::{RnnBackbone, RnnBackboneConfig, RnnKind};
use crate::model::ModelsConfig;
use burn::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Recognized backbone architectures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Architecture {
    /// Circular dilated convolution
    Cdil,
    /// Dilated convolution, zero padding
    Dil,
    /// Temporal (causal dilated) convolution
    Tcn,
    /// Plain convolution
    Cnn,
    /// Plain convolution with deformable sampling
    Deformable,
    Lstm,
    Gru,
}

impl Architecture {
    pub const ALL: [Architecture; 7] = [
        Architecture::Cdil,
        Architecture::Dil,
        Architecture::Tcn,
        Architecture::Cnn,
        Architecture::Deformable,
        Architecture::Lstm,
        Architecture::Gru,
    ];

    /// Name as given on the command line
    pub fn name(&self) -> &'static str {
        match self {
            Architecture::Cdil => "CDIL",
            Architecture::Dil => "DIL",
            Architecture::Tcn => "TCN",
            Architecture::Cnn => "CNN",
            Architecture::Deformable => "Deformable",
            Architecture::Lstm => "LSTM",
            Architecture::Gru => "GRU",
        }
    }

    pub fn is_recurrent(&self) -> bool {
        matches!(self, Architecture::Lstm | Architecture::Gru)
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Architecture {
    type Err = ConfigError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Architecture::ALL
            .into_iter()
            .find(|a| a.name() == name)
            .ok_or_else(|| ConfigError::UnknownModel(name.to_string()))
    }
}

/// An architecture with the hyperparameters it needs
#[derive(Debug, Clone)]
pub enum BackboneSpec {
    Conv {
        architecture: Architecture,
        config: ConvBackboneConfig,
    },
    Recurrent {
        architecture: Architecture,
        config: RnnBackboneConfig,
    },
}

impl BackboneSpec {
    /// Pick the hyperparameters `architecture` uses from the `models` section
    pub fn from_config(architecture: Architecture, models: &ModelsConfig) -> Self {
        let conv = |kind: ConvKind| ConvBackboneConfig {
            kind,
            input_size: models.dim,
            n_class: models.n_class,
            hidden_size: models.cnn_hidden,
            layers: models.cnn_layer,
            kernel_size: models.cnn_ks,
            deformable: architecture == Architecture::Deformable,
            use_embedding: models.use_embedding,
            vocab_size: models.vocab_size,
            fix_length: models.fix_length,
        };
        let rnn = |kind: RnnKind| RnnBackboneConfig {
            kind,
            input_size: models.dim,
            n_class: models.n_class,
            hidden_size: models.rnn_hidden,
            layers: models.rnn_layer,
            use_embedding: models.use_embedding,
            vocab_size: models.vocab_size,
            fix_length: models.fix_length,
        };

        match architecture {
            Architecture::Cdil => Self::conv(architecture, conv(ConvKind::CircularDilated)),
            Architecture::Dil => Self::conv(architecture, conv(ConvKind::Dilated)),
            Architecture::Tcn => Self::conv(architecture, conv(ConvKind::Causal)),
            Architecture::Cnn | Architecture::Deformable => {
                Self::conv(architecture, conv(ConvKind::Plain))
            }
            Architecture::Lstm => Self::recurrent(architecture, rnn(RnnKind::Lstm)),
            Architecture::Gru => Self::recurrent(architecture, rnn(RnnKind::Gru)),
        }
    }

    fn conv(architecture: Architecture, config: ConvBackboneConfig) -> Self {
        Self::Conv {
            architecture,
            config,
        }
    }

    fn recurrent(architecture: Architecture, config: RnnBackboneConfig) -> Self {
        Self::Recurrent {
            architecture,
            config,
        }
    }

    pub fn architecture(&self) -> Architecture {
        match self {
            Self::Conv { architecture, .. } | Self::Recurrent { architecture, .. } => *architecture,
        }
    }

    /// Block or layer count
    pub fn layers(&self) -> usize {
        match self {
            Self::Conv { config, .. } => config.layers,
            Self::Recurrent { config, .. } => config.layers,
        }
    }

    /// Hidden width
    pub fn hidden_size(&self) -> usize {
        match self {
            Self::Conv { config, .. } => config.hidden_size,
            Self::Recurrent { config, .. } => config.hidden_size,
        }
    }

    /// Receptive field for convolution backbones
    pub fn receptive_field(&self, seq_length: usize) -> Option<ReceptiveField> {
        match self {
            Self::Conv { config, .. } => Some(config.receptive_field(seq_length)),
            Self::Recurrent { .. } => None,
        }
    }

    /// Build the backbone on `device`
    pub fn init<B: Backend>(&self, device: &B::Device) -> Backbone<B> {
        match self {
            Self::Conv { config, .. } => Backbone::Conv(config.init(device)),
            Self::Recurrent { config, .. } => Backbone::Recurrent(config.init(device)),
        }
    }
}

/// A constructed backbone
#[derive(Debug)]
pub enum Backbone<B: Backend> {
    Conv(ConvBackbone<B>),
    Recurrent(RnnBackbone<B>),
}

impl<B: Backend> Backbone<B> {
    /// Number of trainable parameters
    pub fn num_params(&self) -> usize {
        match self {
            Backbone::Conv(model) => model.num_params(),
            Backbone::Recurrent(model) => model.num_params(),
        }
    }
}
