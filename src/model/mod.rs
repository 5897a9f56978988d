pub mod architecture;
pub mod checkpoint;
pub mod conv;
pub mod deformable;
pub mod loss;
pub mod receptive_field;
pub mod rnn;
pub mod sequence;

use burn::nn::Embedding;
use burn::prelude::*;
use serde::{Deserialize, Serialize};

pub use architecture::{Architecture, Backbone, BackboneSpec};

/// A model mapping a batch of sequences to class scores
pub trait SequenceClassifier<B: Backend> {
    /// `inputs` is `[batch, time, channels]`, `lengths` the true lengths.
    /// Returns logits `[batch, n_class]`.
    fn forward(&self, inputs: Tensor<B, 3>, lengths: Tensor<B, 1, Int>) -> Tensor<B, 2>;
}

/// The `models` section of the experiment configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Number of classes
    pub n_class: usize,
    /// Sequence length in fixed-length mode
    pub n_length: usize,
    /// Pad or truncate every sample to `n_length`
    pub fix_length: bool,
    /// Treat inputs as token ids and embed them
    pub use_embedding: bool,
    /// Token vocabulary size (embedding only)
    pub vocab_size: usize,
    /// Channels per time step, or embedding width
    pub dim: usize,
    pub cnn_layer: usize,
    pub cnn_hidden: usize,
    pub cnn_ks: usize,
    pub rnn_layer: usize,
    pub rnn_hidden: usize,
}

impl ModelsConfig {
    /// Values per time step in the dataset files
    pub fn data_channels(&self) -> usize {
        if self.use_embedding {
            1
        } else {
            self.dim
        }
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            n_class: 5,
            n_length: 1024,
            fix_length: true,
            use_embedding: false,
            vocab_size: 1,
            dim: 1,
            cnn_layer: 9,
            cnn_hidden: 32,
            cnn_ks: 3,
            rnn_layer: 1,
            rnn_hidden: 128,
        }
    }
}

/// Embed token ids carried in the first channel of `[batch, time, channels]`
pub(crate) fn embed_tokens<B: Backend>(embedding: &Embedding<B>, inputs: Tensor<B, 3>) -> Tensor<B, 3> {
    let [batch, time, _] = inputs.dims();
    let tokens = inputs
        .slice([0..batch, 0..time, 0..1])
        .reshape([batch, time])
        .int();
    embedding.forward(tokens)
}
