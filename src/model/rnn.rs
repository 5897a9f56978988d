use crate::model::sequence::last_step;
use crate::model::{embed_tokens, SequenceClassifier};
use burn::nn::gru::{Gru, GruConfig};
use burn::nn::lstm::{Lstm, LstmConfig};
use burn::nn::{Embedding, EmbeddingConfig, Linear, LinearConfig};
use burn::prelude::*;
use serde::{Deserialize, Serialize};

/// Recurrent gate variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RnnKind {
    Lstm,
    Gru,
}

/// Recurrent backbone configuration
#[derive(Config, Debug)]
pub struct RnnBackboneConfig {
    pub kind: RnnKind,
    pub input_size: usize,
    pub n_class: usize,
    pub hidden_size: usize,
    pub layers: usize,
    #[config(default = "false")]
    pub use_embedding: bool,
    #[config(default = "0")]
    pub vocab_size: usize,
    #[config(default = "true")]
    pub fix_length: bool,
}

impl RnnBackboneConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> RnnBackbone<B> {
        let embedding = self
            .use_embedding
            .then(|| EmbeddingConfig::new(self.vocab_size, self.input_size).init(device));

        let width = |i: usize| if i == 0 { self.input_size } else { self.hidden_size };
        let (lstm, gru) = match self.kind {
            RnnKind::Lstm => {
                let layers = (0..self.layers)
                    .map(|i| LstmConfig::new(width(i), self.hidden_size, true).init(device))
                    .collect();
                (layers, Vec::new())
            }
            RnnKind::Gru => {
                let layers = (0..self.layers)
                    .map(|i| GruConfig::new(width(i), self.hidden_size, true).init(device))
                    .collect();
                (Vec::new(), layers)
            }
        };

        let classifier = LinearConfig::new(self.hidden_size, self.n_class)
            .with_bias(true)
            .init(device);

        RnnBackbone {
            embedding,
            lstm,
            gru,
            classifier,
            fix_length: self.fix_length,
        }
    }
}

/// Stacked LSTM or GRU with a linear classifier on the last valid step
#[derive(Module, Debug)]
pub struct RnnBackbone<B: Backend> {
    embedding: Option<Embedding<B>>,
    /// Populated for LSTM backbones
    lstm: Vec<Lstm<B>>,
    /// Populated for GRU backbones
    gru: Vec<Gru<B>>,
    classifier: Linear<B>,
    fix_length: bool,
}

impl<B: Backend> RnnBackbone<B> {
    /// Hidden states of the top layer, `[batch, time, hidden]`
    pub fn hidden_states(&self, inputs: Tensor<B, 3>) -> Tensor<B, 3> {
        let mut x = match &self.embedding {
            Some(embedding) => embed_tokens(embedding, inputs),
            None => inputs,
        };
        for layer in &self.lstm {
            let (output, _) = layer.forward(x, None);
            x = output;
        }
        for layer in &self.gru {
            x = layer.forward(x, None);
        }
        x
    }
}

impl<B: Backend> SequenceClassifier<B> for RnnBackbone<B> {
    fn forward(&self, inputs: Tensor<B, 3>, lengths: Tensor<B, 1, Int>) -> Tensor<B, 2> {
        let states = self.hidden_states(inputs);
        let last = if self.fix_length {
            last_step(states, None)
        } else {
            last_step(states, Some(lengths))
        };
        self.classifier.forward(last)
    }
}
