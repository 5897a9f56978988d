use crate::model::deformable::{DeformableConv1d, DeformableConv1dConfig};
use crate::model::receptive_field::{DilationGrowth, ReceptiveField};
use crate::model::sequence::{mean_over_time, pad_time, Padding};
use crate::model::{embed_tokens, SequenceClassifier};
use burn::module::Ignored;
use burn::nn::conv::{Conv1d, Conv1dConfig};
use burn::nn::{Embedding, EmbeddingConfig, Linear, LinearConfig, PaddingConfig1d};
use burn::prelude::*;
use burn::tensor::activation::relu;
use serde::{Deserialize, Serialize};

/// Convolution family variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConvKind {
    /// Causal dilated convolution (TCN)
    Causal,
    /// Dilated convolution with zero padding
    Dilated,
    /// Dilated convolution with circular padding
    CircularDilated,
    /// Fixed dilation, zero padding
    Plain,
}

impl ConvKind {
    pub fn padding(&self) -> Padding {
        match self {
            ConvKind::Causal => Padding::Causal,
            ConvKind::CircularDilated => Padding::Circular,
            ConvKind::Dilated | ConvKind::Plain => Padding::Zeros,
        }
    }

    pub fn growth(&self) -> DilationGrowth {
        match self {
            ConvKind::Plain => DilationGrowth::Constant,
            _ => DilationGrowth::Doubling,
        }
    }
}

/// Convolutional backbone configuration
#[derive(Config, Debug)]
pub struct ConvBackboneConfig {
    pub kind: ConvKind,
    /// Channels per time step, or embedding width with `use_embedding`
    pub input_size: usize,
    pub n_class: usize,
    pub hidden_size: usize,
    pub layers: usize,
    pub kernel_size: usize,
    #[config(default = "false")]
    pub deformable: bool,
    #[config(default = "false")]
    pub use_embedding: bool,
    #[config(default = "0")]
    pub vocab_size: usize,
    #[config(default = "true")]
    pub fix_length: bool,
}

impl ConvBackboneConfig {
    /// Theoretical receptive field of the stack
    pub fn receptive_field(&self, seq_length: usize) -> ReceptiveField {
        ReceptiveField::new(self.kernel_size, self.layers, self.kind.growth(), seq_length)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> ConvBackbone<B> {
        let embedding = self
            .use_embedding
            .then(|| EmbeddingConfig::new(self.vocab_size, self.input_size).init(device));

        let blocks = (0..self.layers)
            .map(|i| {
                let channels_in = if i == 0 { self.input_size } else { self.hidden_size };
                self.block(channels_in, self.kind.growth().dilation(i), device)
            })
            .collect();

        let classifier = LinearConfig::new(self.hidden_size, self.n_class)
            .with_bias(true)
            .init(device);

        ConvBackbone {
            embedding,
            blocks,
            classifier,
            fix_length: self.fix_length,
        }
    }

    fn block<B: Backend>(&self, channels_in: usize, dilation: usize, device: &B::Device) -> ConvBlock<B> {
        let residual = (channels_in != self.hidden_size)
            .then(|| Conv1dConfig::new(channels_in, self.hidden_size, 1).init(device));

        ConvBlock {
            first: self.layer(channels_in, dilation, device),
            second: self.layer(self.hidden_size, dilation, device),
            residual,
        }
    }

    fn layer<B: Backend>(&self, channels_in: usize, dilation: usize, device: &B::Device) -> ConvLayer<B> {
        let span = dilation * (self.kernel_size - 1);
        let padding = self.kind.padding();
        let (left, right) = padding.split(span);

        if self.deformable {
            let layer = DeformableConv1dConfig::new(channels_in, self.hidden_size, self.kernel_size)
                .with_dilation(dilation)
                .init(device);
            return ConvLayer::Deformable(layer);
        }

        let conv = Conv1dConfig::new(channels_in, self.hidden_size, self.kernel_size)
            .with_dilation(dilation)
            .with_padding(PaddingConfig1d::Valid)
            .init(device);
        ConvLayer::Padded(PaddedConv1d {
            conv,
            padding: Ignored(padding),
            left,
            right,
        })
    }
}

/// Convolution over an explicitly padded time axis
#[derive(Module, Debug)]
pub struct PaddedConv1d<B: Backend> {
    conv: Conv1d<B>,
    padding: Ignored<Padding>,
    left: usize,
    right: usize,
}

impl<B: Backend> PaddedConv1d<B> {
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        self.conv.forward(pad_time(x, self.left, self.right, *self.padding))
    }
}

/// One length-preserving convolution
#[derive(Module, Debug)]
pub enum ConvLayer<B: Backend> {
    Padded(PaddedConv1d<B>),
    Deformable(DeformableConv1d<B>),
}

impl<B: Backend> ConvLayer<B> {
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        match self {
            ConvLayer::Padded(layer) => layer.forward(x),
            ConvLayer::Deformable(layer) => layer.forward(x),
        }
    }

    pub fn is_deformable(&self) -> bool {
        matches!(self, ConvLayer::Deformable(_))
    }
}

/// Two convolutions sharing a dilation, with a residual connection
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    first: ConvLayer<B>,
    second: ConvLayer<B>,
    /// 1x1 projection when the channel count changes
    residual: Option<Conv1d<B>>,
}

impl<B: Backend> ConvBlock<B> {
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let out = relu(self.first.forward(x.clone()));
        let out = relu(self.second.forward(out));

        let res = match &self.residual {
            Some(projection) => projection.forward(x),
            None => x,
        };
        out + res
    }
}

/// Stack of convolution blocks with a pooled linear classifier
#[derive(Module, Debug)]
pub struct ConvBackbone<B: Backend> {
    embedding: Option<Embedding<B>>,
    blocks: Vec<ConvBlock<B>>,
    classifier: Linear<B>,
    fix_length: bool,
}

impl<B: Backend> ConvBackbone<B> {
    /// Features before pooling, `[batch, hidden, time]`
    pub fn features(&self, inputs: Tensor<B, 3>) -> Tensor<B, 3> {
        let x = match &self.embedding {
            Some(embedding) => embed_tokens(embedding, inputs),
            None => inputs,
        };
        // [batch, time, channels] -> [batch, channels, time]
        let mut x = x.swap_dims(1, 2);
        for block in &self.blocks {
            x = block.forward(x);
        }
        x
    }
}

impl<B: Backend> SequenceClassifier<B> for ConvBackbone<B> {
    fn forward(&self, inputs: Tensor<B, 3>, lengths: Tensor<B, 1, Int>) -> Tensor<B, 2> {
        let features = self.features(inputs);
        let pooled = if self.fix_length {
            mean_over_time(features, None)
        } else {
            mean_over_time(features, Some(lengths))
        };
        self.classifier.forward(pooled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn config(kind: ConvKind) -> ConvBackboneConfig {
        ConvBackboneConfig::new(kind, 1, 4, 8, 3, 3)
    }

    #[test]
    fn test_all_kinds_preserve_time_length() {
        let device = Default::default();
        for kind in [
            ConvKind::Causal,
            ConvKind::Dilated,
            ConvKind::CircularDilated,
            ConvKind::Plain,
        ] {
            let model = config(kind).init::<TestBackend>(&device);
            let inputs = Tensor::<TestBackend, 3>::ones([2, 16, 1], &device);
            assert_eq!(model.features(inputs.clone()).dims(), [2, 8, 16], "{kind:?}");

            let lengths = Tensor::<TestBackend, 1, Int>::from_ints([16, 16], &device);
            assert_eq!(model.forward(inputs, lengths).dims(), [2, 4]);
        }
    }

    #[test]
    fn test_causal_output_ignores_future_steps() {
        let device = Default::default();
        let model = config(ConvKind::Causal).init::<TestBackend>(&device);

        let base = Tensor::<TestBackend, 3>::zeros([1, 8, 1], &device);
        let changed = base
            .clone()
            .slice_assign([0..1, 7..8, 0..1], Tensor::ones([1, 1, 1], &device));

        let before = model.features(base).slice([0..1, 0..8, 0..7]);
        let after = model.features(changed).slice([0..1, 0..8, 0..7]);
        before
            .into_data()
            .assert_approx_eq(&after.into_data(), 5);
    }

    #[test]
    fn test_deformable_and_embedding_variants() {
        let device = Default::default();
        let model = config(ConvKind::Plain)
            .with_deformable(true)
            .with_use_embedding(true)
            .with_vocab_size(10)
            .with_fix_length(false)
            .init::<TestBackend>(&device);

        let tokens = Tensor::<TestBackend, 1>::from_floats([1.0, 2.0, 3.0, 9.0, 0.0, 0.0], &device)
            .reshape([2, 3, 1]);
        let lengths = Tensor::<TestBackend, 1, Int>::from_ints([3, 1], &device);
        assert_eq!(model.forward(tokens, lengths).dims(), [2, 4]);
        assert!(model.num_params() > 0);
        assert!(model
            .blocks
            .iter()
            .all(|b| b.first.is_deformable() && b.second.is_deformable()));

        let plain = config(ConvKind::Plain).init::<TestBackend>(&device);
        assert!(plain.blocks.iter().all(|b| !b.first.is_deformable()));
    }

    #[test]
    fn test_receptive_field_follows_kind() {
        assert_eq!(config(ConvKind::CircularDilated).receptive_field(16).size, 29);
        assert_eq!(config(ConvKind::Plain).receptive_field(16).size, 13);
    }
}
