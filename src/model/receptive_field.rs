use serde::{Deserialize, Serialize};

/// Convolutions per residual block
pub const CONVS_PER_BLOCK: usize = 2;

/// How dilation grows with block depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DilationGrowth {
    /// `2^i` for block `i`
    Doubling,
    /// Always 1
    Constant,
}

impl DilationGrowth {
    pub fn dilation(&self, block: usize) -> usize {
        match self {
            DilationGrowth::Doubling => 1usize << block,
            DilationGrowth::Constant => 1,
        }
    }
}

/// Receptive field of a block stack, relative to a sequence length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReceptiveField {
    pub size: usize,
    pub seq_length: usize,
    pub covers: bool,
    /// Blocks needed to span `seq_length`, `None` when no depth suffices
    pub layers_needed: Option<usize>,
}

impl ReceptiveField {
    pub fn new(kernel_size: usize, layers: usize, growth: DilationGrowth, seq_length: usize) -> Self {
        let size = receptive_field(kernel_size, layers, growth);
        Self {
            size,
            seq_length,
            covers: size >= seq_length,
            layers_needed: layers_to_cover(kernel_size, growth, seq_length),
        }
    }
}

/// Theoretical receptive field of `layers` blocks.
///
/// Each block applies [`CONVS_PER_BLOCK`] convolutions with the same
/// dilation, so doubling dilation gives `1 + 2(K-1)(2^L - 1)` and constant
/// dilation gives `1 + 2(K-1)L`.
pub fn receptive_field(kernel_size: usize, layers: usize, growth: DilationGrowth) -> usize {
    let reach = kernel_size.saturating_sub(1);
    let dilation_sum: usize = (0..layers).map(|i| growth.dilation(i)).sum();
    1 + CONVS_PER_BLOCK * reach * dilation_sum
}

/// Smallest block count whose field spans `seq_length`.
///
/// `None` when the field can never grow (kernel size 1).
pub fn layers_to_cover(kernel_size: usize, growth: DilationGrowth, seq_length: usize) -> Option<usize> {
    if seq_length <= 1 {
        return Some(0);
    }
    if kernel_size <= 1 {
        return None;
    }
    let mut layers = 0;
    while receptive_field(kernel_size, layers, growth) < seq_length {
        layers += 1;
    }
    Some(layers)
}
