//! Time-axis helpers shared by the backbones: padding, length masks and
//! pooling over `[batch, channels, time]` feature maps.

use burn::prelude::*;
use serde::{Deserialize, Serialize};

/// How a convolution pads the time axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Padding {
    /// All padding on the left, zeros
    Causal,
    /// Split evenly, zeros
    Zeros,
    /// Split evenly, wrapping around the sequence
    Circular,
}

impl Padding {
    /// Left and right pad for a convolution spanning `span` extra steps
    pub fn split(&self, span: usize) -> (usize, usize) {
        match self {
            Padding::Causal => (span, 0),
            Padding::Zeros | Padding::Circular => (span / 2, span - span / 2),
        }
    }
}

/// Pad `[batch, channels, time]` on the time axis
pub fn pad_time<B: Backend>(
    x: Tensor<B, 3>,
    left: usize,
    right: usize,
    padding: Padding,
) -> Tensor<B, 3> {
    if left == 0 && right == 0 {
        return x;
    }
    match padding {
        Padding::Circular => circular_pad(x, left, right),
        Padding::Causal | Padding::Zeros => zero_pad(x, left, right),
    }
}

fn zero_pad<B: Backend>(x: Tensor<B, 3>, left: usize, right: usize) -> Tensor<B, 3> {
    let [batch, channels, _] = x.dims();
    let device = x.device();

    let mut parts = Vec::with_capacity(3);
    if left > 0 {
        parts.push(Tensor::zeros([batch, channels, left], &device));
    }
    parts.push(x);
    if right > 0 {
        parts.push(Tensor::zeros([batch, channels, right], &device));
    }
    Tensor::cat(parts, 2)
}

/// Wrap-around padding; pads longer than the sequence wrap repeatedly
fn circular_pad<B: Backend>(x: Tensor<B, 3>, left: usize, right: usize) -> Tensor<B, 3> {
    let [_, _, time] = x.dims();
    let time = time as i64;
    let total = left + time as usize + right;

    let indices: Vec<i64> = (0..total as i64)
        .map(|i| (i - left as i64).rem_euclid(time))
        .collect();
    let indices = Tensor::<B, 1, Int>::from_data(TensorData::new(indices, [total]), &x.device());

    x.select(2, indices)
}

/// `[batch, time]` mask, 1.0 where the step is inside the sample's length
pub fn length_mask<B: Backend>(lengths: Tensor<B, 1, Int>, time: usize) -> Tensor<B, 2> {
    let [batch] = lengths.dims();
    let device = lengths.device();

    let positions = Tensor::<B, 1, Int>::arange(0..time as i64, &device)
        .reshape([1, time])
        .expand([batch, time]);
    let lengths = lengths.reshape([batch, 1]).expand([batch, time]);

    positions.lower(lengths).float()
}

/// Average over time; with `lengths`, only valid steps count
pub fn mean_over_time<B: Backend>(
    features: Tensor<B, 3>,
    lengths: Option<Tensor<B, 1, Int>>,
) -> Tensor<B, 2> {
    let [batch, channels, time] = features.dims();

    match lengths {
        None => features.mean_dim(2).reshape([batch, channels]),
        Some(lengths) => {
            let mask = length_mask(lengths, time)
                .reshape([batch, 1, time])
                .expand([batch, channels, time]);
            let counts = mask.clone().sum_dim(2).clamp_min(1.0);
            (features * mask).sum_dim(2).div(counts).reshape([batch, channels])
        }
    }
}

/// Select the last valid step of `[batch, time, hidden]`
pub fn last_step<B: Backend>(
    outputs: Tensor<B, 3>,
    lengths: Option<Tensor<B, 1, Int>>,
) -> Tensor<B, 2> {
    let [batch, time, hidden] = outputs.dims();

    match lengths {
        None => outputs
            .slice([0..batch, time - 1..time, 0..hidden])
            .reshape([batch, hidden]),
        Some(lengths) => {
            let index = lengths
                .sub_scalar(1)
                .clamp(0, time as i64 - 1)
                .reshape([batch, 1, 1])
                .expand([batch, 1, hidden]);
            outputs.gather(1, index).reshape([batch, hidden])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn sequence(values: &[f32]) -> Tensor<TestBackend, 3> {
        let device = Default::default();
        Tensor::<TestBackend, 3>::from_data(
            TensorData::new(values.to_vec(), [1, 1, values.len()]),
            &device,
        )
    }

    fn to_vec<const D: usize>(x: Tensor<TestBackend, D>) -> Vec<f32> {
        x.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_padding_split() {
        assert_eq!(Padding::Causal.split(4), (4, 0));
        assert_eq!(Padding::Zeros.split(4), (2, 2));
        assert_eq!(Padding::Circular.split(3), (1, 2));
    }

    #[test]
    fn test_zero_and_causal_pad() {
        let x = sequence(&[1.0, 2.0, 3.0]);
        assert_eq!(
            to_vec(pad_time(x.clone(), 1, 1, Padding::Zeros)),
            vec![0.0, 1.0, 2.0, 3.0, 0.0]
        );
        assert_eq!(
            to_vec(pad_time(x, 2, 0, Padding::Causal)),
            vec![0.0, 0.0, 1.0, 2.0, 3.0]
        );
    }

    #[test]
    fn test_circular_pad_wraps() {
        let x = sequence(&[1.0, 2.0, 3.0]);
        assert_eq!(
            to_vec(pad_time(x.clone(), 1, 1, Padding::Circular)),
            vec![3.0, 1.0, 2.0, 3.0, 1.0]
        );
        // Longer than the sequence
        assert_eq!(
            to_vec(pad_time(x, 4, 0, Padding::Circular)),
            vec![3.0, 1.0, 2.0, 3.0, 1.0, 2.0, 3.0]
        );
    }

    #[test]
    fn test_masked_mean_and_last_step() {
        let device = Default::default();
        let features = Tensor::<TestBackend, 1>::from_floats([1.0, 3.0, 5.0, 2.0, 4.0, 6.0], &device)
            .reshape([2, 1, 3]);
        let lengths = Tensor::<TestBackend, 1, Int>::from_ints([2, 3], &device);

        let pooled = mean_over_time(features.clone(), Some(lengths.clone()));
        assert_eq!(to_vec(pooled), vec![2.0, 4.0]);
        assert_eq!(to_vec(mean_over_time(features.clone(), None)), vec![3.0, 4.0]);

        let outputs = features.swap_dims(1, 2);
        assert_eq!(to_vec(last_step(outputs.clone(), Some(lengths))), vec![3.0, 6.0]);
        assert_eq!(to_vec(last_step(outputs, None)), vec![5.0, 6.0]);
    }
}
