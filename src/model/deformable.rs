use crate::model::sequence::{pad_time, Padding};
use burn::nn::conv::{Conv1d, Conv1dConfig};
use burn::nn::{Initializer, Linear, LinearConfig, PaddingConfig1d};
use burn::prelude::*;

/// 1-D convolution whose taps sample the input at learned fractional offsets
#[derive(Module, Debug)]
pub struct DeformableConv1d<B: Backend> {
    /// Predicts one offset per tap and position
    offset: Conv1d<B>,
    /// Mixes the `channels_in * kernel_size` sampled taps
    projection: Linear<B>,
    kernel_size: usize,
    dilation: usize,
}

/// Deformable convolution configuration
#[derive(Config, Debug)]
pub struct DeformableConv1dConfig {
    pub channels_in: usize,
    pub channels_out: usize,
    pub kernel_size: usize,
    #[config(default = "1")]
    pub dilation: usize,
}

impl DeformableConv1dConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DeformableConv1d<B> {
        // Zero offsets start out as a regular convolution
        let offset = Conv1dConfig::new(self.channels_in, self.kernel_size, self.kernel_size)
            .with_dilation(self.dilation)
            .with_padding(PaddingConfig1d::Valid)
            .with_initializer(Initializer::Zeros)
            .init(device);

        let projection = LinearConfig::new(self.channels_in * self.kernel_size, self.channels_out)
            .with_bias(true)
            .init(device);

        DeformableConv1d {
            offset,
            projection,
            kernel_size: self.kernel_size,
            dilation: self.dilation,
        }
    }
}

impl<B: Backend> DeformableConv1d<B> {
    /// `[batch, channels_in, time]` to `[batch, channels_out, time]`
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch, channels, time] = x.dims();
        let device = x.device();

        let span = self.dilation * (self.kernel_size - 1);
        let (left, right) = Padding::Zeros.split(span);
        let offsets = self.offset.forward(pad_time(x.clone(), left, right, Padding::Zeros));

        let base = Tensor::<B, 1, Int>::arange(0..time as i64, &device)
            .float()
            .reshape([1, time])
            .expand([batch, time]);
        let center = (self.kernel_size - 1) as f32 / 2.0;
        let last = (time - 1) as f32;

        let taps = (0..self.kernel_size)
            .map(|k| {
                let shift = (k as f32 - center) * self.dilation as f32;
                let offset = offsets
                    .clone()
                    .slice([0..batch, k..k + 1, 0..time])
                    .reshape([batch, time]);
                let position = base.clone().add_scalar(shift).add(offset);
                sample_linear(x.clone(), position, last)
            })
            .collect::<Vec<_>>();

        // [batch, channels * kernel, time] -> [batch, time, channels * kernel]
        let stacked = Tensor::cat(taps, 1).swap_dims(1, 2);
        debug_assert_eq!(stacked.dims()[2], channels * self.kernel_size);

        self.projection.forward(stacked).swap_dims(1, 2)
    }
}

/// Linear interpolation of `x` at fractional time positions `[batch, time]`.
/// Positions outside `[0, last]` read as zero.
fn sample_linear<B: Backend>(x: Tensor<B, 3>, position: Tensor<B, 2>, last: f32) -> Tensor<B, 3> {
    let [batch, channels, time] = x.dims();

    let inside = position
        .clone()
        .greater_equal_elem(0.0)
        .float()
        .mul(position.clone().lower_equal_elem(last).float());

    let position = position.clamp(0.0, last);
    // Non-negative, so truncation is floor
    let lower = position.clone().int();
    let upper = lower.clone().add_scalar(1).clamp_max(time as i64 - 1);
    let frac = position - lower.clone().float();

    let gather = |index: Tensor<B, 2, Int>| {
        x.clone()
            .gather(2, index.reshape([batch, 1, time]).expand([batch, channels, time]))
    };
    let weight = |w: Tensor<B, 2>| w.reshape([batch, 1, time]).expand([batch, channels, time]);

    let value = gather(lower) * weight(frac.clone().neg().add_scalar(1.0))
        + gather(upper) * weight(frac);

    value * weight(inside)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_output_shape() {
        let device = Default::default();
        let layer = DeformableConv1dConfig::new(2, 4, 3)
            .with_dilation(2)
            .init::<TestBackend>(&device);

        let x = Tensor::<TestBackend, 3>::ones([3, 2, 10], &device);
        assert_eq!(layer.forward(x).dims(), [3, 4, 10]);
    }

    #[test]
    fn test_integer_positions_sample_exactly() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 1>::from_floats([1.0, 2.0, 3.0, 4.0], &device)
            .reshape([1, 1, 4]);
        let position = Tensor::<TestBackend, 1>::from_floats([-1.0, 0.5, 2.0, 3.0], &device)
            .reshape([1, 4]);

        let sampled = sample_linear(x, position, 3.0)
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        assert_eq!(sampled, vec![0.0, 1.5, 3.0, 4.0]);
    }
}
