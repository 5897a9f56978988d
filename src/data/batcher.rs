use crate::data::{Sample, SequenceDataset};
use burn::prelude::*;
use rand::seq::SliceRandom;
use rand::Rng;

/// Index batches covering one epoch of a dataset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    batches: Vec<Vec<usize>>,
}

impl BatchPlan {
    /// Stable order, used for validation and test
    pub fn sequential(len: usize, batch_size: usize) -> Self {
        let order: Vec<usize> = (0..len).collect();
        Self::from_order(&order, batch_size)
    }

    /// Fresh random permutation, used for training
    pub fn shuffled<R: Rng + ?Sized>(len: usize, batch_size: usize, rng: &mut R) -> Self {
        let mut order: Vec<usize> = (0..len).collect();
        order.shuffle(rng);
        Self::from_order(&order, batch_size)
    }

    fn from_order(order: &[usize], batch_size: usize) -> Self {
        // The trailing short batch is kept
        let batches = order
            .chunks(batch_size.max(1))
            .map(|chunk| chunk.to_vec())
            .collect();
        Self { batches }
    }

    pub fn num_batches(&self) -> usize {
        self.batches.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &[usize]> {
        self.batches.iter().map(Vec::as_slice)
    }
}

/// Tensors for one batch
#[derive(Debug, Clone)]
pub struct SequenceBatch<B: Backend> {
    /// `[batch, time, channels]`
    pub inputs: Tensor<B, 3>,
    /// True lengths `[batch]`
    pub lengths: Tensor<B, 1, Int>,
    /// Class labels `[batch]`
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> SequenceBatch<B> {
    pub fn size(&self) -> usize {
        self.targets.dims()[0]
    }
}

/// Turns samples into padded batch tensors
#[derive(Debug, Clone, Copy)]
pub struct SequenceBatcher {
    channels: usize,
    fix_length: Option<usize>,
}

impl SequenceBatcher {
    /// Pad or truncate every sample to `length` steps
    pub fn fixed(channels: usize, length: usize) -> Self {
        Self {
            channels: channels.max(1),
            fix_length: Some(length),
        }
    }

    /// Pad to the longest sample of each batch and keep true lengths
    pub fn variable(channels: usize) -> Self {
        Self {
            channels: channels.max(1),
            fix_length: None,
        }
    }

    /// Build the batch for the given dataset indices
    pub fn batch<B: Backend>(
        &self,
        dataset: &SequenceDataset,
        indices: &[usize],
        device: &B::Device,
    ) -> SequenceBatch<B> {
        let samples: Vec<&Sample> = indices
            .iter()
            .filter_map(|&i| dataset.get(i))
            .collect();
        self.collate(&samples, device)
    }

    /// Stack samples into `[batch, time, channels]`
    pub fn collate<B: Backend>(&self, samples: &[&Sample], device: &B::Device) -> SequenceBatch<B> {
        let channels = self.channels;
        let width = match self.fix_length {
            Some(length) => length,
            None => samples
                .iter()
                .map(|s| s.steps(channels))
                .max()
                .unwrap_or(0),
        };
        let width = width.max(1);

        let mut values = vec![0.0f32; samples.len() * width * channels];
        let mut lengths = Vec::with_capacity(samples.len());
        let mut targets = Vec::with_capacity(samples.len());

        for (row, sample) in samples.iter().enumerate() {
            let steps = sample.steps(channels).min(width);
            let start = row * width * channels;
            values[start..start + steps * channels]
                .copy_from_slice(&sample.values[..steps * channels]);

            let length = match self.fix_length {
                Some(_) => width,
                None => sample.length.clamp(1, width),
            };
            lengths.push(length as i64);
            targets.push(sample.label as i64);
        }

        let batch = samples.len();
        SequenceBatch {
            inputs: Tensor::from_data(TensorData::new(values, [batch, width, channels]), device),
            lengths: Tensor::from_data(TensorData::new(lengths, [batch]), device),
            targets: Tensor::from_data(TensorData::new(targets, [batch]), device),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashSet;

    type TestBackend = NdArray<f32>;

    fn assert_complete(plan: &BatchPlan, len: usize, batch_size: usize) {
        let mut seen = HashSet::new();
        for batch in plan.iter() {
            assert!(batch.len() <= batch_size);
            for &i in batch {
                assert!(seen.insert(i), "index {i} appears twice");
            }
        }
        assert_eq!(seen.len(), len);
        assert!(seen.iter().all(|&i| i < len));
        assert_eq!(plan.num_batches(), len.div_ceil(batch_size));
    }

    #[test]
    fn test_plans_cover_every_sample_once() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for len in [0, 1, 5, 6, 7, 64, 101] {
            for batch_size in [1, 2, 3, 32] {
                assert_complete(&BatchPlan::sequential(len, batch_size), len, batch_size);
                assert_complete(&BatchPlan::shuffled(len, batch_size, &mut rng), len, batch_size);
            }
        }
    }

    #[test]
    fn test_sequential_plan_is_stable() {
        let plan = BatchPlan::sequential(5, 2);
        let batches: Vec<_> = plan.iter().collect();
        assert_eq!(batches, vec![&[0, 1][..], &[2, 3][..], &[4][..]]);
        assert_eq!(plan, BatchPlan::sequential(5, 2));
    }

    #[test]
    fn test_shuffled_plan_changes_per_epoch_and_repeats_per_seed() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let first = BatchPlan::shuffled(50, 8, &mut rng);
        let second = BatchPlan::shuffled(50, 8, &mut rng);
        assert_ne!(first, second);

        let mut again = ChaCha8Rng::seed_from_u64(3);
        assert_eq!(first, BatchPlan::shuffled(50, 8, &mut again));
    }

    #[test]
    fn test_fixed_length_pads_and_truncates() {
        let device = Default::default();
        let dataset = SequenceDataset::new(
            "train",
            vec![
                Sample::new(vec![1.0, 2.0], 2, 0),
                Sample::new(vec![1.0, 2.0, 3.0, 4.0, 5.0], 5, 1),
            ],
        );
        let batch = SequenceBatcher::fixed(1, 3).batch::<TestBackend>(&dataset, &[0, 1], &device);

        assert_eq!(batch.inputs.dims(), [2, 3, 1]);
        let values = batch.inputs.into_data().to_vec::<f32>().unwrap();
        assert_eq!(values, vec![1.0, 2.0, 0.0, 1.0, 2.0, 3.0]);
        let lengths = batch.lengths.into_data().to_vec::<i64>().unwrap();
        assert_eq!(lengths, vec![3, 3]);
    }

    #[test]
    fn test_variable_length_keeps_true_lengths() {
        let device = Default::default();
        let dataset = SequenceDataset::new(
            "dev",
            vec![
                Sample::new(vec![1.0, 1.0, 2.0, 2.0], 2, 1),
                Sample::new(vec![3.0, 3.0], 1, 0),
            ],
        );
        let batch = SequenceBatcher::variable(2).batch::<TestBackend>(&dataset, &[0, 1], &device);

        assert_eq!(batch.inputs.dims(), [2, 2, 2]);
        assert_eq!(batch.size(), 2);
        let lengths = batch.lengths.into_data().to_vec::<i64>().unwrap();
        assert_eq!(lengths, vec![2, 1]);
        let targets = batch.targets.into_data().to_vec::<i64>().unwrap();
        assert_eq!(targets, vec![1, 0]);
    }
}
