use burn::prelude::*;
use burn::tensor::activation::log_softmax;

/// Cross-entropy summed over the batch
#[derive(Clone, Copy, Debug, Default)]
pub struct SummedCrossEntropy;

impl SummedCrossEntropy {
    pub fn new() -> Self {
        Self
    }

    /// Compute the loss
    ///
    /// # Arguments
    /// * `logits` - Model output logits [batch_size, num_classes]
    /// * `targets` - Target labels [batch_size]
    pub fn forward<B: Backend>(&self, logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        let [batch, _] = logits.dims();
        let log_probs = log_softmax(logits, 1);
        log_probs.gather(1, targets.reshape([batch, 1])).sum().neg()
    }
}

/// Metrics for evaluation
pub mod metrics {
    use burn::prelude::*;

    /// Number of rows whose highest-scoring class matches the target
    pub fn correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
        let [batch, _] = logits.dims();
        let predictions = logits.argmax(1).reshape([batch]);
        predictions
            .equal(targets)
            .int()
            .sum()
            .into_scalar()
            .elem::<i64>() as usize
    }

    /// Fraction correct, 0 for an empty set
    pub fn accuracy(correct: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            correct as f64 / total as f64
        }
    }
}
