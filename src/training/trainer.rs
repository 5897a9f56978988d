use crate::data::{BatchPlan, DataSplits, SequenceBatcher, SequenceDataset};
use crate::model::checkpoint::{CheckpointManager, CheckpointMetadata};
use crate::model::loss::{metrics, SummedCrossEntropy};
use crate::model::SequenceClassifier;
use crate::training::callbacks::CallbackManager;
use crate::training::{EpochMetrics, Phase, TrainingConfig, TrainingRecord, TrainingResult};
use crate::utils::random::seeded_rng;
use anyhow::{bail, Result};
use burn::module::AutodiffModule;
use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Instant;
use tracing::{debug, info};

/// Accuracy and loss over one evaluation split
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Evaluation {
    pub loss: f64,
    pub correct: usize,
    pub samples: usize,
}

impl Evaluation {
    pub fn accuracy(&self) -> f64 {
        metrics::accuracy(self.correct, self.samples)
    }
}

/// Epoch-based training and evaluation driver
pub struct Trainer<B: AutodiffBackend> {
    config: TrainingConfig,
    device: B::Device,
    batcher: SequenceBatcher,
    /// Seeds the per-epoch shuffling
    seed: u64,
    checkpoint: Option<CheckpointManager>,
    model_name: String,
    show_progress: bool,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(config: TrainingConfig, batcher: SequenceBatcher, device: B::Device, seed: u64) -> Self {
        Self {
            config,
            device,
            batcher,
            seed,
            checkpoint: None,
            model_name: String::new(),
            show_progress: true,
        }
    }

    /// Persist the best model through `manager`
    pub fn with_checkpoint(mut self, manager: CheckpointManager, model_name: impl Into<String>) -> Self {
        self.checkpoint = Some(manager);
        self.model_name = model_name.into();
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Train for the configured number of epochs.
    ///
    /// Each epoch makes one optimizer step per training batch, then evaluates
    /// validation and test with the updated parameters. The model is saved
    /// whenever validation accuracy strictly beats every earlier epoch.
    pub fn run<M, O>(
        &mut self,
        model: M,
        mut optimizer: O,
        loss: &SummedCrossEntropy,
        data: &DataSplits,
        callbacks: &mut CallbackManager,
    ) -> Result<TrainingResult>
    where
        M: AutodiffModule<B> + SequenceClassifier<B>,
        M::InnerModule: SequenceClassifier<B::InnerBackend>,
        O: Optimizer<M, B>,
    {
        if data.train.is_empty() {
            bail!("Training split is empty");
        }
        if data.val.is_empty() {
            bail!("Validation split is empty");
        }

        info!(
            "Training for {} epochs, batch size {}, learning rate {}",
            self.config.epoch, self.config.batch_size, self.config.learning_rate
        );

        let start_time = Instant::now();
        let mut record = TrainingRecord::new();
        let mut rng = seeded_rng(self.seed);
        let num_params = model.num_params();
        let mut model = model;

        callbacks.on_train_begin(&record);

        for epoch in 0..self.config.epoch {
            callbacks.on_epoch_begin(epoch);

            record.phase = Phase::Train;
            let plan = BatchPlan::shuffled(data.train.len(), self.config.batch_size, &mut rng);
            let progress = self.progress_bar(plan.num_batches() as u64, epoch);

            let mut train = Evaluation::default();
            for (step, indices) in plan.iter().enumerate() {
                let batch = self.batcher.batch::<B>(&data.train, indices, &self.device);
                let size = batch.size();

                let logits = model.forward(batch.inputs, batch.lengths);
                let batch_loss = loss.forward(logits.clone(), batch.targets.clone());
                let loss_value = batch_loss.clone().into_scalar().elem::<f64>();
                train.correct += metrics::correct(logits, batch.targets);

                let grads = batch_loss.backward();
                let grads = GradientsParams::from_grads(grads, &model);
                model = optimizer.step(self.config.learning_rate, model, grads);

                train.loss += loss_value;
                train.samples += size;
                record.global_step += 1;
                callbacks.on_batch_end(step, loss_value);
                progress.inc(1);
            }
            progress.finish_and_clear();

            // Parameters are final for this epoch from here on
            record.phase = Phase::Eval;
            let valid = model.valid();
            let val = self.evaluate(&valid, &data.val, loss);
            let test = self.evaluate(&valid, &data.test, loss);
            debug!(
                "Epoch {} evaluated: val {}/{}, test {}/{}",
                epoch, val.correct, val.samples, test.correct, test.samples
            );

            let metrics = EpochMetrics {
                epoch,
                train_loss: train.loss,
                train_accuracy: train.accuracy(),
                val_accuracy: val.accuracy(),
                test_accuracy: test.accuracy(),
                val_loss: val.loss,
                test_loss: test.loss,
            };

            if record.update_epoch(metrics.clone()) {
                if let Some(manager) = self.checkpoint.as_mut() {
                    let metadata = CheckpointMetadata {
                        version: crate::VERSION.to_string(),
                        model: self.model_name.clone(),
                        seed: self.seed,
                        epoch,
                        val_accuracy: metrics.val_accuracy,
                        num_params,
                    };
                    let path = manager.save(&model, &metadata)?;
                    record.checkpoint_writes = manager.writes();
                    callbacks.on_checkpoint(epoch, &path);
                    record.best_checkpoint = Some(path);
                }
            }

            callbacks.on_epoch_end(&metrics, &record);
        }

        record.phase = Phase::Done;
        callbacks.on_train_end(&record);

        Ok(TrainingResult {
            record,
            duration_secs: start_time.elapsed().as_secs_f64(),
        })
    }

    /// Forward passes only, in stable order
    fn evaluate<M>(&self, model: &M, dataset: &SequenceDataset, loss: &SummedCrossEntropy) -> Evaluation
    where
        M: SequenceClassifier<B::InnerBackend>,
    {
        let mut evaluation = Evaluation::default();
        let plan = BatchPlan::sequential(dataset.len(), self.config.batch_size);

        for indices in plan.iter() {
            let batch = self
                .batcher
                .batch::<B::InnerBackend>(dataset, indices, &self.device);
            let size = batch.size();

            let logits = model.forward(batch.inputs, batch.lengths);
            evaluation.loss += loss
                .forward(logits.clone(), batch.targets.clone())
                .into_scalar()
                .elem::<f64>();
            evaluation.correct += metrics::correct(logits, batch.targets);
            evaluation.samples += size;
        }

        evaluation
    }

    fn progress_bar(&self, len: u64, epoch: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::with_template("{msg} [{bar:30}] {pos}/{len} batches") {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_message(format!("epoch {epoch}"));
        bar
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Sample, SequenceDataset};
    use crate::model::conv::{ConvBackbone, ConvBackboneConfig, ConvKind};
    use crate::training::callbacks::TrainingCallback;
    use burn::backend::{Autodiff, NdArray};
    use burn::optim::AdamConfig;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tempfile::TempDir;

    type TestBackend = Autodiff<NdArray<f32>>;

    #[derive(Default)]
    struct Seen {
        lines: Vec<String>,
        batches: usize,
        checkpoints: Vec<usize>,
    }

    struct Recorder(Rc<RefCell<Seen>>);

    impl TrainingCallback for Recorder {
        fn on_epoch_end(&mut self, metrics: &EpochMetrics, _record: &TrainingRecord) {
            self.0.borrow_mut().lines.push(metrics.to_string());
        }

        fn on_batch_end(&mut self, _batch: usize, _loss: f64) {
            self.0.borrow_mut().batches += 1;
        }

        fn on_checkpoint(&mut self, epoch: usize, _path: &std::path::Path) {
            self.0.borrow_mut().checkpoints.push(epoch);
        }
    }

    fn split(name: &str, count: usize, n_class: usize) -> SequenceDataset {
        let samples = (0..count)
            .map(|i| {
                let label = i % n_class;
                let values = (0..8).map(|t| ((t + label) % 4) as f32 / 4.0).collect();
                Sample::new(values, 8, label)
            })
            .collect();
        SequenceDataset::new(name, samples)
    }

    fn model(device: &<TestBackend as Backend>::Device) -> ConvBackbone<TestBackend> {
        ConvBackboneConfig::new(ConvKind::CircularDilated, 1, 4, 4, 1, 3).init(device)
    }

    fn trainer(epochs: usize, dir: &TempDir) -> Trainer<TestBackend> {
        let config = TrainingConfig {
            batch_size: 2,
            epoch: epochs,
            learning_rate: 1e-2,
        };
        let manager = CheckpointManager::new(dir.path().join("model").join("run")).unwrap();
        Trainer::new(config, SequenceBatcher::fixed(1, 8), Default::default(), 1)
            .with_checkpoint(manager, "CDIL")
            .with_progress(false)
    }

    #[test]
    fn test_single_epoch_scenario() {
        let dir = TempDir::new().unwrap();
        let device = Default::default();
        let data = DataSplits {
            train: split("train", 6, 4),
            val: split("dev", 2, 4),
            test: SequenceDataset::new("test", Vec::new()),
        };

        let seen = Rc::new(RefCell::new(Seen::default()));
        let mut callbacks = CallbackManager::new().with_callback(Recorder(seen.clone()));
        let model = model(&device);
        let optimizer = AdamConfig::new().init::<TestBackend, ConvBackbone<TestBackend>>();

        let result = trainer(1, &dir)
            .run(model, optimizer, &SummedCrossEntropy::new(), &data, &mut callbacks)
            .unwrap();

        let record = &result.record;
        assert_eq!(record.phase, Phase::Done);
        assert_eq!(record.global_step, 3);
        assert_eq!(record.checkpoint_writes, 1);
        assert_eq!(record.best_epoch, Some(0));
        assert!(record.best_checkpoint.as_ref().unwrap().exists());

        let seen = seen.borrow();
        assert_eq!(seen.batches, 3);
        assert_eq!(seen.checkpoints, vec![0]);
        assert_eq!(seen.lines.len(), 1);
        assert!(seen.lines[0].starts_with("Epoch 0:"));
    }

    #[test]
    fn test_best_checkpoint_tracks_maximum() {
        let dir = TempDir::new().unwrap();
        let device = Default::default();
        let data = DataSplits {
            train: split("train", 8, 2),
            val: split("dev", 4, 2),
            test: split("test", 3, 2),
        };

        let seen = Rc::new(RefCell::new(Seen::default()));
        let mut callbacks = CallbackManager::new().with_callback(Recorder(seen.clone()));
        let optimizer = AdamConfig::new().init::<TestBackend, ConvBackbone<TestBackend>>();

        let result = trainer(4, &dir)
            .run(model(&device), optimizer, &SummedCrossEntropy::new(), &data, &mut callbacks)
            .unwrap();

        let accuracies = result.record.val_accuracies();
        assert_eq!(accuracies.len(), 4);
        let max = accuracies.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(result.best_val_accuracy(), max);

        // One write per strict improvement, first maximum wins
        let mut best = f64::NEG_INFINITY;
        let mut expected = Vec::new();
        for (epoch, &acc) in accuracies.iter().enumerate() {
            if acc > best {
                best = acc;
                expected.push(epoch);
            }
        }
        assert_eq!(seen.borrow().checkpoints, expected);
        assert_eq!(result.record.checkpoint_writes, expected.len());
        assert_eq!(result.record.best_epoch, expected.last().copied());
        assert_eq!(seen.borrow().lines.len(), 4);
    }

    #[test]
    fn test_empty_training_split_fails() {
        let dir = TempDir::new().unwrap();
        let device = Default::default();
        let data = DataSplits {
            train: SequenceDataset::new("train", Vec::new()),
            val: split("dev", 2, 4),
            test: split("test", 2, 4),
        };
        let optimizer = AdamConfig::new().init::<TestBackend, ConvBackbone<TestBackend>>();

        let result = trainer(1, &dir).run(
            model(&device),
            optimizer,
            &SummedCrossEntropy::new(),
            &data,
            &mut CallbackManager::new(),
        );
        assert!(result.is_err());
    }
}
