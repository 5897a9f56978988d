use crate::training::{EpochMetrics, TrainingRecord};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Training callback trait
///
/// Callbacks allow custom actions to be performed at various points during training.
pub trait TrainingCallback {
    /// Called at the start of training
    fn on_train_begin(&mut self, _record: &TrainingRecord) {}

    /// Called at the end of training
    fn on_train_end(&mut self, _record: &TrainingRecord) {}

    /// Called at the start of each epoch
    fn on_epoch_begin(&mut self, _epoch: usize) {}

    /// Called once per epoch after evaluation
    fn on_epoch_end(&mut self, _metrics: &EpochMetrics, _record: &TrainingRecord) {}

    /// Called at the end of each training batch
    fn on_batch_end(&mut self, _batch: usize, _loss: f64) {}

    /// Called after a new best checkpoint is written
    fn on_checkpoint(&mut self, _epoch: usize, _path: &Path) {}
}

/// Callback manager that handles multiple callbacks
#[derive(Default)]
pub struct CallbackManager {
    callbacks: Vec<Box<dyn TrainingCallback>>,
}

impl CallbackManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a callback
    pub fn add_callback<C: TrainingCallback + 'static>(&mut self, callback: C) {
        self.callbacks.push(Box::new(callback));
    }

    pub fn with_callback<C: TrainingCallback + 'static>(mut self, callback: C) -> Self {
        self.add_callback(callback);
        self
    }

    pub fn on_train_begin(&mut self, record: &TrainingRecord) {
        for callback in &mut self.callbacks {
            callback.on_train_begin(record);
        }
    }

    pub fn on_train_end(&mut self, record: &TrainingRecord) {
        for callback in &mut self.callbacks {
            callback.on_train_end(record);
        }
    }

    pub fn on_epoch_begin(&mut self, epoch: usize) {
        for callback in &mut self.callbacks {
            callback.on_epoch_begin(epoch);
        }
    }

    pub fn on_epoch_end(&mut self, metrics: &EpochMetrics, record: &TrainingRecord) {
        for callback in &mut self.callbacks {
            callback.on_epoch_end(metrics, record);
        }
    }

    pub fn on_batch_end(&mut self, batch: usize, loss: f64) {
        for callback in &mut self.callbacks {
            callback.on_batch_end(batch, loss);
        }
    }

    pub fn on_checkpoint(&mut self, epoch: usize, path: &Path) {
        for callback in &mut self.callbacks {
            callback.on_checkpoint(epoch, path);
        }
    }
}

/// Writes one line of metrics per epoch to the log
#[derive(Debug, Default)]
pub struct EpochLogger;

impl TrainingCallback for EpochLogger {
    fn on_epoch_end(&mut self, metrics: &EpochMetrics, record: &TrainingRecord) {
        tracing::info!("{}", metrics);
        if record.best_epoch == Some(metrics.epoch) {
            tracing::info!("New best val acc {:.4}", metrics.val_accuracy);
        }
    }

    fn on_batch_end(&mut self, batch: usize, loss: f64) {
        tracing::trace!("batch {} loss {:.4}", batch, loss);
    }
}

/// Metrics logger callback that saves the epoch history to a JSON file
pub struct MetricsHistory {
    log_file: PathBuf,
    history: Vec<EpochMetrics>,
}

impl MetricsHistory {
    pub fn new<P: AsRef<Path>>(log_file: P) -> Self {
        Self {
            log_file: log_file.as_ref().to_path_buf(),
            history: Vec::new(),
        }
    }

    fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.history)?;
        std::fs::write(&self.log_file, json)?;
        Ok(())
    }
}

impl TrainingCallback for MetricsHistory {
    fn on_epoch_end(&mut self, metrics: &EpochMetrics, _record: &TrainingRecord) {
        self.history.push(metrics.clone());

        if let Err(e) = self.save() {
            tracing::warn!("Failed to save metrics: {}", e);
        }
    }
}

/// Timer callback that tracks training time
#[derive(Debug, Default)]
pub struct TimerCallback {
    start_time: Option<Instant>,
    epoch_start: Option<Instant>,
}

impl TimerCallback {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TrainingCallback for TimerCallback {
    fn on_train_begin(&mut self, _record: &TrainingRecord) {
        self.start_time = Some(Instant::now());
        tracing::info!("Training started");
    }

    fn on_epoch_begin(&mut self, _epoch: usize) {
        self.epoch_start = Some(Instant::now());
    }

    fn on_epoch_end(&mut self, metrics: &EpochMetrics, _record: &TrainingRecord) {
        if let Some(start) = self.epoch_start.take() {
            tracing::debug!("Epoch {} took {:.2?}", metrics.epoch, start.elapsed());
        }
    }

    fn on_train_end(&mut self, record: &TrainingRecord) {
        if let Some(start) = self.start_time {
            tracing::info!(
                "Training completed in {:.2?} ({} epochs)",
                start.elapsed(),
                record.epoch
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Counter(Rc<RefCell<Vec<usize>>>);

    impl TrainingCallback for Counter {
        fn on_epoch_end(&mut self, metrics: &EpochMetrics, _record: &TrainingRecord) {
            self.0.borrow_mut().push(metrics.epoch);
        }
    }

    fn metrics(epoch: usize) -> EpochMetrics {
        EpochMetrics {
            epoch,
            train_loss: 0.5,
            train_accuracy: 0.5,
            val_accuracy: 0.5,
            test_accuracy: 0.5,
            val_loss: 0.5,
            test_loss: 0.5,
        }
    }

    #[test]
    fn test_callback_manager_dispatches() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut manager = CallbackManager::new()
            .with_callback(EpochLogger)
            .with_callback(TimerCallback::new())
            .with_callback(Counter(seen.clone()));

        let record = TrainingRecord::new();
        manager.on_train_begin(&record);
        for epoch in 0..3 {
            manager.on_epoch_begin(epoch);
            manager.on_epoch_end(&metrics(epoch), &record);
        }
        manager.on_train_end(&record);

        assert_eq!(*seen.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn test_metrics_history_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("run.metrics.json");
        let mut history = MetricsHistory::new(&path);

        let record = TrainingRecord::new();
        history.on_epoch_end(&metrics(0), &record);
        history.on_epoch_end(&metrics(1), &record);

        let saved: Vec<EpochMetrics> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[1].epoch, 1);
    }
}
