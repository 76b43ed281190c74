//! Top-1 / top-5 evaluation loop.
//!
//! The loop runs `ceil(num_examples / batch_size)` batches. The last batch
//! only counts the examples left over, so every example is scored exactly
//! once even though the batch source pads the final batch by wrapping
//! around the dataset.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use burn::tensor::backend::Backend;
use gatenet_core::{in_top_k, Error, EvalConfig, Percent, Result, TopKAccuracy};
use gatenet_dataset::Batch;
use gatenet_layers::GateEstimator;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::{GatedNet, LayerCost};

/// Running state reported after every batch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub step: usize,
    pub num_iterations: usize,
    pub top1: f64,
    pub top5: f64,
    pub imgs_per_sec: f64,
}

impl Progress {
    /// Completed fraction in percent
    pub fn percentage(&self) -> f64 {
        self.step as f64 / self.num_iterations as f64 * 100.0
    }
}

/// Result of an evaluation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub top1: f64,
    pub top5: f64,
    /// Examples scored
    pub total: usize,
    /// Batches run
    pub steps: usize,
    pub aborted: bool,
    /// Output of the gate formatters
    pub gate_summary: String,
    /// Per-layer cost with the observed gate densities
    pub layers: Vec<LayerCost>,
    pub elapsed_secs: f64,
}

/// Evaluates a `GatedNet` on batches from any source
pub struct Evaluator<B: Backend> {
    model: GatedNet<B>,
    device: B::Device,
    batch_size: usize,
    progress_interval: Duration,
    estimator: GateEstimator,
    stop: Arc<AtomicBool>,
}

impl<B: Backend> Evaluator<B> {
    pub fn new(model: GatedNet<B>, device: B::Device, config: &EvalConfig) -> Self {
        Self {
            model,
            device,
            batch_size: config.batch_size,
            progress_interval: Duration::from_secs_f64(config.progress_interval_secs.max(0.0)),
            estimator: GateEstimator::new(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shares a stop flag with the batch source or a signal handler
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Gate statistics gathered while evaluating
    pub fn estimator(&self) -> &GateEstimator {
        &self.estimator
    }

    pub fn model(&self) -> &GatedNet<B> {
        &self.model
    }

    /// Scores `num_examples` examples drawn from `batches`
    pub fn evaluate<I>(
        &mut self,
        batches: I,
        num_examples: usize,
        mut on_progress: impl FnMut(&Progress),
    ) -> Result<EvaluationResult>
    where
        I: IntoIterator<Item = Result<Batch>>,
    {
        if num_examples == 0 {
            return Err(Error::Evaluation("Nothing to evaluate".to_string()));
        }
        let num_iterations = num_examples.div_ceil(self.batch_size);
        let num_final_examples = num_examples - (num_iterations - 1) * self.batch_size;

        info!("Starting evaluation...");
        let start = Instant::now();
        let mut last_log = start;
        let mut last_log_step = 0;
        let mut accuracy = TopKAccuracy::new();
        let mut step = 0;
        let mut aborted = false;
        let mut batches = batches.into_iter();

        while step < num_iterations {
            if self.stop.load(Ordering::Relaxed) {
                aborted = true;
                break;
            }
            let batch = match batches.next() {
                Some(batch) => batch?,
                None if self.stop.load(Ordering::Relaxed) => {
                    aborted = true;
                    break;
                }
                None => {
                    return Err(Error::Evaluation(format!(
                        "Batch source ran dry after {step} of {num_iterations} batches"
                    )))
                }
            };
            if batch.batch_size() != self.batch_size {
                return Err(Error::Evaluation(format!(
                    "Expected batches of {} images, got {}",
                    self.batch_size,
                    batch.batch_size()
                )));
            }

            let count = if step == num_iterations - 1 {
                num_final_examples
            } else {
                self.batch_size
            };
            let (top1_hits, top5_hits) = self.score(&batch, count)?;
            accuracy.update(top1_hits, top5_hits, count);
            step += 1;

            let now = Instant::now();
            let duration = now.duration_since(last_log);
            let progress = Progress {
                step,
                num_iterations,
                top1: accuracy.top1(),
                top5: accuracy.top5(),
                imgs_per_sec: if duration.is_zero() {
                    0.0
                } else {
                    ((step - last_log_step) * self.batch_size) as f64 / duration.as_secs_f64()
                },
            };
            on_progress(&progress);
            if duration >= self.progress_interval || step == num_iterations {
                info!(
                    "[{:.2}%] top1: {}, top5: {} ({:.1} imgs/sec)",
                    progress.percentage(),
                    Percent(progress.top1),
                    Percent(progress.top5),
                    progress.imgs_per_sec
                );
                last_log = now;
                last_log_step = step;
            }
        }

        let gate_summary = self.estimator.format();
        if aborted {
            info!("Evaluation aborted");
        } else {
            info!("Evaluation complete");
            info!(
                "\ttop1: {}, top5: {} [{} images]",
                Percent(accuracy.top1()),
                Percent(accuracy.top5()),
                accuracy.total
            );
            if !gate_summary.is_empty() {
                info!("\t{}", gate_summary);
            }
        }

        Ok(EvaluationResult {
            top1: accuracy.top1(),
            top5: accuracy.top5(),
            total: accuracy.total,
            steps: step,
            aborted,
            gate_summary,
            layers: self.model.layer_infos(Some(&self.estimator))?,
            elapsed_secs: start.elapsed().as_secs_f64(),
        })
    }

    /// Top-1 and top-5 hits among the first `count` examples of a batch
    fn score(&mut self, batch: &Batch, count: usize) -> Result<(usize, usize)> {
        let (images, _) = batch.to_tensors::<B>(&self.device);
        let output = self.model.forward(images);
        self.model.record(&output, &mut self.estimator)?;

        let [_, num_classes] = output.logits.dims();
        let logits = output
            .logits
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| Error::Evaluation(format!("Failed to read logits: {e:?}")))?;

        let mut top1_hits = 0;
        let mut top5_hits = 0;
        for (row, &label) in logits.chunks(num_classes).zip(&batch.labels).take(count) {
            top1_hits += usize::from(in_top_k(row, label, 1));
            top5_hits += usize::from(in_top_k(row, label, 5));
        }
        Ok((top1_hits, top5_hits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use gatenet_core::{Density, GateParams, GatedConvConfig, NetworkConfig};

    type TestBackend = NdArray;

    fn evaluator(batch_size: usize, num_classes: usize) -> Evaluator<TestBackend> {
        let gate = GateParams::new(Density::new(0.5).unwrap());
        let network = NetworkConfig {
            in_channels: 3,
            image_size: 4,
            num_classes,
            layers: vec![GatedConvConfig::new("conv1", 3, 4, 3, gate)],
        };
        let device = Default::default();
        let model = GatedNet::new(&network, &device).unwrap();
        let mut config = EvalConfig::new("unused");
        config.batch_size = batch_size;
        Evaluator::new(model, device, &config)
    }

    fn batch(index: usize, labels: Vec<usize>) -> Result<Batch> {
        Ok(Batch {
            index,
            images: vec![0.5; labels.len() * 3 * 4 * 4],
            len: labels.len(),
            labels,
            image_shape: [3, 4, 4],
        })
    }

    #[test]
    fn test_final_batch_counts_leftover_examples() {
        let mut evaluator = evaluator(4, 5);
        let batches = (0..3).map(|i| batch(i, vec![0, 1, 2, 3]));
        let mut steps = Vec::new();
        let result = evaluator
            .evaluate(batches, 10, |progress| steps.push(progress.step))
            .unwrap();

        assert_eq!(result.steps, 3);
        assert_eq!(result.total, 10);
        assert!(!result.aborted);
        assert_eq!(steps, vec![1, 2, 3]);
        // five classes, so every label is always in the top five
        assert_eq!(result.top5, 1.0);
    }

    #[test]
    fn test_evenly_divided_examples_keep_final_batch() {
        let mut evaluator = evaluator(4, 5);
        let batches = (0..2).map(|i| batch(i, vec![0, 1, 2, 3]));
        let result = evaluator.evaluate(batches, 8, |_| {}).unwrap();
        assert_eq!(result.steps, 2);
        assert_eq!(result.total, 8);
    }

    #[test]
    fn test_identical_inputs_score_one_class() {
        // identical images give identical logits, so exactly one label wins top-1
        let mut evaluator = evaluator(4, 10);
        let batches = std::iter::once(batch(0, vec![0, 1, 2, 3]));
        let result = evaluator.evaluate(batches, 4, |_| {}).unwrap();
        assert!(result.top1 <= 0.25);
    }

    #[test]
    fn test_stop_flag_aborts() {
        let mut evaluator = evaluator(2, 5);
        evaluator.stop_flag().store(true, Ordering::Relaxed);
        let batches = (0..5).map(|i| batch(i, vec![0, 1]));
        let result = evaluator.evaluate(batches, 10, |_| {}).unwrap();
        assert!(result.aborted);
        assert_eq!(result.steps, 0);
        assert_eq!(result.total, 0);
    }

    #[test]
    fn test_source_running_dry_is_an_error() {
        let mut evaluator = evaluator(2, 5);
        let batches = std::iter::once(batch(0, vec![0, 1]));
        let result = evaluator.evaluate(batches, 10, |_| {});
        assert!(matches!(result, Err(Error::Evaluation(_))));
    }

    #[test]
    fn test_wrong_batch_size_is_an_error() {
        let mut evaluator = evaluator(4, 5);
        let batches = std::iter::once(batch(0, vec![0, 1]));
        let result = evaluator.evaluate(batches, 4, |_| {});
        assert!(matches!(result, Err(Error::Evaluation(_))));
    }

    #[test]
    fn test_gate_statistics_are_reported() {
        let mut evaluator = evaluator(2, 5);
        let batches = (0..2).map(|i| batch(i, vec![0, 1]));
        let result = evaluator.evaluate(batches, 4, |_| {}).unwrap();
        assert!(result.gate_summary.contains("gate: 50.00%"));
        assert_eq!(result.layers.len(), 1);
        assert_eq!(result.layers[0].info.density, 0.5);
    }
}
