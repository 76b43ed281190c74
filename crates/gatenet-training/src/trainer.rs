//! Training step with gate regularization.
//!
//! The optimized loss is the classification loss plus every gated layer's
//! weighted regularization loss. Each step also feeds the gate statistics of
//! the forward pass into the trainer's `GateEstimator`.

use std::marker::PhantomData;

use burn::{
    nn::loss::CrossEntropyLossConfig,
    optim::{GradientsParams, Optimizer},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Int, Tensor,
    },
};
use gatenet_core::Result;
use gatenet_layers::{GateEstimator, GatedOutput};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::model::GatedNet;

/// Task loss plus the sum of all gate losses
pub fn total_loss<B: Backend>(task_loss: Tensor<B, 1>, outputs: &[GatedOutput<B>]) -> Tensor<B, 1> {
    outputs
        .iter()
        .filter_map(|output| output.loss.clone())
        .fold(task_loss, |total, loss| total + loss)
}

/// Metrics of one training step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepMetrics {
    /// Total optimized loss
    pub loss: f64,
    /// Gate regularization part of `loss`
    pub gate_loss: f64,
    /// Batch top-1 accuracy
    pub accuracy: f64,
}

/// Progress of a training run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingState {
    pub step: usize,
    /// Highest top-1 accuracy seen on a single training batch
    pub best_batch_accuracy: f64,
    pub last: Option<StepMetrics>,
}

/// Runs optimization steps on a `GatedNet`
pub struct GateTrainer<B: AutodiffBackend, O> {
    optimizer: O,
    learning_rate: f64,
    estimator: GateEstimator,
    state: TrainingState,
    _backend: PhantomData<B>,
}

impl<B, O> GateTrainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<GatedNet<B>, B>,
{
    pub fn new(optimizer: O, learning_rate: f64) -> Self {
        Self {
            optimizer,
            learning_rate,
            estimator: GateEstimator::new(),
            state: TrainingState::default(),
            _backend: PhantomData,
        }
    }

    /// Gate statistics collected so far
    pub fn estimator(&self) -> &GateEstimator {
        &self.estimator
    }

    pub fn state(&self) -> &TrainingState {
        &self.state
    }

    /// One forward, backward and optimizer update
    pub fn step(
        &mut self,
        model: GatedNet<B>,
        images: Tensor<B, 4>,
        labels: Tensor<B, 1, Int>,
    ) -> Result<(GatedNet<B>, StepMetrics)> {
        let output = model.forward(images);
        model.record(&output, &mut self.estimator)?;

        let [batch_size, _] = output.logits.dims();
        let task_loss = CrossEntropyLossConfig::new()
            .init(&output.logits.device())
            .forward(output.logits.clone(), labels.clone());

        let gate_loss: f64 = output
            .reports
            .iter()
            .filter_map(|report| report.loss.clone())
            .map(|loss| loss.into_scalar().elem::<f64>())
            .sum();
        let loss = total_loss(task_loss, &output.reports);
        let loss_value: f64 = loss.clone().into_scalar().elem();
        if loss_value.is_nan() {
            warn!("Loss is NaN at step {}", self.state.step);
        }

        let correct: i64 = output
            .logits
            .argmax(1)
            .reshape([batch_size])
            .equal(labels)
            .int()
            .sum()
            .into_scalar()
            .elem();

        let grads = GradientsParams::from_grads(loss.backward(), &model);
        let model = self.optimizer.step(self.learning_rate, model, grads);

        let metrics = StepMetrics {
            loss: loss_value,
            gate_loss,
            accuracy: correct as f64 / batch_size as f64,
        };
        self.state.step += 1;
        self.state.best_batch_accuracy = self.state.best_batch_accuracy.max(metrics.accuracy);
        self.state.last = Some(metrics);

        debug!(
            "Step {}: loss={:.4}, gate_loss={:.5}, acc={:.4} | {}",
            self.state.step,
            metrics.loss,
            metrics.gate_loss,
            metrics.accuracy,
            self.estimator.format()
        );

        Ok((model, metrics))
    }
}
