//! Training and evaluation infrastructure for gated networks.
//!
//! This crate provides:
//! - `GatedNet`, a stack of gated convolutions with a linear classifier
//! - Checkpoint loading and saving
//! - A training step that adds gate regularization to the task loss
//! - The top-1 / top-5 evaluation loop

pub mod checkpoint;
pub mod evaluator;
pub mod model;
pub mod trainer;

pub use checkpoint::{Checkpoint, CheckpointHandler};
pub use evaluator::{EvaluationResult, Evaluator, Progress};
pub use model::{GatedNet, LayerCost, NetOutput};
pub use trainer::{total_loss, GateTrainer, StepMetrics, TrainingState};

/// Re-export commonly used types
pub mod prelude {
    pub use super::checkpoint::{Checkpoint, CheckpointHandler};
    pub use super::evaluator::{EvaluationResult, Evaluator, Progress};
    pub use super::model::{GatedNet, NetOutput};
    pub use super::trainer::{GateTrainer, StepMetrics};
}
