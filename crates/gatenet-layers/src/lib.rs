//! Gated convolution layers.
//!
//! This crate provides:
//! - Feature map subsampling (max / L1 / L2 / average) per channel or per row
//! - The gate prediction network of each policy
//! - Top-density discrimination of gate values
//! - Gate regularization losses
//! - `GatedConv2d`, dispatching on the configured policy
//! - Gate statistics (`GateEstimator`) and MAC overhead estimation

pub mod conv;
pub mod density;
pub mod estimator;
pub mod network;
pub mod overhead;
pub mod regularizer;
pub mod subsample;

pub use conv::{GateReport, GatedConv2d, GatedOutput};
pub use density::{discriminate_by_density, mask_density};
pub use estimator::{GateEstimator, GateValue, HistoryPolicy};
pub use network::GateNetwork;
pub use overhead::{conv_macs, estimate_gated_convolution, gate_overhead, LayerInfo};
pub use regularizer::gate_loss;
pub use subsample::subsample;

/// Re-export commonly used types
pub mod prelude {
    pub use super::conv::{GateReport, GatedConv2d, GatedOutput};
    pub use super::estimator::{GateEstimator, GateValue, HistoryPolicy};
    pub use super::overhead::LayerInfo;
    pub use gatenet_core::{
        Density, GateParams, GatePolicy, GatedConvConfig, Granularity, PoolMethod,
    };
}
