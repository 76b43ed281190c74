//! Gate regularization losses.
//!
//! The gate network cannot learn from the hard top-density mask, so each
//! policy pulls its gate output towards a target derived from the real layer
//! output. Targets are detached; only the gate network receives gradients.

use burn::{
    nn::loss::{MseLoss, Reduction},
    tensor::{backend::Backend, Tensor},
};
use gatenet_core::{GateParams, GatePolicy};

use crate::{density::discriminate_by_density, subsample::subsample};

/// Weighted regularization loss of a gate, `None` when the weight is zero.
///
/// * `conv_output` - convolution result before normalization
/// * `activated` - layer output after normalization and activation, before masking
pub fn gate_loss<B: Backend>(
    params: &GateParams,
    gate: Tensor<B, 4>,
    conv_output: Tensor<B, 4>,
    activated: Tensor<B, 4>,
) -> Option<Tensor<B, 1>> {
    if params.weight <= 0.0 {
        return None;
    }

    let loss = match params.policy {
        GatePolicy::Naive => {
            // match the subsampled magnitude of each channel
            let target = subsample(conv_output, params.granularity, params.pool);
            MseLoss::new().forward(gate, target, Reduction::Mean)
        }
        GatePolicy::Parametric => gate.powf_scalar(2.0).sum().div_scalar(2.0),
        GatePolicy::Squeeze => {
            let summary = subsample(activated, params.granularity, params.pool);
            let target = discriminate_by_density(summary, params.density).float();
            MseLoss::new().forward(gate, target, Reduction::Mean)
        }
    };

    Some(loss.mul_scalar(params.weight))
}
