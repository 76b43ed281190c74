//! Gated convolution layer.
//!
//! A `GatedConv2d` runs the main convolution and a gate network side by side.
//! The configured policy decides how gate values enter the output:
//!
//! - naive: gates only select which channels (or rows) survive
//! - parametric: gates act as the batch-norm scale of a non-affine batch norm
//! - squeeze: sigmoid gates scale the normalized output before selection
//!
//! With gating enabled, everything outside the top-density gates is zeroed.

use burn::{
    module::{Ignored, Module, Param},
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d,
    },
    tensor::{activation::relu, backend::Backend, Bool, ElementConversion, Tensor},
};
use gatenet_core::{Activation, Error, GatePolicy, GatedConvConfig, Result};
use serde::{Deserialize, Serialize};

use crate::{density::discriminate_by_density, network::GateNetwork, regularizer::gate_loss};

/// Initial value of the parametric per-channel shift
const PARAMETRIC_SHIFT_INIT: f64 = 0.1;

/// Convolution with a learned, density-enforced gate
#[derive(Module, Debug)]
pub struct GatedConv2d<B: Backend> {
    conv: Conv2d<B>,
    norm: Option<BatchNorm<B, 2>>,
    /// Trainable shift applied after the parametric gamma
    shift: Option<Param<Tensor<B, 1>>>,
    gate: GateNetwork<B>,
    config: Ignored<GatedConvConfig>,
}

/// Everything a gated convolution produces in one forward pass
#[derive(Debug, Clone)]
pub struct GatedOutput<B: Backend> {
    /// Masked layer output `[batch, out_channels, out_height, out_width]`
    pub output: Tensor<B, 4>,
    /// Predicted gate values
    pub gate: Tensor<B, 4>,
    /// Active gates, `None` when gating is disabled
    pub active: Option<Tensor<B, 4, Bool>>,
    /// Weighted regularization loss, `None` when the weight is zero
    pub loss: Option<Tensor<B, 1>>,
}

/// Host-side copy of a layer's gate statistics for one forward pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateReport {
    pub layer: String,
    pub gate: Vec<f32>,
    pub active: Option<Vec<bool>>,
    pub loss: Option<f64>,
}

impl<B: Backend> GatedConv2d<B> {
    /// Creates a gated convolution, validating the configuration first
    pub fn new(config: &GatedConvConfig, device: &B::Device) -> Result<Self> {
        config.validate()?;

        let padding = config.resolved_padding();
        let conv = Conv2dConfig::new(
            [config.in_channels, config.out_channels],
            [config.kernel_size, config.kernel_size],
        )
        .with_stride([config.stride, config.stride])
        .with_padding(PaddingConfig2d::Explicit(padding, padding))
        .with_bias(!config.batch_norm)
        .init(device);

        let parametric = config.gate.policy == GatePolicy::Parametric;
        let norm = config.batch_norm.then(|| {
            let norm = BatchNormConfig::new(config.out_channels).init(device);
            if parametric {
                non_affine(norm)
            } else {
                norm
            }
        });
        let shift = parametric.then(|| {
            Param::from_tensor(Tensor::full(
                [config.out_channels],
                PARAMETRIC_SHIFT_INIT,
                device,
            ))
        });

        Ok(Self {
            conv,
            norm,
            shift,
            gate: GateNetwork::new(config, device),
            config: Ignored(config.clone()),
        })
    }

    /// Layer configuration
    pub fn config(&self) -> &GatedConvConfig {
        &self.config
    }

    /// Layer name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Forward pass
    pub fn forward(&self, input: Tensor<B, 4>) -> GatedOutput<B> {
        let params = &self.config.gate;

        let conv_output = self.conv.forward(input.clone());
        let dims = conv_output.dims();
        let gate = self.gate.forward(input);

        let normalized = match &self.norm {
            Some(norm) => norm.forward(conv_output.clone()),
            None => conv_output.clone(),
        };
        let scaled = match params.policy {
            GatePolicy::Naive => normalized,
            GatePolicy::Squeeze => normalized * gate.clone().expand(dims),
            GatePolicy::Parametric => {
                let scaled = normalized * gate.clone().expand(dims);
                match &self.shift {
                    Some(shift) => {
                        let [_, channels, _, _] = dims;
                        scaled + shift.val().reshape([1, channels, 1, 1]).expand(dims)
                    }
                    None => scaled,
                }
            }
        };
        let activated = match self.config.activation {
            Activation::Relu => relu(scaled),
            Activation::None => scaled,
        };

        let active = params
            .enable
            .then(|| discriminate_by_density(gate.clone(), params.density));
        let output = match &active {
            Some(active) => activated.clone() * active.clone().float().expand(dims),
            None => activated.clone(),
        };

        let loss = gate_loss(params, gate.clone(), conv_output, activated);

        GatedOutput {
            output,
            gate,
            active,
            loss,
        }
    }
}

impl<B: Backend> GatedOutput<B> {
    /// Copies gate values, active mask and loss to the host
    pub fn report(&self, layer: &str) -> Result<GateReport> {
        let gate = self
            .gate
            .clone()
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| Error::Model(format!("Failed to read gate of {layer}: {e:?}")))?;

        let active = match &self.active {
            Some(active) => Some(
                active
                    .clone()
                    .into_data()
                    .to_vec::<bool>()
                    .map_err(|e| {
                        Error::Model(format!("Failed to read active gates of {layer}: {e:?}"))
                    })?,
            ),
            None => None,
        };

        let loss = self
            .loss
            .as_ref()
            .map(|loss| loss.clone().into_scalar().elem::<f64>());

        Ok(GateReport {
            layer: layer.to_string(),
            gate,
            active,
            loss,
        })
    }
}

/// Batch norm with its scale fixed at 1 and shift at 0
fn non_affine<B: Backend>(mut norm: BatchNorm<B, 2>) -> BatchNorm<B, 2> {
    norm.gamma = norm.gamma.set_require_grad(false);
    norm.beta = norm.beta.set_require_grad(false);
    norm
}
