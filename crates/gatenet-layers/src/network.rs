//! Gate prediction network.
//!
//! A small convolution over the subsampled layer input that predicts one gate
//! value per channel (or per channel row). Its receptive field follows the
//! main convolution along the height axis so that vector gates line up with
//! the output rows.

use burn::{
    module::{Ignored, Module, Param},
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, Initializer, PaddingConfig2d,
    },
    tensor::{
        activation::{relu, sigmoid},
        backend::Backend,
        Tensor,
    },
};
use gatenet_core::{Activation, GatePolicy, GatedConvConfig, Granularity};

use crate::subsample::subsample;

/// Gate prediction network of one gated convolution
#[derive(Module, Debug)]
pub struct GateNetwork<B: Backend> {
    /// Squeeze bottleneck `in -> ceil(out / factor)`
    reduce: Option<Conv2d<B>>,
    /// Final projection to one value per gate
    conv: Conv2d<B>,
    norm: Option<BatchNorm<B, 2>>,
    config: Ignored<GatedConvConfig>,
}

impl<B: Backend> GateNetwork<B> {
    /// Builds the gate network for a layer
    pub fn new(config: &GatedConvConfig, device: &B::Device) -> Self {
        let gate = &config.gate;
        let out_channels = config.out_channels;

        let (reduce, conv) = match gate.policy {
            GatePolicy::Squeeze if gate.factor > 0 => {
                let mid_channels = out_channels.div_ceil(gate.factor);
                let reduce = gate_conv(config, config.in_channels, mid_channels, true, device);
                let conv = gate_conv(config, mid_channels, out_channels, false, device);
                (Some(reduce), conv)
            }
            _ => (None, gate_conv(config, config.in_channels, out_channels, true, device)),
        };

        let norm = match gate.policy {
            GatePolicy::Squeeze => None,
            _ if config.batch_norm => Some(BatchNormConfig::new(out_channels).init(device)),
            _ => None,
        };

        Self {
            reduce,
            conv,
            norm,
            config: Ignored(config.clone()),
        }
    }

    /// Predicts gate values from the layer input
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let gate = &self.config.gate;
        let x = subsample(input, gate.granularity, gate.pool);

        match gate.policy {
            GatePolicy::Squeeze => {
                let x = match &self.reduce {
                    Some(reduce) => relu(reduce.forward(x)),
                    None => x,
                };
                sigmoid(self.conv.forward(x))
            }
            GatePolicy::Naive | GatePolicy::Parametric => {
                let x = self.conv.forward(x);
                let x = match &self.norm {
                    Some(norm) => norm.forward(x),
                    None => x,
                };
                match self.config.activation {
                    Activation::Relu => relu(x),
                    Activation::None => x,
                }
            }
        }
    }

    /// Number of gate values per sample for an output of height `out_height`
    pub fn gates_per_sample(&self, out_height: usize) -> usize {
        match self.config.gate.granularity {
            Granularity::Channel => self.config.out_channels,
            Granularity::Vector => self.config.out_channels * out_height,
        }
    }

    #[cfg(test)]
    pub(crate) fn conv_weight(&self) -> Tensor<B, 4> {
        self.conv.weight.val()
    }
}

/// Gate convolution with normal(0, 0.01) weights and unit biases.
///
/// `spatial` selects the layer's kernel height, stride and padding for vector
/// granularity; otherwise (and always for channel granularity) the kernel is 1x1.
fn gate_conv<B: Backend>(
    config: &GatedConvConfig,
    in_channels: usize,
    out_channels: usize,
    spatial: bool,
    device: &B::Device,
) -> Conv2d<B> {
    let (kernel, stride, padding) = match config.gate.granularity {
        Granularity::Vector if spatial => (
            [config.kernel_size, 1],
            [config.stride, 1],
            PaddingConfig2d::Explicit(config.resolved_padding(), 0),
        ),
        _ => ([1, 1], [1, 1], PaddingConfig2d::Valid),
    };

    let mut conv = Conv2dConfig::new([in_channels, out_channels], kernel)
        .with_stride(stride)
        .with_padding(padding)
        .with_initializer(Initializer::Normal {
            mean: 0.0,
            std: 0.01,
        })
        .init(device);
    conv.bias = Some(Param::from_tensor(Tensor::ones([out_channels], device)));
    conv
}
