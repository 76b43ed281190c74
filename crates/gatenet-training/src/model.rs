//! Gated classification network.
//!
//! `GatedNet` chains the configured gated convolutions, then applies global
//! average pooling and a linear classifier. Every forward pass also returns
//! each layer's gate output so callers can collect regularization losses and
//! gate statistics.

use burn::{
    module::{Ignored, Module},
    nn::{
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        Linear, LinearConfig,
    },
    tensor::{backend::Backend, Tensor},
};
use gatenet_core::{NetworkConfig, Result};
use gatenet_layers::{estimate_gated_convolution, GateEstimator, GatedConv2d, GatedOutput, LayerInfo};
use serde::{Deserialize, Serialize};

/// Gated convolutions followed by a linear classifier
#[derive(Module, Debug)]
pub struct GatedNet<B: Backend> {
    layers: Vec<GatedConv2d<B>>,
    pool: AdaptiveAvgPool2d,
    classifier: Linear<B>,
    config: Ignored<NetworkConfig>,
}

/// Logits plus every layer's gate output
#[derive(Debug, Clone)]
pub struct NetOutput<B: Backend> {
    /// `[batch, num_classes]`
    pub logits: Tensor<B, 2>,
    /// One entry per gated layer, in network order
    pub reports: Vec<GatedOutput<B>>,
}

/// Cost estimate of a named layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerCost {
    pub name: String,
    #[serde(flatten)]
    pub info: LayerInfo,
}

impl<B: Backend> GatedNet<B> {
    /// Builds the network, validating the configuration first
    pub fn new(config: &NetworkConfig, device: &B::Device) -> Result<Self> {
        config.validate()?;

        let layers = config
            .layers
            .iter()
            .map(|layer| GatedConv2d::new(layer, device))
            .collect::<Result<Vec<_>>>()?;
        let features = config
            .layers
            .last()
            .map(|layer| layer.out_channels)
            .unwrap_or(config.in_channels);

        Ok(Self {
            layers,
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            classifier: LinearConfig::new(features, config.num_classes).init(device),
            config: Ignored(config.clone()),
        })
    }

    /// Network configuration
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Names of the gated layers, in network order
    pub fn layer_names(&self) -> Vec<&str> {
        self.layers.iter().map(|layer| layer.name()).collect()
    }

    /// Forward pass
    pub fn forward(&self, images: Tensor<B, 4>) -> NetOutput<B> {
        let mut x = images;
        let mut reports = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let gated = layer.forward(x);
            x = gated.output.clone();
            reports.push(gated);
        }

        let [batch_size, channels, _, _] = x.dims();
        let pooled = self.pool.forward(x).reshape([batch_size, channels]);

        NetOutput {
            logits: self.classifier.forward(pooled),
            reports,
        }
    }

    /// Copies every layer's gate statistics into `estimator`
    ///
    /// Autodiff backends record into the training window.
    pub fn record(&self, output: &NetOutput<B>, estimator: &mut GateEstimator) -> Result<()> {
        let is_training = B::ad_enabled();
        for (layer, gated) in self.layers.iter().zip(&output.reports) {
            estimator.record(&gated.report(layer.name())?, is_training);
        }
        Ok(())
    }

    /// Per-layer MAC estimates for the configured input size
    pub fn layer_infos(&self, estimator: Option<&GateEstimator>) -> Result<Vec<LayerCost>> {
        let size = self.config.image_size;
        let mut shape = (size, size);
        self.layers
            .iter()
            .map(|layer| {
                let info = estimate_gated_convolution(layer.config(), shape, estimator)?;
                shape = layer.config().output_size(shape.0, shape.1)?;
                Ok(LayerCost {
                    name: layer.name().to_string(),
                    info,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;
    use gatenet_core::{Density, Error, GateError, GateParams, GatePolicy, GatedConvConfig, Padding};
    use gatenet_layers::estimator::GATE_ACTIVE;

    type TestBackend = NdArray;

    fn network() -> NetworkConfig {
        let gate = GateParams::new(Density::new(0.5).unwrap()).with_policy(GatePolicy::Naive);
        NetworkConfig {
            in_channels: 3,
            image_size: 8,
            num_classes: 10,
            layers: vec![
                GatedConvConfig::new("conv1", 3, 8, 3, gate.clone()).with_stride(2),
                GatedConvConfig::new("conv2", 8, 16, 3, gate),
            ],
        }
    }

    #[test]
    fn test_forward_shapes() {
        let device = Default::default();
        let model = GatedNet::<TestBackend>::new(&network(), &device).unwrap();
        let images = Tensor::<TestBackend, 4>::random([2, 3, 8, 8], Distribution::Default, &device);
        let output = model.forward(images);

        assert_eq!(output.logits.dims(), [2, 10]);
        assert_eq!(output.reports.len(), 2);
        assert_eq!(output.reports[0].output.dims(), [2, 8, 4, 4]);
        assert_eq!(output.reports[1].output.dims(), [2, 16, 4, 4]);
        assert_eq!(model.layer_names(), vec!["conv1", "conv2"]);
    }

    #[test]
    fn test_broken_channel_chain_is_rejected() {
        let device = Default::default();
        let mut config = network();
        config.layers[1].in_channels = 4;
        let result = GatedNet::<TestBackend>::new(&config, &device);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_stages_shrinking_to_nothing_are_rejected() {
        let device = Default::default();
        let mut config = network();
        config.image_size = 4;
        for layer in &mut config.layers {
            layer.padding = Padding::Valid;
        }
        // 4x4 -> 1x1 after the strided stage, then nothing fits a 3x3 kernel
        let result = GatedNet::<TestBackend>::new(&config, &device);
        assert!(matches!(result, Err(Error::Gate(GateError::ParameterValue(_)))));
    }

    #[test]
    fn test_record_and_layer_infos() {
        let device = Default::default();
        let model = GatedNet::<TestBackend>::new(&network(), &device).unwrap();
        let images = Tensor::<TestBackend, 4>::random([2, 3, 8, 8], Distribution::Default, &device);
        let output = model.forward(images);

        let mut estimator = GateEstimator::new();
        model.record(&output, &mut estimator).unwrap();
        assert_eq!(estimator.get_histories(GATE_ACTIVE).len(), 2);

        let infos = model.layer_infos(Some(&estimator)).unwrap();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].name, "conv1");
        assert_eq!(infos[0].info.density, 0.5);
        assert!(infos[1].info.macs > infos[1].info.overhead);
    }
}
