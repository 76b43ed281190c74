//! Multiply-accumulate estimation for gated convolutions.

use gatenet_core::{GatedConvConfig, Result};
use serde::{Deserialize, Serialize};

use crate::estimator::GateEstimator;

/// Cost summary of one layer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerInfo {
    /// Effective MACs per sample, gate overhead included
    pub macs: u64,
    /// Fraction of active gates, 1.0 when ungated
    pub density: f64,
    /// MACs spent on the gate network and gamma multiplication
    pub overhead: u64,
}

/// MACs of a dense convolution producing an `out_h x out_w` map
pub fn conv_macs(
    kernel: usize,
    in_channels: usize,
    out_channels: usize,
    out_height: usize,
    out_width: usize,
) -> u64 {
    (kernel * kernel * in_channels * out_channels * out_height * out_width) as u64
}

/// MACs added by the gate network
pub fn gate_overhead(
    in_channels: usize,
    out_channels: usize,
    out_height: usize,
    out_width: usize,
    factor: usize,
) -> u64 {
    let gate_macs = if factor == 0 {
        in_channels * out_channels
    } else {
        let mid_channels = out_channels.div_ceil(factor);
        in_channels * mid_channels + mid_channels * out_channels
    };
    // gamma multiplication
    (gate_macs + out_height * out_width * out_channels) as u64
}

/// Estimates the cost of a gated convolution on a `(height, width)` input
///
/// When gating is enabled and `estimator` holds active masks for the layer,
/// the convolution MACs are scaled by the observed density. Fails when the
/// layer produces no output for the input size.
pub fn estimate_gated_convolution(
    config: &GatedConvConfig,
    input_shape: (usize, usize),
    estimator: Option<&GateEstimator>,
) -> Result<LayerInfo> {
    let (out_height, out_width) = config.output_size(input_shape.0, input_shape.1)?;
    let mut macs = conv_macs(
        config.kernel_size,
        config.in_channels,
        config.out_channels,
        out_height,
        out_width,
    );

    let mut density = 1.0;
    if config.gate.enable {
        if let Some(observed) = estimator.and_then(|e| e.history_density(&config.name)) {
            density = observed;
            macs = (macs as f64 * density) as u64;
        }
    }

    let overhead = gate_overhead(
        config.in_channels,
        config.out_channels,
        out_height,
        out_width,
        config.gate.factor,
    );

    Ok(LayerInfo {
        macs: macs + overhead,
        density,
        overhead,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conv::GateReport;
    use gatenet_core::{Density, GateParams, GatePolicy};

    fn config(factor: usize) -> GatedConvConfig {
        let gate = GateParams::new(Density::new(0.5).unwrap())
            .with_policy(GatePolicy::Squeeze)
            .with_factor(factor);
        GatedConvConfig::new("conv1", 4, 8, 3, gate)
    }

    #[test]
    fn test_conv_macs() {
        assert_eq!(conv_macs(3, 4, 8, 16, 16), 9 * 4 * 8 * 256);
    }

    #[test]
    fn test_gate_overhead_without_bottleneck() {
        assert_eq!(gate_overhead(4, 8, 16, 16, 0), 4 * 8 + 16 * 16 * 8);
    }

    #[test]
    fn test_gate_overhead_with_bottleneck() {
        // mid = ceil(8 / 3) = 3
        assert_eq!(gate_overhead(4, 8, 2, 2, 3), 4 * 3 + 3 * 8 + 2 * 2 * 8);
    }

    #[test]
    fn test_estimate_without_history_is_dense() {
        let info = estimate_gated_convolution(&config(0), (16, 16), None).unwrap();
        let overhead = gate_overhead(4, 8, 16, 16, 0);
        assert_eq!(info.density, 1.0);
        assert_eq!(info.overhead, overhead);
        assert_eq!(info.macs, conv_macs(3, 4, 8, 16, 16) + overhead);
    }

    #[test]
    fn test_estimate_scales_by_mask_density() {
        let mut estimator = GateEstimator::new();
        estimator.record(
            &GateReport {
                layer: "conv1".to_string(),
                gate: vec![0.0; 4],
                active: Some(vec![true, false, false, false]),
                loss: None,
            },
            false,
        );
        let info = estimate_gated_convolution(&config(0), (16, 16), Some(&estimator)).unwrap();
        assert_eq!(info.density, 0.25);
        assert_eq!(
            info.macs,
            conv_macs(3, 4, 8, 16, 16) / 4 + gate_overhead(4, 8, 16, 16, 0)
        );
    }

    #[test]
    fn test_disabled_gate_ignores_history() {
        let mut estimator = GateEstimator::new();
        estimator.record(
            &GateReport {
                layer: "conv1".to_string(),
                gate: vec![0.0; 2],
                active: Some(vec![true, false]),
                loss: None,
            },
            false,
        );
        let config = {
            let mut config = config(0);
            config.gate.enable = false;
            config
        };
        let info = estimate_gated_convolution(&config, (16, 16), Some(&estimator)).unwrap();
        assert_eq!(info.density, 1.0);
    }

    #[test]
    fn test_estimate_rejects_input_smaller_than_kernel() {
        let config = config(0).with_padding(gatenet_core::Padding::Valid);
        let result = estimate_gated_convolution(&config, (2, 2), None);
        assert!(matches!(
            result,
            Err(gatenet_core::Error::Gate(gatenet_core::GateError::ParameterValue(_)))
        ));
    }
}
