//! Core types and utilities for gated convolution networks.
//!
//! This crate provides the configuration structures, error types, logging
//! setup and accuracy metrics shared by the layer, dataset and training crates.

pub mod error;
pub mod config;
pub mod metrics;
pub mod cli;

pub use error::{Error, GateError, Result};
pub use config::*;
pub use metrics::*;
pub use cli::*;

/// Re-export commonly used burn types
pub mod prelude {
    pub use burn::module::Module;
    pub use burn::tensor::{backend::Backend, Bool, Device, Int, Shape, Tensor, TensorData};
    pub use crate::error::{Error, GateError, Result};
    pub use crate::config::*;
    pub use crate::metrics::*;
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    #[test]
    fn test_prelude_config_is_gatenet_config() {
        let gate = GateParams::new(Density::new(0.5).unwrap());
        let config = Config {
            name: "net".to_string(),
            network: NetworkConfig {
                in_channels: 3,
                image_size: 8,
                num_classes: 2,
                layers: vec![GatedConvConfig::new("conv1", 3, 4, 3, gate)],
            },
            eval: EvalConfig::new("data/val"),
        };
        assert!(config.network.validate().is_ok());
        assert!(config.eval.validate().is_ok());
    }
}
