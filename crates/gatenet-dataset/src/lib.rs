//! Validation data for gated networks.
//!
//! This crate provides functionality for scanning a class-per-directory image
//! folder, preprocessing images into normalized CHW buffers, and feeding
//! fixed-size batches from background threads.

pub mod feeder;
pub mod loader;
pub mod preprocess;

pub use feeder::{Batch, Feeder, FeederConfig};
pub use loader::{ImageFolder, ImageSample};
pub use preprocess::{ImagePreprocessor, PreprocessConfig};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::feeder::*;
    pub use crate::loader::*;
    pub use crate::preprocess::*;
}
