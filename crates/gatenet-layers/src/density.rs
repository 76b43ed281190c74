//! Top-density discrimination.
//!
//! Marks roughly the top `density` fraction of each sample's gate values as
//! active. The decision is a hard threshold and carries no gradient; the gate
//! network is trained through the regularizer instead.

use burn::tensor::{backend::Backend, Bool, Tensor};
use gatenet_core::Density;

/// Marks the largest `ceil(n * density)` elements of every sample as active.
///
/// Elements are compared per sample across all of its gate values. The
/// threshold is the smallest of the top `num_active + 1` values and only
/// values strictly above it are kept, so ties at the threshold are dropped.
pub fn discriminate_by_density<B: Backend>(
    tensor: Tensor<B, 4>,
    density: Density,
) -> Tensor<B, 4, Bool> {
    let tensor = tensor.detach();
    let dims = tensor.dims();
    let [batch, channels, height, width] = dims;
    let num_elements = channels * height * width;
    let num_active = density.num_active(num_elements);

    if num_active >= num_elements {
        return tensor.zeros_like().equal_elem(0.0);
    }

    let flat: Tensor<B, 2> = tensor.reshape([batch, num_elements]);
    let threshold = flat.clone().topk(num_active + 1, 1).min_dim(1);
    let active = flat.greater(threshold.expand([batch, num_elements]));
    active.reshape(dims)
}

/// Fraction of active entries in a host-side mask.
pub fn mask_density(mask: &[bool]) -> f64 {
    if mask.is_empty() {
        return 0.0;
    }
    mask.iter().filter(|&&active| active).count() as f64 / mask.len() as f64
}
