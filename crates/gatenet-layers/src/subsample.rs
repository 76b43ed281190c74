//! Feature map subsampling.
//!
//! Reduces a `[batch, channels, height, width]` feature map to one summary
//! value per channel (`[batch, channels, 1, 1]`) or per channel row
//! (`[batch, channels, height, 1]`).

use burn::tensor::{backend::Backend, Tensor};
use gatenet_core::{Granularity, PoolMethod};

/// Summarises `tensor` at the given granularity. The result is detached.
pub fn subsample<B: Backend>(
    tensor: Tensor<B, 4>,
    granularity: Granularity,
    pool: PoolMethod,
) -> Tensor<B, 4> {
    let summary = match pool {
        PoolMethod::Max => reduce_max(tensor, granularity),
        PoolMethod::Avg => reduce_mean(tensor, granularity),
        PoolMethod::L1 => reduce_mean(tensor.abs(), granularity),
        PoolMethod::L2 => reduce_mean(tensor.powf_scalar(2.0), granularity),
    };
    summary.detach()
}

fn reduce_max<B: Backend>(tensor: Tensor<B, 4>, granularity: Granularity) -> Tensor<B, 4> {
    match granularity {
        Granularity::Channel => tensor.max_dim(3).max_dim(2),
        Granularity::Vector => tensor.max_dim(3),
    }
}

fn reduce_mean<B: Backend>(tensor: Tensor<B, 4>, granularity: Granularity) -> Tensor<B, 4> {
    match granularity {
        Granularity::Channel => tensor.mean_dim(3).mean_dim(2),
        Granularity::Vector => tensor.mean_dim(3),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    // [1, 2, 2, 2]: channel 0 = [[1, -4], [2, 3]], channel 1 = [[0, 0], [-2, 2]]
    fn feature_map() -> Tensor<TestBackend, 4> {
        let device = Default::default();
        Tensor::<TestBackend, 1>::from_floats([1.0, -4.0, 2.0, 3.0, 0.0, 0.0, -2.0, 2.0], &device)
            .reshape([1, 2, 2, 2])
    }

    fn values(tensor: Tensor<TestBackend, 4>) -> Vec<f32> {
        tensor.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_channel_max() {
        let out = subsample(feature_map(), Granularity::Channel, PoolMethod::Max);
        assert_eq!(out.dims(), [1, 2, 1, 1]);
        assert_eq!(values(out), vec![3.0, 2.0]);
    }

    #[test]
    fn test_channel_avg_and_l1() {
        let avg = subsample(feature_map(), Granularity::Channel, PoolMethod::Avg);
        assert_eq!(values(avg), vec![0.5, 0.0]);

        let l1 = subsample(feature_map(), Granularity::Channel, PoolMethod::L1);
        assert_eq!(values(l1), vec![2.5, 1.0]);
    }

    #[test]
    fn test_channel_l2() {
        let l2 = subsample(feature_map(), Granularity::Channel, PoolMethod::L2);
        // (1 + 16 + 4 + 9) / 4 and (0 + 0 + 4 + 4) / 4
        assert_eq!(values(l2), vec![7.5, 2.0]);
    }

    #[test]
    fn test_vector_max() {
        let out = subsample(feature_map(), Granularity::Vector, PoolMethod::Max);
        assert_eq!(out.dims(), [1, 2, 2, 1]);
        assert_eq!(values(out), vec![1.0, 3.0, 0.0, 2.0]);
    }
}
