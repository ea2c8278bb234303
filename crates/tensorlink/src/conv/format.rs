//! Tensor format tags and their dimension accounting.

use serde::{Deserialize, Serialize};

/// Dimension arrangements convolution arguments may arrive in.
///
/// The `VectC` and `VectW` forms pack one logical dimension into
/// fixed-width vector lanes and carry one extra trailing dimension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TensorFormat {
    Nhwc,
    Nchw,
    Hwnc,
    Hwcn,
    NchwVectC,
    NhwcVectW,
}

impl TensorFormat {
    /// Number of spatial dimensions in a `num_dims`-dimensional tensor.
    pub fn spatial_dims_count(self, num_dims: usize) -> usize {
        match self {
            TensorFormat::Nhwc | TensorFormat::Nchw | TensorFormat::Hwnc | TensorFormat::Hwcn => {
                num_dims - 2
            }
            TensorFormat::NchwVectC | TensorFormat::NhwcVectW => num_dims - 3,
        }
    }

    /// Physical index of logical spatial dimension `spatial_dim`.
    ///
    /// Panics when `spatial_dim` is out of range for the format.
    pub fn spatial_dim_index(self, num_dims: usize, spatial_dim: usize) -> usize {
        assert!(
            spatial_dim < self.spatial_dims_count(num_dims),
            "spatial dim {} out of range for {:?} with {} dims",
            spatial_dim,
            self,
            num_dims
        );
        match self {
            TensorFormat::Nhwc | TensorFormat::NhwcVectW => spatial_dim + 1,
            TensorFormat::Nchw | TensorFormat::NchwVectC => spatial_dim + 2,
            TensorFormat::Hwnc | TensorFormat::Hwcn => spatial_dim,
        }
    }

    /// Physical index of the batch dimension.
    pub fn batch_dim_index(self, num_dims: usize) -> usize {
        match self {
            TensorFormat::Nhwc
            | TensorFormat::Nchw
            | TensorFormat::NchwVectC
            | TensorFormat::NhwcVectW => 0,
            TensorFormat::Hwnc => num_dims - 2,
            TensorFormat::Hwcn => num_dims - 1,
        }
    }

    /// Physical index of the feature dimension. For the vectorized
    /// formats this names the packed-lane block, not a full channel.
    pub fn feature_dim_index(self, num_dims: usize) -> usize {
        match self {
            TensorFormat::Nhwc | TensorFormat::Hwnc => num_dims - 1,
            TensorFormat::NhwcVectW | TensorFormat::Hwcn => num_dims - 2,
            TensorFormat::Nchw | TensorFormat::NchwVectC => 1,
        }
    }
}
