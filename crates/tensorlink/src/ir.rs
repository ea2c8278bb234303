//! The op-builder boundary the convolution builders target.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::shape::Shape;

/// Operand precision requested for a convolution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Precision {
    #[default]
    Default,
    High,
    Highest,
}

/// Per-operand precision block attached to convolution ops.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecisionConfig {
    pub operand_precision: Vec<Precision>,
}

impl PrecisionConfig {
    /// The same precision for both convolution operands.
    pub fn same(precision: Precision) -> Self {
        PrecisionConfig {
            operand_precision: vec![precision; 2],
        }
    }
}

/// Padding resolution for the dynamic input-gradient op, applied against
/// the runtime extents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaddingType {
    Valid,
    Same,
}

/// Maps logical batch, feature, and spatial roles onto operand and
/// result dimensions of a general convolution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvDimensionNumbers {
    pub input_batch_dimension: usize,
    pub input_feature_dimension: usize,
    pub input_spatial_dimensions: Vec<usize>,
    pub kernel_input_feature_dimension: usize,
    pub kernel_output_feature_dimension: usize,
    pub kernel_spatial_dimensions: Vec<usize>,
    pub output_batch_dimension: usize,
    pub output_feature_dimension: usize,
    pub output_spatial_dimensions: Vec<usize>,
}

impl ConvDimensionNumbers {
    /// The batch-major arrangement used when no format permutation
    /// applies: inputs and outputs `[N, C, spatial...]`, kernels
    /// `[O, I, spatial...]`.
    pub fn default_for_rank(num_spatial_dims: usize) -> Self {
        let spatial: Vec<usize> = (2..2 + num_spatial_dims).collect();
        ConvDimensionNumbers {
            input_batch_dimension: 0,
            input_feature_dimension: 1,
            input_spatial_dimensions: spatial.clone(),
            kernel_output_feature_dimension: 0,
            kernel_input_feature_dimension: 1,
            kernel_spatial_dimensions: spatial.clone(),
            output_batch_dimension: 0,
            output_feature_dimension: 1,
            output_spatial_dimensions: spatial,
        }
    }
}

/// Full parameter set of a general dilated convolution. All per-axis
/// vectors run over the spatial dimensions only, in logical order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConvGeneralSpec {
    pub window_strides: Vec<i64>,
    /// Per-axis (before, after) padding; entries may be negative.
    pub padding: Vec<(i64, i64)>,
    pub lhs_dilation: Vec<i64>,
    pub rhs_dilation: Vec<i64>,
    pub dimension_numbers: ConvDimensionNumbers,
    pub feature_group_count: i64,
    pub batch_group_count: i64,
    pub precision: PrecisionConfig,
}

/// Graph construction surface the convolution builders drive.
///
/// Implementations append ops to their program representation and hand
/// back opaque value handles; the shape of every handle they returned
/// must stay answerable.
pub trait OpBuilder {
    type Op: Clone;

    /// Shape of a previously built op.
    fn shape_of(&self, op: &Self::Op) -> Result<Shape>;

    /// General dilated convolution of `lhs` by `rhs`.
    fn conv_general_dilated(
        &mut self,
        lhs: &Self::Op,
        rhs: &Self::Op,
        spec: &ConvGeneralSpec,
    ) -> Result<Self::Op>;

    /// Input-gradient convolution whose result extents come from the
    /// `input_sizes` operand at run time.
    fn dynamic_conv_input_grad(
        &mut self,
        input_sizes: &Self::Op,
        lhs: &Self::Op,
        rhs: &Self::Op,
        spec: &ConvGeneralSpec,
        padding_type: PaddingType,
    ) -> Result<Self::Op>;

    /// Reverses the operand along `dims`.
    fn reverse(&mut self, operand: &Self::Op, dims: &[usize]) -> Result<Self::Op>;

    fn transpose(&mut self, operand: &Self::Op, permutation: &[usize]) -> Result<Self::Op>;

    fn reshape(&mut self, operand: &Self::Op, dims: &[usize]) -> Result<Self::Op>;

    /// Broadcasts by prepending `leading_dims` to the operand's shape.
    fn broadcast(&mut self, operand: &Self::Op, leading_dims: &[usize]) -> Result<Self::Op>;

    fn add(&mut self, lhs: &Self::Op, rhs: &Self::Op) -> Result<Self::Op>;

    /// Sums the operand over `dims`, removing them from the shape.
    fn reduce_add(&mut self, operand: &Self::Op, dims: &[usize]) -> Result<Self::Op>;
}
