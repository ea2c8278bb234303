//! Recording op builder with shape inference.
//!
//! Ops append to a flat list; handles index into it. Shape inference
//! validates operands the way a real device compiler would, so geometry
//! bugs surface as builder errors instead of silently wrong programs.

use serde::Serialize;

use tensorlink::error::{Error, Result};
use tensorlink::ir::{ConvGeneralSpec, OpBuilder, PaddingType};
use tensorlink::shape::Shape;

/// Handle to a recorded operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct OpId(pub usize);

/// One recorded operation with its operands and attributes.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Recorded {
    Parameter {
        shape: Shape,
    },
    ConvGeneralDilated {
        lhs: OpId,
        rhs: OpId,
        spec: ConvGeneralSpec,
    },
    DynamicConvInputGrad {
        input_sizes: OpId,
        lhs: OpId,
        rhs: OpId,
        spec: ConvGeneralSpec,
        padding_type: PaddingType,
    },
    Reverse {
        operand: OpId,
        dims: Vec<usize>,
    },
    Transpose {
        operand: OpId,
        permutation: Vec<usize>,
    },
    Reshape {
        operand: OpId,
        dims: Vec<usize>,
    },
    Broadcast {
        operand: OpId,
        leading_dims: Vec<usize>,
    },
    Add {
        lhs: OpId,
        rhs: OpId,
    },
    ReduceAdd {
        operand: OpId,
        dims: Vec<usize>,
    },
}

/// Builder that appends operations to a list and tracks result shapes.
#[derive(Debug, Default)]
pub struct RecordingBuilder {
    ops: Vec<Recorded>,
    shapes: Vec<Shape>,
}

impl RecordingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a program input of the given shape.
    pub fn parameter(&mut self, shape: Shape) -> OpId {
        self.push(Recorded::Parameter { shape: shape.clone() }, shape)
    }

    /// The recorded op behind a handle.
    pub fn recorded(&self, op: OpId) -> &Recorded {
        &self.ops[op.0]
    }

    pub fn ops(&self) -> &[Recorded] {
        &self.ops
    }

    fn push(&mut self, op: Recorded, shape: Shape) -> OpId {
        self.ops.push(op);
        self.shapes.push(shape);
        OpId(self.ops.len() - 1)
    }

    fn shape(&self, op: OpId) -> Result<&Shape> {
        self.shapes
            .get(op.0)
            .ok_or_else(|| Error::builder(format!("unknown op id {}", op.0)))
    }
}

fn infer_conv_shape(lhs: &Shape, rhs: &Shape, spec: &ConvGeneralSpec) -> Result<Shape> {
    let dnums = &spec.dimension_numbers;
    let rank = lhs.rank();
    let num_spatial = dnums.input_spatial_dimensions.len();

    let max_operand_dim = dnums
        .input_spatial_dimensions
        .iter()
        .chain(dnums.output_spatial_dimensions.iter())
        .chain([
            &dnums.input_batch_dimension,
            &dnums.input_feature_dimension,
            &dnums.output_batch_dimension,
            &dnums.output_feature_dimension,
        ])
        .copied()
        .max()
        .unwrap_or(0);
    let max_kernel_dim = dnums
        .kernel_spatial_dimensions
        .iter()
        .chain([
            &dnums.kernel_input_feature_dimension,
            &dnums.kernel_output_feature_dimension,
        ])
        .copied()
        .max()
        .unwrap_or(0);
    if max_operand_dim >= rank || max_kernel_dim >= rhs.rank() {
        return Err(Error::builder(format!(
            "dimension numbers out of range for operand ranks {} and {}",
            rank,
            rhs.rank()
        )));
    }
    if spec.window_strides.len() != num_spatial
        || spec.padding.len() != num_spatial
        || spec.lhs_dilation.len() != num_spatial
        || spec.rhs_dilation.len() != num_spatial
    {
        return Err(Error::builder(format!(
            "window attributes must cover {num_spatial} spatial dimensions"
        )));
    }

    let lhs_feature = lhs.dims()[dnums.input_feature_dimension] as i64;
    let rhs_input_feature = rhs.dims()[dnums.kernel_input_feature_dimension] as i64;
    if spec.feature_group_count <= 0
        || lhs_feature % spec.feature_group_count != 0
        || lhs_feature / spec.feature_group_count != rhs_input_feature
    {
        return Err(Error::builder(format!(
            "feature dimensions inconsistent: lhs {lhs_feature}, kernel {rhs_input_feature}, \
             feature groups {}",
            spec.feature_group_count
        )));
    }
    let lhs_batch = lhs.dims()[dnums.input_batch_dimension] as i64;
    let out_feature = rhs.dims()[dnums.kernel_output_feature_dimension] as i64;
    if spec.batch_group_count <= 0
        || lhs_batch % spec.batch_group_count != 0
        || out_feature % spec.batch_group_count != 0
    {
        return Err(Error::builder(format!(
            "batch {lhs_batch} and output features {out_feature} must divide by batch groups {}",
            spec.batch_group_count
        )));
    }

    let mut out_dims = vec![0usize; rank];
    out_dims[dnums.output_batch_dimension] = (lhs_batch / spec.batch_group_count) as usize;
    out_dims[dnums.output_feature_dimension] = out_feature as usize;
    for i in 0..num_spatial {
        let in_size = lhs.dims()[dnums.input_spatial_dimensions[i]] as i64;
        let kernel_size = rhs.dims()[dnums.kernel_spatial_dimensions[i]] as i64;
        let (pad_before, pad_after) = spec.padding[i];
        let stride = spec.window_strides[i];
        if stride < 1 {
            return Err(Error::builder(format!(
                "window stride for spatial dimension {i} must be at least 1, got {stride}"
            )));
        }
        let dilated_in = if in_size == 0 {
            0
        } else {
            (in_size - 1) * spec.lhs_dilation[i] + 1
        };
        let effective_kernel = (kernel_size - 1) * spec.rhs_dilation[i] + 1;
        let padded = dilated_in + pad_before + pad_after;
        if padded < effective_kernel {
            return Err(Error::builder(format!(
                "window of size {effective_kernel} does not fit padded input of size {padded} \
                 in spatial dimension {i}"
            )));
        }
        out_dims[dnums.output_spatial_dimensions[i]] =
            ((padded - effective_kernel) / stride + 1) as usize;
    }
    Ok(Shape::with_descending_layout(lhs.element_type(), &out_dims))
}

fn check_permutation(permutation: &[usize], rank: usize) -> Result<()> {
    let mut seen = vec![false; rank];
    if permutation.len() != rank {
        return Err(Error::builder(format!(
            "permutation {permutation:?} does not cover rank {rank}"
        )));
    }
    for &dim in permutation {
        if dim >= rank || seen[dim] {
            return Err(Error::builder(format!(
                "permutation {permutation:?} is not a permutation of 0..{rank}"
            )));
        }
        seen[dim] = true;
    }
    Ok(())
}

impl OpBuilder for RecordingBuilder {
    type Op = OpId;

    fn shape_of(&self, op: &OpId) -> Result<Shape> {
        self.shape(*op).cloned()
    }

    fn conv_general_dilated(&mut self, lhs: &OpId, rhs: &OpId, spec: &ConvGeneralSpec) -> Result<OpId> {
        let shape = infer_conv_shape(self.shape(*lhs)?, self.shape(*rhs)?, spec)?;
        Ok(self.push(
            Recorded::ConvGeneralDilated {
                lhs: *lhs,
                rhs: *rhs,
                spec: spec.clone(),
            },
            shape,
        ))
    }

    fn dynamic_conv_input_grad(
        &mut self,
        input_sizes: &OpId,
        lhs: &OpId,
        rhs: &OpId,
        spec: &ConvGeneralSpec,
        padding_type: PaddingType,
    ) -> Result<OpId> {
        let sizes_shape = self.shape(*input_sizes)?;
        if sizes_shape.rank() != 1 {
            return Err(Error::builder(format!(
                "input_sizes must be rank 1, got {:?}",
                sizes_shape.dims()
            )));
        }
        let shape = infer_conv_shape(self.shape(*lhs)?, self.shape(*rhs)?, spec)?;
        Ok(self.push(
            Recorded::DynamicConvInputGrad {
                input_sizes: *input_sizes,
                lhs: *lhs,
                rhs: *rhs,
                spec: spec.clone(),
                padding_type,
            },
            shape,
        ))
    }

    fn reverse(&mut self, operand: &OpId, dims: &[usize]) -> Result<OpId> {
        let shape = self.shape(*operand)?.clone();
        for &dim in dims {
            if dim >= shape.rank() {
                return Err(Error::builder(format!(
                    "reverse dimension {dim} out of range for rank {}",
                    shape.rank()
                )));
            }
        }
        Ok(self.push(
            Recorded::Reverse {
                operand: *operand,
                dims: dims.to_vec(),
            },
            shape,
        ))
    }

    fn transpose(&mut self, operand: &OpId, permutation: &[usize]) -> Result<OpId> {
        let shape = self.shape(*operand)?;
        check_permutation(permutation, shape.rank())?;
        let dims: Vec<usize> = permutation.iter().map(|&dim| shape.dims()[dim]).collect();
        let out = Shape::with_descending_layout(shape.element_type(), &dims);
        Ok(self.push(
            Recorded::Transpose {
                operand: *operand,
                permutation: permutation.to_vec(),
            },
            out,
        ))
    }

    fn reshape(&mut self, operand: &OpId, dims: &[usize]) -> Result<OpId> {
        let shape = self.shape(*operand)?;
        let before: usize = shape.dims().iter().product();
        let after: usize = dims.iter().product();
        if before != after {
            return Err(Error::builder(format!(
                "reshape changes element count: {:?} to {:?}",
                shape.dims(),
                dims
            )));
        }
        let out = Shape::with_descending_layout(shape.element_type(), dims);
        Ok(self.push(
            Recorded::Reshape {
                operand: *operand,
                dims: dims.to_vec(),
            },
            out,
        ))
    }

    fn broadcast(&mut self, operand: &OpId, leading_dims: &[usize]) -> Result<OpId> {
        let shape = self.shape(*operand)?;
        let mut dims = leading_dims.to_vec();
        dims.extend_from_slice(shape.dims());
        let out = Shape::with_descending_layout(shape.element_type(), &dims);
        Ok(self.push(
            Recorded::Broadcast {
                operand: *operand,
                leading_dims: leading_dims.to_vec(),
            },
            out,
        ))
    }

    fn add(&mut self, lhs: &OpId, rhs: &OpId) -> Result<OpId> {
        let lhs_shape = self.shape(*lhs)?;
        let rhs_shape = self.shape(*rhs)?;
        if lhs_shape.dims() != rhs_shape.dims() {
            return Err(Error::builder(format!(
                "add operands disagree: {:?} vs. {:?}",
                lhs_shape.dims(),
                rhs_shape.dims()
            )));
        }
        let out = lhs_shape.clone();
        Ok(self.push(Recorded::Add { lhs: *lhs, rhs: *rhs }, out))
    }

    fn reduce_add(&mut self, operand: &OpId, dims: &[usize]) -> Result<OpId> {
        let shape = self.shape(*operand)?;
        for &dim in dims {
            if dim >= shape.rank() {
                return Err(Error::builder(format!(
                    "reduce dimension {dim} out of range for rank {}",
                    shape.rank()
                )));
            }
        }
        let kept: Vec<usize> = (0..shape.rank())
            .filter(|dim| !dims.contains(dim))
            .map(|dim| shape.dims()[dim])
            .collect();
        let out = Shape::with_descending_layout(shape.element_type(), &kept);
        Ok(self.push(
            Recorded::ReduceAdd {
                operand: *operand,
                dims: dims.to_vec(),
            },
            out,
        ))
    }
}
