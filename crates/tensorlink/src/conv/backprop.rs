//! Convolution gradient geometry.
//!
//! The builders in [`super::build`] express both gradients of a forward
//! convolution as convolutions themselves. Everything they need beyond
//! the operands is captured here: per-spatial-dimension sizes, strides,
//! dilations, and the padding to apply to the gradient.

use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::shape::Shape;

use super::format::TensorFormat;

/// Forward padding resolution mode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Padding {
    Valid,
    Same,
    /// One (before, after) pair per spatial dimension.
    Explicit(Vec<(i64, i64)>),
}

/// Geometry of one spatial dimension of a convolution gradient.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConvBackpropSpatialDimension {
    pub input_size: i64,
    pub filter_size: i64,
    pub output_size: i64,
    pub stride: i64,
    pub dilation: i64,
    /// Output size after upsampling by the stride:
    /// `(output_size - 1) * stride + 1`.
    pub expanded_output_size: i64,
    /// Padding applied to the expanded output when convolving it with
    /// the mirrored filter; either entry may be negative.
    pub pad_before: i64,
    pub pad_after: i64,
}

/// Batch, depth, and per-spatial-dimension geometry shared by the
/// gradient builders.
#[derive(Clone, Debug, Default)]
pub struct ConvBackpropDimensions {
    pub spatial_dims: SmallVec<[ConvBackpropSpatialDimension; 3]>,
    pub batch_size: i64,
    pub in_depth: i64,
    pub out_depth: i64,
}

impl ConvBackpropDimensions {
    pub fn input_size(&self, dim: usize) -> i64 {
        self.spatial_dims[dim].input_size
    }

    pub fn filter_size(&self, dim: usize) -> i64 {
        self.spatial_dims[dim].filter_size
    }

    pub fn output_size(&self, dim: usize) -> i64 {
        self.spatial_dims[dim].output_size
    }

    pub fn stride(&self, dim: usize) -> i64 {
        self.spatial_dims[dim].stride
    }

    pub fn dilation(&self, dim: usize) -> i64 {
        self.spatial_dims[dim].dilation
    }

    /// Forward padding split for spatial dimension `dim`.
    ///
    /// `Valid` pads nothing, `Explicit` returns the caller's pair, and
    /// `Same` splits the total needed padding with the smaller half
    /// before the data.
    pub fn spatial_padding(&self, padding: &Padding, dim: usize) -> (i64, i64) {
        match padding {
            Padding::Valid => (0, 0),
            Padding::Same => {
                let d = &self.spatial_dims[dim];
                let total = ((d.output_size - 1) * d.stride + (d.filter_size - 1) * d.dilation
                    + 1
                    - d.input_size)
                    .max(0);
                (total / 2, total - total / 2)
            }
            Padding::Explicit(pairs) => pairs[dim],
        }
    }
}

/// Forward output extent and padding split of one spatial dimension.
fn windowed_output_size(
    label: &str,
    input_size: i64,
    filter_size: i64,
    dilation: i64,
    stride: i64,
    padding: &Padding,
    spatial_dim: usize,
) -> Result<(i64, i64, i64)> {
    if stride <= 0 {
        return Err(Error::invalid_argument(
            label,
            format!("stride must be > 0, got {stride}"),
        ));
    }
    if dilation < 1 {
        return Err(Error::invalid_argument(
            label,
            format!("dilation must be >= 1, got {dilation}"),
        ));
    }
    let effective_filter_size = (filter_size - 1) * dilation + 1;
    let (output_size, pad_before, pad_after) = match padding {
        Padding::Valid => ((input_size - effective_filter_size + stride) / stride, 0, 0),
        Padding::Same => {
            let output_size = (input_size + stride - 1) / stride;
            let padding_needed =
                ((output_size - 1) * stride + effective_filter_size - input_size).max(0);
            // An odd total puts the extra element after the data.
            (
                output_size,
                padding_needed / 2,
                padding_needed - padding_needed / 2,
            )
        }
        Padding::Explicit(pairs) => {
            let (before, after) = pairs[spatial_dim];
            (
                (input_size + before + after - effective_filter_size + stride) / stride,
                before,
                after,
            )
        }
    };
    if output_size < 0 {
        return Err(Error::invalid_argument(
            label,
            format!("computed output size would be negative: {output_size}"),
        ));
    }
    Ok((output_size, pad_before, pad_after))
}

#[allow(clippy::too_many_arguments)]
fn extract_and_verify_dimension(
    label: &str,
    input_shape: &Shape,
    filter_shape: &Shape,
    out_backprop_shape: &Shape,
    dilations: &[i64],
    strides: &[i64],
    padding: &Padding,
    image_dim: usize,
    spatial_dim: usize,
) -> Result<ConvBackpropSpatialDimension> {
    let input_size = input_shape.dims()[image_dim] as i64;
    let filter_size = filter_shape.dims()[spatial_dim] as i64;
    let output_size = out_backprop_shape.dims()[image_dim] as i64;
    let stride = strides[spatial_dim];
    let dilation = dilations[spatial_dim];

    let (computed_output, forward_pad_before, _) = windowed_output_size(
        label,
        input_size,
        filter_size,
        dilation,
        stride,
        padding,
        spatial_dim,
    )?;
    if output_size != computed_output {
        return Err(Error::invalid_argument(
            label,
            format!(
                "size of out_backprop doesn't match computed: actual = {output_size}, \
                 computed = {computed_output} for spatial dimension {spatial_dim}"
            ),
        ));
    }

    // Convolving the stride-expanded output with the mirrored filter
    // must land exactly back on the input extent.
    let effective_filter_size = (filter_size - 1) * dilation + 1;
    let expanded_output_size = (output_size - 1) * stride + 1;
    let padded_out_size = input_size + effective_filter_size - 1;
    let pad_before = effective_filter_size - 1 - forward_pad_before;
    let pad_after = padded_out_size - expanded_output_size - pad_before;
    Ok(ConvBackpropSpatialDimension {
        input_size,
        filter_size,
        output_size,
        stride,
        dilation,
        expanded_output_size,
        pad_before,
        pad_after,
    })
}

/// Validates the gradient geometry of a convolution and returns the
/// per-dimension records the gradient builders consume.
///
/// `input_shape`, `filter_shape`, and `out_backprop_shape` are the
/// forward operands; the filter arrives as `[spatial..., in, out]` with
/// grouped filters already collapsed. Every mismatch comes back as
/// [`Error::InvalidArgument`] tagged with `label`.
#[allow(clippy::too_many_arguments)]
pub fn conv_backprop_compute_dimensions_v2(
    label: &str,
    num_spatial_dims: usize,
    input_shape: &Shape,
    filter_shape: &Shape,
    out_backprop_shape: &Shape,
    dilations: &[i64],
    strides: &[i64],
    padding: &Padding,
    data_format: TensorFormat,
) -> Result<ConvBackpropDimensions> {
    let num_dims = num_spatial_dims + 2;
    if input_shape.rank() != num_dims {
        return Err(Error::invalid_argument(
            label,
            format!("input must be {num_dims}-dimensional"),
        ));
    }
    if filter_shape.rank() != num_dims {
        return Err(Error::invalid_argument(
            label,
            format!("filter must be {num_dims}-dimensional"),
        ));
    }
    if out_backprop_shape.rank() != num_dims {
        return Err(Error::invalid_argument(
            label,
            format!("out_backprop must be {num_dims}-dimensional"),
        ));
    }
    if dilations.len() != num_spatial_dims {
        return Err(Error::invalid_argument(
            label,
            format!("expected {} dilations, got {}", num_spatial_dims, dilations.len()),
        ));
    }
    if strides.len() != num_spatial_dims {
        return Err(Error::invalid_argument(
            label,
            format!("expected {} strides, got {}", num_spatial_dims, strides.len()),
        ));
    }
    if let Padding::Explicit(pairs) = padding {
        if pairs.len() != num_spatial_dims {
            return Err(Error::invalid_argument(
                label,
                format!(
                    "expected {} explicit padding pairs, got {}",
                    num_spatial_dims,
                    pairs.len()
                ),
            ));
        }
    }

    let batch_dim = data_format.batch_dim_index(num_dims);
    let batch_size = input_shape.dims()[batch_dim] as i64;
    let out_batch_size = out_backprop_shape.dims()[batch_dim] as i64;
    if batch_size != out_batch_size {
        return Err(Error::invalid_argument(
            label,
            format!(
                "input and out_backprop must have the same batch size: \
                 input batch {batch_size}, out_backprop batch {out_batch_size}"
            ),
        ));
    }

    let feature_dim = data_format.feature_dim_index(num_dims);
    let in_depth = input_shape.dims()[feature_dim] as i64;
    // Filter dims run [spatial..., in_depth, out_depth].
    let filter_in_depth = filter_shape.dims()[num_dims - 2] as i64;
    if filter_in_depth <= 0 {
        return Err(Error::invalid_argument(
            label,
            "filter depth must be strictly greater than zero",
        ));
    }
    if in_depth % filter_in_depth != 0 {
        return Err(Error::invalid_argument(
            label,
            format!(
                "input depth {in_depth} must be evenly divisible by filter depth {filter_in_depth}"
            ),
        ));
    }
    let out_depth = filter_shape.dims()[num_dims - 1] as i64;
    let backprop_depth = out_backprop_shape.dims()[feature_dim] as i64;
    if out_depth != backprop_depth {
        return Err(Error::invalid_argument(
            label,
            format!(
                "filter and out_backprop must have the same out_depth: \
                 filter {out_depth}, out_backprop {backprop_depth}"
            ),
        ));
    }

    let mut spatial_dims = SmallVec::new();
    for spatial_dim in 0..num_spatial_dims {
        let image_dim = data_format.spatial_dim_index(num_dims, spatial_dim);
        spatial_dims.push(extract_and_verify_dimension(
            label,
            input_shape,
            filter_shape,
            out_backprop_shape,
            dilations,
            strides,
            padding,
            image_dim,
            spatial_dim,
        )?);
    }
    Ok(ConvBackpropDimensions {
        spatial_dims,
        batch_size,
        in_depth,
        out_depth,
    })
}
