//! Builders that lower convolutions and their gradients onto an op
//! builder.
//!
//! Two surfaces live here. The `make_backprop_*` pair speaks the
//! bridge vocabulary (explicit data formats, filters in
//! `[spatial..., in, out]` orientation) and emits a single convolution
//! each. The `build_convolution_*` family speaks the frontend
//! vocabulary (inputs `[N, C, spatial...]`, kernels
//! `[O, I/groups, spatial...]`, symmetric padding) and adapts operands
//! before delegating.

use crate::env;
use crate::error::{Error, Result};
use crate::ir::{ConvDimensionNumbers, ConvGeneralSpec, OpBuilder, PaddingType, PrecisionConfig};
use crate::shape::Shape;

use super::backprop::{conv_backprop_compute_dimensions_v2, Padding};
use super::format::TensorFormat;

/// Convolution attributes in the gradient builders' vocabulary. The
/// per-axis vectors run over the spatial dimensions in logical order.
#[derive(Clone, Debug)]
pub struct ConvOpAttrs {
    pub depthwise: bool,
    pub num_spatial_dims: usize,
    pub dilations: Vec<i64>,
    pub strides: Vec<i64>,
    pub padding: Padding,
    pub data_format: TensorFormat,
}

fn check_conv_attrs(label: &str, attrs: &ConvOpAttrs) -> Result<()> {
    if attrs.strides.len() != attrs.num_spatial_dims {
        return Err(Error::invalid_argument(
            label,
            format!(
                "expected {} strides, got {}",
                attrs.num_spatial_dims,
                attrs.strides.len()
            ),
        ));
    }
    for (i, &stride) in attrs.strides.iter().enumerate() {
        if stride < 1 {
            return Err(Error::invalid_argument(
                label,
                format!("stride for spatial dimension {i} must be at least 1, got {stride}"),
            ));
        }
    }
    if attrs.dilations.len() != attrs.num_spatial_dims {
        return Err(Error::invalid_argument(
            label,
            format!(
                "expected {} dilations, got {}",
                attrs.num_spatial_dims,
                attrs.dilations.len()
            ),
        ));
    }
    for (i, &dilation) in attrs.dilations.iter().enumerate() {
        if dilation < 1 {
            return Err(Error::invalid_argument(
                label,
                format!("dilation for spatial dimension {i} must be at least 1, got {dilation}"),
            ));
        }
    }
    if let Padding::Explicit(pairs) = &attrs.padding {
        if pairs.len() != attrs.num_spatial_dims {
            return Err(Error::invalid_argument(
                label,
                format!(
                    "expected {} explicit padding pairs, got {}",
                    attrs.num_spatial_dims,
                    pairs.len()
                ),
            ));
        }
        for (i, &(before, after)) in pairs.iter().enumerate() {
            if before < 0 || after < 0 {
                return Err(Error::invalid_argument(
                    label,
                    format!(
                        "explicit padding for spatial dimension {i} must be non-negative, \
                         got ({before}, {after})"
                    ),
                ));
            }
        }
    }
    Ok(())
}

/// Filter `[spatial..., in, multiplier]` rewritten to the grouped form
/// `[spatial..., 1, in * multiplier]` used for depthwise convolutions.
fn grouped_filter_shape_for_depthwise(filter_shape: &Shape) -> Shape {
    let mut dims = filter_shape.dims().to_vec();
    let num_dims = dims.len();
    let input_feature = dims[num_dims - 2];
    let multiplier = dims[num_dims - 1];
    dims[num_dims - 2] = 1;
    dims[num_dims - 1] = input_feature * multiplier;
    Shape::with_descending_layout(filter_shape.element_type(), &dims)
}

/// Rearranges a grouped-convolution filter `[spatial..., I, O]` into
/// `[spatial..., I * groups, O / groups]` so the input-gradient
/// convolution sees the full input depth on the kernel.
fn transpose_filter_for_group_backprop_input<B: OpBuilder>(
    builder: &mut B,
    filter: &B::Op,
    filter_shape: &Shape,
    num_groups: usize,
    num_spatial_dims: usize,
) -> Result<B::Op> {
    let dims = filter_shape.dims();
    let num_dims = dims.len();

    // [spatial..., I, G, O / G]
    let mut split = dims.to_vec();
    split[num_dims - 1] = num_groups;
    split.push(dims[num_dims - 1] / num_groups);
    let reshaped = builder.reshape(filter, &split)?;

    // [spatial..., G, I, O / G]
    let mut permutation: Vec<usize> = (0..num_dims + 1).collect();
    permutation.swap(num_spatial_dims, num_spatial_dims + 1);
    let transposed = builder.transpose(&reshaped, &permutation)?;

    // [spatial..., G * I, O / G]
    let mut merged = Vec::with_capacity(num_dims);
    merged.extend_from_slice(&dims[..num_spatial_dims]);
    merged.push(num_groups * dims[num_dims - 2]);
    merged.push(dims[num_dims - 1] / num_groups);
    builder.reshape(&transposed, &merged)
}

/// Builds the convolution computing the gradient with respect to the
/// forward input.
///
/// `input_shape` is the forward input's shape, which the result takes.
/// The filter arrives in `[spatial..., in, out]` orientation. When
/// `input_sizes` is given the dynamic variant is emitted and the result
/// extents come from that operand at run time; only `Valid` and `Same`
/// padding are expressible there.
#[allow(clippy::too_many_arguments)]
pub fn make_backprop_input_conv_op<B: OpBuilder>(
    builder: &mut B,
    label: &str,
    input_shape: &Shape,
    filter: &B::Op,
    out_backprop: &B::Op,
    attrs: &ConvOpAttrs,
    input_sizes: Option<&B::Op>,
) -> Result<B::Op> {
    check_conv_attrs(label, attrs)?;

    let num_dims = attrs.num_spatial_dims + 2;
    let batch_dim = attrs.data_format.batch_dim_index(num_dims);
    let feature_dim = attrs.data_format.feature_dim_index(num_dims);

    let filter_shape = builder.shape_of(filter)?;
    let out_backprop_shape = builder.shape_of(out_backprop)?;

    let grouped_filter_shape = if attrs.depthwise {
        grouped_filter_shape_for_depthwise(&filter_shape)
    } else {
        filter_shape.clone()
    };
    let dims = conv_backprop_compute_dimensions_v2(
        label,
        attrs.num_spatial_dims,
        input_shape,
        &grouped_filter_shape,
        &out_backprop_shape,
        &attrs.dilations,
        &attrs.strides,
        &attrs.padding,
        attrs.data_format,
    )?;

    let in_depth = input_shape.dims()[feature_dim];
    let filter_in_depth = filter_shape.dims()[attrs.num_spatial_dims];
    let feature_group_count = if attrs.depthwise {
        filter_in_depth
    } else {
        in_depth / filter_in_depth
    };

    // The input gradient convolves the output gradient with the
    // spatially mirrored filter. The kernel's feature roles swap, the
    // stride moves into the gradient's dilation, and the recorded pads
    // line the expanded gradient up with the input extents.
    let mut dimension_numbers = ConvDimensionNumbers {
        input_batch_dimension: batch_dim,
        input_feature_dimension: feature_dim,
        input_spatial_dimensions: Vec::with_capacity(attrs.num_spatial_dims),
        kernel_input_feature_dimension: attrs.num_spatial_dims + 1,
        kernel_output_feature_dimension: attrs.num_spatial_dims,
        kernel_spatial_dimensions: Vec::with_capacity(attrs.num_spatial_dims),
        output_batch_dimension: batch_dim,
        output_feature_dimension: feature_dim,
        output_spatial_dimensions: Vec::with_capacity(attrs.num_spatial_dims),
    };
    let mut kernel_spatial_dims = Vec::with_capacity(attrs.num_spatial_dims);
    let mut padding = Vec::with_capacity(attrs.num_spatial_dims);
    let mut lhs_dilation = Vec::with_capacity(attrs.num_spatial_dims);
    let mut rhs_dilation = Vec::with_capacity(attrs.num_spatial_dims);
    for i in 0..attrs.num_spatial_dims {
        let dim = attrs.data_format.spatial_dim_index(num_dims, i);
        dimension_numbers.input_spatial_dimensions.push(dim);
        dimension_numbers.kernel_spatial_dimensions.push(i);
        dimension_numbers.output_spatial_dimensions.push(dim);
        kernel_spatial_dims.push(i);
        padding.push((dims.spatial_dims[i].pad_before, dims.spatial_dims[i].pad_after));
        lhs_dilation.push(dims.spatial_dims[i].stride);
        rhs_dilation.push(attrs.dilations[i]);
    }

    let mut kernel = filter.clone();
    if feature_group_count != 1 && !attrs.depthwise {
        kernel = transpose_filter_for_group_backprop_input(
            builder,
            &kernel,
            &filter_shape,
            feature_group_count,
            attrs.num_spatial_dims,
        )?;
    }
    let mirrored = builder.reverse(&kernel, &kernel_spatial_dims)?;

    let spec = ConvGeneralSpec {
        window_strides: vec![1; attrs.num_spatial_dims],
        padding,
        lhs_dilation,
        rhs_dilation,
        dimension_numbers,
        feature_group_count: feature_group_count as i64,
        batch_group_count: 1,
        precision: PrecisionConfig::same(env::matmul_precision()),
    };
    match input_sizes {
        None => builder.conv_general_dilated(out_backprop, &mirrored, &spec),
        Some(input_sizes) => {
            let padding_type = match attrs.padding {
                Padding::Valid => PaddingType::Valid,
                Padding::Same => PaddingType::Same,
                Padding::Explicit(_) => {
                    return Err(Error::invalid_argument(
                        label,
                        "dynamic convolution gradients support only valid and same padding",
                    ))
                }
            };
            builder.dynamic_conv_input_grad(input_sizes, out_backprop, &mirrored, &spec, padding_type)
        }
    }
}

/// Builds the convolution computing the gradient with respect to the
/// filter.
///
/// `activations` is the forward input, `gradients` the output gradient,
/// `filter_shape` the target filter extents in `[spatial..., in, out]`
/// orientation. The result takes `filter_shape`.
pub fn make_backprop_filter_conv_op<B: OpBuilder>(
    builder: &mut B,
    label: &str,
    activations: &B::Op,
    filter_shape: &Shape,
    gradients: &B::Op,
    attrs: &ConvOpAttrs,
) -> Result<B::Op> {
    check_conv_attrs(label, attrs)?;

    let activations_shape = builder.shape_of(activations)?;
    let out_backprop_shape = builder.shape_of(gradients)?;

    let grouped_filter_shape = if attrs.depthwise {
        grouped_filter_shape_for_depthwise(filter_shape)
    } else {
        filter_shape.clone()
    };
    let dims = conv_backprop_compute_dimensions_v2(
        label,
        attrs.num_spatial_dims,
        &activations_shape,
        &grouped_filter_shape,
        &out_backprop_shape,
        &attrs.dilations,
        &attrs.strides,
        &attrs.padding,
        attrs.data_format,
    )?;

    let num_dims = attrs.num_spatial_dims + 2;
    let batch_dim = attrs.data_format.batch_dim_index(num_dims);
    let feature_dim = attrs.data_format.feature_dim_index(num_dims);
    let in_depth = activations_shape.dims()[feature_dim] as i64;
    let filter_in_depth = grouped_filter_shape.dims()[attrs.num_spatial_dims] as i64;
    let batch_group_count = in_depth / filter_in_depth;

    // The filter gradient convolves the activations with the
    // stride-dilated output gradient. The activations act as the
    // convolution input with batch and feature swapped, the gradient
    // acts as the kernel, and grouping moves into the batch dimension.
    let mut dimension_numbers = ConvDimensionNumbers {
        input_batch_dimension: feature_dim,
        input_feature_dimension: batch_dim,
        input_spatial_dimensions: Vec::with_capacity(attrs.num_spatial_dims),
        kernel_input_feature_dimension: batch_dim,
        kernel_output_feature_dimension: feature_dim,
        kernel_spatial_dimensions: Vec::with_capacity(attrs.num_spatial_dims),
        output_batch_dimension: attrs.num_spatial_dims,
        output_feature_dimension: attrs.num_spatial_dims + 1,
        output_spatial_dimensions: (0..attrs.num_spatial_dims).collect(),
    };

    let mut padding = Vec::with_capacity(attrs.num_spatial_dims);
    let mut rhs_dilation = Vec::with_capacity(attrs.num_spatial_dims);
    let mut window_strides = Vec::with_capacity(attrs.num_spatial_dims);
    for i in 0..attrs.num_spatial_dims {
        let dim = attrs.data_format.spatial_dim_index(num_dims, i);
        dimension_numbers.input_spatial_dimensions.push(dim);
        dimension_numbers.kernel_spatial_dimensions.push(dim);
        rhs_dilation.push(dims.spatial_dims[i].stride);
        window_strides.push(attrs.dilations[i]);

        // Pad the activations so each filter tap sees exactly the input
        // positions the forward pass used. The total can go negative
        // when trailing input elements never participated.
        let padded_in_size = dims.spatial_dims[i].expanded_output_size
            + (dims.spatial_dims[i].filter_size - 1) * attrs.dilations[i];
        let pad_total = padded_in_size - dims.spatial_dims[i].input_size;
        let pad_before = match &attrs.padding {
            Padding::Explicit(pairs) => pairs[i].0,
            Padding::Same => (pad_total / 2).max(0),
            Padding::Valid => 0,
        };
        padding.push((pad_before, pad_total - pad_before));
    }

    let spec = ConvGeneralSpec {
        window_strides,
        padding,
        lhs_dilation: vec![1; attrs.num_spatial_dims],
        rhs_dilation,
        dimension_numbers,
        feature_group_count: 1,
        batch_group_count,
        precision: PrecisionConfig::same(env::matmul_precision()),
    };
    let mut filter_backprop = builder.conv_general_dilated(activations, gradients, &spec)?;
    if attrs.depthwise {
        filter_backprop = builder.reshape(&filter_backprop, filter_shape.dims())?;
    }
    Ok(filter_backprop)
}

fn symmetric_padding(padding: &[i64]) -> Vec<(i64, i64)> {
    padding.iter().map(|&pad| (pad, pad)).collect()
}

/// Attributes for the gradient builders from frontend-style per-axis
/// parameters.
fn make_conv_op_attrs(stride: &[i64], padding: &[i64], dilation: &[i64]) -> ConvOpAttrs {
    let num_spatial_dims = stride.len();
    assert_eq!(padding.len(), num_spatial_dims, "padding rank mismatch");
    assert_eq!(dilation.len(), num_spatial_dims, "dilation rank mismatch");
    ConvOpAttrs {
        depthwise: false,
        num_spatial_dims,
        dilations: dilation.to_vec(),
        strides: stride.to_vec(),
        padding: Padding::Explicit(symmetric_padding(padding)),
        data_format: TensorFormat::Nchw,
    }
}

/// Permutation taking a kernel from `[O, I, spatial...]` to the gradient
/// builders' `[spatial..., I, O]` orientation.
fn filter_transpose_permutation(rank: usize) -> Vec<usize> {
    assert!(
        rank == 4 || rank == 5,
        "invalid convolution filter rank: {rank}"
    );
    let mut permutation: Vec<usize> = (2..rank).collect();
    permutation.push(1);
    permutation.push(0);
    permutation
}

/// Permutation moving a trailing feature dimension back to position 1.
fn bias_transpose_permutation(rank: usize) -> Vec<usize> {
    let mut permutation = Vec::with_capacity(rank);
    permutation.push(0);
    permutation.push(rank - 1);
    permutation.extend(1..rank - 1);
    permutation
}

fn inverse_permutation(permutation: &[usize]) -> Vec<usize> {
    let mut inverse = vec![0usize; permutation.len()];
    for (index, &dim) in permutation.iter().enumerate() {
        inverse[dim] = index;
    }
    inverse
}

fn permute_dims(dims: &[usize], permutation: &[usize]) -> Vec<usize> {
    permutation.iter().map(|&dim| dims[dim]).collect()
}

/// Lowers a forward convolution: input `[N, C, spatial...]`, kernel
/// `[O, I/groups, spatial...]`, symmetric per-axis padding.
///
/// With `transposed` set, lowers the transposed (fractionally strided)
/// convolution instead, with `output_padding` extending the trailing
/// edge of the result; `output_padding` is ignored otherwise.
#[allow(clippy::too_many_arguments)]
pub fn build_convolution_overrideable<B: OpBuilder>(
    builder: &mut B,
    input: &B::Op,
    kernel: &B::Op,
    stride: &[i64],
    padding: &[i64],
    dilation: &[i64],
    transposed: bool,
    output_padding: &[i64],
    groups: i64,
) -> Result<B::Op> {
    if transposed {
        return build_transposed_convolution(
            builder,
            input,
            kernel,
            stride,
            padding,
            dilation,
            output_padding,
            groups,
        );
    }
    let num_spatial_dims = stride.len();
    assert_eq!(padding.len(), num_spatial_dims, "padding rank mismatch");
    assert_eq!(dilation.len(), num_spatial_dims, "dilation rank mismatch");
    let spec = ConvGeneralSpec {
        window_strides: stride.to_vec(),
        padding: symmetric_padding(padding),
        lhs_dilation: vec![1; num_spatial_dims],
        rhs_dilation: dilation.to_vec(),
        dimension_numbers: ConvDimensionNumbers::default_for_rank(num_spatial_dims),
        feature_group_count: groups,
        batch_group_count: 1,
        precision: PrecisionConfig::same(env::matmul_precision()),
    };
    builder.conv_general_dilated(input, kernel, &spec)
}

/// Forward convolution plus a per-feature bias.
#[allow(clippy::too_many_arguments)]
pub fn build_convolution_overrideable_bias<B: OpBuilder>(
    builder: &mut B,
    input: &B::Op,
    kernel: &B::Op,
    bias: &B::Op,
    stride: &[i64],
    padding: &[i64],
    dilation: &[i64],
    transposed: bool,
    output_padding: &[i64],
    groups: i64,
) -> Result<B::Op> {
    let conv = build_convolution_overrideable(
        builder,
        input,
        kernel,
        stride,
        padding,
        dilation,
        transposed,
        output_padding,
        groups,
    )?;
    let conv_shape = builder.shape_of(&conv)?;
    // Broadcasting appends the feature axis last; move it back next to
    // the batch before adding.
    let mut broadcast_dims = conv_shape.dims().to_vec();
    broadcast_dims.remove(1);
    let broadcast = builder.broadcast(bias, &broadcast_dims)?;
    let bias_moved =
        builder.transpose(&broadcast, &bias_transpose_permutation(conv_shape.rank()))?;
    builder.add(&conv, &bias_moved)
}

fn build_transposed_convolution<B: OpBuilder>(
    builder: &mut B,
    input: &B::Op,
    kernel: &B::Op,
    stride: &[i64],
    padding: &[i64],
    dilation: &[i64],
    output_padding: &[i64],
    groups: i64,
) -> Result<B::Op> {
    let input_shape = builder.shape_of(input)?;
    let kernel_shape = builder.shape_of(kernel)?;
    let num_spatial_dims = input_shape.rank() - 2;
    assert!(
        num_spatial_dims == 2 || num_spatial_dims == 3,
        "transposed convolution supports 2 or 3 spatial dimensions, got {num_spatial_dims}"
    );
    // A transposed convolution is the input gradient of the forward
    // convolution that maps the target extents back onto `input`. The
    // group factor folds into the output features.
    let features = kernel_shape.dims()[1] * groups as usize;
    let mut target_dims = vec![input_shape.dims()[0], features];
    for spatial_dim in 0..num_spatial_dims {
        let in_size = input_shape.dims()[2 + spatial_dim] as i64;
        let kernel_size = kernel_shape.dims()[2 + spatial_dim] as i64;
        let out_size = (in_size - 1) * stride[spatial_dim] - 2 * padding[spatial_dim]
            + dilation[spatial_dim] * (kernel_size - 1)
            + output_padding[spatial_dim]
            + 1;
        if out_size < 1 {
            return Err(Error::invalid_argument(
                "transposed_convolution",
                format!(
                    "computed output size would be non-positive: {out_size} \
                     for spatial dimension {spatial_dim}"
                ),
            ));
        }
        target_dims.push(out_size as usize);
    }
    let target_shape = Shape::with_descending_layout(input_shape.element_type(), &target_dims);
    build_conv_backward_input(builder, input, kernel, &target_shape, stride, padding, dilation)
}

/// Input gradient of a forward convolution in frontend orientation;
/// `grad_output` plays the output-gradient role.
fn build_conv_backward_input<B: OpBuilder>(
    builder: &mut B,
    grad_output: &B::Op,
    kernel: &B::Op,
    input_shape: &Shape,
    stride: &[i64],
    padding: &[i64],
    dilation: &[i64],
) -> Result<B::Op> {
    let attrs = make_conv_op_attrs(stride, padding, dilation);
    let kernel_shape = builder.shape_of(kernel)?;
    let permutation = filter_transpose_permutation(kernel_shape.rank());
    let kernel_transposed = builder.transpose(kernel, &permutation)?;
    make_backprop_input_conv_op(
        builder,
        "conv_backward_input",
        input_shape,
        &kernel_transposed,
        grad_output,
        &attrs,
        None,
    )
}

/// Filter gradient, permuted back into the frontend kernel orientation.
fn build_conv_backward_weight<B: OpBuilder>(
    builder: &mut B,
    grad_output: &B::Op,
    input: &B::Op,
    kernel_shape: &Shape,
    stride: &[i64],
    padding: &[i64],
    dilation: &[i64],
) -> Result<B::Op> {
    let attrs = make_conv_op_attrs(stride, padding, dilation);
    let permutation = filter_transpose_permutation(kernel_shape.rank());
    let transposed_dims = permute_dims(kernel_shape.dims(), &permutation);
    let transposed_shape =
        Shape::with_descending_layout(kernel_shape.element_type(), &transposed_dims);
    let conv = make_backprop_filter_conv_op(
        builder,
        "conv_backward_weight",
        input,
        &transposed_shape,
        grad_output,
        &attrs,
    )?;
    builder.transpose(&conv, &inverse_permutation(&permutation))
}

/// Bias gradient: the output gradient summed over every dimension but
/// the feature dimension.
fn build_grad_bias<B: OpBuilder>(builder: &mut B, grad_output: &B::Op) -> Result<B::Op> {
    let shape = builder.shape_of(grad_output)?;
    let reduce_dims: Vec<usize> = (0..shape.rank()).filter(|&dim| dim != 1).collect();
    builder.reduce_add(grad_output, &reduce_dims)
}

/// Gradients of a convolution with respect to input, kernel, and bias.
#[derive(Clone, Debug)]
pub struct ConvGrads<Op> {
    pub grad_input: Op,
    pub grad_weight: Op,
    pub grad_bias: Op,
}

/// Gradients of [`build_convolution_overrideable`] for the given output
/// gradient.
///
/// For a transposed convolution the forward pass is itself an input
/// gradient, so the roles swap: the input gradient is a plain forward
/// convolution of `grad_output`, and the weight gradient reads
/// `grad_output` as the activations.
#[allow(clippy::too_many_arguments)]
pub fn build_convolution_backward_overrideable<B: OpBuilder>(
    builder: &mut B,
    grad_output: &B::Op,
    input: &B::Op,
    kernel: &B::Op,
    stride: &[i64],
    padding: &[i64],
    dilation: &[i64],
    transposed: bool,
    output_padding: &[i64],
    groups: i64,
) -> Result<ConvGrads<B::Op>> {
    let kernel_shape = builder.shape_of(kernel)?;
    if transposed {
        let grad_input = build_convolution_overrideable(
            builder,
            grad_output,
            kernel,
            stride,
            padding,
            dilation,
            false,
            output_padding,
            groups,
        )?;
        let grad_weight = build_conv_backward_weight(
            builder,
            input,
            grad_output,
            &kernel_shape,
            stride,
            padding,
            dilation,
        )?;
        let grad_bias = build_grad_bias(builder, grad_output)?;
        return Ok(ConvGrads {
            grad_input,
            grad_weight,
            grad_bias,
        });
    }
    let input_shape = builder.shape_of(input)?;
    let grad_input = build_conv_backward_input(
        builder,
        grad_output,
        kernel,
        &input_shape,
        stride,
        padding,
        dilation,
    )?;
    let grad_weight = build_conv_backward_weight(
        builder,
        grad_output,
        input,
        &kernel_shape,
        stride,
        padding,
        dilation,
    )?;
    let grad_bias = build_grad_bias(builder, grad_output)?;
    Ok(ConvGrads {
        grad_input,
        grad_weight,
        grad_bias,
    })
}
