use tensorlink::conv::{conv_backprop_compute_dimensions_v2, Padding, TensorFormat};
use tensorlink::error::Error;
use tensorlink::shape::{ElementType, Shape};

fn shape(dims: &[usize]) -> Shape {
    Shape::with_descending_layout(ElementType::F32, dims)
}

#[test]
fn spatial_dims_count_per_format() {
    assert_eq!(TensorFormat::Nhwc.spatial_dims_count(4), 2);
    assert_eq!(TensorFormat::Nchw.spatial_dims_count(5), 3);
    assert_eq!(TensorFormat::Hwnc.spatial_dims_count(4), 2);
    assert_eq!(TensorFormat::Hwcn.spatial_dims_count(4), 2);
    assert_eq!(TensorFormat::NchwVectC.spatial_dims_count(5), 2);
    assert_eq!(TensorFormat::NhwcVectW.spatial_dims_count(5), 2);
}

#[test]
fn spatial_dim_index_per_format() {
    assert_eq!(TensorFormat::Nhwc.spatial_dim_index(4, 0), 1);
    assert_eq!(TensorFormat::Nhwc.spatial_dim_index(4, 1), 2);
    assert_eq!(TensorFormat::Nchw.spatial_dim_index(4, 1), 3);
    assert_eq!(TensorFormat::NchwVectC.spatial_dim_index(5, 0), 2);
    assert_eq!(TensorFormat::NhwcVectW.spatial_dim_index(5, 1), 2);
    assert_eq!(TensorFormat::Hwnc.spatial_dim_index(4, 0), 0);
    assert_eq!(TensorFormat::Hwcn.spatial_dim_index(4, 1), 1);
}

#[test]
#[should_panic(expected = "out of range")]
fn spatial_dim_index_rejects_out_of_range() {
    TensorFormat::Nchw.spatial_dim_index(4, 2);
}

#[test]
fn batch_and_feature_dim_indexes() {
    assert_eq!(TensorFormat::Nhwc.batch_dim_index(4), 0);
    assert_eq!(TensorFormat::Hwnc.batch_dim_index(4), 2);
    assert_eq!(TensorFormat::Hwcn.batch_dim_index(4), 3);

    assert_eq!(TensorFormat::Nhwc.feature_dim_index(4), 3);
    assert_eq!(TensorFormat::Nchw.feature_dim_index(4), 1);
    assert_eq!(TensorFormat::NchwVectC.feature_dim_index(5), 1);
    assert_eq!(TensorFormat::NhwcVectW.feature_dim_index(5), 3);
    assert_eq!(TensorFormat::Hwnc.feature_dim_index(4), 3);
    assert_eq!(TensorFormat::Hwcn.feature_dim_index(4), 2);
}

#[test]
fn same_padding_stride_one_keeps_extents() {
    let dims = conv_backprop_compute_dimensions_v2(
        "conv2d_backprop_input",
        2,
        &shape(&[1, 2, 10, 10]),
        &shape(&[3, 3, 2, 4]),
        &shape(&[1, 4, 10, 10]),
        &[1, 1],
        &[1, 1],
        &Padding::Same,
        TensorFormat::Nchw,
    )
    .unwrap_or_else(|err| panic!("unexpected error: {err}"));

    assert_eq!(dims.batch_size, 1);
    assert_eq!(dims.in_depth, 2);
    assert_eq!(dims.out_depth, 4);
    assert_eq!(dims.input_size(0), 10);
    assert_eq!(dims.filter_size(1), 3);
    assert_eq!(dims.output_size(0), 10);
    assert_eq!(dims.spatial_padding(&Padding::Same, 0), (1, 1));
    assert_eq!(dims.spatial_dims[0].expanded_output_size, 10);
    assert_eq!(dims.spatial_dims[0].pad_before, 1);
    assert_eq!(dims.spatial_dims[0].pad_after, 1);
}

#[test]
fn same_padding_puts_odd_totals_after() {
    let dims = conv_backprop_compute_dimensions_v2(
        "conv2d_backprop_filter",
        2,
        &shape(&[1, 1, 10, 10]),
        &shape(&[3, 3, 1, 1]),
        &shape(&[1, 1, 5, 5]),
        &[1, 1],
        &[2, 2],
        &Padding::Same,
        TensorFormat::Nchw,
    )
    .unwrap_or_else(|err| panic!("unexpected error: {err}"));

    assert_eq!(dims.spatial_padding(&Padding::Same, 0), (0, 1));
    assert_eq!(dims.spatial_dims[0].expanded_output_size, 9);
    // Gradient pads: filter 3 gives an effective size of 3, the forward
    // pass padded 0 before, so the expanded gradient pads 2 before.
    assert_eq!(dims.spatial_dims[0].pad_before, 2);
    assert_eq!(dims.spatial_dims[0].pad_after, 1);
}

#[test]
fn valid_padding_pads_nothing() {
    let dims = conv_backprop_compute_dimensions_v2(
        "conv2d_backprop_input",
        2,
        &shape(&[1, 1, 10, 10]),
        &shape(&[3, 3, 1, 1]),
        &shape(&[1, 1, 8, 8]),
        &[1, 1],
        &[1, 1],
        &Padding::Valid,
        TensorFormat::Nchw,
    )
    .unwrap_or_else(|err| panic!("unexpected error: {err}"));

    assert_eq!(dims.spatial_padding(&Padding::Valid, 0), (0, 0));
    assert_eq!(dims.spatial_dims[0].pad_before, 2);
    assert_eq!(dims.spatial_dims[0].pad_after, 2);
}

#[test]
fn explicit_padding_passes_pairs_through() {
    let padding = Padding::Explicit(vec![(2, 1), (0, 0)]);
    let dims = conv_backprop_compute_dimensions_v2(
        "conv2d_backprop_input",
        2,
        &shape(&[1, 1, 10, 10]),
        &shape(&[3, 3, 1, 1]),
        &shape(&[1, 1, 11, 8]),
        &[1, 1],
        &[1, 1],
        &padding,
        TensorFormat::Nchw,
    )
    .unwrap_or_else(|err| panic!("unexpected error: {err}"));

    assert_eq!(dims.spatial_padding(&padding, 0), (2, 1));
    assert_eq!(dims.spatial_padding(&padding, 1), (0, 0));
    assert_eq!(dims.spatial_dims[0].pad_before, 0);
    assert_eq!(dims.spatial_dims[1].pad_before, 2);
}

#[test]
fn dilation_scales_the_effective_filter() {
    // Effective filter (3 - 1) * 2 + 1 = 5, VALID output (10 - 5) + 1 = 6.
    let dims = conv_backprop_compute_dimensions_v2(
        "conv2d_backprop_input",
        2,
        &shape(&[1, 1, 10, 10]),
        &shape(&[3, 3, 1, 1]),
        &shape(&[1, 1, 6, 6]),
        &[2, 2],
        &[1, 1],
        &Padding::Valid,
        TensorFormat::Nchw,
    )
    .unwrap_or_else(|err| panic!("unexpected error: {err}"));

    assert_eq!(dims.dilation(0), 2);
    assert_eq!(dims.spatial_dims[0].pad_before, 4);
    assert_eq!(dims.spatial_dims[0].expanded_output_size, 6);
}

#[test]
fn nhwc_reads_dims_from_their_format_positions() {
    let dims = conv_backprop_compute_dimensions_v2(
        "conv2d_backprop_input",
        2,
        &shape(&[2, 10, 10, 3]),
        &shape(&[3, 3, 3, 8]),
        &shape(&[2, 10, 10, 8]),
        &[1, 1],
        &[1, 1],
        &Padding::Same,
        TensorFormat::Nhwc,
    )
    .unwrap_or_else(|err| panic!("unexpected error: {err}"));

    assert_eq!(dims.batch_size, 2);
    assert_eq!(dims.in_depth, 3);
    assert_eq!(dims.out_depth, 8);
    assert_eq!(dims.input_size(0), 10);
}

#[test]
fn out_backprop_size_mismatch_names_the_computed_size() {
    let err = conv_backprop_compute_dimensions_v2(
        "conv2d_backprop_input",
        2,
        &shape(&[1, 1, 10, 10]),
        &shape(&[3, 3, 1, 1]),
        &shape(&[1, 1, 9, 8]),
        &[1, 1],
        &[1, 1],
        &Padding::Valid,
        TensorFormat::Nchw,
    )
    .expect_err("size mismatch should return an error");
    match err {
        Error::InvalidArgument { label, message } => {
            assert_eq!(label, "conv2d_backprop_input");
            assert!(
                message.contains("actual = 9, computed = 8"),
                "unexpected message: {message}"
            );
        }
        other => panic!("unexpected error variant: {other}"),
    }
}

#[test]
fn wrong_rank_is_a_labeled_error() {
    let err = conv_backprop_compute_dimensions_v2(
        "conv3d_backprop_filter",
        3,
        &shape(&[1, 1, 5, 5]),
        &shape(&[3, 3, 3, 1, 1]),
        &shape(&[1, 1, 3, 3, 3]),
        &[1, 1, 1],
        &[1, 1, 1],
        &Padding::Valid,
        TensorFormat::Nchw,
    )
    .expect_err("rank mismatch should return an error");
    match err {
        Error::InvalidArgument { label, message } => {
            assert_eq!(label, "conv3d_backprop_filter");
            assert!(message.contains("input must be 5-dimensional"), "unexpected message: {message}");
        }
        other => panic!("unexpected error variant: {other}"),
    }
}

#[test]
fn batch_mismatch_is_rejected() {
    let err = conv_backprop_compute_dimensions_v2(
        "conv2d_backprop_input",
        2,
        &shape(&[2, 1, 10, 10]),
        &shape(&[3, 3, 1, 1]),
        &shape(&[3, 1, 8, 8]),
        &[1, 1],
        &[1, 1],
        &Padding::Valid,
        TensorFormat::Nchw,
    )
    .expect_err("batch mismatch should return an error");
    assert!(err.to_string().contains("same batch size"), "unexpected error: {err}");
}

#[test]
fn depth_divisibility_is_required() {
    let err = conv_backprop_compute_dimensions_v2(
        "conv2d_backprop_input",
        2,
        &shape(&[1, 3, 10, 10]),
        &shape(&[3, 3, 2, 4]),
        &shape(&[1, 4, 8, 8]),
        &[1, 1],
        &[1, 1],
        &Padding::Valid,
        TensorFormat::Nchw,
    )
    .expect_err("depth mismatch should return an error");
    assert!(err.to_string().contains("evenly divisible"), "unexpected error: {err}");
}

#[test]
fn attribute_lengths_must_match_the_rank() {
    let err = conv_backprop_compute_dimensions_v2(
        "conv2d_backprop_input",
        2,
        &shape(&[1, 1, 10, 10]),
        &shape(&[3, 3, 1, 1]),
        &shape(&[1, 1, 8, 8]),
        &[1, 1],
        &[1],
        &Padding::Valid,
        TensorFormat::Nchw,
    )
    .expect_err("short strides should return an error");
    assert!(err.to_string().contains("expected 2 strides"), "unexpected error: {err}");

    let err = conv_backprop_compute_dimensions_v2(
        "conv2d_backprop_input",
        2,
        &shape(&[1, 1, 10, 10]),
        &shape(&[3, 3, 1, 1]),
        &shape(&[1, 1, 8, 8]),
        &[1, 1],
        &[1, 1],
        &Padding::Explicit(vec![(0, 0)]),
        TensorFormat::Nchw,
    )
    .expect_err("short explicit padding should return an error");
    assert!(
        err.to_string().contains("explicit padding pairs"),
        "unexpected error: {err}"
    );
}

#[test]
fn zero_stride_is_rejected() {
    let err = conv_backprop_compute_dimensions_v2(
        "conv2d_backprop_input",
        2,
        &shape(&[1, 1, 10, 10]),
        &shape(&[3, 3, 1, 1]),
        &shape(&[1, 1, 8, 8]),
        &[1, 1],
        &[0, 1],
        &Padding::Valid,
        TensorFormat::Nchw,
    )
    .expect_err("zero stride should return an error");
    assert!(err.to_string().contains("stride must be > 0"), "unexpected error: {err}");
}
