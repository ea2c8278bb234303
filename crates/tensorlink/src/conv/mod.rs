//! Convolution geometry and lowering.

pub mod backprop;
pub mod build;
pub mod format;

pub use backprop::{
    conv_backprop_compute_dimensions_v2, ConvBackpropDimensions, ConvBackpropSpatialDimension,
    Padding,
};
pub use build::{
    build_convolution_backward_overrideable, build_convolution_overrideable,
    build_convolution_overrideable_bias, make_backprop_filter_conv_op,
    make_backprop_input_conv_op, ConvGrads, ConvOpAttrs,
};
pub use format::TensorFormat;
