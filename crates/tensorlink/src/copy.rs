//! Relayouts dense buffers between arbitrary minor-to-major layouts.

use half::bf16;

use crate::shape::Shape;

/// Element conversion applied while copying between buffers.
///
/// The blanket identity implementation lowers contiguous runs to block
/// copies; the mixed-precision pairs convert one element at a time.
pub trait ConvertElement<S: Copy>: Copy {
    fn convert(value: S) -> Self;

    /// Converts a contiguous run; both slices must have equal length.
    fn convert_slice(dest: &mut [Self], src: &[S]) {
        for (d, s) in dest.iter_mut().zip(src.iter()) {
            *d = Self::convert(*s);
        }
    }
}

impl<T: Copy> ConvertElement<T> for T {
    fn convert(value: T) -> T {
        value
    }

    fn convert_slice(dest: &mut [T], src: &[T]) {
        dest.copy_from_slice(src);
    }
}

impl ConvertElement<f32> for bf16 {
    fn convert(value: f32) -> bf16 {
        bf16::from_f32(value)
    }
}

impl ConvertElement<bf16> for f32 {
    fn convert(value: bf16) -> f32 {
        value.to_f32()
    }
}

/// Copies `n` elements through the conversion, stepping each buffer by
/// its own stride. Unit strides on both sides collapse to one
/// contiguous-run conversion.
pub fn strided_copy<S, D>(dest: &mut [D], dest_stride: usize, src: &[S], src_stride: usize, n: usize)
where
    S: Copy,
    D: ConvertElement<S>,
{
    if n == 0 {
        return;
    }
    if dest_stride == 1 && src_stride == 1 {
        D::convert_slice(&mut dest[..n], &src[..n]);
        return;
    }
    let mut dest_index = 0;
    let mut src_index = 0;
    for _ in 0..n {
        dest[dest_index] = D::convert(src[src_index]);
        dest_index += dest_stride;
        src_index += src_stride;
    }
}

fn flat_offset(strides: &[usize], indices: &[usize]) -> usize {
    strides
        .iter()
        .zip(indices.iter())
        .map(|(stride, index)| stride * index)
        .sum()
}

/// Copies every element of `src` into `dest`, converting element types
/// and rearranging between the two layouts.
///
/// The shapes must share dimension extents, `dest_buffer_size` must be
/// the element count times the destination element size, and both
/// slices must hold exactly the element count; violations panic.
///
/// When the shapes are equal ignoring floating-point precision the copy
/// is one linear pass. Otherwise the destination is walked in its
/// minor-to-major order, one contiguous run of its most-minor dimension
/// per step, with the remaining dimensions advanced through a
/// multi-index with carry.
pub fn copy_tensors<S, D>(
    src: &[S],
    src_shape: &Shape,
    dest: &mut [D],
    dest_buffer_size: usize,
    dest_shape: &Shape,
) where
    S: Copy,
    D: ConvertElement<S>,
{
    assert!(
        src_shape.compatible_ignoring_element_type(dest_shape),
        "incompatible copy shapes: {:?} vs. {:?}",
        src_shape,
        dest_shape
    );
    let total_elements = src_shape.element_count();
    assert_eq!(
        dest_buffer_size,
        total_elements * std::mem::size_of::<D>(),
        "destination buffer size mismatch for {:?}",
        dest_shape
    );
    assert_eq!(total_elements, src.len(), "source element count mismatch");
    assert_eq!(total_elements, dest.len(), "destination element count mismatch");

    if src_shape.equal_ignoring_fp_precision(dest_shape) {
        D::convert_slice(dest, src);
    } else if total_elements > 0 {
        let src_strides = src_shape.strides();
        let dest_strides = dest_shape.strides();
        let iter_dims = dest_shape.minor_to_major();
        let inner_dim = iter_dims[0];
        let inner_len = dest_shape.dims()[inner_dim];
        let inner_src_stride = src_strides[inner_dim];
        let inner_dest_stride = dest_strides[inner_dim];
        let mut indices = vec![0usize; iter_dims.len()];
        let mut n = 0;
        while n < iter_dims.len() {
            let dest_offset = flat_offset(&dest_strides, &indices);
            let src_offset = flat_offset(&src_strides, &indices);
            strided_copy(
                &mut dest[dest_offset..],
                inner_dest_stride,
                &src[src_offset..],
                inner_src_stride,
                inner_len,
            );
            // The whole most-minor run was just copied; carry starts at
            // the next more-major dimension.
            n = 1;
            while n < iter_dims.len() {
                let dim = iter_dims[n];
                indices[dim] += 1;
                if indices[dim] < dest_shape.dims()[dim] {
                    break;
                }
                indices[dim] = 0;
                n += 1;
            }
        }
    }
}
