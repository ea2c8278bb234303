//! Device-side array shapes: element type, extents, and memory layout.

use serde::{Deserialize, Serialize};

/// Element types representable in device literals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    Ui8,
    Si8,
    Si16,
    Si32,
    Si64,
    F32,
    Bf16,
}

impl ElementType {
    /// Storage size of one element.
    pub fn size_in_bytes(self) -> usize {
        match self {
            ElementType::Ui8 | ElementType::Si8 => 1,
            ElementType::Si16 | ElementType::Bf16 => 2,
            ElementType::Si32 | ElementType::F32 => 4,
            ElementType::Si64 => 8,
        }
    }

    pub fn is_floating(self) -> bool {
        matches!(self, ElementType::F32 | ElementType::Bf16)
    }
}

/// An array shape with an explicit minor-to-major memory layout.
///
/// `minor_to_major()[0]` names the dimension whose elements sit next to
/// each other in memory; the last entry names the slowest-varying one.
/// The descending layout `[rank-1, .., 1, 0]` is the dense row-major
/// arrangement host tensors use.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    element_type: ElementType,
    dims: Vec<usize>,
    minor_to_major: Vec<usize>,
}

impl Shape {
    /// Builds a shape with the descending (row-major) layout.
    pub fn with_descending_layout(element_type: ElementType, dims: &[usize]) -> Self {
        let minor_to_major = (0..dims.len()).rev().collect();
        Shape {
            element_type,
            dims: dims.to_vec(),
            minor_to_major,
        }
    }

    /// Builds a shape with an explicit minor-to-major layout.
    ///
    /// Panics when `minor_to_major` is not a permutation of the
    /// dimension indices.
    pub fn with_layout(element_type: ElementType, dims: &[usize], minor_to_major: &[usize]) -> Self {
        assert!(
            is_permutation(minor_to_major, dims.len()),
            "layout {:?} is not a permutation of 0..{}",
            minor_to_major,
            dims.len()
        );
        Shape {
            element_type,
            dims: dims.to_vec(),
            minor_to_major: minor_to_major.to_vec(),
        }
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Dimension indices ordered minor to major. Also the order the copy
    /// engine walks destination elements in.
    pub fn minor_to_major(&self) -> &[usize] {
        &self.minor_to_major
    }

    /// Total number of elements; a rank-0 shape holds one.
    pub fn element_count(&self) -> usize {
        self.dims
            .iter()
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
            .unwrap_or_else(|| panic!("element count overflows usize for dims {:?}", self.dims))
    }

    /// Buffer size in bytes of a dense literal of this shape.
    pub fn byte_len(&self) -> usize {
        self.element_count() * self.element_type.size_in_bytes()
    }

    /// Per-dimension strides in elements, derived from the layout: the
    /// stride of a dimension is the product of the extents of all
    /// dimensions more minor than it.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![0usize; self.dims.len()];
        let mut stride = 1usize;
        for &dim in &self.minor_to_major {
            strides[dim] = stride;
            stride *= self.dims[dim];
        }
        strides
    }

    /// Same dimension extents; element types and layouts are ignored.
    pub fn compatible_ignoring_element_type(&self, other: &Shape) -> bool {
        self.dims == other.dims
    }

    /// Same extents and layout, with element types either equal or both
    /// floating point.
    pub fn equal_ignoring_fp_precision(&self, other: &Shape) -> bool {
        self.dims == other.dims
            && self.minor_to_major == other.minor_to_major
            && (self.element_type == other.element_type
                || (self.element_type.is_floating() && other.element_type.is_floating()))
    }
}

fn is_permutation(layout: &[usize], rank: usize) -> bool {
    if layout.len() != rank {
        return false;
    }
    let mut seen = vec![false; rank];
    for &dim in layout {
        if dim >= rank || seen[dim] {
            return false;
        }
        seen[dim] = true;
    }
    true
}

/// A device program shape: a single array or a flat tuple of arrays.
///
/// Tuples appear at computation boundaries for multi-result programs;
/// the operations that consume components reject nested tuples.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceShape {
    Array(Shape),
    Tuple(Vec<DeviceShape>),
}

impl DeviceShape {
    pub fn is_tuple(&self) -> bool {
        matches!(self, DeviceShape::Tuple(_))
    }
}
