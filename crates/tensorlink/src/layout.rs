//! Layout selection for shapes bound to a device.

use std::collections::HashMap;

use crate::device::DeviceKind;
use crate::shape::{DeviceShape, ElementType, Shape};

/// Chooses device-side layouts when marshaling host tensors.
///
/// The default policy keeps the descending (row-major) layout everywhere
/// except rank-4 shapes bound for `Tpu` devices, which get `[0, 1, 3, 2]`
/// so the two trailing logical dimensions swap places in memory.
#[derive(Clone, Debug)]
pub struct LayoutPolicy {
    rank4_overrides: HashMap<DeviceKind, [usize; 4]>,
}

impl Default for LayoutPolicy {
    fn default() -> Self {
        let mut rank4_overrides = HashMap::new();
        rank4_overrides.insert(DeviceKind::Tpu, [0, 1, 3, 2]);
        LayoutPolicy { rank4_overrides }
    }
}

impl LayoutPolicy {
    /// A policy that selects the descending layout for everything.
    pub fn descending_only() -> Self {
        LayoutPolicy {
            rank4_overrides: HashMap::new(),
        }
    }

    /// Overrides the layout applied to rank-4 shapes on `kind` devices.
    pub fn with_rank4_override(mut self, kind: DeviceKind, minor_to_major: [usize; 4]) -> Self {
        self.rank4_overrides.insert(kind, minor_to_major);
        self
    }

    /// Shape of an array with `dims` when it lives on a `kind` device.
    pub fn array_shape(&self, element_type: ElementType, dims: &[usize], kind: DeviceKind) -> Shape {
        if dims.len() == 4 {
            if let Some(layout) = self.rank4_overrides.get(&kind) {
                return Shape::with_layout(element_type, dims, layout);
            }
        }
        Shape::with_descending_layout(element_type, dims)
    }
}

/// Returns the component array shapes of `shape`: the shape itself for
/// an array, the components in order for a tuple.
///
/// Tuple shapes must be flat; a nested tuple is a contract violation and
/// panics.
pub fn get_component_shapes(shape: &DeviceShape) -> Vec<Shape> {
    match shape {
        DeviceShape::Array(array) => vec![array.clone()],
        DeviceShape::Tuple(components) => components
            .iter()
            .map(|component| match component {
                DeviceShape::Array(array) => array.clone(),
                DeviceShape::Tuple(_) => panic!("nested tuple shape: {:?}", shape),
            })
            .collect(),
    }
}

/// Rewrites every component of `shape` with the layout the policy picks
/// for `kind`, preserving extents and element types.
///
/// Multi-component inputs come back as a flat tuple; single components
/// come back as a bare array shape. Empty tuples panic.
pub fn make_shape_with_device_layout(
    shape: &DeviceShape,
    kind: DeviceKind,
    policy: &LayoutPolicy,
) -> DeviceShape {
    let components = get_component_shapes(shape);
    assert!(!components.is_empty(), "empty tuple shape");
    let mut mapped: Vec<Shape> = components
        .iter()
        .map(|component| policy.array_shape(component.element_type(), component.dims(), kind))
        .collect();
    if mapped.len() == 1 {
        DeviceShape::Array(mapped.remove(0))
    } else {
        DeviceShape::Tuple(mapped.into_iter().map(DeviceShape::Array).collect())
    }
}
