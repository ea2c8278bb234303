//! Host-side tensor surface.

pub mod host;
pub mod scalar;

pub use host::{HostArray, HostScalar, HostTensor};
pub use scalar::{element_type_for_device, ScalarKind};
