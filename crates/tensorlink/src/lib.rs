pub mod client;
pub mod conv;
pub mod copy;
pub mod device;
mod env;
pub mod error;
pub mod ir;
pub mod layout;
pub mod literal;
pub mod marshal;
pub mod shape;
pub mod tensor;

pub use client::{TensorSource, TransferClient};
pub use device::{Device, DeviceKind};
pub use error::{Error, Result};
pub use ir::OpBuilder;
pub use layout::LayoutPolicy;
pub use literal::Literal;
pub use shape::{DeviceShape, ElementType, Shape};
pub use tensor::{HostArray, HostTensor, ScalarKind};
