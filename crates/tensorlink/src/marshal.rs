//! Host tensor / device literal marshaling and the transfer entry
//! points built on top of it.

use half::bf16;

use crate::client::{TensorSource, TransferClient};
use crate::copy::{copy_tensors, ConvertElement};
use crate::device::Device;
use crate::env;
use crate::error::Result;
use crate::layout::LayoutPolicy;
use crate::literal::Literal;
use crate::shape::{ElementType, Shape};
use crate::tensor::host::{bytes_as_slice, bytes_as_slice_mut, zeroed_bytes};
use crate::tensor::scalar::element_type_for_device;
use crate::tensor::{HostArray, ScalarKind};

/// Serializes `tensor` into `dest_buffer` using the destination shape's
/// element type and layout.
///
/// Supported pairings: f32 host data feeds `F32` or `Bf16` destinations;
/// each integer kind feeds its same-width destination. Pairing the
/// buffer with any other element type trips the copy engine's
/// buffer-size check and panics.
pub fn populate_tensor_buffer<A: HostArray>(tensor: &A, dest_shape: &Shape, dest_buffer: &mut [u8]) {
    match (tensor.scalar_kind(), dest_shape.element_type()) {
        (ScalarKind::F32, ElementType::Bf16) => {
            tensor_to_buffer::<f32, bf16, A>(tensor, dest_shape, dest_buffer)
        }
        (ScalarKind::F32, _) => tensor_to_buffer::<f32, f32, A>(tensor, dest_shape, dest_buffer),
        (ScalarKind::U8, _) => tensor_to_buffer::<u8, u8, A>(tensor, dest_shape, dest_buffer),
        (ScalarKind::I8, _) => tensor_to_buffer::<i8, i8, A>(tensor, dest_shape, dest_buffer),
        (ScalarKind::I16, _) => tensor_to_buffer::<i16, i16, A>(tensor, dest_shape, dest_buffer),
        (ScalarKind::I32, _) => tensor_to_buffer::<i32, i32, A>(tensor, dest_shape, dest_buffer),
        (ScalarKind::I64, _) => tensor_to_buffer::<i64, i64, A>(tensor, dest_shape, dest_buffer),
    }
}

fn tensor_to_buffer<S, D, A>(tensor: &A, dest_shape: &Shape, dest_buffer: &mut [u8])
where
    S: Copy,
    D: ConvertElement<S>,
    A: HostArray,
{
    let bytes = tensor.contiguous_bytes();
    let src_shape =
        Shape::with_descending_layout(tensor.scalar_kind().element_type(), &tensor.dims());
    let dest_buffer_size = dest_buffer.len();
    copy_tensors::<S, D>(
        bytes_as_slice::<S>(&bytes),
        &src_shape,
        bytes_as_slice_mut::<D>(dest_buffer),
        dest_buffer_size,
        dest_shape,
    );
}

/// Builds a literal for `tensor`, using `shape` when given or the
/// tensor's natural descending-layout shape otherwise.
pub fn get_tensor_literal<A: HostArray>(tensor: &A, shape: Option<&Shape>) -> Literal {
    let natural;
    let shape = match shape {
        Some(shape) => shape,
        None => {
            natural = Shape::with_descending_layout(
                tensor.scalar_kind().element_type(),
                &tensor.dims(),
            );
            &natural
        }
    };
    let mut buffer = zeroed_bytes(shape.byte_len(), shape.element_type().size_in_bytes());
    populate_tensor_buffer(tensor, shape, &mut buffer);
    Literal::from_bytes(shape.clone(), buffer)
}

/// Rebuilds a host tensor from a literal.
///
/// The result is dense row-major. Reduced-precision float literals
/// promote to f32 host data; every other element type maps to its
/// same-width host type.
pub fn make_tensor_from_literal<A: HostArray>(literal: &Literal) -> A {
    match literal.shape().element_type() {
        ElementType::Bf16 => literal_to_tensor::<bf16, f32, A>(literal),
        ElementType::F32 => literal_to_tensor::<f32, f32, A>(literal),
        ElementType::Ui8 => literal_to_tensor::<u8, u8, A>(literal),
        ElementType::Si8 => literal_to_tensor::<i8, i8, A>(literal),
        ElementType::Si16 => literal_to_tensor::<i16, i16, A>(literal),
        ElementType::Si32 => literal_to_tensor::<i32, i32, A>(literal),
        ElementType::Si64 => literal_to_tensor::<i64, i64, A>(literal),
    }
}

fn literal_to_tensor<S, D, A>(literal: &Literal) -> A
where
    S: Copy,
    D: ConvertElement<S>,
    A: HostArray,
{
    let kind = ScalarKind::from_element_type(literal.shape().element_type());
    let dims = literal.shape().dims().to_vec();
    let dest_shape = Shape::with_descending_layout(kind.element_type(), &dims);
    let mut buffer = zeroed_bytes(dest_shape.byte_len(), kind.size_in_bytes());
    let buffer_size = buffer.len();
    copy_tensors::<S, D>(
        bytes_as_slice::<S>(literal.bytes()),
        literal.shape(),
        bytes_as_slice_mut::<D>(&mut buffer),
        buffer_size,
        &dest_shape,
    );
    A::from_dense(kind, &dims, buffer)
}

/// Device shape a host tensor marshals to: the layout the policy picks
/// plus the process-wide bf16 switch applied to the element type.
pub fn shape_for_device<A: HostArray>(tensor: &A, device: Device, policy: &LayoutPolicy) -> Shape {
    let element_type = element_type_for_device(tensor.scalar_kind(), env::use_bf16());
    policy.array_shape(element_type, &tensor.dims(), device.kind)
}

/// Transfers one tensor under a caller-supplied device shape and returns
/// its data handle.
///
/// The batch holds a single source; a service answering with anything
/// but one handle violates the transfer contract and panics.
pub fn tensor_to_device_data_with_shape<A, C>(
    client: &C,
    tensor: &A,
    shape: Shape,
    device: Device,
) -> Result<C::Data>
where
    A: HostArray,
    C: TransferClient,
{
    let sources = vec![TensorSource::new(shape, device, tensor)];
    let mut handles = client.transfer_to_server(&sources)?;
    assert_eq!(
        handles.len(),
        1,
        "transfer returned {} handles for one source",
        handles.len()
    );
    Ok(handles.remove(0))
}

/// Transfers one tensor under the device shape the policy picks for it.
pub fn tensor_to_device_data<A, C>(
    client: &C,
    policy: &LayoutPolicy,
    tensor: &A,
    device: Device,
) -> Result<C::Data>
where
    A: HostArray,
    C: TransferClient,
{
    let shape = shape_for_device(tensor, device, policy);
    tensor_to_device_data_with_shape(client, tensor, shape, device)
}

/// Batched transfer: one source per tensor/device pair, one service
/// call, handles in input order. Length mismatch between the slices is
/// fatal.
pub fn create_tensors_data<A, C>(
    client: &C,
    policy: &LayoutPolicy,
    tensors: &[A],
    devices: &[Device],
) -> Result<Vec<C::Data>>
where
    A: HostArray,
    C: TransferClient,
{
    assert_eq!(
        tensors.len(),
        devices.len(),
        "{} tensors for {} devices",
        tensors.len(),
        devices.len()
    );
    let sources: Vec<TensorSource<'_, A>> = tensors
        .iter()
        .zip(devices.iter())
        .map(|(tensor, device)| {
            TensorSource::new(shape_for_device(tensor, *device, policy), *device, tensor)
        })
        .collect();
    client.transfer_to_server(&sources)
}
