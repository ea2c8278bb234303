//! The host-to-device transfer boundary.

use crate::device::Device;
use crate::error::Result;
use crate::marshal;
use crate::shape::Shape;
use crate::tensor::host::zeroed_bytes;
use crate::tensor::HostArray;

/// One pending host-to-device transfer: the destination shape and device
/// plus the host tensor whose elements back it.
///
/// Population is pure. The transfer service decides when to call
/// [`TensorSource::populate`] and owns the resulting buffer; nothing is
/// written into caller-visible state.
pub struct TensorSource<'a, A> {
    shape: Shape,
    device: Device,
    tensor: &'a A,
}

impl<'a, A: HostArray> TensorSource<'a, A> {
    pub fn new(shape: Shape, device: Device, tensor: &'a A) -> Self {
        TensorSource {
            shape,
            device,
            tensor,
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Serializes the host tensor into a fresh buffer laid out for the
    /// destination shape.
    pub fn populate(&self) -> Vec<u8> {
        let mut buffer = zeroed_bytes(
            self.shape.byte_len(),
            self.shape.element_type().size_in_bytes(),
        );
        marshal::populate_tensor_buffer(self.tensor, &self.shape, &mut buffer);
        buffer
    }
}

/// Batch host-to-device transfer service.
///
/// Implementations own any queuing or asynchrony; one call moves the
/// whole batch and yields one opaque handle per source, in input order.
pub trait TransferClient {
    /// Opaque reference to device-resident data.
    type Data: Clone;

    fn transfer_to_server<A: HostArray>(
        &self,
        sources: &[TensorSource<'_, A>],
    ) -> Result<Vec<Self::Data>>;
}
