//! Host-memory transfer client.

use std::sync::Arc;

use tensorlink::client::{TensorSource, TransferClient};
use tensorlink::device::Device;
use tensorlink::error::Result;
use tensorlink::literal::Literal;
use tensorlink::tensor::HostArray;

/// Device data held by [`CpuClient`]: the populated literal plus the
/// device it was addressed to.
#[derive(Clone, Debug)]
pub struct CpuData {
    device: Device,
    literal: Literal,
}

impl CpuData {
    pub fn device(&self) -> Device {
        self.device
    }

    pub fn literal(&self) -> &Literal {
        &self.literal
    }
}

/// Transfer client that populates every source into host memory.
#[derive(Clone, Debug, Default)]
pub struct CpuClient;

impl CpuClient {
    pub fn new() -> Self {
        CpuClient
    }
}

impl TransferClient for CpuClient {
    type Data = Arc<CpuData>;

    fn transfer_to_server<A: HostArray>(
        &self,
        sources: &[TensorSource<'_, A>],
    ) -> Result<Vec<Self::Data>> {
        Ok(sources
            .iter()
            .map(|source| {
                Arc::new(CpuData {
                    device: source.device(),
                    literal: Literal::from_bytes(source.shape().clone(), source.populate()),
                })
            })
            .collect())
    }
}
