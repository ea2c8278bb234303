//! Dense literal payloads exchanged with the device.

use std::sync::Arc;

use serde::{ser::SerializeStruct, Deserialize, Serialize};

use crate::shape::Shape;

/// A device literal: a shape plus the dense bytes backing it.
///
/// The bytes are laid out in the shape's minor-to-major order. Clones
/// share the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Literal {
    shape: Shape,
    bytes: Arc<[u8]>,
}

impl Literal {
    /// Wraps a populated buffer. The buffer length must match the
    /// shape's byte length exactly; anything else panics.
    pub fn from_bytes(shape: Shape, bytes: Vec<u8>) -> Self {
        assert_eq!(
            bytes.len(),
            shape.byte_len(),
            "literal buffer length {} does not match shape {:?}",
            bytes.len(),
            shape
        );
        Literal {
            shape,
            bytes: Arc::<[u8]>::from(bytes),
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }
}

impl Serialize for Literal {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("Literal", 2)?;
        state.serialize_field("shape", &self.shape)?;
        state.serialize_field("bytes", &self.bytes.as_ref())?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for Literal {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct LiteralHelper {
            shape: Shape,
            bytes: Vec<u8>,
        }

        let helper = LiteralHelper::deserialize(deserializer)?;
        if helper.bytes.len() != helper.shape.byte_len() {
            return Err(serde::de::Error::custom(format!(
                "literal buffer length {} does not match shape {:?}",
                helper.bytes.len(),
                helper.shape
            )));
        }
        Ok(Literal {
            shape: helper.shape,
            bytes: Arc::<[u8]>::from(helper.bytes),
        })
    }
}
