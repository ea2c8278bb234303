//! Host-side element tags and their device-type mappings.

use serde::{Deserialize, Serialize};

use crate::shape::ElementType;

/// Element types host tensors may carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarKind {
    F32,
    U8,
    I8,
    I16,
    I32,
    I64,
}

impl ScalarKind {
    pub fn size_in_bytes(self) -> usize {
        match self {
            ScalarKind::U8 | ScalarKind::I8 => 1,
            ScalarKind::I16 => 2,
            ScalarKind::F32 | ScalarKind::I32 => 4,
            ScalarKind::I64 => 8,
        }
    }

    /// The natural device element type for this host type.
    pub fn element_type(self) -> ElementType {
        match self {
            ScalarKind::F32 => ElementType::F32,
            ScalarKind::U8 => ElementType::Ui8,
            ScalarKind::I8 => ElementType::Si8,
            ScalarKind::I16 => ElementType::Si16,
            ScalarKind::I32 => ElementType::Si32,
            ScalarKind::I64 => ElementType::Si64,
        }
    }

    /// The host type literals of `element_type` read back as.
    ///
    /// Reduced-precision floats promote to f32; every other type maps to
    /// its same-width host type.
    pub fn from_element_type(element_type: ElementType) -> ScalarKind {
        match element_type {
            ElementType::Bf16 | ElementType::F32 => ScalarKind::F32,
            ElementType::Ui8 => ScalarKind::U8,
            ElementType::Si8 => ScalarKind::I8,
            ElementType::Si16 => ScalarKind::I16,
            ElementType::Si32 => ScalarKind::I32,
            ElementType::Si64 => ScalarKind::I64,
        }
    }
}

/// Device element type used when marshaling host data of `kind`. With
/// the bf16 switch on, f32 host data is stored as bf16 on device.
pub fn element_type_for_device(kind: ScalarKind, use_bf16: bool) -> ElementType {
    match kind {
        ScalarKind::F32 if use_bf16 => ElementType::Bf16,
        _ => kind.element_type(),
    }
}
