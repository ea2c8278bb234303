//! Host tensor surface: the array trait the marshaling layer works
//! against and a dense reference implementation.

use std::borrow::Cow;
use std::mem::{align_of, size_of, ManuallyDrop};

use super::scalar::ScalarKind;

/// Host scalar types storable in a [`HostTensor`].
pub trait HostScalar: Copy + Default + 'static {
    const KIND: ScalarKind;
}

impl HostScalar for f32 {
    const KIND: ScalarKind = ScalarKind::F32;
}

impl HostScalar for u8 {
    const KIND: ScalarKind = ScalarKind::U8;
}

impl HostScalar for i8 {
    const KIND: ScalarKind = ScalarKind::I8;
}

impl HostScalar for i16 {
    const KIND: ScalarKind = ScalarKind::I16;
}

impl HostScalar for i32 {
    const KIND: ScalarKind = ScalarKind::I32;
}

impl HostScalar for i64 {
    const KIND: ScalarKind = ScalarKind::I64;
}

/// Capabilities the marshaling layer needs from a host tensor.
///
/// Implementations wrap whatever array object the embedding framework
/// uses. Element storage is exposed as dense row-major bytes, aligned
/// for the element type; `dims` are the logical extents.
pub trait HostArray: Sized {
    /// Element type tag of the stored data.
    fn scalar_kind(&self) -> ScalarKind;

    /// Logical dimension extents.
    fn dims(&self) -> Vec<usize>;

    /// The elements as one dense row-major buffer, copying only when the
    /// underlying storage is not already contiguous.
    fn contiguous_bytes(&self) -> Cow<'_, [u8]>;

    /// Builds an array from a dense row-major buffer.
    fn from_dense(kind: ScalarKind, dims: &[usize], bytes: Vec<u8>) -> Self;
}

/// Dense host tensor backing tests and standalone use.
#[derive(Clone, Debug, PartialEq)]
pub struct HostTensor {
    kind: ScalarKind,
    dims: Vec<usize>,
    data: Vec<u8>,
}

impl HostTensor {
    /// Constructs a tensor from typed values, validating the length
    /// against the extents.
    pub fn from_vec<T: HostScalar>(dims: &[usize], data: Vec<T>) -> Self {
        let expected: usize = dims.iter().product();
        assert_eq!(
            data.len(),
            expected,
            "tensor data length {} does not match dims {:?}",
            data.len(),
            dims
        );
        HostTensor {
            kind: T::KIND,
            dims: dims.to_vec(),
            data: vec_into_bytes(data),
        }
    }

    /// Zero-filled tensor of the given kind and extents.
    pub fn zeros(kind: ScalarKind, dims: &[usize]) -> Self {
        let len: usize = dims.iter().product();
        let data = match kind {
            ScalarKind::F32 => vec_into_bytes(vec![0.0f32; len]),
            ScalarKind::U8 => vec![0u8; len],
            ScalarKind::I8 => vec_into_bytes(vec![0i8; len]),
            ScalarKind::I16 => vec_into_bytes(vec![0i16; len]),
            ScalarKind::I32 => vec_into_bytes(vec![0i32; len]),
            ScalarKind::I64 => vec_into_bytes(vec![0i64; len]),
        };
        HostTensor {
            kind,
            dims: dims.to_vec(),
            data,
        }
    }

    pub fn kind(&self) -> ScalarKind {
        self.kind
    }

    /// Typed view of the elements. Panics when `T` does not match the
    /// tensor's scalar kind.
    pub fn data<T: HostScalar>(&self) -> &[T] {
        assert_eq!(
            T::KIND,
            self.kind,
            "requested {:?} view of a {:?} tensor",
            T::KIND,
            self.kind
        );
        bytes_as_slice(&self.data)
    }
}

impl HostArray for HostTensor {
    fn scalar_kind(&self) -> ScalarKind {
        self.kind
    }

    fn dims(&self) -> Vec<usize> {
        self.dims.clone()
    }

    fn contiguous_bytes(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(&self.data)
    }

    fn from_dense(kind: ScalarKind, dims: &[usize], bytes: Vec<u8>) -> Self {
        let expected = dims.iter().product::<usize>() * kind.size_in_bytes();
        assert_eq!(
            bytes.len(),
            expected,
            "dense buffer length {} does not match {:?} dims {:?}",
            bytes.len(),
            kind,
            dims
        );
        HostTensor {
            kind,
            dims: dims.to_vec(),
            data: realign(kind, bytes),
        }
    }
}

pub(crate) fn vec_into_bytes<T>(data: Vec<T>) -> Vec<u8> {
    let mut data = ManuallyDrop::new(data);
    let ptr = data.as_mut_ptr() as *mut u8;
    let len = data.len() * size_of::<T>();
    let cap = data.capacity() * size_of::<T>();
    unsafe { Vec::from_raw_parts(ptr, len, cap) }
}

pub(crate) fn bytes_as_slice<T>(bytes: &[u8]) -> &[T] {
    assert_eq!(
        bytes.len() % size_of::<T>(),
        0,
        "byte length {} is not a multiple of element size {}",
        bytes.len(),
        size_of::<T>()
    );
    assert_eq!(
        bytes.as_ptr() as usize % align_of::<T>(),
        0,
        "byte buffer is not aligned for the element type"
    );
    unsafe { std::slice::from_raw_parts(bytes.as_ptr() as *const T, bytes.len() / size_of::<T>()) }
}

pub(crate) fn bytes_as_slice_mut<T>(bytes: &mut [u8]) -> &mut [T] {
    assert_eq!(
        bytes.len() % size_of::<T>(),
        0,
        "byte length {} is not a multiple of element size {}",
        bytes.len(),
        size_of::<T>()
    );
    assert_eq!(
        bytes.as_ptr() as usize % align_of::<T>(),
        0,
        "byte buffer is not aligned for the element type"
    );
    unsafe {
        std::slice::from_raw_parts_mut(bytes.as_mut_ptr() as *mut T, bytes.len() / size_of::<T>())
    }
}

/// Zero-filled byte buffer aligned for elements of `align` bytes.
pub(crate) fn zeroed_bytes(len: usize, align: usize) -> Vec<u8> {
    debug_assert_eq!(len % align, 0);
    match align {
        1 => vec![0u8; len],
        2 => vec_into_bytes(vec![0u16; len / 2]),
        4 => vec_into_bytes(vec![0u32; len / 4]),
        8 => vec_into_bytes(vec![0u64; len / 8]),
        _ => panic!("unsupported element alignment {align}"),
    }
}

// Typed views assert element alignment; rebuild the buffer in a typed
// allocation when the incoming one misses it.
fn realign(kind: ScalarKind, bytes: Vec<u8>) -> Vec<u8> {
    if bytes.as_ptr() as usize % kind.size_in_bytes() == 0 {
        return bytes;
    }
    let mut out = zeroed_bytes(bytes.len(), kind.size_in_bytes());
    out.copy_from_slice(&bytes);
    out
}
