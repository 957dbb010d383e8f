use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Placement of one model instance. CPU doubles as the "no device" case.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda { device_id: u32 },
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda { device_id } => write!(f, "gpu{device_id}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DType {
    F32,
    F16,
    I64,
    I32,
    U8,
}

impl DType {
    pub fn byte_size(self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F16 => 2,
            DType::I64 => 8,
            DType::I32 => 4,
            DType::U8 => 1,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::F32 => "f32",
            DType::F16 => "f16",
            DType::I64 => "i64",
            DType::I32 => "i32",
            DType::U8 => "u8",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape(pub SmallVec<[usize; 6]>);

impl Shape {
    pub fn from_slice(d: &[usize]) -> Self {
        Self(d.iter().copied().collect())
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn numel(&self) -> usize {
        self.0.iter().product::<usize>().max(1)
    }

    /// Same shape with `dim` prepended, e.g. to add a batch dimension.
    pub fn with_leading(&self, dim: usize) -> Self {
        let mut dims = SmallVec::with_capacity(self.0.len() + 1);
        dims.push(dim);
        dims.extend(self.0.iter().copied());
        Self(dims)
    }
}

/// A host tensor: every buffer this crate marshals lives in host memory;
/// device residency is the engine's concern behind its session interface.
#[derive(Clone, Debug)]
pub struct Tensor {
    pub dtype: DType,
    pub shape: Shape,
    pub bytes: Bytes,
}

impl Tensor {
    pub fn new(dtype: DType, shape: Shape, bytes: Bytes) -> Self {
        Self {
            dtype,
            shape,
            bytes,
        }
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_numel_and_rank() {
        let s = Shape::from_slice(&[2, 3, 4]);
        assert_eq!(s.rank(), 3);
        assert_eq!(s.numel(), 24);

        // Scalar shapes count one element.
        assert_eq!(Shape::from_slice(&[]).numel(), 1);
    }

    #[test]
    fn shape_with_leading_prepends() {
        let s = Shape::from_slice(&[3]).with_leading(8);
        assert_eq!(s, Shape::from_slice(&[8, 3]));
    }

    #[test]
    fn dtype_byte_sizes() {
        assert_eq!(DType::F32.byte_size(), 4);
        assert_eq!(DType::F16.byte_size(), 2);
        assert_eq!(DType::I64.byte_size(), 8);
        assert_eq!(DType::U8.byte_size(), 1);
    }
}
