//! Tensor types and operations for the CPU generation session
//!
//! Weights keep the precision they were serialized with; every operation
//! computes in f32 and returns f32 tensors.

mod dtype;
pub mod ops;
pub mod view;

pub use dtype::DType;
pub use view::{EngineBuffer, EngineTensors};

use crate::{Error, Result};
use std::sync::Arc;

/// A tensor with owned, shareable data
#[derive(Debug, Clone)]
pub struct Tensor {
    /// Raw little-endian data buffer
    data: Arc<Vec<u8>>,
    /// Data type
    dtype: DType,
    /// Shape (dimensions)
    shape: Vec<usize>,
}

impl Tensor {
    /// Create a new tensor from raw bytes
    pub fn from_bytes(data: Vec<u8>, dtype: DType, shape: Vec<usize>) -> Result<Self> {
        let expected_bytes = shape.iter().product::<usize>() * dtype.size_of();
        if data.len() != expected_bytes {
            return Err(Error::ShapeMismatch {
                expected: vec![expected_bytes],
                got: vec![data.len()],
            });
        }

        Ok(Self {
            data: Arc::new(data),
            dtype,
            shape,
        })
    }

    /// Create an f32 tensor from a slice
    pub fn from_f32(data: &[f32], shape: Vec<usize>) -> Result<Self> {
        let numel: usize = shape.iter().product();
        if data.len() != numel {
            return Err(Error::ShapeMismatch {
                expected: vec![numel],
                got: vec![data.len()],
            });
        }

        let bytes = bytemuck::cast_slice::<f32, u8>(data).to_vec();
        Self::from_bytes(bytes, DType::F32, shape)
    }

    /// Decode the buffer into f32 values
    pub fn to_f32_vec(&self) -> Result<Vec<f32>> {
        let bytes = self.as_bytes();
        let values = match self.dtype {
            DType::F32 => bytes
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
            DType::F16 => bytes
                .chunks_exact(2)
                .map(|b| half::f16::from_le_bytes([b[0], b[1]]).to_f32())
                .collect(),
            DType::BF16 => bytes
                .chunks_exact(2)
                .map(|b| half::bf16::from_le_bytes([b[0], b[1]]).to_f32())
                .collect(),
            DType::I8 | DType::I32 => {
                return Err(Error::UnsupportedDType(format!(
                    "{} tensors cannot be used as float weights",
                    self.dtype
                )))
            }
        };
        Ok(values)
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Get shape
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Get dtype
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Number of elements
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    /// Check the shape against what the model config promises
    pub fn expect_shape(&self, expected: &[usize]) -> Result<()> {
        if self.shape != expected {
            return Err(Error::ShapeMismatch {
                expected: expected.to_vec(),
                got: self.shape.clone(),
            });
        }
        Ok(())
    }
}
