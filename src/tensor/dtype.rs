//! Data types for engine tensors

use serde::{Deserialize, Serialize};

/// Supported data types for engine weights and activations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    /// 32-bit floating point
    F32,
    /// 16-bit floating point (IEEE 754)
    F16,
    /// 16-bit brain floating point
    BF16,
    /// 8-bit signed integer
    I8,
    /// 32-bit signed integer (token ids)
    I32,
}

impl DType {
    /// Size in bytes of a single element
    pub fn size_of(&self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F16 => 2,
            DType::BF16 => 2,
            DType::I8 => 1,
            DType::I32 => 4,
        }
    }

    /// Map a safetensors dtype onto ours
    pub fn from_safetensors(dtype: safetensors::Dtype) -> Option<Self> {
        match dtype {
            safetensors::Dtype::F32 => Some(DType::F32),
            safetensors::Dtype::F16 => Some(DType::F16),
            safetensors::Dtype::BF16 => Some(DType::BF16),
            safetensors::Dtype::I8 => Some(DType::I8),
            safetensors::Dtype::I32 => Some(DType::I32),
            _ => None,
        }
    }

    /// Parse the `precision` string of an engine's builder config
    pub fn from_precision(precision: &str) -> Option<Self> {
        match precision {
            "float32" | "fp32" => Some(DType::F32),
            "float16" | "fp16" => Some(DType::F16),
            "bfloat16" | "bf16" => Some(DType::BF16),
            "int8" => Some(DType::I8),
            _ => None,
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
