//! Engine buffers and the tensors serialized inside them

use super::{DType, Tensor};
use crate::{Error, Result};
use memmap2::Mmap;
use safetensors::SafeTensors;
use std::path::Path;

/// Serialized engine bytes, memory-mapped from disk
pub struct EngineBuffer {
    mmap: Mmap,
}

impl EngineBuffer {
    /// Map an engine file into memory
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        // SAFETY: the engine file is read-only input; nothing in this process writes it
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self { mmap })
    }

    /// Raw engine bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap
    }

    /// Size of the engine in bytes
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Whether the engine file is empty
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}

/// Named tensors parsed out of an engine buffer (zero-copy until `get`)
pub struct EngineTensors<'a> {
    inner: SafeTensors<'a>,
}

impl<'a> EngineTensors<'a> {
    /// Parse the safetensors header of an engine buffer
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        let inner = SafeTensors::deserialize(buffer)?;
        Ok(Self { inner })
    }

    /// Tensor names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.names().into_iter().cloned().collect();
        names.sort();
        names
    }

    /// Check if tensor exists
    pub fn contains(&self, name: &str) -> bool {
        self.inner.tensor(name).is_ok()
    }

    /// Copy a tensor out of the buffer
    pub fn get(&self, name: &str) -> Result<Tensor> {
        let view = self
            .inner
            .tensor(name)
            .map_err(|_| Error::TensorNotFound(name.to_string()))?;

        let dtype = DType::from_safetensors(view.dtype())
            .ok_or_else(|| Error::UnsupportedDType(format!("{:?}", view.dtype())))?;

        Tensor::from_bytes(view.data().to_vec(), dtype, view.shape().to_vec())
    }
}
