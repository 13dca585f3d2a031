//! Runtime world layout: how many ranks exist and which one we are

use crate::{Error, Result};

/// Number of ranks launched and this process's rank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorldConfig {
    pub size: usize,
    pub rank: usize,
}

impl WorldConfig {
    /// A single-process world
    pub fn single() -> Self {
        Self { size: 1, rank: 0 }
    }

    /// Read the world layout exported by the launcher
    ///
    /// MPI launchers export `OMPI_COMM_WORLD_*`; torchrun-style launchers
    /// export `WORLD_SIZE`/`RANK`. Without either this is a single process.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`WorldConfig::from_env`], reading variables through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let size = first_usize(&lookup, &["OMPI_COMM_WORLD_SIZE", "WORLD_SIZE"])?.unwrap_or(1);
        let rank = first_usize(&lookup, &["OMPI_COMM_WORLD_RANK", "RANK"])?.unwrap_or(0);

        if size == 0 || rank >= size {
            return Err(Error::Config(format!(
                "invalid world layout: rank {} of {}",
                rank, size
            )));
        }
        Ok(Self { size, rank })
    }
}

fn first_usize<F>(lookup: &F, keys: &[&str]) -> Result<Option<usize>>
where
    F: Fn(&str) -> Option<String>,
{
    for key in keys {
        if let Some(value) = lookup(key) {
            let parsed = value
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("{}={:?} is not a number", key, value)))?;
            return Ok(Some(parsed));
        }
    }
    Ok(None)
}

/// Placement of this rank within the tensor-parallel group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    pub world_size: usize,
    pub rank: usize,
    pub tp_size: usize,
    pub gpus_per_node: usize,
}

impl Mapping {
    /// Create a mapping with 8 devices per node
    pub fn new(world_size: usize, rank: usize, tp_size: usize) -> Result<Self> {
        if tp_size == 0 || world_size != tp_size {
            return Err(Error::Config(format!(
                "world size {} must equal tensor-parallel size {}",
                world_size, tp_size
            )));
        }
        if rank >= world_size {
            return Err(Error::Config(format!(
                "rank {} out of range for world size {}",
                rank, world_size
            )));
        }
        Ok(Self {
            world_size,
            rank,
            tp_size,
            gpus_per_node: 8,
        })
    }

    pub fn with_gpus_per_node(mut self, gpus_per_node: usize) -> Self {
        self.gpus_per_node = gpus_per_node.max(1);
        self
    }

    /// Local device this rank runs on
    pub fn device_id(&self) -> usize {
        self.rank % self.gpus_per_node
    }

    /// Rank within the tensor-parallel group
    pub fn tp_rank(&self) -> usize {
        self.rank % self.tp_size
    }
}
