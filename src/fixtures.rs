//! Writing and checking expected-output fixtures (.npy)

use crate::{Error, Result};
use ndarray::{s, Array2, Array3, Axis};
use ndarray_npy::{read_npy, write_npy};
use std::path::{Path, PathBuf};
use tracing::info;

/// Locations of the two fixture files for one (batch size, beam width) run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixturePaths {
    pub input_ids: PathBuf,
    pub output_ids: PathBuf,
}

impl FixturePaths {
    pub fn new(data_dir: impl AsRef<Path>, batch_size: usize, beam_width: usize) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            input_ids: data_dir.join(format!("inputId-BS{}-BM{}.npy", batch_size, beam_width)),
            output_ids: data_dir.join(format!("outputId-BS{}-BM{}.npy", batch_size, beam_width)),
        }
    }
}

/// Drop the trailing columns that are `end_id` in every row
///
/// Keeps up to and including the latest first-`end_id` position over all
/// `(batch, beam)` rows. A row without `end_id` keeps its full length.
pub fn trim_output(output_ids: &Array3<i32>, end_id: i32) -> Array3<i32> {
    let seq_len = output_ids.len_of(Axis(2));
    if seq_len == 0 {
        return output_ids.clone();
    }

    let keep = output_ids
        .lanes(Axis(2))
        .into_iter()
        .map(|row| {
            row.iter()
                .position(|&t| t == end_id)
                .unwrap_or(seq_len - 1)
        })
        .max()
        .map_or(seq_len, |last| last + 1);

    output_ids.slice(s![.., .., ..keep]).to_owned()
}

/// Persists fixtures under a data directory
#[derive(Debug, Clone)]
pub struct FixtureWriter {
    data_dir: PathBuf,
}

impl FixtureWriter {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Write both arrays, replacing any existing files
    pub fn save(
        &self,
        batch_size: usize,
        beam_width: usize,
        input_ids: &Array2<i32>,
        output_ids: &Array3<i32>,
    ) -> Result<FixturePaths> {
        std::fs::create_dir_all(&self.data_dir)?;
        let paths = FixturePaths::new(&self.data_dir, batch_size, beam_width);

        write_npy(&paths.input_ids, input_ids)?;
        write_npy(&paths.output_ids, output_ids)?;

        info!(
            "Wrote {} {:?} and {} {:?}",
            paths.input_ids.display(),
            input_ids.shape(),
            paths.output_ids.display(),
            output_ids.shape()
        );
        Ok(paths)
    }

    /// Compare arrays against the fixtures already on disk
    pub fn verify(
        &self,
        batch_size: usize,
        beam_width: usize,
        input_ids: &Array2<i32>,
        output_ids: &Array3<i32>,
    ) -> Result<FixturePaths> {
        let paths = FixturePaths::new(&self.data_dir, batch_size, beam_width);

        let expected_input: Array2<i32> = read_npy(&paths.input_ids)?;
        if &expected_input != input_ids {
            return Err(Error::FixtureMismatch(format!(
                "{} differs from regenerated input ids",
                paths.input_ids.display()
            )));
        }

        let expected_output: Array3<i32> = read_npy(&paths.output_ids)?;
        if &expected_output != output_ids {
            return Err(Error::FixtureMismatch(format!(
                "{}: expected shape {:?}, regenerated {:?}",
                paths.output_ids.display(),
                expected_output.shape(),
                output_ids.shape()
            )));
        }

        info!("{} and {} match", paths.input_ids.display(), paths.output_ids.display());
        Ok(paths)
    }
}

/// Load a fixture pair written by `FixtureWriter::save`
pub fn load(paths: &FixturePaths) -> Result<(Array2<i32>, Array3<i32>)> {
    let input_ids: Array2<i32> = read_npy(&paths.input_ids)?;
    let output_ids: Array3<i32> = read_npy(&paths.output_ids)?;
    Ok((input_ids, output_ids))
}
