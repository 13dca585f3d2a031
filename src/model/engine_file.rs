//! Locating serialized engines inside an engine directory

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of the engine built for one rank
pub fn engine_name(model: &str, dtype: &str, tp_size: usize, rank: usize) -> String {
    format!("{}_{}_tp{}_rank{}.engine", model, dtype, tp_size, rank)
}

/// Find every engine in `engine_dir` built for this precision, tp degree and rank
///
/// Results are sorted by path. An empty match is an error.
pub fn find_engines(
    engine_dir: impl AsRef<Path>,
    dtype: &str,
    tp_size: usize,
    rank: usize,
) -> Result<Vec<PathBuf>> {
    let engine_dir = engine_dir.as_ref();
    let suffix = format!("_{}_tp{}_rank{}.engine", dtype, tp_size, rank);

    let mut engines: Vec<PathBuf> = std::fs::read_dir(engine_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.len() > suffix.len() && n.ends_with(&suffix))
        })
        .collect();
    engines.sort();

    debug!("Found {} engine(s) matching *{}", engines.len(), suffix);

    if engines.is_empty() {
        return Err(Error::EngineNotFound(format!(
            "no *{} in {}",
            suffix,
            engine_dir.display()
        )));
    }
    Ok(engines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_name() {
        assert_eq!(
            engine_name("chatglm-6b", "float16", 1, 0),
            "chatglm-6b_float16_tp1_rank0.engine"
        );
    }

    #[test]
    fn test_find_engines_filters_by_rank_and_dtype() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "chatglm-6b_float16_tp2_rank0.engine",
            "chatglm-6b_float16_tp2_rank1.engine",
            "chatglm-6b_bfloat16_tp2_rank0.engine",
            "config.json",
        ] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let found = find_engines(dir.path(), "float16", 2, 1).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("chatglm-6b_float16_tp2_rank1.engine"));

        assert!(matches!(
            find_engines(dir.path(), "float32", 2, 0),
            Err(Error::EngineNotFound(_))
        ));
    }
}
