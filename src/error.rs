//! Error types for expected-output generation

use thiserror::Error;

/// Result type alias for fixture generation
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while generating expected outputs
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error parsing the engine's safetensors buffer
    #[error("Safetensors error: {0}")]
    Safetensors(#[from] safetensors::SafeTensorError),

    /// JSON parsing error (config files)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Writing a .npy fixture failed
    #[error("NPY write error: {0}")]
    NpyWrite(#[from] ndarray_npy::WriteNpyError),

    /// Reading a .npy fixture failed
    #[error("NPY read error: {0}")]
    NpyRead(#[from] ndarray_npy::ReadNpyError),

    /// Array construction with an inconsistent shape
    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// Engine configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// The engine was built for a different model
    #[error("Model name mismatch: expected {expected}, engine was built for {found}")]
    ModelNameMismatch { expected: String, found: String },

    /// Engine and runtime disagree on the number of ranks
    #[error("Engine world size ({engine}) != Runtime world size ({runtime})")]
    WorldSizeMismatch { engine: usize, runtime: usize },

    /// No engine file for this rank
    #[error("Engine not found: {0}")]
    EngineNotFound(String),

    /// Tensor shape mismatch
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// Unsupported data type
    #[error("Unsupported dtype: {0}")]
    UnsupportedDType(String),

    /// Tensor not found in the engine
    #[error("Tensor not found: {0}")]
    TensorNotFound(String),

    /// Tokenizer error
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// Generation error
    #[error("Generation error: {0}")]
    Generation(String),

    /// A regenerated fixture differs from the one on disk
    #[error("Fixture mismatch: {0}")]
    FixtureMismatch(String),
}
