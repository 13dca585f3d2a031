//! Expected-output fixture generation for LLM engine regression tests
//!
//! Loads a serialized engine and its tokenizer, decodes a fixed prompt set for
//! a few batch-size/beam-width combinations and stores the token ids as `.npy`
//! files. Later test runs compare their own output against these byte for byte.
//!
//! ## Pipeline
//!
//! ```text
//! config.json ──▶ validate (model name, world size)
//!                      │
//! tokenizer.json ──▶ encode_batch ──▶ align_to_head (attention plugin)
//!                      │
//! *.engine ──▶ GenerationSession::setup / decode
//!                      │
//!                trim_output ──▶ inputId-BS{b}-BM{w}.npy
//!                                outputId-BS{b}-BM{w}.npy
//! ```

pub mod args;
pub mod error;
pub mod fixtures;
pub mod generate;
pub mod inputs;
pub mod layer;
pub mod model;
pub mod runtime;
pub mod tensor;
pub mod tokenizer;

// Re-exports
pub use args::Args;
pub use error::{Error, Result};
pub use fixtures::{FixturePaths, FixtureWriter};
pub use generate::{generate, generate_all, FIXTURE_RUNS, MODEL_NAME};
pub use model::{EngineConfig, ModelConfig};
pub use runtime::{GenerationSession, Mapping, SamplingConfig, WorldConfig};
pub use tensor::{DType, Tensor};
pub use tokenizer::{BatchEncoding, ModelTokenizer, PaddingSide};
