//! Generation runtime: rank layout, sampling and the decoding session

mod beam;
mod mapping;
mod sampling;
mod session;

pub use beam::{beam_search, BeamSearchParams, Hypothesis};
pub use mapping::{Mapping, WorldConfig};
pub use sampling::{apply_repetition_penalty, argmax, SamplingConfig, TokenSampler};
pub use session::{GenerationSession, SessionSetup};
