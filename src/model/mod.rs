//! Engine description: the build config and the engine files on disk

mod config;
mod engine_file;

pub use config::{
    pad_vocab_size, BuilderConfig, EngineConfig, ModelConfig, PluginConfig, PluginSetting,
    QuantMode,
};
pub use engine_file::{engine_name, find_engines};
