//! Command-line arguments

use crate::generate::MODEL_NAME;
use clap::Parser;
use std::path::PathBuf;

/// Default prompts for the fixture batches
pub const DEFAULT_INPUT_TEXT: [&str; 2] = [
    "What's new between ChatGLM3-6B and ChatGLM2-6B?",
    "Could you introduce NVIDIA Corporation for me?",
];

#[derive(Parser, Debug, Clone)]
#[command(name = "generate-expected-output")]
#[command(about = "Generate expected token-ID fixtures for engine regression tests", version)]
pub struct Args {
    /// Directory holding config.json and the *.engine files
    #[arg(long, default_value = "models/rt_engine/chatglm6b")]
    pub engine_dir: PathBuf,

    /// Directory holding tokenizer.json
    #[arg(long, default_value = "models/chatglm6b/pyTorchModel")]
    pub tokenizer_dir: PathBuf,

    /// Where the .npy fixtures are written
    #[arg(long, default_value = "data/chatglm6b")]
    pub data_dir: PathBuf,

    /// Model name the engine must have been built for
    #[arg(long, default_value = MODEL_NAME)]
    pub model_name: String,

    /// Prompts; repeat the flag for more than one
    #[arg(long = "input-text", num_args = 1.., default_values = DEFAULT_INPUT_TEXT)]
    pub input_text: Vec<String>,

    /// Maximum tokens to generate per sequence
    #[arg(long, default_value = "1024")]
    pub max_output_len: usize,

    /// Temperature
    #[arg(long, default_value = "1.0")]
    pub temperature: f32,

    /// Top-k (1 = greedy)
    #[arg(long, default_value = "1")]
    pub top_k: usize,

    /// Top-p (0.0 = disabled)
    #[arg(long, default_value = "0.0")]
    pub top_p: f32,

    /// Beam score length penalty
    #[arg(long, default_value = "1.0")]
    pub length_penalty: f32,

    /// Repetition penalty (1.0 = disabled)
    #[arg(long, default_value = "1.0")]
    pub repetition_penalty: f32,

    /// Sampling seed
    #[arg(long, default_value = "1")]
    pub random_seed: u64,

    /// Log level used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Compare against existing fixtures instead of overwriting them
    #[arg(long)]
    pub verify: bool,
}

impl Args {
    /// Path of the engine's config.json
    pub fn config_path(&self) -> PathBuf {
        self.engine_dir.join("config.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["generate-expected-output"]);
        assert_eq!(args.model_name, "chatglm-6b");
        assert_eq!(args.input_text.len(), 2);
        assert_eq!(args.top_k, 1);
        assert!(!args.verify);
        assert_eq!(
            args.config_path(),
            PathBuf::from("models/rt_engine/chatglm6b/config.json")
        );
    }

    #[test]
    fn test_repeated_input_text() {
        let args = Args::parse_from([
            "generate-expected-output",
            "--input-text",
            "one",
            "--input-text",
            "two",
            "--max-output-len",
            "8",
        ]);
        assert_eq!(args.input_text, vec!["one", "two"]);
        assert_eq!(args.max_output_len, 8);
    }
}
