//! Engine configuration parsing and validation

use crate::tensor::DType;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Contents of an engine directory's `config.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Settings the engine was built with
    pub builder_config: BuilderConfig,

    /// Plugins enabled at build time
    #[serde(default)]
    pub plugin_config: PluginConfig,
}

/// The `builder_config` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuilderConfig {
    /// Model name the engine was built for
    pub name: String,

    /// Weight precision ("float16", "bfloat16", "float32")
    pub precision: String,

    /// Tensor-parallel degree (engine world size)
    #[serde(default = "default_tensor_parallel")]
    pub tensor_parallel: usize,

    /// Vocabulary size
    pub vocab_size: usize,

    /// Number of transformer layers
    pub num_layers: usize,

    /// Number of attention heads
    pub num_heads: usize,

    /// Number of KV heads (for GQA/MQA)
    #[serde(default)]
    pub num_kv_heads: Option<usize>,

    /// Hidden size (embedding dimension)
    pub hidden_size: usize,

    /// MLP hidden dim
    #[serde(default)]
    pub intermediate_size: Option<usize>,

    /// End-of-sequence token
    pub eos_token_id: u32,

    /// Padding token
    pub pad_token_id: u32,

    #[serde(default)]
    pub remove_input_padding: bool,

    #[serde(default)]
    pub paged_kv_cache: bool,

    #[serde(default)]
    pub quant_mode: QuantMode,

    #[serde(default)]
    pub max_batch_size: Option<usize>,

    #[serde(default)]
    pub max_input_len: Option<usize>,

    #[serde(default)]
    pub max_output_len: Option<usize>,

    /// RMS norm epsilon
    #[serde(default = "default_rms_norm_eps")]
    pub rms_norm_eps: f32,

    /// RoPE theta
    #[serde(default = "default_rope_theta")]
    pub rope_theta: f32,
}

fn default_tensor_parallel() -> usize {
    1
}
fn default_rms_norm_eps() -> f32 {
    1e-5
}
fn default_rope_theta() -> f32 {
    10000.0
}

/// The `plugin_config` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginConfig {
    #[serde(default)]
    pub gpt_attention_plugin: PluginSetting,
}

/// A plugin is either switched off (`false`) or set to the precision it runs in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PluginSetting {
    Toggle(bool),
    Precision(String),
}

impl Default for PluginSetting {
    fn default() -> Self {
        PluginSetting::Toggle(false)
    }
}

impl PluginSetting {
    pub fn is_enabled(&self) -> bool {
        match self {
            PluginSetting::Toggle(on) => *on,
            PluginSetting::Precision(p) => !p.is_empty() && p != "false",
        }
    }
}

/// Quantization flags as stored in the builder config
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuantMode(pub u32);

impl QuantMode {
    pub const INT4_WEIGHTS: u32 = 1 << 0;
    pub const INT8_WEIGHTS: u32 = 1 << 1;
    pub const ACTIVATIONS: u32 = 1 << 2;
    pub const INT8_KV_CACHE: u32 = 1 << 6;

    /// No quantization at all
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn has_weight_quantization(&self) -> bool {
        self.0 & (Self::INT4_WEIGHTS | Self::INT8_WEIGHTS) != 0
    }

    pub fn has_int8_kv_cache(&self) -> bool {
        self.0 & Self::INT8_KV_CACHE != 0
    }
}

/// Per-rank model configuration handed to the generation session
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub model_name: String,
    pub vocab_size: usize,
    /// Vocabulary padded to a multiple of the tensor-parallel degree
    pub vocab_size_padded: usize,
    pub num_layers: usize,
    pub num_heads: usize,
    pub num_kv_heads: usize,
    pub hidden_size: usize,
    pub intermediate_size: usize,
    pub gpt_attention_plugin: bool,
    pub remove_input_padding: bool,
    pub paged_kv_cache: bool,
    pub quant_mode: QuantMode,
    pub dtype: DType,
    pub rms_norm_eps: f32,
    pub rope_theta: f32,
    pub max_input_len: Option<usize>,
    pub max_output_len: Option<usize>,
    pub max_batch_size: Option<usize>,
}

impl ModelConfig {
    /// Get head dimension
    pub fn head_dim(&self) -> usize {
        self.hidden_size / self.num_heads
    }

    /// Query heads per KV head
    pub fn gqa_ratio(&self) -> usize {
        self.num_heads / self.num_kv_heads
    }
}

/// Round `vocab_size` up to a multiple of `tp_size`
pub fn pad_vocab_size(vocab_size: usize, tp_size: usize) -> usize {
    vocab_size.div_ceil(tp_size) * tp_size
}

impl EngineConfig {
    /// Load `config.json` from an engine directory
    pub fn from_dir(engine_dir: impl AsRef<Path>) -> Result<Self> {
        Self::from_file(engine_dir.as_ref().join("config.json"))
    }

    /// Load an engine config from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config_str = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        let config: EngineConfig = serde_json::from_str(&config_str)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

        debug!(
            "Engine config: name={}, precision={}, tp={}",
            config.builder_config.name,
            config.builder_config.precision,
            config.builder_config.tensor_parallel
        );
        Ok(config)
    }

    /// Fail unless the engine was built for `expected`
    pub fn ensure_model_name(&self, expected: &str) -> Result<()> {
        if self.builder_config.name != expected {
            return Err(Error::ModelNameMismatch {
                expected: expected.to_string(),
                found: self.builder_config.name.clone(),
            });
        }
        Ok(())
    }

    /// Fail unless the engine's world size matches the runtime's
    pub fn ensure_world_size(&self, runtime_world_size: usize) -> Result<()> {
        let engine = self.world_size();
        if engine != runtime_world_size {
            return Err(Error::WorldSizeMismatch {
                engine,
                runtime: runtime_world_size,
            });
        }
        Ok(())
    }

    /// Engine world size
    pub fn world_size(&self) -> usize {
        self.builder_config.tensor_parallel
    }

    /// End-of-sequence token id
    pub fn end_id(&self) -> u32 {
        self.builder_config.eos_token_id
    }

    /// Padding token id
    pub fn pad_id(&self) -> u32 {
        self.builder_config.pad_token_id
    }

    /// Whether inputs must be aligned at the head of each row
    pub fn uses_gpt_attention_plugin(&self) -> bool {
        self.plugin_config.gpt_attention_plugin.is_enabled()
    }

    /// Weight precision
    pub fn dtype(&self) -> Result<DType> {
        DType::from_precision(&self.builder_config.precision)
            .ok_or_else(|| Error::UnsupportedDType(self.builder_config.precision.clone()))
    }

    /// Build the per-rank model config; sharded dimensions are split across `world_size`
    pub fn model_config(&self, world_size: usize) -> Result<ModelConfig> {
        let b = &self.builder_config;
        if world_size == 0 {
            return Err(Error::Config("world size must be at least 1".to_string()));
        }

        let num_kv_heads = b.num_kv_heads.unwrap_or(b.num_heads);
        let intermediate_size = b.intermediate_size.unwrap_or(4 * b.hidden_size);
        for (what, value) in [
            ("num_heads", b.num_heads),
            ("num_kv_heads", num_kv_heads),
            ("hidden_size", b.hidden_size),
            ("intermediate_size", intermediate_size),
        ] {
            if value == 0 || value % world_size != 0 {
                return Err(Error::Config(format!(
                    "{} ({}) is not divisible by world size {}",
                    what, value, world_size
                )));
            }
        }

        Ok(ModelConfig {
            model_name: b.name.clone(),
            vocab_size: b.vocab_size,
            vocab_size_padded: pad_vocab_size(b.vocab_size, world_size),
            num_layers: b.num_layers,
            num_heads: b.num_heads / world_size,
            num_kv_heads: num_kv_heads / world_size,
            hidden_size: b.hidden_size / world_size,
            intermediate_size: intermediate_size / world_size,
            gpt_attention_plugin: self.uses_gpt_attention_plugin(),
            remove_input_padding: b.remove_input_padding,
            paged_kv_cache: b.paged_kv_cache,
            quant_mode: b.quant_mode,
            dtype: self.dtype()?,
            rms_norm_eps: b.rms_norm_eps,
            rope_theta: b.rope_theta,
            max_input_len: b.max_input_len,
            max_output_len: b.max_output_len,
            max_batch_size: b.max_batch_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EngineConfig {
        serde_json::from_value(serde_json::json!({
            "builder_config": {
                "name": "chatglm-6b",
                "precision": "float16",
                "tensor_parallel": 2,
                "vocab_size": 130527,
                "num_layers": 28,
                "num_heads": 32,
                "hidden_size": 4096,
                "eos_token_id": 130005,
                "pad_token_id": 3,
                "remove_input_padding": false,
                "paged_kv_cache": false,
                "quant_mode": 0
            },
            "plugin_config": {
                "gpt_attention_plugin": "float16"
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_and_validate() {
        let config = sample();
        assert!(config.uses_gpt_attention_plugin());
        assert!(config.ensure_model_name("chatglm-6b").is_ok());
        assert!(matches!(
            config.ensure_model_name("gpt2"),
            Err(Error::ModelNameMismatch { .. })
        ));
        assert!(config.ensure_world_size(2).is_ok());
        assert!(matches!(
            config.ensure_world_size(1),
            Err(Error::WorldSizeMismatch { engine: 2, runtime: 1 })
        ));
    }

    #[test]
    fn test_model_config_is_sharded() {
        let model = sample().model_config(2).unwrap();
        assert_eq!(model.num_heads, 16);
        assert_eq!(model.num_kv_heads, 16);
        assert_eq!(model.hidden_size, 2048);
        assert_eq!(model.vocab_size_padded, 130528);
        assert_eq!(model.dtype, DType::F16);
        assert_eq!(model.head_dim(), 128);
    }

    #[test]
    fn test_plugin_toggle() {
        assert!(!PluginSetting::Toggle(false).is_enabled());
        assert!(PluginSetting::Toggle(true).is_enabled());
        assert!(!PluginSetting::default().is_enabled());
    }

    #[test]
    fn test_pad_vocab_size() {
        assert_eq!(pad_vocab_size(10, 1), 10);
        assert_eq!(pad_vocab_size(10, 4), 12);
    }

    #[test]
    fn test_quant_mode_flags() {
        assert!(QuantMode::default().is_empty());
        let mode = QuantMode(QuantMode::INT8_WEIGHTS | QuantMode::INT8_KV_CACHE);
        assert!(mode.has_weight_quantization());
        assert!(mode.has_int8_kv_cache());
        assert!(!QuantMode(QuantMode::ACTIVATIONS).has_weight_quantization());
    }
}
