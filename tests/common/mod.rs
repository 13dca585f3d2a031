//! A tiny engine, tokenizer and config on disk for end-to-end tests

#![allow(dead_code)]

use clap::Parser;
use expected_output::Args;
use safetensors::tensor::TensorView;
use safetensors::Dtype;
use std::path::PathBuf;
use tempfile::TempDir;

pub const VOCAB: [&str; 20] = [
    "<unk>", "<pad>", "</s>", "hello", "world", "what", "is", "new", "between", "could", "you",
    "introduce", "me", "the", "a", "of", "for", "model", "engine", "test",
];
pub const PAD_ID: u32 = 1;
pub const END_ID: u32 = 2;
pub const HIDDEN: usize = 8;
pub const HEADS: usize = 2;
pub const KV_HEADS: usize = 1;
pub const INTER: usize = 16;
pub const LAYERS: usize = 2;

pub const SHORT_PROMPT: &str = "could you introduce me";
pub const LONG_PROMPT: &str = "hello world what is new between the engine";

/// A model directory tree inside a temp dir
pub struct TinyModel {
    pub root: TempDir,
}

impl TinyModel {
    pub fn build(attention_plugin: bool) -> Self {
        let model = Self {
            root: tempfile::tempdir().unwrap(),
        };
        std::fs::create_dir_all(model.engine_dir()).unwrap();
        std::fs::create_dir_all(model.tokenizer_dir()).unwrap();

        model.write_config("chatglm-6b", 1, attention_plugin);
        model.write_tokenizer();
        std::fs::write(
            model.engine_dir().join("chatglm-6b_float32_tp1_rank0.engine"),
            engine_bytes(),
        )
        .unwrap();
        model
    }

    pub fn engine_dir(&self) -> PathBuf {
        self.root.path().join("engine")
    }

    pub fn tokenizer_dir(&self) -> PathBuf {
        self.root.path().join("tokenizer")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.path().join("data")
    }

    pub fn write_config(&self, name: &str, tensor_parallel: usize, attention_plugin: bool) {
        let plugin = if attention_plugin {
            serde_json::json!("float32")
        } else {
            serde_json::json!(false)
        };
        let config = serde_json::json!({
            "builder_config": {
                "name": name,
                "precision": "float32",
                "tensor_parallel": tensor_parallel,
                "vocab_size": VOCAB.len(),
                "num_layers": LAYERS,
                "num_heads": HEADS,
                "num_kv_heads": KV_HEADS,
                "hidden_size": HIDDEN,
                "intermediate_size": INTER,
                "eos_token_id": END_ID,
                "pad_token_id": PAD_ID,
                "remove_input_padding": false,
                "paged_kv_cache": false,
                "quant_mode": 0,
                "max_batch_size": 4,
                "max_input_len": 32,
                "max_output_len": 32
            },
            "plugin_config": {
                "gpt_attention_plugin": plugin
            }
        });
        std::fs::write(
            self.engine_dir().join("config.json"),
            serde_json::to_string_pretty(&config).unwrap(),
        )
        .unwrap();
    }

    fn write_tokenizer(&self) {
        let vocab: serde_json::Map<String, serde_json::Value> = VOCAB
            .iter()
            .enumerate()
            .map(|(i, t)| (t.to_string(), serde_json::json!(i)))
            .collect();
        let tokenizer = serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [],
            "normalizer": null,
            "pre_tokenizer": { "type": "Whitespace" },
            "post_processor": null,
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": vocab,
                "unk_token": "<unk>"
            }
        });
        std::fs::write(
            self.tokenizer_dir().join("tokenizer.json"),
            serde_json::to_string(&tokenizer).unwrap(),
        )
        .unwrap();
        std::fs::write(
            self.tokenizer_dir().join("tokenizer_config.json"),
            r#"{"padding_side": "left"}"#,
        )
        .unwrap();
    }

    /// Arguments pointing at this tree, plus `extra`
    pub fn args(&self, extra: &[&str]) -> Args {
        let mut argv: Vec<String> = vec![
            "generate-expected-output".into(),
            "--engine-dir".into(),
            self.engine_dir().display().to_string(),
            "--tokenizer-dir".into(),
            self.tokenizer_dir().display().to_string(),
            "--data-dir".into(),
            self.data_dir().display().to_string(),
            "--input-text".into(),
            SHORT_PROMPT.into(),
            "--input-text".into(),
            LONG_PROMPT.into(),
            "--max-output-len".into(),
            "6".into(),
        ];
        argv.extend(extra.iter().map(|s| s.to_string()));
        Args::parse_from(argv)
    }
}

/// Deterministic weights in [-0.5, 0.5)
fn weights(seed: u64, n: usize) -> Vec<f32> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    (0..n)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ((state >> 40) as f32 / (1u64 << 24) as f32) - 0.5
        })
        .collect()
}

/// Serialized engine for the tiny model
pub fn engine_bytes() -> Vec<u8> {
    let kv_dim = KV_HEADS * (HIDDEN / HEADS);
    let mut tensors: Vec<(String, Vec<usize>, Vec<f32>)> = vec![
        (
            "transformer.vocab_embedding.weight".into(),
            vec![VOCAB.len(), HIDDEN],
            weights(1, VOCAB.len() * HIDDEN),
        ),
        ("transformer.ln_f.weight".into(), vec![HIDDEN], vec![1.0; HIDDEN]),
        (
            "lm_head.weight".into(),
            vec![VOCAB.len(), HIDDEN],
            weights(2, VOCAB.len() * HIDDEN),
        ),
    ];

    for layer in 0..LAYERS {
        let seed = 100 * (layer as u64 + 1);
        let name = |w: &str| format!("transformer.layers.{}.{}", layer, w);
        let (hh, kh, ih) = (HIDDEN * HIDDEN, kv_dim * HIDDEN, INTER * HIDDEN);
        tensors.extend([
            (name("attention.q_proj.weight"), vec![HIDDEN, HIDDEN], weights(seed, hh)),
            (name("attention.k_proj.weight"), vec![kv_dim, HIDDEN], weights(seed + 1, kh)),
            (name("attention.v_proj.weight"), vec![kv_dim, HIDDEN], weights(seed + 2, kh)),
            (name("attention.dense.weight"), vec![HIDDEN, HIDDEN], weights(seed + 3, hh)),
            (name("mlp.gate.weight"), vec![INTER, HIDDEN], weights(seed + 4, ih)),
            (name("mlp.fc.weight"), vec![INTER, HIDDEN], weights(seed + 5, ih)),
            (name("mlp.proj.weight"), vec![HIDDEN, INTER], weights(seed + 6, ih)),
            (name("input_layernorm.weight"), vec![HIDDEN], vec![1.0; HIDDEN]),
            (name("post_layernorm.weight"), vec![HIDDEN], vec![1.0; HIDDEN]),
        ]);
    }

    let raw: Vec<(String, Vec<usize>, Vec<u8>)> = tensors
        .into_iter()
        .map(|(name, shape, values)| {
            let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect();
            (name, shape, bytes)
        })
        .collect();
    let views: Vec<(String, TensorView<'_>)> = raw
        .iter()
        .map(|(name, shape, bytes)| {
            (
                name.clone(),
                TensorView::new(Dtype::F32, shape.clone(), bytes).unwrap(),
            )
        })
        .collect();

    safetensors::serialize(views, &None).unwrap()
}

/// Token ids of `text` under the tiny vocabulary
pub fn ids(text: &str) -> Vec<i32> {
    text.split_whitespace()
        .map(|w| VOCAB.iter().position(|t| *t == w).unwrap_or(0) as i32)
        .collect()
}
