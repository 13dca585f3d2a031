//! Transformer weights held by a generation session

mod loader;

pub use loader::EngineWeights;

use crate::tensor::Tensor;

/// Weights for a single transformer layer
#[derive(Debug)]
pub struct LayerWeights {
    /// Attention projections, `[out_features, in_features]`
    pub q_proj: Tensor,
    pub k_proj: Tensor,
    pub v_proj: Tensor,
    pub o_proj: Tensor,

    /// MLP weights (SwiGLU)
    pub gate_proj: Tensor,
    pub up_proj: Tensor,
    pub down_proj: Tensor,

    /// Normalization weights
    pub input_layernorm: Tensor,
    pub post_attention_layernorm: Tensor,
}

/// Shared weights (embeddings, final norm, lm_head)
#[derive(Debug)]
pub struct SharedWeights {
    /// Token embeddings
    pub embed_tokens: Tensor,
    /// Final layer norm
    pub norm: Tensor,
    /// Language model head (tied to embed_tokens when absent)
    pub lm_head: Option<Tensor>,
}

impl SharedWeights {
    /// The projection used to produce logits
    pub fn output_projection(&self) -> &Tensor {
        self.lm_head.as_ref().unwrap_or(&self.embed_tokens)
    }
}

/// Tensor names used inside an engine buffer
#[derive(Debug, Clone)]
pub struct LayerNaming {
    /// Prefix for layers
    pub layer_prefix: String,
    pub q_proj: String,
    pub k_proj: String,
    pub v_proj: String,
    pub o_proj: String,
    pub gate_proj: String,
    pub up_proj: String,
    pub down_proj: String,
    pub input_layernorm: String,
    pub post_attention_layernorm: String,
    pub embed_tokens: String,
    pub norm: String,
    pub lm_head: String,
}

impl Default for LayerNaming {
    fn default() -> Self {
        Self {
            layer_prefix: "transformer.layers".to_string(),
            q_proj: "attention.q_proj.weight".to_string(),
            k_proj: "attention.k_proj.weight".to_string(),
            v_proj: "attention.v_proj.weight".to_string(),
            o_proj: "attention.dense.weight".to_string(),
            gate_proj: "mlp.gate.weight".to_string(),
            up_proj: "mlp.fc.weight".to_string(),
            down_proj: "mlp.proj.weight".to_string(),
            input_layernorm: "input_layernorm.weight".to_string(),
            post_attention_layernorm: "post_layernorm.weight".to_string(),
            embed_tokens: "transformer.vocab_embedding.weight".to_string(),
            norm: "transformer.ln_f.weight".to_string(),
            lm_head: "lm_head.weight".to_string(),
        }
    }
}

impl LayerNaming {
    /// Get full tensor name for a layer weight
    pub fn layer_tensor_name(&self, layer_idx: usize, weight_name: &str) -> String {
        format!("{}.{}.{}", self.layer_prefix, layer_idx, weight_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_tensor_name() {
        let naming = LayerNaming::default();
        assert_eq!(
            naming.layer_tensor_name(3, &naming.q_proj),
            "transformer.layers.3.attention.q_proj.weight"
        );
    }
}
