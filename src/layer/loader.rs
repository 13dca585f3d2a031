//! Loading session weights out of an engine buffer

use super::{LayerNaming, LayerWeights, SharedWeights};
use crate::model::ModelConfig;
use crate::tensor::{EngineTensors, Tensor};
use crate::Result;
use tracing::{debug, info};

/// All weights of one rank's engine
#[derive(Debug)]
pub struct EngineWeights {
    pub shared: SharedWeights,
    pub layers: Vec<LayerWeights>,
}

impl EngineWeights {
    /// Copy every weight out of `buffer`, checking shapes against `config`
    pub fn load(buffer: &[u8], naming: &LayerNaming, config: &ModelConfig) -> Result<Self> {
        let tensors = EngineTensors::parse(buffer)?;
        info!(
            "Engine holds {} tensors ({} bytes)",
            tensors.names().len(),
            buffer.len()
        );

        let shared = load_shared(&tensors, naming, config)?;
        let layers = (0..config.num_layers)
            .map(|idx| load_layer(&tensors, naming, config, idx))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { shared, layers })
    }
}

fn load_shared(
    tensors: &EngineTensors<'_>,
    naming: &LayerNaming,
    config: &ModelConfig,
) -> Result<SharedWeights> {
    let hidden = config.hidden_size;

    let embed_tokens = tensors.get(&naming.embed_tokens)?;
    embed_tokens.expect_shape(&[config.vocab_size_padded, hidden])?;

    let norm = tensors.get(&naming.norm)?;
    norm.expect_shape(&[hidden])?;

    // lm_head may be tied to embed_tokens
    let lm_head = if tensors.contains(&naming.lm_head) {
        let lm_head = tensors.get(&naming.lm_head)?;
        lm_head.expect_shape(&[config.vocab_size_padded, hidden])?;
        Some(lm_head)
    } else {
        debug!("No {} in engine, using tied embeddings", naming.lm_head);
        None
    };

    Ok(SharedWeights {
        embed_tokens,
        norm,
        lm_head,
    })
}

fn load_layer(
    tensors: &EngineTensors<'_>,
    naming: &LayerNaming,
    config: &ModelConfig,
    layer_idx: usize,
) -> Result<LayerWeights> {
    debug!("Loading layer {}", layer_idx);

    let hidden = config.hidden_size;
    let kv_dim = config.num_kv_heads * config.head_dim();
    let inter = config.intermediate_size;

    let get = |weight_name: &str, shape: &[usize]| -> Result<Tensor> {
        let tensor = tensors.get(&naming.layer_tensor_name(layer_idx, weight_name))?;
        tensor.expect_shape(shape)?;
        Ok(tensor)
    };

    Ok(LayerWeights {
        q_proj: get(&naming.q_proj, &[hidden, hidden])?,
        k_proj: get(&naming.k_proj, &[kv_dim, hidden])?,
        v_proj: get(&naming.v_proj, &[kv_dim, hidden])?,
        o_proj: get(&naming.o_proj, &[hidden, hidden])?,
        gate_proj: get(&naming.gate_proj, &[inter, hidden])?,
        up_proj: get(&naming.up_proj, &[inter, hidden])?,
        down_proj: get(&naming.down_proj, &[hidden, inter])?,
        input_layernorm: get(&naming.input_layernorm, &[hidden])?,
        post_attention_layernorm: get(&naming.post_attention_layernorm, &[hidden])?,
    })
}
