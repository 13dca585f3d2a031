//! CPU generation session over a serialized engine
//!
//! Mirrors the call shape of a compiled-engine runtime: construct from a
//! model config and the engine bytes, `setup` the buffer sizes, then `decode`
//! a padded batch into `[batch, beam, max_input_len + max_output_len]` ids.
//! Every step recomputes the full sequence; there is no KV cache.

use super::beam::{beam_search, BeamSearchParams};
use super::mapping::Mapping;
use super::sampling::{sample_until_end, SamplingConfig, TokenSampler};
use crate::layer::{EngineWeights, LayerNaming, LayerWeights};
use crate::model::ModelConfig;
use crate::tensor::{ops, Tensor};
use crate::{Error, Result};
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{Array1, Array2, Array3};
use tracing::{debug, info, warn};

/// Buffer sizes fixed by `setup`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSetup {
    pub batch_size: usize,
    pub max_input_len: usize,
    pub max_output_len: usize,
    pub beam_width: usize,
}

impl SessionSetup {
    /// Length of every output row
    pub fn max_seq_len(&self) -> usize {
        self.max_input_len + self.max_output_len
    }
}

/// Decodes batches with one rank's engine
pub struct GenerationSession {
    config: ModelConfig,
    mapping: Mapping,
    weights: EngineWeights,
    setup: Option<SessionSetup>,
}

impl GenerationSession {
    /// Load the engine weights for this rank
    pub fn new(config: ModelConfig, engine_buffer: &[u8], mapping: Mapping) -> Result<Self> {
        if mapping.tp_size != 1 {
            return Err(Error::Generation(format!(
                "CPU session runs a single rank, engine expects tp_size={}",
                mapping.tp_size
            )));
        }
        let quant = config.quant_mode;
        if !quant.is_empty() {
            let kind = if quant.has_weight_quantization() {
                "weight-quantized"
            } else if quant.has_int8_kv_cache() {
                "int8 KV cache"
            } else {
                "quantized"
            };
            return Err(Error::Generation(format!(
                "{} engines are not supported (quant_mode={})",
                kind, quant.0
            )));
        }
        if config.num_heads == 0
            || config.num_kv_heads == 0
            || config.num_heads % config.num_kv_heads != 0
        {
            return Err(Error::Config(format!(
                "{} attention heads cannot be grouped over {} KV heads",
                config.num_heads, config.num_kv_heads
            )));
        }

        if config.remove_input_padding {
            warn!("Engine was built with remove_input_padding; decoding the padded batch instead");
        }
        if config.paged_kv_cache {
            debug!("Paged KV cache requested; the CPU session recomputes every step");
        }

        info!(
            "Loading {} engine: {} layers, hidden_size={}, dtype={}, device {}",
            config.model_name,
            config.num_layers,
            config.hidden_size,
            config.dtype,
            mapping.device_id()
        );
        let weights = EngineWeights::load(engine_buffer, &LayerNaming::default(), &config)?;

        Ok(Self {
            config,
            mapping,
            weights,
            setup: None,
        })
    }

    /// Get model config
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Get rank mapping
    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    /// Fix batch and sequence sizes for the following `decode` calls
    pub fn setup(
        &mut self,
        batch_size: usize,
        max_input_len: usize,
        max_output_len: usize,
        beam_width: usize,
    ) -> Result<()> {
        if batch_size == 0 || max_input_len == 0 || beam_width == 0 {
            return Err(Error::Config(format!(
                "invalid session setup: batch={}, input_len={}, beam={}",
                batch_size, max_input_len, beam_width
            )));
        }
        for (what, value, limit) in [
            ("batch size", batch_size, self.config.max_batch_size),
            ("input length", max_input_len, self.config.max_input_len),
            ("output length", max_output_len, self.config.max_output_len),
        ] {
            if let Some(limit) = limit {
                if value > limit {
                    return Err(Error::Config(format!(
                        "{} {} exceeds the engine limit of {}",
                        what, value, limit
                    )));
                }
            }
        }

        let setup = SessionSetup {
            batch_size,
            max_input_len,
            max_output_len,
            beam_width,
        };
        debug!("Session setup: {:?}", setup);
        self.setup = Some(setup);
        Ok(())
    }

    /// Decode a padded batch
    ///
    /// Rows are read from the head when the engine uses the attention plugin
    /// and from the tail otherwise. Each output row holds the prompt followed
    /// by the generated tokens, padded with `end_id`.
    pub fn decode(
        &self,
        input_ids: &Array2<i32>,
        input_lengths: &Array1<i32>,
        sampling: &SamplingConfig,
    ) -> Result<Array3<i32>> {
        let setup = self
            .setup
            .ok_or_else(|| Error::Generation("decode called before setup".to_string()))?;

        let (batch, width) = input_ids.dim();
        if batch != setup.batch_size || width != setup.max_input_len {
            return Err(Error::ShapeMismatch {
                expected: vec![setup.batch_size, setup.max_input_len],
                got: vec![batch, width],
            });
        }
        if input_lengths.len() != batch {
            return Err(Error::ShapeMismatch {
                expected: vec![batch],
                got: vec![input_lengths.len()],
            });
        }
        if sampling.num_beams != setup.beam_width {
            return Err(Error::Generation(format!(
                "sampling asks for {} beams, session was set up for {}",
                sampling.num_beams, setup.beam_width
            )));
        }

        let end_id = i32::try_from(sampling.end_id).map_err(|_| {
            Error::Generation(format!("end id {} overflows i32", sampling.end_id))
        })?;
        let mut output = Array3::from_elem((batch, setup.beam_width, setup.max_seq_len()), end_id);
        let mut sampler = TokenSampler::new(sampling.random_seed);

        let pb = ProgressBar::new(batch as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} sequences")
                .map_err(|e| Error::Generation(e.to_string()))?,
        );

        for b in 0..batch {
            let prompt = self.prompt_tokens(input_ids, input_lengths[b], b)?;

            let beams: Vec<Vec<u32>> = if setup.beam_width == 1 {
                vec![sample_until_end(
                    &prompt,
                    setup.max_output_len,
                    sampling,
                    &mut sampler,
                    |seq| self.forward(seq),
                )?]
            } else {
                let params = BeamSearchParams {
                    beam_width: setup.beam_width,
                    max_new_tokens: setup.max_output_len,
                    end_id: sampling.end_id,
                    length_penalty: sampling.length_penalty,
                    temperature: sampling.temperature,
                };
                beam_search(&prompt, &params, |seq| self.forward(seq))?
                    .into_iter()
                    .map(|h| h.tokens)
                    .collect()
            };

            write_beams(&mut output, b, &prompt, &beams);
            debug!(
                "Sequence {}: prompt {} tokens, {} beam(s)",
                b,
                prompt.len(),
                beams.len()
            );
            pb.inc(1);
        }

        pb.finish_and_clear();
        Ok(output)
    }

    /// Extract the unpadded prompt of row `b`
    fn prompt_tokens(&self, input_ids: &Array2<i32>, length: i32, b: usize) -> Result<Vec<u32>> {
        let width = input_ids.ncols();
        let length = usize::try_from(length)
            .ok()
            .filter(|&l| l > 0 && l <= width)
            .ok_or_else(|| {
                Error::Generation(format!(
                    "input length {} invalid for row {} of width {}",
                    length, b, width
                ))
            })?;

        let row = input_ids.row(b);
        let start = if self.config.gpt_attention_plugin {
            0
        } else {
            width - length
        };

        row.iter()
            .skip(start)
            .take(length)
            .map(|&id| {
                u32::try_from(id).map_err(|_| {
                    Error::Generation(format!("negative token id {} in row {}", id, b))
                })
            })
            .collect()
    }

    /// Logits of the position following `tokens`, over the unpadded vocabulary
    pub fn forward(&self, tokens: &[u32]) -> Result<Vec<f32>> {
        if tokens.is_empty() {
            return Err(Error::Generation(
                "cannot run forward on an empty sequence".to_string(),
            ));
        }
        let shared = &self.weights.shared;
        let eps = self.config.rms_norm_eps;

        let mut hidden = ops::embedding(&shared.embed_tokens, tokens)?;

        for layer in &self.weights.layers {
            // Pre-attention norm
            let normed = ops::rms_norm(&hidden, &layer.input_layernorm, eps)?;
            let attn_out = self.attention(&normed, layer)?;
            hidden = ops::add(&hidden, &attn_out)?;

            // Post-attention norm
            let normed = ops::rms_norm(&hidden, &layer.post_attention_layernorm, eps)?;
            let mlp_out = self.mlp(&normed, layer)?;
            hidden = ops::add(&hidden, &mlp_out)?;
        }

        let hidden = ops::rms_norm(&hidden, &shared.norm, eps)?;

        // LM head on the last position only
        let hidden_size = self.config.hidden_size;
        let values = hidden.to_f32_vec()?;
        let last = Tensor::from_f32(&values[values.len() - hidden_size..], vec![1, hidden_size])?;
        let mut logits = ops::linear(&last, shared.output_projection())?.to_f32_vec()?;
        logits.truncate(self.config.vocab_size);

        Ok(logits)
    }

    /// Causal self-attention with rotary embeddings and grouped KV heads
    fn attention(&self, hidden: &Tensor, layer: &LayerWeights) -> Result<Tensor> {
        let seq_len = hidden.shape()[0];
        let hidden_size = self.config.hidden_size;
        let num_heads = self.config.num_heads;
        let num_kv_heads = self.config.num_kv_heads;
        let head_dim = self.config.head_dim();
        let group = self.config.gqa_ratio();

        let mut q = ops::linear(hidden, &layer.q_proj)?.to_f32_vec()?;
        let mut k = ops::linear(hidden, &layer.k_proj)?.to_f32_vec()?;
        let v = ops::linear(hidden, &layer.v_proj)?.to_f32_vec()?;

        ops::apply_rope(&mut q, seq_len, num_heads, head_dim, self.config.rope_theta);
        ops::apply_rope(&mut k, seq_len, num_kv_heads, head_dim, self.config.rope_theta);

        let scale = 1.0 / (head_dim as f32).sqrt();
        let mut output = vec![0.0f32; seq_len * hidden_size];
        let mut scores = vec![0.0f32; seq_len];

        for h in 0..num_heads {
            let kv_h = h / group;

            for i in 0..seq_len {
                let q_row = &q[(i * num_heads + h) * head_dim..][..head_dim];

                // Causal: only positions 0..=i
                let mut max_val = f32::NEG_INFINITY;
                for (j, score) in scores.iter_mut().enumerate().take(i + 1) {
                    let k_row = &k[(j * num_kv_heads + kv_h) * head_dim..][..head_dim];
                    *score = q_row.iter().zip(k_row).map(|(a, b)| a * b).sum::<f32>() * scale;
                    max_val = max_val.max(*score);
                }

                let mut sum = 0.0f32;
                for score in scores.iter_mut().take(i + 1) {
                    *score = (*score - max_val).exp();
                    sum += *score;
                }

                let out = &mut output[i * hidden_size + h * head_dim..][..head_dim];
                for (j, &weight) in scores.iter().enumerate().take(i + 1) {
                    let v_row = &v[(j * num_kv_heads + kv_h) * head_dim..][..head_dim];
                    for (o, &val) in out.iter_mut().zip(v_row) {
                        *o += weight / sum * val;
                    }
                }
            }
        }

        let attn_out = Tensor::from_f32(&output, vec![seq_len, hidden_size])?;
        ops::linear(&attn_out, &layer.o_proj)
    }

    /// SwiGLU MLP
    fn mlp(&self, hidden: &Tensor, layer: &LayerWeights) -> Result<Tensor> {
        let gate = ops::silu(&ops::linear(hidden, &layer.gate_proj)?)?;
        let up = ops::linear(hidden, &layer.up_proj)?;
        ops::linear(&ops::mul(&gate, &up)?, &layer.down_proj)
    }
}

/// Write prompt plus generated tokens of every beam of row `b`
///
/// Positions past the generated tokens keep whatever `output` was filled with.
fn write_beams(output: &mut Array3<i32>, b: usize, prompt: &[u32], beams: &[Vec<u32>]) {
    for (k, generated) in beams.iter().enumerate() {
        for (pos, &token) in prompt.iter().chain(generated).enumerate() {
            output[[b, k, pos]] = token as i32;
        }
    }
}
