//! Sampling configuration and single-beam token selection

use crate::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Configuration for a decode call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Token that ends a sequence; also fills unused output positions
    pub end_id: u32,

    /// Padding token of the inputs
    pub pad_id: u32,

    /// Beam width (1 = sampling / greedy)
    pub num_beams: usize,

    /// Temperature for sampling (1.0 = unscaled)
    pub temperature: f32,

    /// Top-k sampling (1 = greedy, 0 = disabled)
    pub top_k: usize,

    /// Top-p (nucleus) threshold (0.0 = disabled)
    pub top_p: f32,

    /// Length penalty exponent applied to beam scores
    pub length_penalty: f32,

    /// Repetition penalty (1.0 = disabled)
    pub repetition_penalty: f32,

    /// Seed for the sampling RNG
    pub random_seed: u64,
}

impl SamplingConfig {
    /// Greedy decoding with the given special tokens
    pub fn new(end_id: u32, pad_id: u32) -> Self {
        Self {
            end_id,
            pad_id,
            num_beams: 1,
            temperature: 1.0,
            top_k: 1,
            top_p: 0.0,
            length_penalty: 1.0,
            repetition_penalty: 1.0,
            random_seed: 0,
        }
    }

    /// Whether single-beam decoding reduces to argmax
    pub fn is_greedy(&self) -> bool {
        self.top_k == 1 || (self.top_k == 0 && self.top_p <= 0.0) || self.temperature < 1e-6
    }
}

/// Picks the next token for a single beam
pub struct TokenSampler {
    rng: StdRng,
}

impl TokenSampler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Sample the next token; `history` is everything decoded so far, prompt included
    pub fn sample(&mut self, logits: &[f32], history: &[u32], config: &SamplingConfig) -> u32 {
        let mut logits = logits.to_vec();
        apply_repetition_penalty(&mut logits, history, config.repetition_penalty);

        if config.is_greedy() {
            return argmax(&logits) as u32;
        }

        let scaled: Vec<f32> = logits.iter().map(|&x| x / config.temperature).collect();

        // Candidates sorted by logit, highest first; ties keep the lower id first
        let mut indexed: Vec<(usize, f32)> = scaled.into_iter().enumerate().collect();
        indexed.sort_by(|(_, a), (_, b)| b.total_cmp(a));
        if config.top_k > 0 && config.top_k < indexed.len() {
            indexed.truncate(config.top_k);
        }

        // Softmax
        let max_val = indexed.first().map_or(0.0, |&(_, v)| v);
        let exp: Vec<f32> = indexed.iter().map(|&(_, v)| (v - max_val).exp()).collect();
        let sum: f32 = exp.iter().sum();
        let mut probs: Vec<(usize, f32)> = indexed
            .iter()
            .zip(exp.iter())
            .map(|(&(i, _), &e)| (i, e / sum))
            .collect();

        if config.top_p > 0.0 && config.top_p < 1.0 {
            let mut cumsum = 0.0;
            let mut cutoff = probs.len();
            for (i, &(_, p)) in probs.iter().enumerate() {
                cumsum += p;
                if cumsum >= config.top_p {
                    cutoff = i + 1;
                    break;
                }
            }
            probs.truncate(cutoff);
        }

        let total: f32 = probs.iter().map(|&(_, p)| p).sum();
        let r: f32 = self.rng.gen::<f32>() * total;
        let mut cumsum = 0.0;
        for &(idx, p) in &probs {
            cumsum += p;
            if r < cumsum {
                return idx as u32;
            }
        }

        probs.last().map_or(0, |&(idx, _)| idx as u32)
    }
}

/// Draw tokens after `prompt` until `end_id` or `max_new_tokens`
///
/// Returns the generated tokens only; a finished sequence ends with `end_id`.
pub fn sample_until_end<F>(
    prompt: &[u32],
    max_new_tokens: usize,
    config: &SamplingConfig,
    sampler: &mut TokenSampler,
    mut logits_for: F,
) -> Result<Vec<u32>>
where
    F: FnMut(&[u32]) -> Result<Vec<f32>>,
{
    let mut tokens = prompt.to_vec();

    for _ in 0..max_new_tokens {
        let logits = logits_for(&tokens)?;
        let next = sampler.sample(&logits, &tokens, config);
        tokens.push(next);
        if next == config.end_id {
            break;
        }
    }

    Ok(tokens.split_off(prompt.len()))
}

/// Index of the largest logit; the lowest index wins ties
pub fn argmax(logits: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in logits.iter().enumerate() {
        if v > logits[best] {
            best = i;
        }
    }
    best
}

/// Penalize tokens that already appear in `history`
pub fn apply_repetition_penalty(logits: &mut [f32], history: &[u32], penalty: f32) {
    if (penalty - 1.0).abs() < f32::EPSILON {
        return;
    }
    let mut seen = vec![false; logits.len()];
    for &token in history {
        let token = token as usize;
        if token < logits.len() && !seen[token] {
            seen[token] = true;
            let l = &mut logits[token];
            *l = if *l > 0.0 { *l / penalty } else { *l * penalty };
        }
    }
}
