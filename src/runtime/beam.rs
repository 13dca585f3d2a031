//! Beam search over a single prompt

use crate::tensor::ops::log_softmax;
use crate::Result;
use std::cmp::Ordering;

/// Parameters of one beam search
#[derive(Debug, Clone, Copy)]
pub struct BeamSearchParams {
    pub beam_width: usize,
    pub max_new_tokens: usize,
    pub end_id: u32,
    /// Exponent applied to the generated length when scoring
    pub length_penalty: f32,
    pub temperature: f32,
}

/// A candidate continuation of the prompt
#[derive(Debug, Clone, PartialEq)]
pub struct Hypothesis {
    /// Generated tokens (prompt excluded); finished ones end with `end_id`
    pub tokens: Vec<u32>,
    /// Cumulative log probability
    pub log_prob: f32,
    pub finished: bool,
}

impl Hypothesis {
    /// Length-normalized score: `log_prob / len ^ length_penalty`
    pub fn score(&self, length_penalty: f32) -> f32 {
        let len = self.tokens.len().max(1) as f32;
        self.log_prob / len.powf(length_penalty)
    }
}

struct Candidate {
    parent: usize,
    token: u32,
    log_prob: f32,
}

/// Run beam search from `prompt`, returning up to `beam_width` hypotheses, best first
///
/// `logits_for` maps a full token sequence (prompt + generated) to the logits
/// of the next position. Each step expands every live beam with its
/// `2 * beam_width` best tokens. A candidate ending in `end_id` retires when it
/// ranks within the top `beam_width` of the step; the search stops early once
/// `beam_width` hypotheses have retired.
pub fn beam_search<F>(
    prompt: &[u32],
    params: &BeamSearchParams,
    mut logits_for: F,
) -> Result<Vec<Hypothesis>>
where
    F: FnMut(&[u32]) -> Result<Vec<f32>>,
{
    let width = params.beam_width.max(1);
    let mut live = vec![Hypothesis {
        tokens: Vec::new(),
        log_prob: 0.0,
        finished: false,
    }];
    let mut completed: Vec<Hypothesis> = Vec::new();
    let mut sequence = prompt.to_vec();

    for _ in 0..params.max_new_tokens {
        let mut candidates = Vec::with_capacity(live.len() * 2 * width);

        for (parent, hyp) in live.iter().enumerate() {
            sequence.truncate(prompt.len());
            sequence.extend_from_slice(&hyp.tokens);

            let mut logits = logits_for(&sequence)?;
            if params.temperature > 0.0 && (params.temperature - 1.0).abs() > f32::EPSILON {
                let inv_t = 1.0 / params.temperature;
                logits.iter_mut().for_each(|v| *v *= inv_t);
            }
            let log_probs = log_softmax(&logits);

            for (token, lp) in top_k(&log_probs, 2 * width) {
                candidates.push(Candidate {
                    parent,
                    token,
                    log_prob: hyp.log_prob + lp,
                });
            }
        }

        // Stable sort keeps parent order, then token order, among equal scores
        candidates.sort_by(|a, b| {
            b.log_prob
                .partial_cmp(&a.log_prob)
                .unwrap_or(Ordering::Equal)
        });

        let mut next = Vec::with_capacity(width);
        for (rank, cand) in candidates.iter().enumerate() {
            let mut tokens = live[cand.parent].tokens.clone();
            tokens.push(cand.token);

            if cand.token == params.end_id {
                if rank < width {
                    completed.push(Hypothesis {
                        tokens,
                        log_prob: cand.log_prob,
                        finished: true,
                    });
                }
            } else {
                next.push(Hypothesis {
                    tokens,
                    log_prob: cand.log_prob,
                    finished: false,
                });
            }

            if next.len() == width {
                break;
            }
        }

        live = next;
        if completed.len() >= width || live.is_empty() {
            break;
        }
    }

    completed.extend(live);
    completed.sort_by(|a, b| {
        b.score(params.length_penalty)
            .partial_cmp(&a.score(params.length_penalty))
            .unwrap_or(Ordering::Equal)
    });
    completed.truncate(width);
    Ok(completed)
}

/// Return the top-k (`token_id`, `log_prob`) pairs sorted descending
fn top_k(log_probs: &[f32], k: usize) -> Vec<(u32, f32)> {
    let mut indexed: Vec<(u32, f32)> = log_probs
        .iter()
        .enumerate()
        .map(|(i, &v)| (i as u32, v))
        .collect();
    indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    indexed.truncate(k);
    indexed
}
