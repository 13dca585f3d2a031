//! Tensor operations for the transformer forward pass
//!
//! Rows are processed in parallel with rayon. Each output element is reduced
//! sequentially, so results do not depend on the thread count.

use super::Tensor;
use crate::{Error, Result};
use rayon::prelude::*;

// Below this many output elements the rayon overhead dominates
const PARALLEL_THRESHOLD: usize = 4096;

/// Linear projection: Y = X @ W^T
/// X: [M, K], W: [N, K] -> Y: [M, N]
///
/// Weights are stored row-major as `[out_features, in_features]`, so each
/// output element is a dot product of two contiguous rows.
pub fn linear(x: &Tensor, w: &Tensor) -> Result<Tensor> {
    let (m, k1) = matrix_dims(x)?;
    let (n, k2) = matrix_dims(w)?;

    if k1 != k2 {
        return Err(Error::ShapeMismatch {
            expected: vec![k1],
            got: vec![k2],
        });
    }
    let k = k1;
    if m == 0 || n == 0 {
        return Tensor::from_f32(&[], vec![m, n]);
    }

    let x_data = x.to_f32_vec()?;
    let w_data = w.to_f32_vec()?;
    let mut out = vec![0.0f32; m * n];

    let row_kernel = |(i, out_row): (usize, &mut [f32])| {
        let x_row = &x_data[i * k..(i + 1) * k];
        for (j, o) in out_row.iter_mut().enumerate() {
            *o = dot(x_row, &w_data[j * k..(j + 1) * k]);
        }
    };

    if m * n < PARALLEL_THRESHOLD {
        out.chunks_mut(n).enumerate().for_each(row_kernel);
    } else {
        out.par_chunks_mut(n).enumerate().for_each(row_kernel);
    }

    Tensor::from_f32(&out, vec![m, n])
}

/// Dot product, unrolled by 4
#[inline]
fn dot(a: &[f32], b: &[f32]) -> f32 {
    let mut sum = 0.0f32;
    let mut kk = 0;
    while kk + 4 <= a.len() {
        sum += a[kk] * b[kk];
        sum += a[kk + 1] * b[kk + 1];
        sum += a[kk + 2] * b[kk + 2];
        sum += a[kk + 3] * b[kk + 3];
        kk += 4;
    }
    while kk < a.len() {
        sum += a[kk] * b[kk];
        kk += 1;
    }
    sum
}

fn matrix_dims(t: &Tensor) -> Result<(usize, usize)> {
    match t.shape() {
        [rows, cols] => Ok((*rows, *cols)),
        other => Err(Error::ShapeMismatch {
            expected: vec![2],
            got: vec![other.len()],
        }),
    }
}

/// Gather embedding rows for the given token ids
pub fn embedding(table: &Tensor, ids: &[u32]) -> Result<Tensor> {
    let (vocab, hidden) = matrix_dims(table)?;
    let data = table.to_f32_vec()?;
    let mut out = Vec::with_capacity(ids.len() * hidden);

    for &id in ids {
        let id = id as usize;
        if id >= vocab {
            return Err(Error::Generation(format!(
                "token id {} out of range for vocabulary of {}",
                id, vocab
            )));
        }
        out.extend_from_slice(&data[id * hidden..(id + 1) * hidden]);
    }

    Tensor::from_f32(&out, vec![ids.len(), hidden])
}

/// RMS normalization over the last dimension
pub fn rms_norm(x: &Tensor, weight: &Tensor, eps: f32) -> Result<Tensor> {
    let data = x.to_f32_vec()?;
    let weight_data = weight.to_f32_vec()?;
    let shape = x.shape().to_vec();
    let hidden_size = shape.last().copied().unwrap_or(0);

    if weight_data.len() != hidden_size {
        return Err(Error::ShapeMismatch {
            expected: vec![hidden_size],
            got: vec![weight_data.len()],
        });
    }

    let out: Vec<f32> = data
        .par_chunks(hidden_size.max(1))
        .flat_map_iter(|row| {
            let sum_sq: f32 = row.iter().map(|&v| v * v).sum();
            let inv_rms = 1.0 / (sum_sq / hidden_size as f32 + eps).sqrt();
            row.iter()
                .zip(weight_data.iter())
                .map(move |(&v, &w)| v * inv_rms * w)
        })
        .collect();

    Tensor::from_f32(&out, shape)
}

/// SiLU (Swish) activation: x * sigmoid(x)
pub fn silu(x: &Tensor) -> Result<Tensor> {
    let data = x.to_f32_vec()?;
    let out: Vec<f32> = data.par_iter().map(|&v| v * sigmoid(v)).collect();
    Tensor::from_f32(&out, x.shape().to_vec())
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    let x = x.clamp(-20.0, 20.0);
    1.0 / (1.0 + (-x).exp())
}

/// Element-wise multiply
pub fn mul(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    zip_with(a, b, |x, y| x * y)
}

/// Element-wise add
pub fn add(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    zip_with(a, b, |x, y| x + y)
}

fn zip_with(a: &Tensor, b: &Tensor, f: impl Fn(f32, f32) -> f32 + Sync) -> Result<Tensor> {
    if a.shape() != b.shape() {
        return Err(Error::ShapeMismatch {
            expected: a.shape().to_vec(),
            got: b.shape().to_vec(),
        });
    }

    let a_data = a.to_f32_vec()?;
    let b_data = b.to_f32_vec()?;
    let out: Vec<f32> = a_data
        .par_iter()
        .zip(b_data.par_iter())
        .map(|(&x, &y)| f(x, y))
        .collect();

    Tensor::from_f32(&out, a.shape().to_vec())
}

/// Rotate `x` in place with rotary position embeddings
///
/// x: [seq_len, num_heads, head_dim] flattened; positions start at 0.
pub fn apply_rope(x: &mut [f32], seq_len: usize, num_heads: usize, head_dim: usize, theta: f32) {
    let half_dim = head_dim / 2;
    let freqs: Vec<f32> = (0..half_dim)
        .map(|i| 1.0 / theta.powf(2.0 * i as f32 / head_dim as f32))
        .collect();

    for pos in 0..seq_len {
        for h in 0..num_heads {
            let base = (pos * num_heads + h) * head_dim;
            for (i, &freq) in freqs.iter().enumerate() {
                let (sin, cos) = (pos as f32 * freq).sin_cos();
                let x0 = x[base + i];
                let x1 = x[base + i + half_dim];
                x[base + i] = x0 * cos - x1 * sin;
                x[base + i + half_dim] = x0 * sin + x1 * cos;
            }
        }
    }
}

/// Log-softmax of a logit vector
pub fn log_softmax(logits: &[f32]) -> Vec<f32> {
    if logits.is_empty() {
        return Vec::new();
    }
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let sum_exp: f32 = logits.iter().map(|&v| (v - max).exp()).sum();
    let log_sum_exp = max + sum_exp.ln();
    logits.iter().map(|&v| v - log_sum_exp).collect()
}
