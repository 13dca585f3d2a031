//! Preparing prompt batches for the engine

use ndarray::Array2;

/// Prompts for a batch of `batch_size` rows
///
/// A batch of one uses the first prompt; larger batches take the prompts in
/// order and repeat the first one for any rows beyond the list.
pub fn prompts_for_batch(prompts: &[String], batch_size: usize) -> Vec<String> {
    let mut batch: Vec<String> = prompts.iter().take(batch_size).cloned().collect();
    if let Some(first) = prompts.first() {
        while batch.len() < batch_size {
            batch.push(first.clone());
        }
    }
    batch
}

/// Move every row's tokens to the head, dropping leading `pad_id`s
///
/// Engines built with the GPT attention plugin read each row from position 0.
/// The freed tail is filled with `end_id`.
pub fn align_to_head(input_ids: &Array2<i32>, pad_id: i32, end_id: i32) -> Array2<i32> {
    let mut aligned = Array2::from_elem(input_ids.dim(), end_id);

    for (src, mut dst) in input_ids.rows().into_iter().zip(aligned.rows_mut()) {
        let n_padding = src.iter().take_while(|&&t| t == pad_id).count();
        for (d, &s) in dst.iter_mut().zip(src.iter().skip(n_padding)) {
            *d = s;
        }
    }

    aligned
}
