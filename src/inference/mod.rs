//! Attention compute kernels
//!
//! The performance-critical half of the crate: given projected Q/K/V
//! buffers, these kernels run the scaled dot-product attention pipeline
//! over scratch storage.
//!
//! ## Modules
//!
//! - [`simd`] - SIMD primitives (batched linear, softmax, dot products)
//! - [`scratch`] - Per-call buffer sets and the checkout pool
//! - [`thread`] - Thread configuration for the rayon compute pool
//!
//! ## Parallelism
//!
//! The score/softmax/context stage is embarrassingly parallel across
//! `(batch, head)` pairs: each pair owns one `(seq, seq)` score block and
//! one `(seq, head_size)` context block, so the work is submitted to the
//! rayon pool as independent per-pair items with no shared mutable state.

mod scratch;
mod simd;
mod thread;

pub use scratch::{AttentionScratch, ScratchPool};
pub use simd::{add_scaled, simd_dot, simd_linear, simd_linear_into, simd_mul, simd_softmax};
pub use thread::{configure_thread_pool, optimal_thread_count, ThreadConfig};

use rayon::prelude::*;
use trueno::Vector;

use crate::config::AttentionConfig;
use crate::error::{AtentoError, Result};
use crate::tensor::TensorView;

/// Scaled dot-product attention over projected Q/K/V buffers
///
/// Per `(batch, head)` pair, for every query position `i`:
/// 1. raw scores `scores[i, j] = (Q[i, :] · K[j, :]) * scale + mask[b, j]`
///    — the additive mask is broadcast over heads and query positions and
///    fused into the score pass,
/// 2. numerically stable softmax over the key axis,
/// 3. optional multiplicative head-mask gate on the probabilities,
/// 4. context `context[i, :] = Σ_j probs[i, j] * V[j, :]`.
///
/// Q/K/V are `(batch * seq, hidden)` row-major; the per-head `(seq,
/// head_size)` operands are strided views into them, not copies.
/// `attention_mask` is `(batch, seq)` (the flattened `(B, 1, 1, S)` form);
/// `head_mask`, when present, is `(batch, num_heads, seq, seq)`. Results
/// land in `scores` (the post-softmax probabilities, kept for inspection by
/// tests) and `context`, both laid out `(batch, num_heads, seq, ...)`.
///
/// All dimensions are validated by the caller; the kernel itself is a pure
/// function of its inputs.
#[allow(clippy::too_many_arguments)]
pub(crate) fn attention_forward(
    config: &AttentionConfig,
    batch: usize,
    seq: usize,
    q: &[f32],
    k: &[f32],
    v: &[f32],
    attention_mask: &[f32],
    head_mask: Option<&[f32]>,
    scores: &mut [f32],
    context: &mut [f32],
) {
    let num_heads = config.num_heads;
    let head_size = config.head_size();
    let hidden = config.hidden_size;
    let scale = config.scale();

    debug_assert_eq!(q.len(), batch * seq * hidden);
    debug_assert_eq!(scores.len(), batch * num_heads * seq * seq);
    debug_assert_eq!(context.len(), batch * num_heads * seq * head_size);
    debug_assert_eq!(attention_mask.len(), batch * seq);

    scores
        .par_chunks_mut(seq * seq)
        .zip(context.par_chunks_mut(seq * head_size))
        .enumerate()
        .for_each(|(idx, (scores_bh, ctx_bh))| {
            let b = idx / num_heads;
            let h = idx % num_heads;

            let q_head =
                TensorView::head(q, b, h, seq, hidden, head_size).expect("validated head split");
            let k_head =
                TensorView::head(k, b, h, seq, hidden, head_size).expect("validated head split");
            let v_head =
                TensorView::head(v, b, h, seq, hidden, head_size).expect("validated head split");
            let mask_row = &attention_mask[b * seq..(b + 1) * seq];

            // K rows converted once per head; every query row reuses them
            let k_rows: Vec<Vector> = (0..seq)
                .map(|j| Vector::from_slice(k_head.row(j)))
                .collect();

            for i in 0..seq {
                let row = &mut scores_bh[i * seq..(i + 1) * seq];
                let q_vec = Vector::from_slice(q_head.row(i));

                for (j, k_row) in k_rows.iter().enumerate() {
                    row[j] =
                        q_vec.dot(k_row).expect("dot product failed") * scale + mask_row[j];
                }

                simd_softmax(row);

                if let Some(hm) = head_mask {
                    let hm_start = ((b * num_heads + h) * seq + i) * seq;
                    simd_mul(row, &hm[hm_start..hm_start + seq]);
                }

                let ctx_row = &mut ctx_bh[i * head_size..(i + 1) * head_size];
                ctx_row.fill(0.0);
                for j in 0..seq {
                    let p = row[j];
                    if p != 0.0 {
                        add_scaled(ctx_row, v_head.row(j), p);
                    }
                }
            }
        });
}

/// Recombine per-head context blocks into `(tokens, hidden)` rows
///
/// Inverse of the head split: `merged[b, s, h * head_size + d] =
/// context[b, h, s, d]`. Parallel over the batch axis.
pub(crate) fn merge_heads(
    context: &[f32],
    batch: usize,
    seq: usize,
    num_heads: usize,
    head_size: usize,
    merged: &mut [f32],
) {
    let hidden = num_heads * head_size;
    debug_assert_eq!(context.len(), batch * num_heads * seq * head_size);
    debug_assert_eq!(merged.len(), batch * seq * hidden);

    merged
        .par_chunks_mut(seq * hidden)
        .enumerate()
        .for_each(|(b, m_b)| {
            for h in 0..num_heads {
                for s in 0..seq {
                    let src_start = ((b * num_heads + h) * seq + s) * head_size;
                    let dst_start = s * hidden + h * head_size;
                    m_b[dst_start..dst_start + head_size]
                        .copy_from_slice(&context[src_start..src_start + head_size]);
                }
            }
        });
}

/// Scan a buffer for NaN/Inf, reporting where it was found
///
/// Used by debug builds on the forward output; never on the release fast
/// path.
pub(crate) fn check_finite(data: &[f32], what: &str) -> Result<()> {
    if let Some(pos) = data.iter().position(|x| !x.is_finite()) {
        return Err(AtentoError::NumericError {
            reason: format!("non-finite value at index {pos} in {what}"),
        });
    }
    Ok(())
}
