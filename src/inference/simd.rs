//! SIMD-accelerated primitive operations
//!
//! Hot-path kernels for the attention forward pass, built on trueno's SIMD
//! backend (AVX2/SSE on x86, NEON on ARM, scalar fallback elsewhere).
//!
//! ## Operations
//!
//! - [`simd_linear_into`] - Batched linear projection `Y = X·Wᵀ + b`
//! - [`simd_dot`] - SIMD-accelerated dot product
//! - [`simd_softmax`] - Numerically stable softmax
//! - [`simd_mul`] - Element-wise multiplication
//! - [`add_scaled`] - Fused scale-and-accumulate (axpy)

use rayon::prelude::*;
use trueno::Vector;

/// Tile size for cache-efficient iteration over weight rows
const TILE_SIZE: usize = 64;

/// SIMD-accelerated dot product
///
/// # Example
///
/// ```
/// use atento::inference::simd_dot;
///
/// let a = vec![1.0, 2.0, 3.0];
/// let b = vec![4.0, 5.0, 6.0];
/// assert!((simd_dot(&a, &b) - 32.0).abs() < 1e-5);
/// ```
#[inline]
#[must_use]
pub fn simd_dot(a: &[f32], b: &[f32]) -> f32 {
    Vector::from_slice(a)
        .dot(&Vector::from_slice(b))
        .expect("dot product failed")
}

/// Batched linear projection into a caller-provided buffer
///
/// Computes `out[t, o] = input[t, :] · weight[o, :] + bias[o]` for every
/// token row `t`. The input is treated as a single `(tokens, in_dim)`
/// matrix regardless of the caller's batch/sequence structure, so the whole
/// projection is one batched matmul: token rows run in parallel on the
/// rayon pool and each output element is a SIMD dot product, tiled over
/// weight rows for cache locality.
///
/// # Panics
///
/// Debug-asserts the buffer lengths; callers validate shapes beforehand.
pub fn simd_linear_into(
    input: &[f32],
    weight: &[f32],
    bias: &[f32],
    in_dim: usize,
    out_dim: usize,
    out: &mut [f32],
) {
    debug_assert_eq!(input.len() % in_dim, 0);
    debug_assert_eq!(weight.len(), out_dim * in_dim);
    debug_assert_eq!(bias.len(), out_dim);
    debug_assert_eq!(out.len(), (input.len() / in_dim) * out_dim);

    out.par_chunks_mut(out_dim)
        .zip(input.par_chunks(in_dim))
        .for_each(|(out_row, x)| {
            let x_vec = Vector::from_slice(x);

            for tile_start in (0..out_dim).step_by(TILE_SIZE) {
                let tile_end = (tile_start + TILE_SIZE).min(out_dim);

                for o in tile_start..tile_end {
                    let row_start = o * in_dim;
                    let w_row = Vector::from_slice(&weight[row_start..row_start + in_dim]);
                    out_row[o] = x_vec.dot(&w_row).expect("dot product failed") + bias[o];
                }
            }
        });
}

/// Batched linear projection returning a fresh buffer
///
/// Allocating variant of [`simd_linear_into`] for callers without a
/// scratch buffer.
#[must_use]
pub fn simd_linear(
    input: &[f32],
    weight: &[f32],
    bias: &[f32],
    in_dim: usize,
    out_dim: usize,
) -> Vec<f32> {
    let tokens = input.len() / in_dim;
    let mut out = vec![0.0; tokens * out_dim];
    simd_linear_into(input, weight, bias, in_dim, out_dim, &mut out);
    out
}

/// Numerically stable softmax over a single row, in place
///
/// Uses the max-subtraction trick to prevent overflow:
/// `softmax(x)_i = exp(x_i - max(x)) / sum(exp(x_j - max(x)))`
///
/// # Example
///
/// ```
/// use atento::inference::simd_softmax;
///
/// let mut data = vec![1.0, 2.0, 3.0];
/// simd_softmax(&mut data);
/// let sum: f32 = data.iter().sum();
/// assert!((sum - 1.0).abs() < 1e-5);
/// ```
pub fn simd_softmax(data: &mut [f32]) {
    if data.is_empty() {
        return;
    }

    let max_val = data.iter().copied().fold(f32::NEG_INFINITY, f32::max);

    let mut sum = 0.0;
    for x in data.iter_mut() {
        *x = (*x - max_val).exp();
        sum += *x;
    }

    if sum > 0.0 {
        let inv_sum = 1.0 / sum;
        for x in data.iter_mut() {
            *x *= inv_sum;
        }
    }
}

/// Element-wise multiplication (a *= b)
///
/// # Example
///
/// ```
/// use atento::inference::simd_mul;
///
/// let mut a = vec![1.0, 2.0, 3.0];
/// simd_mul(&mut a, &[2.0, 3.0, 4.0]);
/// assert_eq!(a, vec![2.0, 6.0, 12.0]);
/// ```
#[inline]
pub fn simd_mul(a: &mut [f32], b: &[f32]) {
    for (x, y) in a.iter_mut().zip(b.iter()) {
        *x *= y;
    }
}

/// Scale-and-accumulate: `acc += x * scale`
///
/// The inner step of the context matmul `context[i, :] += probs[i, j] *
/// V[j, :]`. Written as a plain indexed loop over equal-length slices so
/// the compiler can vectorize it.
#[inline]
pub fn add_scaled(acc: &mut [f32], x: &[f32], scale: f32) {
    for (a, &v) in acc.iter_mut().zip(x.iter()) {
        *a += v * scale;
    }
}
