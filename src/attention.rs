//! Multi-head self-attention inference module
//!
//! [`SelfAttention`] orchestrates the weight store, the projections, and
//! the attention kernels into the public forward-pass entry point:
//!
//! ```text
//! input ─┬─> Q projection ─┐
//!        ├─> K projection ─┼─> scaled dot-product attention ─> merge heads
//!        └─> V projection ─┘        (additive mask, softmax,
//!                                    multiplicative head mask)
//!                                            │
//!        residual ───────────────────────────┴─> output projection
//!                                                 [+ LayerNorm]
//! ```
//!
//! The module owns no mutable state across calls: weights are immutable
//! after conversion and per-call scratch comes from an internally
//! synchronized pool, so one instance can serve concurrent `forward` calls
//! from multiple threads.
//!
//! ## Example
//!
//! ```rust,ignore
//! use atento::{additive_mask, AttentionConfig, AttentionSource, SelfAttention};
//!
//! let config = AttentionConfig::new(768, 12)?;
//! let module = SelfAttention::from_source(config, &source)?;
//! let output = module.forward(&hidden_states, &mask, None)?;
//! ```

use crate::config::AttentionConfig;
use crate::error::{AtentoError, Result};
use crate::inference::{attention_forward, merge_heads, ScratchPool};
use crate::tensor::Tensor;
use crate::weights::{AttentionSource, AttentionWeights, QkvProjection};

#[cfg(debug_assertions)]
use crate::inference::check_finite;

/// Hidden sizes up to this fuse Q/K/V into one matmul by default
///
/// Benchmark-derived crossover: one fused matmul wins for small models,
/// three parallel matmuls win once per-projection work is large enough to
/// fill the pool.
const FUSED_HIDDEN_LIMIT: usize = 512;

/// How the Q/K/V projections are executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QkvStrategy {
    /// Choose by hidden size (fuse at or below the crossover point)
    Auto,
    /// Single `(3 * hidden, hidden)` matmul, then split rows
    Fused,
    /// Three independent matmuls submitted in parallel
    Separate,
}

/// Multi-head self-attention inference module
///
/// Constructed once from a trained block's parameters; `forward` may then
/// be called concurrently from any number of threads.
#[derive(Debug)]
pub struct SelfAttention {
    config: AttentionConfig,
    weights: AttentionWeights,
    pool: ScratchPool,
}

impl SelfAttention {
    /// Convert a trained attention block with the default projection
    /// strategy
    ///
    /// # Errors
    ///
    /// Returns [`AtentoError::ConversionError`] on inconsistent source
    /// parameters.
    pub fn from_source(config: AttentionConfig, source: &AttentionSource<'_>) -> Result<Self> {
        Self::from_source_with_strategy(config, source, QkvStrategy::Auto)
    }

    /// Convert a trained attention block with an explicit projection
    /// strategy
    ///
    /// # Errors
    ///
    /// Returns [`AtentoError::ConversionError`] on inconsistent source
    /// parameters.
    pub fn from_source_with_strategy(
        config: AttentionConfig,
        source: &AttentionSource<'_>,
        strategy: QkvStrategy,
    ) -> Result<Self> {
        let fused = match strategy {
            QkvStrategy::Auto => config.hidden_size <= FUSED_HIDDEN_LIMIT,
            QkvStrategy::Fused => true,
            QkvStrategy::Separate => false,
        };
        let weights = if fused {
            AttentionWeights::from_source_fused(&config, source)?
        } else {
            AttentionWeights::from_source(&config, source)?
        };
        Ok(Self {
            config,
            weights,
            pool: ScratchPool::new(),
        })
    }

    /// Forward pass
    ///
    /// # Arguments
    ///
    /// * `input` - Hidden states, `(batch, seq, hidden)`
    /// * `attention_mask` - Additive mask, `(batch, 1, 1, seq)`; excluded
    ///   positions carry a large negative value, kept positions carry zero
    /// * `head_mask` - Optional multiplicative gate,
    ///   `(batch, num_heads, seq, seq)`, applied to the post-softmax
    ///   probabilities; absence means all-ones
    ///
    /// # Returns
    ///
    /// Output tensor of shape `(batch, seq, hidden)`. The call is a pure
    /// function of its inputs and the immutable weight store; identical
    /// inputs produce bitwise-identical outputs.
    ///
    /// # Errors
    ///
    /// Returns [`AtentoError::InvalidShape`] if any dimension disagrees;
    /// the module remains valid for subsequent calls. Debug builds also
    /// return [`AtentoError::NumericError`] if the output contains NaN or
    /// Inf.
    pub fn forward(
        &self,
        input: &Tensor<f32>,
        attention_mask: &Tensor<f32>,
        head_mask: Option<&Tensor<f32>>,
    ) -> Result<Tensor<f32>> {
        let (batch, seq) = self.validate_call(input, attention_mask, head_mask)?;
        let hidden = self.config.hidden_size;
        let num_heads = self.config.num_heads;
        let head_size = self.config.head_size();
        let tokens = batch * seq;

        let mut scratch =
            self.pool
                .acquire(batch, seq, hidden, num_heads, self.weights.is_fused());
        let input2d = input.data();

        // Q/K/V projections
        match &self.weights.qkv {
            QkvProjection::Fused { qkv } => {
                qkv.forward_into(input2d, &mut scratch.qkv);
                split_qkv(
                    &scratch.qkv,
                    hidden,
                    &mut scratch.q,
                    &mut scratch.k,
                    &mut scratch.v,
                );
            }
            QkvProjection::Separate { query, key, value } => {
                let (q_buf, k_buf, v_buf) = (&mut scratch.q, &mut scratch.k, &mut scratch.v);
                rayon::join(
                    || query.forward_into(input2d, q_buf),
                    || {
                        rayon::join(
                            || key.forward_into(input2d, k_buf),
                            || value.forward_into(input2d, v_buf),
                        )
                    },
                );
            }
        }

        // Scaled dot-product attention per (batch, head)
        attention_forward(
            &self.config,
            batch,
            seq,
            &scratch.q,
            &scratch.k,
            &scratch.v,
            attention_mask.data(),
            head_mask.map(Tensor::data),
            &mut scratch.scores,
            &mut scratch.context,
        );

        // Merge heads and project
        merge_heads(
            &scratch.context,
            batch,
            seq,
            num_heads,
            head_size,
            &mut scratch.merged,
        );

        let mut out = vec![0.0; tokens * hidden];
        self.weights.output.forward_into(&scratch.merged, &mut out);

        // Output sub-layer of the trained block: LayerNorm(projection + input)
        if let Some(norm) = &self.weights.norm {
            let mut normed = vec![0.0; tokens * hidden];
            norm.forward_residual_into(&out, input2d, &mut normed);
            out = normed;
        }

        self.pool.release(scratch);

        #[cfg(debug_assertions)]
        check_finite(&out, "forward output")?;

        Tensor::from_vec(vec![batch, seq, hidden], out)
    }

    /// Module configuration
    #[must_use]
    pub fn config(&self) -> &AttentionConfig {
        &self.config
    }

    /// Whether Q/K/V run as one fused matmul
    #[must_use]
    pub fn is_fused(&self) -> bool {
        self.weights.is_fused()
    }

    /// Whether the output sub-layer applies a residual layer norm
    #[must_use]
    pub fn has_output_norm(&self) -> bool {
        self.weights.has_output_norm()
    }

    fn validate_call(
        &self,
        input: &Tensor<f32>,
        attention_mask: &Tensor<f32>,
        head_mask: Option<&Tensor<f32>>,
    ) -> Result<(usize, usize)> {
        let shape = input.shape();
        if shape.len() != 3 {
            return Err(AtentoError::InvalidShape {
                reason: format!("input must be (batch, seq, hidden), got {shape:?}"),
            });
        }
        let (batch, seq, h) = (shape[0], shape[1], shape[2]);
        if h != self.config.hidden_size {
            return Err(AtentoError::InvalidShape {
                reason: format!(
                    "input hidden dimension {h} doesn't match configured {}",
                    self.config.hidden_size
                ),
            });
        }

        let expected_mask = [batch, 1, 1, seq];
        if attention_mask.shape() != expected_mask {
            return Err(AtentoError::InvalidShape {
                reason: format!(
                    "attention mask shape {:?} doesn't match expected {expected_mask:?}",
                    attention_mask.shape()
                ),
            });
        }

        if let Some(hm) = head_mask {
            let expected_hm = [batch, self.config.num_heads, seq, seq];
            if hm.shape() != expected_hm {
                return Err(AtentoError::InvalidShape {
                    reason: format!(
                        "head mask shape {:?} doesn't match expected {expected_hm:?}",
                        hm.shape()
                    ),
                });
            }
        }

        Ok((batch, seq))
    }
}

/// Build an additive attention mask from a binary keep mask
///
/// Kept positions (`keep == 1`) map to `0`; excluded positions
/// (`keep == 0`) map to `mask_value`, so their post-softmax weight is ≈ 0.
/// Input is `(batch, seq)`; output is the `(batch, 1, 1, seq)` shape
/// `forward` expects.
///
/// # Errors
///
/// Returns [`AtentoError::InvalidShape`] if `keep` is not 2-D.
pub fn additive_mask(keep: &Tensor<f32>, mask_value: f32) -> Result<Tensor<f32>> {
    let shape = keep.shape();
    if shape.len() != 2 {
        return Err(AtentoError::InvalidShape {
            reason: format!("keep mask must be (batch, seq), got {shape:?}"),
        });
    }
    let data: Vec<f32> = keep.data().iter().map(|&m| (1.0 - m) * mask_value).collect();
    Tensor::from_vec(vec![shape[0], 1, 1, shape[1]], data)
}

/// Split fused `(tokens, 3 * hidden)` projection rows into Q/K/V buffers
fn split_qkv(qkv: &[f32], hidden: usize, q: &mut [f32], k: &mut [f32], v: &mut [f32]) {
    for (t, row) in qkv.chunks_exact(3 * hidden).enumerate() {
        let dst = t * hidden;
        q[dst..dst + hidden].copy_from_slice(&row[..hidden]);
        k[dst..dst + hidden].copy_from_slice(&row[hidden..2 * hidden]);
        v[dst..dst + hidden].copy_from_slice(&row[2 * hidden..]);
    }
}
