//! Weight ingestion from a trained attention block
//!
//! [`AttentionSource`] is the borrowed view of an external trained block's
//! parameters; [`AttentionWeights`] is the owned, immutable store the
//! module computes against. Conversion is a one-time deep copy: every
//! parameter slice is copied into owned row-major tensors, so the
//! constructed module has no lifetime coupling to the source framework's
//! object graph. After construction the store is never mutated, which is
//! what makes concurrent forward calls safe without locking.

use crate::config::AttentionConfig;
use crate::error::{AtentoError, Result};
use crate::layers::{LayerNorm, Linear};
use crate::tensor::Tensor;

/// Borrowed parameters of a trained attention block
///
/// Weight matrices are `(hidden, hidden)` row-major with output units as
/// rows (`y = x · Wᵀ + b`); biases are `(hidden,)`. The layer-norm pair
/// belongs to the block's output sub-layer and is optional: when present,
/// the converted module finishes its forward pass with
/// `LayerNorm(projection + input)` exactly as the trained block does.
#[derive(Debug, Clone, Copy)]
pub struct AttentionSource<'a> {
    /// Query projection weight, `(hidden, hidden)`
    pub query_weight: &'a [f32],
    /// Query projection bias, `(hidden,)`
    pub query_bias: &'a [f32],
    /// Key projection weight, `(hidden, hidden)`
    pub key_weight: &'a [f32],
    /// Key projection bias, `(hidden,)`
    pub key_bias: &'a [f32],
    /// Value projection weight, `(hidden, hidden)`
    pub value_weight: &'a [f32],
    /// Value projection bias, `(hidden,)`
    pub value_bias: &'a [f32],
    /// Output projection weight, `(hidden, hidden)`
    pub output_weight: &'a [f32],
    /// Output projection bias, `(hidden,)`
    pub output_bias: &'a [f32],
    /// Output layer-norm gamma, `(hidden,)`
    pub norm_weight: Option<&'a [f32]>,
    /// Output layer-norm beta, `(hidden,)`
    pub norm_bias: Option<&'a [f32]>,
}

/// Q/K/V projection storage: three matmuls or one fused matmul
///
/// Fusing concatenates the three weight matrices into a single `(3 *
/// hidden, hidden)` matrix so the projection stage becomes one batched
/// matmul. Semantics are identical; the split into Q/K/V happens on the
/// projected rows.
#[derive(Debug, Clone)]
pub(crate) enum QkvProjection {
    Separate {
        query: Linear,
        key: Linear,
        value: Linear,
    },
    Fused {
        qkv: Linear,
    },
}

/// Immutable weight store for one attention module
///
/// Created once by [`AttentionWeights::from_source`]; shared read-only
/// across all forward invocations.
#[derive(Debug, Clone)]
pub struct AttentionWeights {
    pub(crate) qkv: QkvProjection,
    pub(crate) output: Linear,
    pub(crate) norm: Option<LayerNorm>,
}

fn expect_len(name: &str, actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(AtentoError::ConversionError {
            reason: format!("{name} has {actual} elements, expected {expected}"),
        });
    }
    Ok(())
}

impl AttentionWeights {
    /// Convert a trained block's parameters, keeping three separate Q/K/V
    /// projections
    ///
    /// # Errors
    ///
    /// Returns [`AtentoError::ConversionError`] if any parameter length is
    /// inconsistent with `config.hidden_size`, or if only one of the
    /// layer-norm parameters is supplied.
    pub fn from_source(config: &AttentionConfig, source: &AttentionSource<'_>) -> Result<Self> {
        Self::validate(config, source)?;
        let hidden = config.hidden_size;

        let qkv = QkvProjection::Separate {
            query: owned_linear(hidden, source.query_weight, source.query_bias)?,
            key: owned_linear(hidden, source.key_weight, source.key_bias)?,
            value: owned_linear(hidden, source.value_weight, source.value_bias)?,
        };

        Self::assemble(config, source, qkv)
    }

    /// Convert a trained block's parameters, fusing Q/K/V into one matmul
    ///
    /// # Errors
    ///
    /// Same conditions as [`AttentionWeights::from_source`].
    pub fn from_source_fused(
        config: &AttentionConfig,
        source: &AttentionSource<'_>,
    ) -> Result<Self> {
        Self::validate(config, source)?;
        let hidden = config.hidden_size;

        let mut fused_weight = Vec::with_capacity(3 * hidden * hidden);
        fused_weight.extend_from_slice(source.query_weight);
        fused_weight.extend_from_slice(source.key_weight);
        fused_weight.extend_from_slice(source.value_weight);

        let mut fused_bias = Vec::with_capacity(3 * hidden);
        fused_bias.extend_from_slice(source.query_bias);
        fused_bias.extend_from_slice(source.key_bias);
        fused_bias.extend_from_slice(source.value_bias);

        let qkv = QkvProjection::Fused {
            qkv: Linear::from_parts(
                Tensor::from_vec(vec![3 * hidden, hidden], fused_weight)?,
                Tensor::from_vec(vec![3 * hidden], fused_bias)?,
            )?,
        };

        Self::assemble(config, source, qkv)
    }

    fn assemble(
        config: &AttentionConfig,
        source: &AttentionSource<'_>,
        qkv: QkvProjection,
    ) -> Result<Self> {
        let hidden = config.hidden_size;
        let output = owned_linear(hidden, source.output_weight, source.output_bias)?;

        let norm = match (source.norm_weight, source.norm_bias) {
            (Some(gamma), Some(beta)) => Some(LayerNorm::from_parts(
                gamma.to_vec(),
                beta.to_vec(),
                config.layer_norm_eps,
            )?),
            (None, None) => None,
            _ => unreachable!("validate() rejects a lone layer-norm parameter"),
        };

        log::debug!(
            "converted attention weights: hidden={hidden}, fused_qkv={}, output_norm={}",
            matches!(qkv, QkvProjection::Fused { .. }),
            norm.is_some()
        );

        Ok(Self { qkv, output, norm })
    }

    fn validate(config: &AttentionConfig, source: &AttentionSource<'_>) -> Result<()> {
        let hidden = config.hidden_size;
        let square = hidden * hidden;

        expect_len("query weight", source.query_weight.len(), square)?;
        expect_len("key weight", source.key_weight.len(), square)?;
        expect_len("value weight", source.value_weight.len(), square)?;
        expect_len("output weight", source.output_weight.len(), square)?;
        expect_len("query bias", source.query_bias.len(), hidden)?;
        expect_len("key bias", source.key_bias.len(), hidden)?;
        expect_len("value bias", source.value_bias.len(), hidden)?;
        expect_len("output bias", source.output_bias.len(), hidden)?;

        match (source.norm_weight, source.norm_bias) {
            (Some(gamma), Some(beta)) => {
                expect_len("layer-norm gamma", gamma.len(), hidden)?;
                expect_len("layer-norm beta", beta.len(), hidden)?;
            }
            (None, None) => {}
            _ => {
                return Err(AtentoError::ConversionError {
                    reason: "layer-norm gamma and beta must be supplied together".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Whether Q/K/V are stored as one fused projection
    #[must_use]
    pub fn is_fused(&self) -> bool {
        matches!(self.qkv, QkvProjection::Fused { .. })
    }

    /// Whether the output sub-layer carries a residual layer norm
    #[must_use]
    pub fn has_output_norm(&self) -> bool {
        self.norm.is_some()
    }
}

fn owned_linear(hidden: usize, weight: &[f32], bias: &[f32]) -> Result<Linear> {
    Linear::from_parts(
        Tensor::from_vec(vec![hidden, hidden], weight.to_vec())?,
        Tensor::from_vec(vec![hidden], bias.to_vec())?,
    )
}
