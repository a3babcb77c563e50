//! Attention module configuration
//!
//! [`AttentionConfig`] carries the dimensions of a trained attention block
//! plus the two empirical constants of the masking convention. Both
//! constants are configurable rather than hard-coded: the additive mask
//! magnitude because it comes from the source model's convention, and the
//! layer-norm epsilon because it must match the trained block exactly for
//! output parity.

use serde::{Deserialize, Serialize};

use crate::error::{AtentoError, Result};

/// Additive mask value for excluded positions (post-softmax weight ≈ 0)
pub const DEFAULT_MASK_VALUE: f32 = -10000.0;

/// Layer-norm epsilon used by the encoder blocks this crate converts from
pub const DEFAULT_LAYER_NORM_EPS: f32 = 1e-12;

fn default_mask_value() -> f32 {
    DEFAULT_MASK_VALUE
}

fn default_layer_norm_eps() -> f32 {
    DEFAULT_LAYER_NORM_EPS
}

/// Configuration for a multi-head self-attention module
///
/// # Examples
///
/// ```
/// use atento::AttentionConfig;
///
/// let config = AttentionConfig::new(768, 12).unwrap();
/// assert_eq!(config.head_size(), 64);
/// assert!((config.scale() - 0.125).abs() < 1e-6);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttentionConfig {
    /// Model hidden dimension
    pub hidden_size: usize,
    /// Number of attention heads; must divide `hidden_size` evenly
    pub num_heads: usize,
    /// Additive value marking excluded positions in the attention mask
    #[serde(default = "default_mask_value")]
    pub mask_value: f32,
    /// Epsilon for the output layer normalization
    #[serde(default = "default_layer_norm_eps")]
    pub layer_norm_eps: f32,
}

impl AttentionConfig {
    /// Create a configuration, validating the head split
    ///
    /// # Errors
    ///
    /// Returns [`AtentoError::ConversionError`] if either dimension is zero
    /// or `hidden_size` is not divisible by `num_heads`.
    pub fn new(hidden_size: usize, num_heads: usize) -> Result<Self> {
        if hidden_size == 0 || num_heads == 0 {
            return Err(AtentoError::ConversionError {
                reason: format!(
                    "hidden_size {hidden_size} and num_heads {num_heads} must both be > 0"
                ),
            });
        }
        if hidden_size % num_heads != 0 {
            return Err(AtentoError::ConversionError {
                reason: format!(
                    "hidden_size {hidden_size} is not divisible by num_heads {num_heads}"
                ),
            });
        }
        Ok(Self {
            hidden_size,
            num_heads,
            mask_value: DEFAULT_MASK_VALUE,
            layer_norm_eps: DEFAULT_LAYER_NORM_EPS,
        })
    }

    /// Per-head sub-vector size
    #[must_use]
    pub fn head_size(&self) -> usize {
        self.hidden_size / self.num_heads
    }

    /// Attention scale `1 / sqrt(head_size)`
    #[must_use]
    pub fn scale(&self) -> f32 {
        #[allow(clippy::cast_precision_loss)]
        let head_size = self.head_size() as f32;
        1.0 / head_size.sqrt()
    }

    /// Override the additive mask magnitude
    #[must_use]
    pub fn with_mask_value(mut self, mask_value: f32) -> Self {
        self.mask_value = mask_value;
        self
    }

    /// Override the layer-norm epsilon
    #[must_use]
    pub fn with_layer_norm_eps(mut self, eps: f32) -> Self {
        self.layer_norm_eps = eps;
        self
    }
}
