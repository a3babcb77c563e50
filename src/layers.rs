//! Neural network layers for the attention module
//!
//! Implements the two building blocks the forward pass composes:
//! - Linear projection (batched `Y = X·Wᵀ + b`)
//! - Layer normalization (with the residual form used by encoder blocks)
//!
//! ## Example
//!
//! ```rust,ignore
//! use atento::layers::Linear;
//!
//! let linear = Linear::from_parts(weight, bias)?;
//! let projected = linear.forward(&hidden_states)?;
//! ```

use crate::error::{AtentoError, Result};
use crate::inference::simd_linear_into;
use crate::tensor::Tensor;

/// Linear projection layer holding loaded weights
///
/// The weight is stored row-major as `(out_features, in_features)` so each
/// output unit's weights are one contiguous row — the cache-friendly layout
/// for the dot products in [`simd_linear_into`].
#[derive(Debug, Clone)]
pub struct Linear {
    /// Weight matrix, shape `(out_features, in_features)`
    weight: Tensor<f32>,
    /// Bias vector, shape `(out_features,)`
    bias: Tensor<f32>,
    in_features: usize,
    out_features: usize,
}

impl Linear {
    /// Create a projection from loaded weight and bias tensors
    ///
    /// # Errors
    ///
    /// Returns [`AtentoError::InvalidShape`] if the weight is not 2-D or
    /// the bias length doesn't match the weight's output dimension.
    pub fn from_parts(weight: Tensor<f32>, bias: Tensor<f32>) -> Result<Self> {
        let wshape = weight.shape();
        if wshape.len() != 2 {
            return Err(AtentoError::InvalidShape {
                reason: format!("weight must be 2-D, got {wshape:?}"),
            });
        }
        let (out_features, in_features) = (wshape[0], wshape[1]);
        if bias.shape() != [out_features] {
            return Err(AtentoError::InvalidShape {
                reason: format!(
                    "bias shape {:?} doesn't match weight output dimension {out_features}",
                    bias.shape()
                ),
            });
        }
        Ok(Self {
            weight,
            bias,
            in_features,
            out_features,
        })
    }

    /// Forward pass: project every token row of the input
    ///
    /// The input's trailing dimension must equal `in_features`; all leading
    /// dimensions are collapsed into token rows and restored on the output.
    ///
    /// # Errors
    ///
    /// Returns [`AtentoError::InvalidShape`] on a trailing-dimension
    /// mismatch.
    pub fn forward(&self, input: &Tensor<f32>) -> Result<Tensor<f32>> {
        let shape = input.shape();
        let last_dim = shape[shape.len() - 1];
        if last_dim != self.in_features {
            return Err(AtentoError::InvalidShape {
                reason: format!(
                    "input trailing dimension {last_dim} doesn't match in_features {}",
                    self.in_features
                ),
            });
        }

        let tokens = input.len() / self.in_features;
        let mut out = vec![0.0; tokens * self.out_features];
        self.forward_into(input.data(), &mut out);

        let mut out_shape = shape.to_vec();
        *out_shape.last_mut().expect("shape is non-empty") = self.out_features;
        Tensor::from_vec(out_shape, out)
    }

    /// Forward pass into a caller-provided buffer (no allocation)
    ///
    /// Callers are responsible for pre-validated lengths: `input` holds
    /// whole token rows and `out` is sized `tokens * out_features`.
    pub fn forward_into(&self, input: &[f32], out: &mut [f32]) {
        simd_linear_into(
            input,
            self.weight.data(),
            self.bias.data(),
            self.in_features,
            self.out_features,
            out,
        );
    }

    /// Input dimension
    #[must_use]
    pub fn in_features(&self) -> usize {
        self.in_features
    }

    /// Output dimension
    #[must_use]
    pub fn out_features(&self) -> usize {
        self.out_features
    }

    /// Weight tensor, `(out_features, in_features)` row-major
    #[must_use]
    pub fn weight(&self) -> &Tensor<f32> {
        &self.weight
    }

    /// Bias tensor, `(out_features,)`
    #[must_use]
    pub fn bias(&self) -> &Tensor<f32> {
        &self.bias
    }
}

/// Layer normalization with loaded scale/shift parameters
///
/// Normalizes activations across the feature dimension:
/// ```text
/// y = (x - mean(x)) / sqrt(variance(x) + eps) * gamma + beta
/// ```
#[derive(Debug, Clone)]
pub struct LayerNorm {
    /// Feature dimension being normalized
    normalized_shape: usize,
    /// Epsilon for numerical stability
    eps: f32,
    /// Scale parameter (gamma)
    weight: Vec<f32>,
    /// Shift parameter (beta)
    bias: Vec<f32>,
}

impl LayerNorm {
    /// Create a layer norm with identity parameters (gamma=1, beta=0)
    ///
    /// # Errors
    ///
    /// Returns [`AtentoError::InvalidShape`] if `normalized_shape` is zero.
    pub fn new(normalized_shape: usize, eps: f32) -> Result<Self> {
        if normalized_shape == 0 {
            return Err(AtentoError::InvalidShape {
                reason: "normalized_shape must be > 0".to_string(),
            });
        }
        Ok(Self {
            normalized_shape,
            eps,
            weight: vec![1.0; normalized_shape],
            bias: vec![0.0; normalized_shape],
        })
    }

    /// Create a layer norm from trained gamma/beta parameters
    ///
    /// # Errors
    ///
    /// Returns [`AtentoError::InvalidShape`] if the parameter lengths
    /// differ or are zero.
    pub fn from_parts(weight: Vec<f32>, bias: Vec<f32>, eps: f32) -> Result<Self> {
        if weight.is_empty() || weight.len() != bias.len() {
            return Err(AtentoError::InvalidShape {
                reason: format!(
                    "gamma length {} and beta length {} must be equal and non-zero",
                    weight.len(),
                    bias.len()
                ),
            });
        }
        Ok(Self {
            normalized_shape: weight.len(),
            eps,
            weight,
            bias,
        })
    }

    /// Forward pass over every feature-dimension group of the input
    ///
    /// # Errors
    ///
    /// Returns [`AtentoError::InvalidShape`] if the input's trailing
    /// dimension doesn't match `normalized_shape`.
    pub fn forward(&self, input: &Tensor<f32>) -> Result<Tensor<f32>> {
        let shape = input.shape();
        let last_dim = shape[shape.len() - 1];
        if last_dim != self.normalized_shape {
            return Err(AtentoError::InvalidShape {
                reason: format!(
                    "last dimension {last_dim} doesn't match normalized_shape {}",
                    self.normalized_shape
                ),
            });
        }

        let mut out = vec![0.0; input.len()];
        for (group, out_group) in input
            .data()
            .chunks_exact(self.normalized_shape)
            .zip(out.chunks_exact_mut(self.normalized_shape))
        {
            self.normalize_row(group, out_group);
        }
        Tensor::from_vec(shape.to_vec(), out)
    }

    /// Residual form: `out[t, :] = LayerNorm(hidden[t, :] + residual[t, :])`
    ///
    /// The shape encoder blocks use after their output projection. Operates
    /// on flat token rows; lengths are the caller's responsibility.
    pub fn forward_residual_into(&self, hidden: &[f32], residual: &[f32], out: &mut [f32]) {
        debug_assert_eq!(hidden.len(), residual.len());
        debug_assert_eq!(hidden.len(), out.len());
        debug_assert_eq!(hidden.len() % self.normalized_shape, 0);

        let n = self.normalized_shape;
        let mut summed = vec![0.0; n];
        for ((h_row, r_row), out_row) in hidden
            .chunks_exact(n)
            .zip(residual.chunks_exact(n))
            .zip(out.chunks_exact_mut(n))
        {
            for (s, (&h, &r)) in summed.iter_mut().zip(h_row.iter().zip(r_row.iter())) {
                *s = h + r;
            }
            self.normalize_row(&summed, out_row);
        }
    }

    fn normalize_row(&self, group: &[f32], out: &mut [f32]) {
        #[allow(clippy::cast_precision_loss)]
        let n = self.normalized_shape as f32;

        let mean: f32 = group.iter().sum::<f32>() / n;
        let variance: f32 = group
            .iter()
            .map(|&x| {
                let diff = x - mean;
                diff * diff
            })
            .sum::<f32>()
            / n;

        let inv_std = 1.0 / (variance + self.eps).sqrt();
        for (i, (&x, o)) in group.iter().zip(out.iter_mut()).enumerate() {
            *o = (x - mean) * inv_std * self.weight[i] + self.bias[i];
        }
    }

    /// Get the normalized shape
    #[must_use]
    pub fn normalized_shape(&self) -> usize {
        self.normalized_shape
    }

    /// Get epsilon value
    #[must_use]
    pub fn eps(&self) -> f32 {
        self.eps
    }
}
