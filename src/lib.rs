//! # atento
//!
//! SIMD-accelerated multi-head self-attention inference for trained
//! encoder blocks.
//!
//! Converts the parameters of an already-trained attention block into a
//! standalone, framework-independent module and runs its forward pass on
//! CPU: linear projections, scaled dot-product attention with additive
//! masking and per-head gating, head merge, output projection, and the
//! block's residual layer norm when it has one.
//!
//! ## Architecture
//!
//! ```text
//! trained block ──(one-time deep copy)──> AttentionWeights
//!
//! input ──> Q/K/V projections ──> attention kernel ──> output projection ──> output
//!            (parallel or fused)   (per-(batch, head)      [+ LayerNorm]
//!                                   work items)
//! ```
//!
//! ## Design
//!
//! - Weights are immutable after conversion; scratch buffers come from an
//!   internally synchronized pool, so one module instance serves
//!   concurrent `forward` calls without locking on the hot path.
//! - Hot loops use trueno SIMD dot products and rayon data parallelism
//!   over token rows and `(batch, head)` pairs.
//! - Per-head operands are stride-based views into the projected buffers,
//!   never copies.
//!
//! ## Example
//!
//! ```rust,ignore
//! use atento::{additive_mask, AttentionConfig, AttentionSource, SelfAttention, Tensor};
//!
//! let config = AttentionConfig::new(768, 12)?;
//! let module = SelfAttention::from_source(config, &source)?;
//!
//! let keep = Tensor::from_vec(vec![batch, seq], keep_flags)?;
//! let mask = additive_mask(&keep, module.config().mask_value)?;
//! let output = module.forward(&hidden_states, &mask, None)?;
//! assert_eq!(output.shape(), hidden_states.shape());
//! ```

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod attention;
pub mod config;
pub mod error;
pub mod inference;
pub mod layers;
pub mod tensor;
pub mod weights;

pub use attention::{additive_mask, QkvStrategy, SelfAttention};
pub use config::AttentionConfig;
pub use error::{AtentoError, Result};
pub use tensor::{Tensor, TensorView};
pub use weights::{AttentionSource, AttentionWeights};
