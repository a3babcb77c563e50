//! Per-call scratch buffers and the checkout pool
//!
//! A forward pass needs several intermediates whose sizes depend on the
//! per-call `(batch, seq)` but are bounded by them. [`AttentionScratch`]
//! owns one set; [`ScratchPool`] is a mutex-guarded free list so repeated
//! and concurrent forward calls reuse buffers instead of allocating in
//! tight loops. Buffers only ever grow; a checkout resizes to fit.

use std::sync::Mutex;

/// Scratch buffers for one in-flight forward call
///
/// Layouts (row-major, `tokens = batch * seq`, `hidden = num_heads *
/// head_size`):
/// - `qkv`: `(tokens, 3 * hidden)` — fused-projection output, empty on the
///   separate path
/// - `q`, `k`, `v`: `(tokens, hidden)`
/// - `scores`: `(batch, num_heads, seq, seq)`
/// - `context`: `(batch, num_heads, seq, head_size)`
/// - `merged`: `(tokens, hidden)` — heads recombined
#[derive(Debug, Default)]
pub struct AttentionScratch {
    pub(crate) qkv: Vec<f32>,
    pub(crate) q: Vec<f32>,
    pub(crate) k: Vec<f32>,
    pub(crate) v: Vec<f32>,
    pub(crate) scores: Vec<f32>,
    pub(crate) context: Vec<f32>,
    pub(crate) merged: Vec<f32>,
}

impl AttentionScratch {
    /// Resize every buffer for a `(batch, seq)` call shape
    ///
    /// `fused` controls whether the combined QKV buffer is materialized.
    pub(crate) fn ensure(
        &mut self,
        batch: usize,
        seq: usize,
        hidden: usize,
        num_heads: usize,
        fused: bool,
    ) {
        let tokens = batch * seq;
        let head_size = hidden / num_heads;

        self.qkv.resize(if fused { tokens * 3 * hidden } else { 0 }, 0.0);
        self.q.resize(tokens * hidden, 0.0);
        self.k.resize(tokens * hidden, 0.0);
        self.v.resize(tokens * hidden, 0.0);
        self.scores.resize(batch * num_heads * seq * seq, 0.0);
        self.context.resize(batch * num_heads * seq * head_size, 0.0);
        self.merged.resize(tokens * hidden, 0.0);
    }
}

/// How many idle scratch sets the pool keeps before dropping extras
const MAX_IDLE: usize = 8;

/// Thread-safe pool of [`AttentionScratch`] buffers
///
/// Checkout/return under a mutex held only for the list operation, never
/// across a forward pass; concurrent calls each hold their own scratch.
#[derive(Debug, Default)]
pub struct ScratchPool {
    slots: Mutex<Vec<AttentionScratch>>,
}

impl ScratchPool {
    /// Create an empty pool
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
        }
    }

    /// Check out a scratch set sized for the given call shape
    pub(crate) fn acquire(
        &self,
        batch: usize,
        seq: usize,
        hidden: usize,
        num_heads: usize,
        fused: bool,
    ) -> AttentionScratch {
        let mut scratch = {
            let mut slots = self.slots.lock().expect("scratch pool lock poisoned");
            slots.pop().unwrap_or_default()
        };
        scratch.ensure(batch, seq, hidden, num_heads, fused);
        scratch
    }

    /// Return a scratch set to the pool
    pub(crate) fn release(&self, scratch: AttentionScratch) {
        let mut slots = self.slots.lock().expect("scratch pool lock poisoned");
        if slots.len() < MAX_IDLE {
            slots.push(scratch);
        }
    }

    /// Number of idle scratch sets currently pooled
    #[must_use]
    pub fn idle(&self) -> usize {
        self.slots.lock().expect("scratch pool lock poisoned").len()
    }
}
