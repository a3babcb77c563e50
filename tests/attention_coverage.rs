//! Coverage tests for the self-attention module's public API
//!
//! Exercises the contract surface end to end:
//! - Shape invariance across batch/sequence/head combinations
//! - Determinism of repeated calls
//! - Additive mask and head mask behavior
//! - Degenerate single-token sequences
//! - Error paths (conversion and call-time)

use atento::{
    additive_mask, AtentoError, AttentionConfig, AttentionSource, QkvStrategy, SelfAttention,
    Tensor,
};

// ============================================================================
// Test Helpers
// ============================================================================

fn seeded(n: usize, seed: usize) -> Vec<f32> {
    (0..n)
        .map(|i| ((i * 37 + seed * 11) % 1000) as f32 * 0.001 - 0.5)
        .collect()
}

struct Params {
    qw: Vec<f32>,
    kw: Vec<f32>,
    vw: Vec<f32>,
    ow: Vec<f32>,
    qb: Vec<f32>,
    kb: Vec<f32>,
    vb: Vec<f32>,
    ob: Vec<f32>,
}

impl Params {
    fn new(hidden: usize, seed: usize) -> Self {
        Self {
            qw: seeded(hidden * hidden, seed),
            kw: seeded(hidden * hidden, seed + 1),
            vw: seeded(hidden * hidden, seed + 2),
            ow: seeded(hidden * hidden, seed + 3),
            qb: seeded(hidden, seed + 4),
            kb: seeded(hidden, seed + 5),
            vb: seeded(hidden, seed + 6),
            ob: seeded(hidden, seed + 7),
        }
    }

    fn source(&self) -> AttentionSource<'_> {
        AttentionSource {
            query_weight: &self.qw,
            query_bias: &self.qb,
            key_weight: &self.kw,
            key_bias: &self.kb,
            value_weight: &self.vw,
            value_bias: &self.vb,
            output_weight: &self.ow,
            output_bias: &self.ob,
            norm_weight: None,
            norm_bias: None,
        }
    }
}

fn module(hidden: usize, num_heads: usize, seed: usize) -> SelfAttention {
    let config = AttentionConfig::new(hidden, num_heads).expect("test");
    let params = Params::new(hidden, seed);
    SelfAttention::from_source(config, &params.source()).expect("test")
}

fn keep_all_mask(batch: usize, seq: usize) -> Tensor<f32> {
    Tensor::from_vec(vec![batch, 1, 1, seq], vec![0.0; batch * seq]).expect("test")
}

// ============================================================================
// SHAPE INVARIANCE
// ============================================================================

#[test]
fn test_forward_shape_invariance_grid() {
    for &(hidden, num_heads) in &[(8usize, 2usize), (16, 4), (32, 8), (24, 3)] {
        let m = module(hidden, num_heads, 1);
        for &(batch, seq) in &[(1usize, 1usize), (1, 7), (2, 5), (3, 12)] {
            let input =
                Tensor::from_vec(vec![batch, seq, hidden], seeded(batch * seq * hidden, 2))
                    .expect("test");
            let mask = keep_all_mask(batch, seq);
            let out = m.forward(&input, &mask, None).expect("test");
            assert_eq!(
                out.shape(),
                &[batch, seq, hidden],
                "shape mismatch for hidden={hidden} heads={num_heads} batch={batch} seq={seq}"
            );
        }
    }
}

#[test]
fn test_forward_output_finite() {
    let m = module(16, 4, 3);
    let input = Tensor::from_vec(vec![2, 9, 16], seeded(288, 4)).expect("test");
    let mask = keep_all_mask(2, 9);
    let out = m.forward(&input, &mask, None).expect("test");
    assert!(out.data().iter().all(|x| x.is_finite()));
}

// ============================================================================
// DETERMINISM
// ============================================================================

#[test]
fn test_forward_bitwise_deterministic() {
    let m = module(32, 4, 5);
    let input = Tensor::from_vec(vec![2, 8, 32], seeded(512, 6)).expect("test");
    let mask = keep_all_mask(2, 8);

    let first = m.forward(&input, &mask, None).expect("test");
    for _ in 0..5 {
        let again = m.forward(&input, &mask, None).expect("test");
        assert_eq!(first.data(), again.data());
    }
}

// ============================================================================
// ADDITIVE MASK BEHAVIOR
// ============================================================================

#[test]
fn test_masked_position_does_not_influence_other_rows() {
    // With position j excluded, its key/value contribute ~nothing to any
    // other query row, so perturbing the input there must leave those rows
    // essentially unchanged.
    let hidden = 16;
    let seq = 6;
    let masked_pos = 4;
    let m = module(hidden, 4, 7);

    let keep: Vec<f32> = (0..seq)
        .map(|j| if j == masked_pos { 0.0 } else { 1.0 })
        .collect();
    let keep = Tensor::from_vec(vec![1, seq], keep).expect("test");
    let mask = additive_mask(&keep, -10000.0).expect("test");

    let base_data = seeded(seq * hidden, 8);
    let mut bumped_data = base_data.clone();
    for x in bumped_data[masked_pos * hidden..(masked_pos + 1) * hidden].iter_mut() {
        *x += 2.5;
    }

    let base = m
        .forward(
            &Tensor::from_vec(vec![1, seq, hidden], base_data).expect("test"),
            &mask,
            None,
        )
        .expect("test");
    let bumped = m
        .forward(
            &Tensor::from_vec(vec![1, seq, hidden], bumped_data).expect("test"),
            &mask,
            None,
        )
        .expect("test");

    for s in 0..seq {
        if s == masked_pos {
            continue; // its own query row legitimately changes
        }
        for d in 0..hidden {
            let a = base.data()[s * hidden + d];
            let b = bumped.data()[s * hidden + d];
            assert!(
                (a - b).abs() < 1e-3,
                "row {s} moved by {} despite position {masked_pos} being masked",
                (a - b).abs()
            );
        }
    }
}

#[test]
fn test_all_positions_masked_still_finite() {
    // Max-subtraction keeps softmax well-defined even when every score is
    // the mask value
    let m = module(8, 2, 9);
    let seq = 4;
    let keep = Tensor::from_vec(vec![1, seq], vec![0.0; seq]).expect("test");
    let mask = additive_mask(&keep, -10000.0).expect("test");
    let input = Tensor::from_vec(vec![1, seq, 8], seeded(32, 10)).expect("test");

    let out = m.forward(&input, &mask, None).expect("test");
    assert!(out.data().iter().all(|x| x.is_finite()));
}

#[test]
fn test_additive_mask_helper_round_trip() {
    let keep = Tensor::from_vec(vec![2, 3], vec![1.0, 0.0, 1.0, 0.0, 1.0, 1.0]).expect("test");
    let mask = additive_mask(&keep, -10000.0).expect("test");
    assert_eq!(mask.shape(), &[2, 1, 1, 3]);
    assert_eq!(
        mask.data(),
        &[0.0, -10000.0, 0.0, -10000.0, 0.0, 0.0]
    );
}

// ============================================================================
// HEAD MASK BEHAVIOR
// ============================================================================

#[test]
fn test_zeroed_head_contributes_nothing_before_projection() {
    // With an identity output projection the output IS the merged context,
    // so a zeroed head must leave its hidden-slice columns exactly zero.
    let hidden = 8;
    let num_heads = 2;
    let head_size = hidden / num_heads;
    let seq = 3;

    let config = AttentionConfig::new(hidden, num_heads).expect("test");
    let params = Params::new(hidden, 11);
    let mut identity = vec![0.0; hidden * hidden];
    for i in 0..hidden {
        identity[i * hidden + i] = 1.0;
    }
    let zero_bias = vec![0.0; hidden];
    let source = AttentionSource {
        output_weight: &identity,
        output_bias: &zero_bias,
        ..params.source()
    };
    let m = SelfAttention::from_source(config, &source).expect("test");

    // Zero out head 1 for the whole batch
    let mut hm = vec![1.0; num_heads * seq * seq];
    for x in hm[seq * seq..].iter_mut() {
        *x = 0.0;
    }
    let head_mask = Tensor::from_vec(vec![1, num_heads, seq, seq], hm).expect("test");

    let input = Tensor::from_vec(vec![1, seq, hidden], seeded(seq * hidden, 12)).expect("test");
    let mask = keep_all_mask(1, seq);
    let out = m.forward(&input, &mask, Some(&head_mask)).expect("test");

    for s in 0..seq {
        let row = &out.data()[s * hidden..(s + 1) * hidden];
        let head1_cols = &row[head_size..2 * head_size];
        assert!(
            head1_cols.iter().all(|&x| x == 0.0),
            "zeroed head leaked into row {s}: {head1_cols:?}"
        );
        // Sanity: head 0 actually produced something
        assert!(row[..head_size].iter().any(|&x| x.abs() > 1e-6));
    }
}

#[test]
fn test_all_ones_head_mask_is_identity() {
    let m = module(16, 4, 13);
    let (batch, seq) = (2, 5);
    let input = Tensor::from_vec(vec![batch, seq, 16], seeded(160, 14)).expect("test");
    let mask = keep_all_mask(batch, seq);
    let ones =
        Tensor::from_vec(vec![batch, 4, seq, seq], vec![1.0; batch * 4 * seq * seq])
            .expect("test");

    let without = m.forward(&input, &mask, None).expect("test");
    let with = m.forward(&input, &mask, Some(&ones)).expect("test");
    assert_eq!(without.data(), with.data());
}

// ============================================================================
// DEGENERATE SEQUENCES
// ============================================================================

#[test]
fn test_single_token_sequence_well_defined() {
    let m = module(16, 4, 15);
    let input = Tensor::from_vec(vec![2, 1, 16], seeded(32, 16)).expect("test");
    let mask = keep_all_mask(2, 1);

    let out = m.forward(&input, &mask, None).expect("test");
    assert_eq!(out.shape(), &[2, 1, 16]);
    assert!(out.data().iter().all(|x| x.is_finite()));
}

#[test]
fn test_single_token_masked_still_finite() {
    // S=1 with the lone position excluded: softmax over one -10000 score
    let m = module(8, 2, 17);
    let keep = Tensor::from_vec(vec![1, 1], vec![0.0]).expect("test");
    let mask = additive_mask(&keep, -10000.0).expect("test");
    let input = Tensor::from_vec(vec![1, 1, 8], seeded(8, 18)).expect("test");

    let out = m.forward(&input, &mask, None).expect("test");
    assert!(out.data().iter().all(|x| x.is_finite()));
}

// ============================================================================
// ERROR PATHS
// ============================================================================

#[test]
fn test_conversion_rejects_indivisible_heads() {
    assert!(matches!(
        AttentionConfig::new(10, 3),
        Err(AtentoError::ConversionError { .. })
    ));
}

#[test]
fn test_conversion_rejects_short_weights() {
    let config = AttentionConfig::new(8, 2).expect("test");
    let params = Params::new(8, 19);
    let short = &params.qw[..10];
    let source = AttentionSource {
        query_weight: short,
        ..params.source()
    };
    assert!(matches!(
        SelfAttention::from_source(config, &source),
        Err(AtentoError::ConversionError { .. })
    ));
}

#[test]
fn test_call_time_shape_errors_are_invalid_shape() {
    let m = module(8, 2, 20);
    let input = Tensor::from_vec(vec![1, 4, 8], seeded(32, 21)).expect("test");
    let wrong_mask = keep_all_mask(2, 4); // batch mismatch

    assert!(matches!(
        m.forward(&input, &wrong_mask, None),
        Err(AtentoError::InvalidShape { .. })
    ));
}

#[test]
fn test_strategies_agree_on_output() {
    let config = AttentionConfig::new(16, 4).expect("test");
    let params = Params::new(16, 22);
    let fused =
        SelfAttention::from_source_with_strategy(config.clone(), &params.source(), QkvStrategy::Fused)
            .expect("test");
    let separate = SelfAttention::from_source_with_strategy(
        config,
        &params.source(),
        QkvStrategy::Separate,
    )
    .expect("test");

    let input = Tensor::from_vec(vec![2, 7, 16], seeded(224, 23)).expect("test");
    let mask = keep_all_mask(2, 7);

    let a = fused.forward(&input, &mask, None).expect("test");
    let b = separate.forward(&input, &mask, None).expect("test");
    for (x, y) in a.data().iter().zip(b.data().iter()) {
        assert!((x - y).abs() < 1e-5);
    }
}
