//! Cross-backend agreement: a candidate backend must produce the same tensors as a reference.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tbridge::{BridgeResult, CreationOps, Handle, TensorBackend};

use crate::creation::{bridge, values, F32, F64, HOST, I32, I64, OPAQUE, SPARSE, STRIDED};

pub const ATOL: f64 = 1e-6;

type Case = Box<dyn Fn(&dyn CreationOps) -> BridgeResult<Handle>>;

fn cases(seed: u64) -> Vec<(String, Case)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let fill: f64 = rng.gen_range(-100.0..100.0);
    let dims: Vec<i64> = (0..3).map(|_| rng.gen_range(1..5)).collect();
    let numel: i64 = dims.iter().product();
    let buffer: Vec<u8> = (0..numel)
        .flat_map(|_| rng.gen_range(-1.0f32..1.0).to_le_bytes())
        .collect();

    let mut out: Vec<(String, Case)> = Vec::new();
    let shape = dims.clone();
    out.push((
        format!("zeros{shape:?}"),
        Box::new(move |ops: &dyn CreationOps| ops.create_zeros(&shape, F32, STRIDED, &HOST, false)),
    ));
    let shape = dims.clone();
    out.push((
        format!("ones{shape:?}:i64"),
        Box::new(move |ops: &dyn CreationOps| ops.create_ones(&shape, I64, STRIDED, &HOST, false)),
    ));
    let shape = dims.clone();
    out.push((
        format!("full{shape:?}={fill}"),
        Box::new(move |ops: &dyn CreationOps| ops.create_full(&shape, fill, F64, STRIDED, &HOST, false)),
    ));
    let shape = dims.clone();
    out.push((
        format!("from_buffer{shape:?}"),
        Box::new(move |ops: &dyn CreationOps| ops.create_from_buffer(&buffer, &shape, F32, STRIDED, &HOST, false)),
    ));
    out.push((
        "arange(-2.5, 7, 0.75)".to_string(),
        Box::new(|ops: &dyn CreationOps| ops.create_arange(-2.5, 7.0, 0.75, F32, STRIDED, &HOST, false)),
    ));
    out.push((
        "arange(0, 17, 3):i32".to_string(),
        Box::new(|ops: &dyn CreationOps| ops.create_arange(0.0, 17.0, 3.0, I32, STRIDED, &HOST, false)),
    ));
    out.push((
        "linspace(-1, 4, 9)".to_string(),
        Box::new(|ops: &dyn CreationOps| ops.create_linspace(-1.0, 4.0, 9, F64, STRIDED, &HOST, false)),
    ));
    out.push((
        "linspace(2, 5, 0)".to_string(),
        Box::new(|ops: &dyn CreationOps| ops.create_linspace(2.0, 5.0, 0, F32, STRIDED, &HOST, false)),
    ));
    out.push((
        "linspace(3, 9, 1)".to_string(),
        Box::new(|ops: &dyn CreationOps| ops.create_linspace(3.0, 9.0, 1, F32, STRIDED, &HOST, false)),
    ));
    out.push((
        "arange(0, 5, 1.5):i32".to_string(),
        Box::new(|ops: &dyn CreationOps| ops.create_arange(0.0, 5.0, 1.5, I32, STRIDED, &HOST, false)),
    ));
    out.push((
        "arange(0.5, 7.9, 2.5):i64".to_string(),
        Box::new(|ops: &dyn CreationOps| ops.create_arange(0.5, 7.9, 2.5, I64, STRIDED, &HOST, false)),
    ));
    out.push((
        "eye(4, 2)".to_string(),
        Box::new(|ops: &dyn CreationOps| ops.create_eye(4, 2, F32, STRIDED, &HOST, false)),
    ));
    out.push((
        "eye(3, 5):sparse".to_string(),
        Box::new(|ops: &dyn CreationOps| ops.create_eye(3, 5, F32, SPARSE, &HOST, false)),
    ));
    out.push((
        "ones(3, 3):opaque".to_string(),
        Box::new(|ops: &dyn CreationOps| ops.create_ones(&[3, 3], F32, OPAQUE, &HOST, false)),
    ));
    out
}

/// Runs every creation case through both backends and compares metadata and contents.
pub fn backends_agree<R, C>(reference: &Arc<R>, candidate: &Arc<C>, seed: u64)
where
    R: TensorBackend + 'static,
    C: TensorBackend + 'static,
{
    let reference_bridge = bridge(reference);
    let candidate_bridge = bridge(candidate);
    let reference: &dyn CreationOps = &reference_bridge;
    let candidate: &dyn CreationOps = &candidate_bridge;
    for (name, case) in cases(seed) {
        let expected = case(reference).unwrap_or_else(|err| panic!("{name}: reference failed: {err}"));
        let actual = case(candidate).unwrap_or_else(|err| panic!("{name}: candidate failed: {err}"));

        let expected_meta = reference.describe(expected).unwrap();
        let actual_meta = candidate.describe(actual).unwrap();
        assert_eq!(actual_meta.shape, expected_meta.shape, "{name}: shape");
        assert_eq!(actual_meta.dtype, expected_meta.dtype, "{name}: dtype");
        assert_eq!(actual_meta.layout, expected_meta.layout, "{name}: layout");

        let expected_values = values(reference, expected);
        let actual_values = values(candidate, actual);
        assert_eq!(actual_values.len(), expected_values.len(), "{name}: length");
        for (i, (a, e)) in actual_values.iter().zip(&expected_values).enumerate() {
            assert!((a - e).abs() <= ATOL, "{name}: element {i}: {a} vs {e}");
        }
    }
}

/// Both backends must reject the same malformed requests with the same error kind.
pub fn backends_reject_alike<R, C>(reference: &Arc<R>, candidate: &Arc<C>)
where
    R: TensorBackend + 'static,
    C: TensorBackend + 'static,
{
    let reference_bridge = bridge(reference);
    let candidate_bridge = bridge(candidate);
    let reference: &dyn CreationOps = &reference_bridge;
    let candidate: &dyn CreationOps = &candidate_bridge;
    let failing: [(&str, Case); 6] = [
        (
            "negative extent",
            Box::new(|ops: &dyn CreationOps| ops.create_ones(&[3, -1], F32, STRIDED, &HOST, false)),
        ),
        (
            "zero step",
            Box::new(|ops: &dyn CreationOps| ops.create_arange(0.0, 1.0, 0.0, F32, STRIDED, &HOST, false)),
        ),
        (
            "negative steps",
            Box::new(|ops: &dyn CreationOps| ops.create_linspace(0.0, 1.0, -2, F32, STRIDED, &HOST, false)),
        ),
        (
            "negative eye",
            Box::new(|ops: &dyn CreationOps| ops.create_eye(2, -2, F32, STRIDED, &HOST, false)),
        ),
        (
            "integer step truncated to zero",
            Box::new(|ops: &dyn CreationOps| ops.create_arange(0.0, 5.0, 0.5, I32, STRIDED, &HOST, false)),
        ),
        (
            "allocation too large",
            Box::new(|ops: &dyn CreationOps| {
                ops.create_full(&[1i64 << 40, 1i64 << 40], 1.0, F64, STRIDED, &HOST, false)
            }),
        ),
    ];
    for (name, case) in failing {
        let expected = case(reference).unwrap_err();
        let actual = case(candidate).unwrap_err();
        assert_eq!(actual.kind(), expected.kind(), "{name}: {actual} vs {expected}");
    }
    assert_eq!(reference.live_handles(), 0);
    assert_eq!(candidate.live_handles(), 0);
}
