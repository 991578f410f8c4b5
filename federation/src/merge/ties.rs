//! TIES parameter merging: trim sub-threshold differences, elect by sign
//! agreement, resolve sign conflicts by magnitude.

use tracing::debug;

use crate::model::{ParameterSet, Tensor};

use super::{MergeError, MergeResult};

/// Mean-absolute-difference below which an incoming parameter is treated
/// as noise and the incumbent value kept unchanged.
pub const DEFAULT_TIES_THRESHOLD: f64 = 1e-5;

/// Merge `incoming` into `incumbent`, returning a new parameter set.
///
/// Per shared key: if the mean absolute difference is below `threshold`
/// the incumbent tensor is kept verbatim. Otherwise, element-wise: where
/// signs agree the values are averaged; where they disagree the value with
/// the larger magnitude wins, the incumbent winning magnitude ties. Keys
/// present only in the incumbent are kept; keys present only in the
/// incoming set are dropped. Shapes must match per shared key.
pub fn ties_merge(
    incumbent: &ParameterSet,
    incoming: &ParameterSet,
    threshold: f64,
) -> MergeResult<ParameterSet> {
    let mut merged = ParameterSet::new();

    for (key, a) in incumbent.iter() {
        let Some(b) = incoming.get(key) else {
            merged.insert(key.clone(), a.clone());
            continue;
        };

        if !a.same_shape(b) {
            return Err(MergeError::ShapeMismatch {
                key: key.clone(),
                a: a.shape.clone(),
                b: b.shape.clone(),
            });
        }

        if a.mean_abs_diff(b) < threshold {
            merged.insert(key.clone(), a.clone());
            continue;
        }

        merged.insert(key.clone(), resolve_signs(a, b));
    }

    let dropped = incoming.keys().filter(|k| !incumbent.contains_key(k)).count();
    if dropped > 0 {
        debug!(dropped, "incoming parameters absent from incumbent were dropped");
    }

    Ok(merged)
}

/// Element-wise sign resolution for one parameter pair.
fn resolve_signs(a: &Tensor, b: &Tensor) -> Tensor {
    let data = a
        .data
        .iter()
        .zip(&b.data)
        .map(|(&va, &vb)| {
            if sign(va) == sign(vb) {
                (va + vb) / 2.0
            } else if va.abs() >= vb.abs() {
                va
            } else {
                vb
            }
        })
        .collect();

    Tensor {
        shape: a.shape.clone(),
        data,
    }
}

// f32::signum maps 0.0 to 1.0; zero must agree with neither sign.
fn sign(x: f32) -> i8 {
    if x > 0.0 {
        1
    } else if x < 0.0 {
        -1
    } else {
        0
    }
}
