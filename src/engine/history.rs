//! History Reconstructor: derives per-field change timelines from an ordered
//! submission history.
//!
//! Pure functions only: no mutation, no I/O. The same inputs always produce
//! the same timeline.

use crate::engine::submissions::SubmissionWithPeriod;
use serde::Serialize;
use serde_json::Value as JsonValue;

/// One point in a field's derived timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub period_label: String,
    pub value: JsonValue,
    pub changed_from_previous: bool,
}

/// Derives the change timeline of `field_name` across ordered submissions.
///
/// Fewer than two entries produce an empty vector: a single data point has
/// no history by definition, and callers rendering a timeline must check
/// the length first. This is policy, not an error.
///
/// An absent field reads as JSON null. The first emitted entry is the
/// baseline and is always marked changed; each later entry compares against
/// the previously emitted value using structural equality (see
/// [`values_equal`]), so byte-level differences between documents never
/// register as changes.
pub fn field_history(entries: &[(String, JsonValue)], field_name: &str) -> Vec<FieldChange> {
    if entries.len() < 2 {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(entries.len());
    let mut previous: Option<&JsonValue> = None;
    for (label, content) in entries {
        let value = content.get(field_name).unwrap_or(&JsonValue::Null);
        let changed = match previous {
            None => true,
            Some(prev) => !values_equal(prev, value),
        };
        out.push(FieldChange {
            period_label: label.clone(),
            value: value.clone(),
            changed_from_previous: changed,
        });
        previous = Some(value);
    }
    out
}

/// Adapts a submission history (as returned by the submission store) into
/// the (period label, content) pairs the reconstructor consumes.
pub fn timeline_entries(history: &[SubmissionWithPeriod]) -> Vec<(String, JsonValue)> {
    history
        .iter()
        .map(|entry| (entry.period_label.clone(), entry.submission.content.clone()))
        .collect()
}

/// Deep structural equality over scalars. Strings compare trimmed; integer
/// and float encodings of the same number compare equal; arrays and objects
/// compare element-wise.
pub fn values_equal(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::String(x), JsonValue::String(y)) => x.trim() == y.trim(),
        (JsonValue::Number(x), JsonValue::Number(y)) => {
            // Integer pairs compare exactly; f64 only bridges mixed
            // integer/float encodings. Collapsing large integers into f64
            // would erase real changes above 2^53.
            if let (Some(ix), Some(iy)) = (x.as_i64(), y.as_i64()) {
                ix == iy
            } else if let (Some(ux), Some(uy)) = (x.as_u64(), y.as_u64()) {
                ux == uy
            } else if x.is_f64() || y.is_f64() {
                match (x.as_f64(), y.as_f64()) {
                    (Some(fx), Some(fy)) => fx == fy,
                    _ => x == y,
                }
            } else {
                // One negative, one beyond i64::MAX.
                false
            }
        }
        (JsonValue::Array(xs), JsonValue::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (JsonValue::Object(xm), JsonValue::Object(ym)) => {
            xm.len() == ym.len()
                && xm
                    .iter()
                    .all(|(k, x)| ym.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}
