//! Lens score coercion: round, clamp, and derive the four-lens total.

use serde_json::Value;
use thiserror::Error;

use crate::normalizer::record::{LensScores, TOTAL_KEY};

/// Closed integer interval a lens score must fall into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreBounds {
    pub lo: i64,
    pub hi: i64,
}

impl ScoreBounds {
    /// SPM Paper 2 lenses: content, organization, language, communicative.
    pub const FOUR_LENS: ScoreBounds = ScoreBounds { lo: 0, hi: 5 };
    /// Legacy rubric, seven lenses out of ten.
    pub const TEN_POINT: ScoreBounds = ScoreBounds { lo: 0, hi: 10 };

    pub fn clamp(&self, value: i64) -> i64 {
        value.clamp(self.lo, self.hi)
    }

    #[cfg(test)]
    pub fn contains(&self, value: i64) -> bool {
        (self.lo..=self.hi).contains(&value)
    }
}

/// A lens value that had to be forced into range. Logged, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("lens '{lens}' scored {value}, clamped to {clamped}")]
pub struct ScoreRangeWarning {
    pub lens: String,
    pub value: i64,
    pub clamped: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScoreWarning {
    #[error(transparent)]
    OutOfRange(#[from] ScoreRangeWarning),

    #[error("explicit total {explicit} disagrees with lens sum {sum}; keeping explicit total")]
    TotalMismatch { explicit: i64, sum: i64 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoercedScores {
    pub scores: LensScores,
    pub warnings: Vec<ScoreWarning>,
}

/// Reads a JSON number or numeric string. Booleans, null and non-finite
/// values are not scores.
fn numeric_value(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Rounds to the nearest integer, ties to even.
fn round_score(value: &Value) -> Option<i64> {
    numeric_value(value).map(|n| n.round_ties_even() as i64)
}

/// Coerces every expected lens of `raw_scores` into `bounds`.
///
/// Absent or non-numeric lenses come back as `None`. When the bounds are the
/// four-lens [0,5] scheme and all four lenses are scored, `total_out_of_20` is
/// the model's explicit total (clamped to [0, 4*hi]) or else the lens sum.
pub fn validate_and_coerce_scores(
    raw_scores: &Value,
    expected_lenses: &[&str],
    bounds: ScoreBounds,
) -> CoercedScores {
    let raw = raw_scores.as_object();
    let mut out = CoercedScores::default();

    for &lens in expected_lenses {
        let coerced = raw
            .and_then(|m| m.get(lens))
            .and_then(round_score)
            .map(|value| {
                let clamped = bounds.clamp(value);
                if clamped != value {
                    out.warnings.push(
                        ScoreRangeWarning {
                            lens: lens.to_string(),
                            value,
                            clamped,
                        }
                        .into(),
                    );
                }
                clamped
            });
        out.scores.lenses.insert(lens.to_string(), coerced);
    }

    if bounds == ScoreBounds::FOUR_LENS
        && expected_lenses.len() == 4
        && out.scores.is_complete(expected_lenses)
    {
        let sum: i64 = expected_lenses
            .iter()
            .filter_map(|lens| out.scores.get(lens))
            .sum();
        let max_total = bounds.hi * expected_lenses.len() as i64;

        let total = match raw.and_then(|m| m.get(TOTAL_KEY)).and_then(round_score) {
            Some(explicit) => {
                let clamped = explicit.clamp(0, max_total);
                if clamped != explicit {
                    out.warnings.push(
                        ScoreRangeWarning {
                            lens: TOTAL_KEY.to_string(),
                            value: explicit,
                            clamped,
                        }
                        .into(),
                    );
                }
                if clamped != sum {
                    out.warnings.push(ScoreWarning::TotalMismatch {
                        explicit: clamped,
                        sum,
                    });
                }
                clamped
            }
            None => sum,
        };
        out.scores.total_out_of_20 = Some(total);
    }

    out
}
