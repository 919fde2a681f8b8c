//! Performance history: the series a progress dashboard plots.
//!
//! Everything here is derived from stored records on read; nothing is cached.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::normalizer::record::TOTAL_KEY;
use crate::normalizer::Schema;
use crate::store::StoredRecord;

pub mod handlers;

/// Self-tests needed before per-type averages are shown.
pub const DASHBOARD_UNLOCK_ATTEMPTS: usize = 5;

/// One plotted point: a lens (or the total) at the time its record was created.
/// Legacy and four-lens records share lens names but not scales, so every
/// point carries its rubric and maximum.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScorePoint {
    pub timestamp: DateTime<Utc>,
    pub kind: Schema,
    pub category: String,
    pub score: i64,
    pub out_of: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeAverage {
    pub attempts: usize,
    /// Mean per lens over attempts that scored it; `None` if none did.
    pub lenses: BTreeMap<String, Option<f64>>,
    pub total_out_of_20: Option<f64>,
}

/// Chronological points for every scored lens and every derived total.
pub fn scores_over_time(records: &[StoredRecord]) -> Vec<ScorePoint> {
    let mut ordered: Vec<&StoredRecord> = records.iter().collect();
    ordered.sort_by_key(|r| r.record.metadata.created_at);

    let mut points = Vec::new();
    for stored in ordered {
        let record = &stored.record;
        let timestamp = record.metadata.created_at;
        let bounds = record.kind.bounds();
        for lens in record.kind.lenses() {
            if let Some(score) = record.scores.get(lens) {
                points.push(ScorePoint {
                    timestamp,
                    kind: record.kind,
                    category: lens.to_string(),
                    score,
                    out_of: bounds.hi,
                });
            }
        }
        if let Some(total) = record.scores.total_out_of_20 {
            points.push(ScorePoint {
                timestamp,
                kind: record.kind,
                category: TOTAL_KEY.to_string(),
                score: total,
                out_of: bounds.hi * record.kind.lenses().len() as i64,
            });
        }
    }
    points
}

fn mean(values: &[i64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<i64>() as f64 / values.len() as f64)
}

/// Averages grouped by essay type, once enough self-tests exist.
/// Unscored lenses are skipped rather than counted as zero.
pub fn average_by_type(self_tests: &[StoredRecord]) -> Option<BTreeMap<String, TypeAverage>> {
    if self_tests.len() < DASHBOARD_UNLOCK_ATTEMPTS {
        return None;
    }

    let mut grouped: BTreeMap<&str, Vec<&StoredRecord>> = BTreeMap::new();
    for stored in self_tests {
        grouped
            .entry(stored.record.essay_type.as_str())
            .or_default()
            .push(stored);
    }

    let averages = grouped
        .into_iter()
        .map(|(essay_type, records)| {
            let lenses = records
                .first()
                .map(|r| r.record.kind.lenses())
                .unwrap_or_default()
                .iter()
                .map(|lens| {
                    let scored: Vec<i64> =
                        records.iter().filter_map(|r| r.record.scores.get(lens)).collect();
                    (lens.to_string(), mean(&scored))
                })
                .collect();
            let totals: Vec<i64> = records
                .iter()
                .filter_map(|r| r.record.scores.total_out_of_20)
                .collect();
            (
                essay_type.to_string(),
                TypeAverage {
                    attempts: records.len(),
                    lenses,
                    total_out_of_20: mean(&totals),
                },
            )
        })
        .collect();
    Some(averages)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    use super::*;
    use crate::normalizer::record::{EvaluationRecord, LensScores, RecordMetadata};
    use crate::normalizer::Schema;

    fn stored(kind: Schema, essay_type: &str, scores: &[(&str, Option<i64>)], minutes: i64) -> StoredRecord {
        let mut lens_scores = LensScores::default();
        for (lens, score) in scores {
            lens_scores.lenses.insert(lens.to_string(), *score);
        }
        if scores.len() == 4 && scores.iter().all(|(_, s)| s.is_some()) {
            lens_scores.total_out_of_20 = Some(scores.iter().filter_map(|(_, s)| *s).sum());
        }
        StoredRecord {
            id: Uuid::new_v4(),
            record: EvaluationRecord {
                kind,
                essay_type: essay_type.to_string(),
                part: None,
                scores: lens_scores,
                suggestions: vec![],
                strengths: vec![],
                weaknesses: vec![],
                next_focus: vec![],
                summary_comment: None,
                game_like_role: None,
                metadata: RecordMetadata {
                    username: "amir".to_string(),
                    created_at: Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap()
                        + Duration::minutes(minutes),
                },
            },
        }
    }

    fn full(c: i64, o: i64, l: i64, m: i64) -> [(&'static str, Option<i64>); 4] {
        [
            ("content", Some(c)),
            ("organization", Some(o)),
            ("language", Some(l)),
            ("communicative", Some(m)),
        ]
    }

    #[test]
    fn test_scores_over_time_is_chronological_and_skips_unscored() {
        let newer = stored(Schema::FourLens, "Email", &full(4, 4, 3, 5), 10);
        let older = stored(
            Schema::FourLens,
            "Article",
            &[("content", Some(2)), ("organization", None)],
            0,
        );
        let points = scores_over_time(&[newer, older]);

        assert_eq!(points.len(), 1 + 5);
        assert_eq!(points[0].category, "content");
        assert_eq!(points[0].score, 2);
        assert_eq!(points.last().unwrap().category, TOTAL_KEY);
        assert_eq!(points.last().unwrap().score, 16);
        assert_eq!(points.last().unwrap().out_of, 20);
        assert!(points[..5].iter().all(|p| p.kind == Schema::FourLens));
        assert_eq!(points[0].out_of, 5);
    }

    #[test]
    fn test_legacy_records_plot_seven_lenses_without_total() {
        let scores: Vec<(&str, Option<i64>)> =
            Schema::LegacyTenPoint.lenses().iter().map(|l| (*l, Some(7))).collect();
        let points = scores_over_time(&[stored(Schema::LegacyTenPoint, "Unclassified", &scores, 0)]);
        assert_eq!(points.len(), 7);
        assert!(points.iter().all(|p| p.category != TOTAL_KEY));
        assert!(points.iter().all(|p| p.kind == Schema::LegacyTenPoint && p.out_of == 10));
    }

    #[test]
    fn test_mixed_rubrics_keep_their_own_scale() {
        let legacy: Vec<(&str, Option<i64>)> =
            Schema::LegacyTenPoint.lenses().iter().map(|l| (*l, Some(8))).collect();
        let points = scores_over_time(&[
            stored(Schema::LegacyTenPoint, "Unclassified", &legacy, 0),
            stored(Schema::FourLens, "Email", &full(4, 4, 4, 4), 5),
        ]);
        let content: Vec<(Schema, i64, i64)> = points
            .iter()
            .filter(|p| p.category == "content")
            .map(|p| (p.kind, p.score, p.out_of))
            .collect();
        assert_eq!(
            content,
            vec![(Schema::LegacyTenPoint, 8, 10), (Schema::FourLens, 4, 5)]
        );
        let json = serde_json::to_value(&points[0]).unwrap();
        assert_eq!(json["kind"], "legacy_ten_point");
        assert_eq!(json["out_of"], 10);
    }

    #[test]
    fn test_averages_locked_below_five_attempts() {
        let tests: Vec<_> = (0..4)
            .map(|i| stored(Schema::SelfTest, "Email", &full(3, 3, 3, 3), i))
            .collect();
        assert!(average_by_type(&tests).is_none());
    }

    #[test]
    fn test_averages_group_by_type_and_ignore_missing() {
        let mut tests: Vec<_> = vec![
            stored(Schema::SelfTest, "Email", &full(4, 3, 2, 5), 0),
            stored(Schema::SelfTest, "Email", &full(2, 3, 4, 5), 1),
            stored(Schema::SelfTest, "Review", &full(5, 5, 5, 5), 2),
            stored(Schema::SelfTest, "Review", &full(3, 3, 3, 3), 3),
        ];
        tests.push(stored(
            Schema::SelfTest,
            "Email",
            &[("content", Some(3)), ("organization", None)],
            4,
        ));

        let averages = average_by_type(&tests).unwrap();
        let email = &averages["Email"];
        assert_eq!(email.attempts, 3);
        assert_eq!(email.lenses["content"], Some(3.0));
        assert_eq!(email.lenses["organization"], Some(3.0));
        assert_eq!(email.lenses["language"], Some(3.0));
        assert_eq!(email.total_out_of_20, Some(14.0));

        let review = &averages["Review"];
        assert_eq!(review.attempts, 2);
        assert_eq!(review.total_out_of_20, Some(16.0));
    }
}
