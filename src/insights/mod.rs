//! Ranked coaching insights built from the other analyzers' results.

mod rules;

use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

pub use rules::default_rules;

use crate::{
    comparison::theoretical_best_lap,
    corners::{BrakeZone, CornerRating, trail_braking_ratio},
    rules::RuleSet,
    telemetry::{Lap, TelemetrySample, sorted_by_time},
};

/// Throttle position counted as flat out
pub const FULL_THROTTLE: f64 = 0.95;
/// Valid laps needed before consistency is judged
pub const MIN_CONSISTENCY_LAPS: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InsightCategory {
    Cornering,
    Braking,
    Consistency,
    Acceleration,
    General,
}

impl fmt::Display for InsightCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsightCategory::Cornering => write!(f, "Cornering"),
            InsightCategory::Braking => write!(f, "Braking"),
            InsightCategory::Consistency => write!(f, "Consistency"),
            InsightCategory::Acceleration => write!(f, "Acceleration"),
            InsightCategory::General => write!(f, "General"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Critical,
    Warning,
    Suggestion,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Critical => write!(f, "Critical"),
            Severity::Warning => write!(f, "Warning"),
            Severity::Suggestion => write!(f, "Suggestion"),
            Severity::Info => write!(f, "Info"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub category: InsightCategory,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub improvement: String,
    /// Estimated lap time gain in seconds, never negative
    pub potential_gain_s: f64,
    /// 0 to 1
    pub confidence: f64,
}

/// Lap time spread of the valid laps.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Consistency {
    /// `100 - (stddev / mean) * 1000`, 100 for identical lap times
    pub score: f64,
    pub mean_lap_time_s: f64,
    pub stddev_s: f64,
}

/// Everything the insight rules get to look at.
#[derive(Clone, Debug, Default)]
pub struct InsightContext {
    pub corner_ratings: Vec<CornerRating>,
    pub trail_braking_ratio: Option<f64>,
    pub consistency: Option<Consistency>,
    pub full_throttle_fraction: Option<f64>,
    /// Best valid lap minus the theoretical best lap
    pub theoretical_best_gap_s: Option<f64>,
}

impl InsightContext {
    pub fn new(
        corner_ratings: &[CornerRating],
        brake_zones: &[BrakeZone],
        laps: &[Lap],
        samples: &[TelemetrySample],
    ) -> Self {
        let valid_times = laps
            .iter()
            .filter(|l| l.is_valid)
            .map(|l| l.lap_time_s)
            .collect_vec();
        let best_lap = valid_times.iter().copied().min_by(f64::total_cmp);
        let theoretical_best_gap_s = best_lap
            .zip(theoretical_best_lap(laps))
            .map(|(best, theoretical)| (best - theoretical).max(0.));

        Self {
            corner_ratings: corner_ratings.to_vec(),
            trail_braking_ratio: trail_braking_ratio(brake_zones),
            consistency: consistency(&valid_times),
            full_throttle_fraction: full_throttle_fraction(samples),
            theoretical_best_gap_s,
        }
    }
}

fn consistency(lap_times: &[f64]) -> Option<Consistency> {
    if lap_times.len() < MIN_CONSISTENCY_LAPS {
        return None;
    }
    let mean = lap_times.iter().sum::<f64>() / lap_times.len() as f64;
    if mean <= 0. {
        return None;
    }
    let variance =
        lap_times.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / lap_times.len() as f64;
    let stddev_s = variance.sqrt();
    Some(Consistency {
        score: 100. - stddev_s / mean * 1000.,
        mean_lap_time_s: mean,
        stddev_s,
    })
}

/// Consistency score of a set of lap times, `None` with fewer than three laps.
pub fn consistency_score(lap_times: &[f64]) -> Option<f64> {
    consistency(lap_times).map(|c| c.score)
}

/// Fraction of elapsed time spent at full throttle, `None` when no time elapsed.
pub fn full_throttle_fraction(samples: &[TelemetrySample]) -> Option<f64> {
    let samples = sorted_by_time(samples);
    let (total_ms, flat_out_ms) = samples
        .iter()
        .tuple_windows()
        .fold((0, 0), |(total, flat_out), (prev, next)| {
            let dt = next.timestamp_ms - prev.timestamp_ms;
            if prev.throttle >= FULL_THROTTLE {
                (total + dt, flat_out + dt)
            } else {
                (total + dt, flat_out)
            }
        });
    if total_ms == 0 {
        return None;
    }
    Some(flat_out_ms as f64 / total_ms as f64)
}

/// Sort by potential gain, largest first. Equal gains keep their order.
pub fn rank_insights(mut insights: Vec<Insight>) -> Vec<Insight> {
    insights.sort_by(|a, b| b.potential_gain_s.total_cmp(&a.potential_gain_s));
    insights
}

pub struct InsightGenerator {
    rules: RuleSet<InsightContext, Insight>,
}

impl InsightGenerator {
    pub fn new() -> Self {
        Self {
            rules: default_rules(),
        }
    }

    pub fn with_rules(mut self, rules: RuleSet<InsightContext, Insight>) -> Self {
        self.rules = rules;
        self
    }

    pub fn rules_mut(&mut self) -> &mut RuleSet<InsightContext, Insight> {
        &mut self.rules
    }

    pub fn generate(
        &self,
        corner_ratings: &[CornerRating],
        brake_zones: &[BrakeZone],
        laps: &[Lap],
        samples: &[TelemetrySample],
    ) -> Vec<Insight> {
        let context = InsightContext::new(corner_ratings, brake_zones, laps, samples);
        self.generate_from_context(&context)
    }

    pub fn generate_from_context(&self, context: &InsightContext) -> Vec<Insight> {
        rank_insights(self.rules.evaluate(context))
    }
}

impl Default for InsightGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Ranked coaching insights using the default rules. An empty list means
/// nothing worth reporting was found.
pub fn generate_insights(
    corner_ratings: &[CornerRating],
    brake_zones: &[BrakeZone],
    laps: &[Lap],
    samples: &[TelemetrySample],
) -> Vec<Insight> {
    InsightGenerator::new().generate(corner_ratings, brake_zones, laps, samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corners::CornerGrade;
    use proptest::prelude::*;

    fn rating(grade: CornerGrade, time_loss_s: f64) -> CornerRating {
        CornerRating {
            grade,
            score: 0.,
            entry_apex_ratio: 1.,
            exit_entry_ratio: 1.,
            throttle_smoothness: 0.,
            time_loss_s,
            suggestions: Vec::new(),
        }
    }

    fn valid_lap(lap_number: u32, lap_time_s: f64) -> Lap {
        Lap {
            lap_number,
            lap_time_s,
            is_valid: true,
            ..Default::default()
        }
    }

    fn insight(title: &str, gain: f64) -> Insight {
        Insight {
            category: InsightCategory::General,
            severity: Severity::Info,
            title: title.to_string(),
            description: String::new(),
            improvement: String::new(),
            potential_gain_s: gain,
            confidence: 1.,
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(generate_insights(&[], &[], &[], &[]).is_empty());
    }

    #[test]
    fn test_consistency_score() {
        assert_eq!(consistency_score(&[90., 90., 90.]), Some(100.));
        assert_eq!(consistency_score(&[90., 91.]), None);
        assert_eq!(consistency_score(&[]), None);
        // population standard deviation over a 90s mean
        let score = consistency_score(&[89., 90., 91.]).unwrap();
        let expected = 100. - (2f64 / 3.).sqrt() / 90. * 1000.;
        assert!((score - expected).abs() < 1e-9);
    }

    #[test]
    fn test_full_throttle_fraction_is_time_weighted() {
        let samples = [(0, 1.), (1000, 0.2), (4000, 1.), (5000, 1.)]
            .into_iter()
            .map(|(timestamp_ms, throttle)| TelemetrySample {
                timestamp_ms,
                throttle,
                ..Default::default()
            })
            .collect_vec();
        // flat out for 0..1000 and 4000..5000 of 5000ms
        assert_eq!(full_throttle_fraction(&samples), Some(0.4));
        assert_eq!(full_throttle_fraction(&samples[..1]), None);
    }

    #[test]
    fn test_ranking_is_stable() {
        let ranked = rank_insights(vec![
            insight("a", 0.1),
            insight("b", 0.5),
            insight("c", 0.1),
            insight("d", 0.5),
        ]);
        let titles = ranked.iter().map(|i| i.title.as_str()).collect_vec();
        assert_eq!(titles, vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn test_custom_rule() {
        let generator = InsightGenerator::new().with_rules(RuleSet::new().with_rule(
            "always",
            |_: &InsightContext, out: &mut Vec<Insight>| out.push(insight("always", 0.)),
        ));
        let insights = generator.generate(&[], &[], &[], &[]);
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].title, "always");
    }

    #[test]
    fn test_disabled_rule_is_skipped() {
        let laps = vec![valid_lap(1, 90.), valid_lap(2, 90.), valid_lap(3, 90.)];
        let mut generator = InsightGenerator::new();
        let titles = |generator: &InsightGenerator| {
            generator
                .generate(&[], &[], &laps, &[])
                .into_iter()
                .map(|i| i.title)
                .collect_vec()
        };
        assert!(titles(&generator).contains(&"Excellent consistency".to_string()));

        assert!(generator.rules_mut().remove("consistency"));
        assert!(!generator.rules_mut().remove("consistency"));
        assert!(!titles(&generator).contains(&"Excellent consistency".to_string()));
        assert!(!generator.rules_mut().names().any(|name| name == "consistency"));
    }

    #[test]
    fn test_theoretical_best_gap() {
        let laps = vec![
            Lap {
                sector_times_s: vec![30., 31., 30.],
                ..valid_lap(1, 91.)
            },
            Lap {
                sector_times_s: vec![30.5, 29.5, 30.5],
                ..valid_lap(2, 90.5)
            },
        ];
        let context = InsightContext::new(&[], &[], &laps, &[]);
        assert_eq!(context.theoretical_best_gap_s, Some(1.));
        let insights = generate_insights(&[], &[], &laps, &[]);
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].category, InsightCategory::General);
        assert_eq!(insights[0].potential_gain_s, 1.);
    }

    #[test]
    fn test_insights_sorted_by_gain() {
        let ratings = vec![
            rating(CornerGrade::Bad, 0.8),
            rating(CornerGrade::Poor, 0.4),
            rating(CornerGrade::Good, 0.),
        ];
        let laps = vec![valid_lap(1, 90.), valid_lap(2, 95.), valid_lap(3, 100.)];
        let insights = generate_insights(&ratings, &[], &laps, &[]);
        assert!(insights.len() >= 2);
        assert!(
            insights
                .windows(2)
                .all(|w| w[0].potential_gain_s >= w[1].potential_gain_s)
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_ranking_ignores_rating_order(
            losses in prop::collection::vec(0.0f64..2.0, 0..12),
            lap_times in prop::collection::vec(80.0f64..100.0, 0..8),
        ) {
            let ratings = losses
                .iter()
                .enumerate()
                .map(|(i, &loss)| {
                    let grade = if i % 3 == 0 { CornerGrade::Excellent } else { CornerGrade::Poor };
                    rating(grade, loss)
                })
                .collect_vec();
            let laps = lap_times
                .iter()
                .enumerate()
                .map(|(i, &t)| valid_lap(i as u32 + 1, t))
                .collect_vec();

            let forward = generate_insights(&ratings, &[], &laps, &[]);
            let mut reversed_ratings = ratings.clone();
            reversed_ratings.reverse();
            let backward = generate_insights(&reversed_ratings, &[], &laps, &[]);

            prop_assert!(forward.windows(2).all(|w| w[0].potential_gain_s >= w[1].potential_gain_s));
            prop_assert!(forward.iter().all(|i| i.potential_gain_s >= 0.));
            let titles = |insights: &[Insight]| insights.iter().map(|i| i.title.clone()).collect_vec();
            prop_assert_eq!(titles(&forward), titles(&backward));
        }
    }
}
