use super::{Insight, InsightCategory, InsightContext, Severity};
use crate::{corners::CornerGrade, rules::RuleSet};

/// Total corner time loss above which poor corners become a warning
const CORNER_LOSS_WARNING_S: f64 = 1.;
const MIN_TRAIL_BRAKING_RATIO: f64 = 0.3;
/// Typical gain from trail braking into the slow corners of a lap
const TRAIL_BRAKING_GAIN_S: f64 = 0.3;
const LOW_CONSISTENCY_SCORE: f64 = 80.;
const HIGH_CONSISTENCY_SCORE: f64 = 90.;
const MIN_FULL_THROTTLE_FRACTION: f64 = 0.4;
/// Seconds gained per unit of missing full throttle fraction
const THROTTLE_GAIN_FACTOR_S: f64 = 2.;
const MIN_THEORETICAL_GAP_S: f64 = 0.1;

pub fn default_rules() -> RuleSet<InsightContext, Insight> {
    RuleSet::new()
        .with_rule("poor_corners", poor_corners)
        .with_rule("strong_corners", strong_corners)
        .with_rule("trail_braking", trail_braking)
        .with_rule("consistency", consistency)
        .with_rule("full_throttle", full_throttle)
        .with_rule("theoretical_best", theoretical_best)
}

fn poor_corners(context: &InsightContext, output: &mut Vec<Insight>) {
    let (count, total_loss_s) = context
        .corner_ratings
        .iter()
        .filter(|r| r.grade.needs_work())
        .fold((0, 0.), |(count, loss), r| (count + 1, loss + r.time_loss_s));
    if count == 0 {
        return;
    }
    let severity = if total_loss_s > CORNER_LOSS_WARNING_S {
        Severity::Warning
    } else {
        Severity::Suggestion
    };
    output.push(Insight {
        category: InsightCategory::Cornering,
        severity,
        title: "Corners need work".to_string(),
        description: format!(
            "{count} of {} corners rated poor or bad, losing about {total_loss_s:.2}s",
            context.corner_ratings.len()
        ),
        improvement: "Brake a little earlier, carry a steadier apex speed and prioritize the exit"
            .to_string(),
        potential_gain_s: total_loss_s.max(0.),
        confidence: 0.7,
    });
}

fn strong_corners(context: &InsightContext, output: &mut Vec<Insight>) {
    let total = context.corner_ratings.len();
    let excellent = context
        .corner_ratings
        .iter()
        .filter(|r| r.grade == CornerGrade::Excellent)
        .count();
    if total == 0 || excellent * 2 <= total {
        return;
    }
    output.push(Insight {
        category: InsightCategory::Cornering,
        severity: Severity::Info,
        title: "Strong cornering".to_string(),
        description: format!("{excellent} of {total} corners rated excellent"),
        improvement: "Keep the same approach and use these corners as a reference".to_string(),
        potential_gain_s: 0.,
        confidence: 0.8,
    });
}

fn trail_braking(context: &InsightContext, output: &mut Vec<Insight>) {
    let Some(ratio) = context.trail_braking_ratio else {
        return;
    };
    if ratio >= MIN_TRAIL_BRAKING_RATIO {
        return;
    }
    output.push(Insight {
        category: InsightCategory::Braking,
        severity: Severity::Suggestion,
        title: "Use more trail braking".to_string(),
        description: format!(
            "Trail braking in {:.0}% of braking zones",
            ratio * 100.
        ),
        improvement: "Release the brake progressively while turning in to help the car rotate"
            .to_string(),
        potential_gain_s: TRAIL_BRAKING_GAIN_S,
        confidence: 0.6,
    });
}

fn consistency(context: &InsightContext, output: &mut Vec<Insight>) {
    let Some(consistency) = context.consistency else {
        return;
    };
    if consistency.score < LOW_CONSISTENCY_SCORE {
        output.push(Insight {
            category: InsightCategory::Consistency,
            severity: Severity::Warning,
            title: "Lap times are inconsistent".to_string(),
            description: format!(
                "Consistency score {:.0}, lap times vary by {:.2}s",
                consistency.score, consistency.stddev_s
            ),
            improvement: "Pick fixed reference points for braking and turn-in and repeat them every lap"
                .to_string(),
            potential_gain_s: consistency.stddev_s / 2.,
            confidence: 0.8,
        });
    } else if consistency.score > HIGH_CONSISTENCY_SCORE {
        output.push(Insight {
            category: InsightCategory::Consistency,
            severity: Severity::Info,
            title: "Excellent consistency".to_string(),
            description: format!("Consistency score {:.0}", consistency.score),
            improvement: "Consistency is a strength, focus on raw pace".to_string(),
            potential_gain_s: 0.,
            confidence: 0.9,
        });
    }
}

fn full_throttle(context: &InsightContext, output: &mut Vec<Insight>) {
    let Some(fraction) = context.full_throttle_fraction else {
        return;
    };
    if fraction >= MIN_FULL_THROTTLE_FRACTION {
        return;
    }
    output.push(Insight {
        category: InsightCategory::Acceleration,
        severity: Severity::Suggestion,
        title: "Get to full throttle earlier".to_string(),
        description: format!("Full throttle for {:.0}% of the lap", fraction * 100.),
        improvement: "Commit to the throttle as soon as the steering starts to unwind".to_string(),
        potential_gain_s: (MIN_FULL_THROTTLE_FRACTION - fraction) * THROTTLE_GAIN_FACTOR_S,
        confidence: 0.5,
    });
}

fn theoretical_best(context: &InsightContext, output: &mut Vec<Insight>) {
    let Some(gap_s) = context.theoretical_best_gap_s else {
        return;
    };
    if gap_s <= MIN_THEORETICAL_GAP_S {
        return;
    }
    output.push(Insight {
        category: InsightCategory::General,
        severity: Severity::Info,
        title: "Time left in your best sectors".to_string(),
        description: format!(
            "Combining your best sectors is {gap_s:.3}s faster than your best lap"
        ),
        improvement: "Compare your laps sector by sector and repeat the best ones".to_string(),
        potential_gain_s: gap_s,
        confidence: 0.9,
    });
}
