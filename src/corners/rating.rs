use std::fmt;

use serde::{Deserialize, Serialize};

use super::Corner;
use crate::rules::RuleSet;

/// Entry to apex speed ratio above which the corner was entered too fast
const MAX_ENTRY_APEX_RATIO: f64 = 1.25;
/// Mean throttle step per sample tolerated before penalizing
const SMOOTH_THROTTLE_STEP: f64 = 0.05;
/// Exit to entry speed ratio below which the exit is considered slow
const MIN_EXIT_ENTRY_RATIO: f64 = 0.9;
/// Share of the corner duration a perfect driver could still gain
const TIME_LOSS_FACTOR: f64 = 0.1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CornerGrade {
    Excellent,
    Good,
    Poor,
    Bad,
}

impl CornerGrade {
    pub fn from_score(score: f64) -> Self {
        if score >= 85. {
            CornerGrade::Excellent
        } else if score >= 70. {
            CornerGrade::Good
        } else if score >= 50. {
            CornerGrade::Poor
        } else {
            CornerGrade::Bad
        }
    }

    pub fn needs_work(&self) -> bool {
        matches!(self, CornerGrade::Poor | CornerGrade::Bad)
    }
}

impl fmt::Display for CornerGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CornerGrade::Excellent => write!(f, "Excellent"),
            CornerGrade::Good => write!(f, "Good"),
            CornerGrade::Poor => write!(f, "Poor"),
            CornerGrade::Bad => write!(f, "Bad"),
        }
    }
}

/// Improvement suggestion for a corner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum CornerAdvice {
    EntryTooFast { entry_apex_ratio: f64 },
    RoughThrottle { throttle_smoothness: f64 },
    SlowExit { exit_entry_ratio: f64 },
    ReviewLine,
}

impl fmt::Display for CornerAdvice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CornerAdvice::EntryTooFast { entry_apex_ratio } => write!(
                f,
                "Entry speed is {:.0}% above apex speed. Brake earlier and carry a steadier minimum speed",
                (entry_apex_ratio - 1.) * 100.
            ),
            CornerAdvice::RoughThrottle {
                throttle_smoothness,
            } => write!(
                f,
                "Throttle changes {:.0}% per sample through the corner. Roll on the throttle progressively",
                throttle_smoothness * 100.
            ),
            CornerAdvice::SlowExit { exit_entry_ratio } => write!(
                f,
                "Exit speed is {:.0}% below entry speed. Open the steering earlier and get back to throttle sooner",
                (1. - exit_entry_ratio) * 100.
            ),
            CornerAdvice::ReviewLine => write!(
                f,
                "Review your line through this corner against a faster lap"
            ),
        }
    }
}

/// Corner measurements the advice rules look at.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CornerContext {
    pub entry_apex_ratio: f64,
    pub exit_entry_ratio: f64,
    pub throttle_smoothness: f64,
    pub grade: CornerGrade,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CornerRating {
    pub grade: CornerGrade,
    /// 0 to 100, higher is better
    pub score: f64,
    pub entry_apex_ratio: f64,
    pub exit_entry_ratio: f64,
    pub throttle_smoothness: f64,
    pub time_loss_s: f64,
    /// Only filled in for corners graded poor or bad
    pub suggestions: Vec<CornerAdvice>,
}

pub fn default_rules() -> RuleSet<CornerContext, CornerAdvice> {
    RuleSet::new()
        .with_rule("entry_speed", |c: &CornerContext, out: &mut Vec<CornerAdvice>| {
            if c.entry_apex_ratio > MAX_ENTRY_APEX_RATIO {
                out.push(CornerAdvice::EntryTooFast {
                    entry_apex_ratio: c.entry_apex_ratio,
                });
            }
        })
        .with_rule("throttle", |c: &CornerContext, out: &mut Vec<CornerAdvice>| {
            if c.throttle_smoothness > SMOOTH_THROTTLE_STEP {
                out.push(CornerAdvice::RoughThrottle {
                    throttle_smoothness: c.throttle_smoothness,
                });
            }
        })
        .with_rule("exit_speed", |c: &CornerContext, out: &mut Vec<CornerAdvice>| {
            if c.exit_entry_ratio < MIN_EXIT_ENTRY_RATIO {
                out.push(CornerAdvice::SlowExit {
                    exit_entry_ratio: c.exit_entry_ratio,
                });
            }
        })
}

pub struct CornerRater {
    rules: RuleSet<CornerContext, CornerAdvice>,
}

impl CornerRater {
    pub fn new() -> Self {
        Self {
            rules: default_rules(),
        }
    }

    pub fn with_rules(mut self, rules: RuleSet<CornerContext, CornerAdvice>) -> Self {
        self.rules = rules;
        self
    }

    pub fn rate(&self, corner: &Corner) -> CornerRating {
        // a stationary reading gives no information, treat it as neutral
        let ratio = |num: f64, den: f64| if den > 0. { num / den } else { 1. };
        let entry_apex_ratio = ratio(corner.entry_speed_kph, corner.apex_speed_kph);
        let exit_entry_ratio = ratio(corner.exit_speed_kph, corner.entry_speed_kph);
        let throttle_smoothness = corner.throttle_smoothness;

        let entry_penalty = ((entry_apex_ratio - MAX_ENTRY_APEX_RATIO) * 100.).clamp(0., 40.);
        let throttle_penalty = ((throttle_smoothness - SMOOTH_THROTTLE_STEP) * 300.).clamp(0., 30.);
        let exit_penalty = ((MIN_EXIT_ENTRY_RATIO - exit_entry_ratio) * 150.).clamp(0., 30.);
        let score = (100. - entry_penalty - throttle_penalty - exit_penalty).clamp(0., 100.);
        let grade = CornerGrade::from_score(score);
        let time_loss_s = corner.duration_s.max(0.) * (1. - score / 100.) * TIME_LOSS_FACTOR;

        let suggestions = if grade.needs_work() {
            let context = CornerContext {
                entry_apex_ratio,
                exit_entry_ratio,
                throttle_smoothness,
                grade,
            };
            self.rules.evaluate_or(&context, || CornerAdvice::ReviewLine)
        } else {
            Vec::new()
        };

        CornerRating {
            grade,
            score,
            entry_apex_ratio,
            exit_entry_ratio,
            throttle_smoothness,
            time_loss_s,
            suggestions,
        }
    }
}

impl Default for CornerRater {
    fn default() -> Self {
        Self::new()
    }
}

/// Rate a corner's execution with the default advice rules.
pub fn rate_corner(corner: &Corner) -> CornerRating {
    CornerRater::new().rate(corner)
}
