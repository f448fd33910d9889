//! Side by side comparison of two laps aligned by distance.
//!
//! Lap A is the lap being reviewed and lap B the reference. Every delta is
//! A minus B, so a positive time delta means A is slower.

use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
    rules::RuleSet,
    telemetry::{
        Lap, TelemetrySample, average_speed_kph, cumulative_distance_m, sorted_by_time,
    },
};

/// Spacing of the distance aligned delta trace
pub const DELTA_TRACE_STEP_M: f64 = 10.;
pub const SECTOR_COUNT: usize = 3;
/// Braking onsets further apart than this are not the same braking point
pub const MAX_BRAKING_PAIR_DISTANCE_M: f64 = 75.;

const BRAKING_POINT_BRAKE: f64 = 0.5;
const ACCELERATION_POINT_THROTTLE: f64 = 0.8;
/// Braking later than this in the reference is worth pointing out
const NOTABLE_BRAKING_DELTA_M: f64 = 10.;
const NOTABLE_TOP_SPEED_DELTA_KPH: f64 = 5.;
const NOTABLE_SECTOR_DELTA_S: f64 = 0.2;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InputPoint {
    pub index: usize,
    pub distance_m: f64,
    pub speed_kph: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LapSummary {
    pub lap_number: u32,
    pub lap_time_s: f64,
    pub distance_m: f64,
    pub avg_speed_kph: f64,
    pub max_speed_kph: f64,
    /// Brake above 50% while slowing, first sample of each run
    pub braking_points: Vec<InputPoint>,
    /// Throttle above 80% while speeding up, first sample of each run
    pub acceleration_points: Vec<InputPoint>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SectorDelta {
    pub sector: usize,
    pub time_a_s: f64,
    pub time_b_s: f64,
    pub delta_s: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeltaPoint {
    pub distance_m: f64,
    pub speed_delta_kph: f64,
    pub time_delta_s: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BrakingPointDelta {
    pub distance_a_m: f64,
    pub distance_b_m: f64,
    /// Positive when lap B brakes later
    pub delta_m: f64,
    pub speed_delta_kph: f64,
}

/// Comparative advice. These are rule-of-thumb heuristics over the deltas,
/// not a fitted model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ComparisonAdvice {
    BrakeLater { distance_m: f64, delta_m: f64 },
    LowerTopSpeed { speed_deficit_kph: f64 },
    SectorLoss { sector: usize, delta_s: f64 },
    NoClearGain,
}

impl fmt::Display for ComparisonAdvice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComparisonAdvice::BrakeLater {
                distance_m,
                delta_m,
            } => write!(
                f,
                "Reference brakes {delta_m:.0}m later at {distance_m:.0}m. Try moving your brake point"
            ),
            ComparisonAdvice::LowerTopSpeed { speed_deficit_kph } => write!(
                f,
                "Top speed {speed_deficit_kph:.1} km/h lower than the reference. Focus on corner exits before straights"
            ),
            ComparisonAdvice::SectorLoss { sector, delta_s } => write!(
                f,
                "Most time lost in sector {} ({delta_s:.3}s)",
                sector + 1
            ),
            ComparisonAdvice::NoClearGain => write!(
                f,
                "No clear gain against the reference lap"
            ),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ComparisonContext {
    pub lap_a: LapSummary,
    pub lap_b: LapSummary,
    pub sector_deltas: Vec<SectorDelta>,
    pub braking_point_deltas: Vec<BrakingPointDelta>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LapComparisonResult {
    pub lap_a: LapSummary,
    pub lap_b: LapSummary,
    /// Lap A time minus lap B time
    pub time_difference_s: f64,
    pub sector_deltas: Vec<SectorDelta>,
    pub delta_trace: Vec<DeltaPoint>,
    pub braking_point_deltas: Vec<BrakingPointDelta>,
    pub recommendations: Vec<ComparisonAdvice>,
}

pub fn default_rules() -> RuleSet<ComparisonContext, ComparisonAdvice> {
    RuleSet::new()
        .with_rule("braking_points", braking_points_rule)
        .with_rule("top_speed", top_speed_rule)
        .with_rule("sector_loss", sector_loss_rule)
}

fn braking_points_rule(context: &ComparisonContext, output: &mut Vec<ComparisonAdvice>) {
    output.extend(
        context
            .braking_point_deltas
            .iter()
            .filter(|d| d.delta_m > NOTABLE_BRAKING_DELTA_M)
            .map(|d| ComparisonAdvice::BrakeLater {
                distance_m: d.distance_a_m,
                delta_m: d.delta_m,
            }),
    );
}

fn top_speed_rule(context: &ComparisonContext, output: &mut Vec<ComparisonAdvice>) {
    let deficit = context.lap_b.max_speed_kph - context.lap_a.max_speed_kph;
    if deficit > NOTABLE_TOP_SPEED_DELTA_KPH {
        output.push(ComparisonAdvice::LowerTopSpeed {
            speed_deficit_kph: deficit,
        });
    }
}

fn sector_loss_rule(context: &ComparisonContext, output: &mut Vec<ComparisonAdvice>) {
    let worst = context
        .sector_deltas
        .iter()
        .filter(|s| s.delta_s > NOTABLE_SECTOR_DELTA_S)
        .max_by(|a, b| a.delta_s.total_cmp(&b.delta_s));
    if let Some(sector) = worst {
        output.push(ComparisonAdvice::SectorLoss {
            sector: sector.sector,
            delta_s: sector.delta_s,
        });
    }
}

/// Elapsed time and speed of a lap as functions of distance.
struct LapProfile {
    distance_m: Vec<f64>,
    elapsed_s: Vec<f64>,
    speed_kph: Vec<f64>,
}

impl LapProfile {
    fn new(samples: &[TelemetrySample]) -> Self {
        let start = samples.first().map(|s| s.timestamp_ms).unwrap_or(0);
        Self {
            distance_m: cumulative_distance_m(samples),
            elapsed_s: samples
                .iter()
                .map(|s| (s.timestamp_ms - start) as f64 / 1000.)
                .collect(),
            speed_kph: samples.iter().map(|s| s.speed_kph).collect(),
        }
    }

    fn total_distance_m(&self) -> f64 {
        self.distance_m.last().copied().unwrap_or(0.)
    }

    /// Linear interpolation of (elapsed, speed) at a distance, clamped to the lap.
    fn at(&self, distance_m: f64) -> (f64, f64) {
        let len = self.distance_m.len();
        let i = self.distance_m.partition_point(|&d| d < distance_m);
        if i == 0 {
            return (self.elapsed_s[0], self.speed_kph[0]);
        }
        if i >= len {
            return (self.elapsed_s[len - 1], self.speed_kph[len - 1]);
        }
        // distance_m[i - 1] < distance_m <= distance_m[i]
        let (d0, d1) = (self.distance_m[i - 1], self.distance_m[i]);
        let t = (distance_m - d0) / (d1 - d0);
        let lerp = |values: &[f64]| values[i - 1] + t * (values[i] - values[i - 1]);
        (lerp(&self.elapsed_s), lerp(&self.speed_kph))
    }
}

fn input_points(
    samples: &[TelemetrySample],
    distances: &[f64],
    active: impl Fn(&TelemetrySample, &TelemetrySample) -> bool,
) -> Vec<InputPoint> {
    let mut points = Vec::new();
    let mut was_active = false;
    for (i, (prev, next)) in samples.iter().tuple_windows().enumerate() {
        let is_active = active(prev, next);
        if is_active && !was_active {
            points.push(InputPoint {
                index: i + 1,
                distance_m: distances[i + 1],
                speed_kph: next.speed_kph,
            });
        }
        was_active = is_active;
    }
    points
}

fn summarize(samples: &[TelemetrySample], profile: &LapProfile) -> LapSummary {
    let Some(last) = samples.last() else {
        return LapSummary::default();
    };
    let lap_time_s = profile.elapsed_s.last().copied().unwrap_or(0.);
    let distance_m = profile.total_distance_m();
    LapSummary {
        lap_number: last.lap_number,
        lap_time_s,
        distance_m,
        avg_speed_kph: average_speed_kph(distance_m, lap_time_s),
        max_speed_kph: samples.iter().map(|s| s.speed_kph).fold(0., f64::max),
        braking_points: input_points(samples, &profile.distance_m, |prev, next| {
            next.brake > BRAKING_POINT_BRAKE && next.speed_kph < prev.speed_kph
        }),
        acceleration_points: input_points(samples, &profile.distance_m, |prev, next| {
            next.throttle > ACCELERATION_POINT_THROTTLE && next.speed_kph > prev.speed_kph
        }),
    }
}

fn pair_braking_points(a: &[InputPoint], b: &[InputPoint]) -> Vec<BrakingPointDelta> {
    a.iter()
        .filter_map(|point_a| {
            b.iter()
                .min_by(|x, y| {
                    (x.distance_m - point_a.distance_m)
                        .abs()
                        .total_cmp(&(y.distance_m - point_a.distance_m).abs())
                })
                .filter(|point_b| {
                    (point_b.distance_m - point_a.distance_m).abs() <= MAX_BRAKING_PAIR_DISTANCE_M
                })
                .map(|point_b| BrakingPointDelta {
                    distance_a_m: point_a.distance_m,
                    distance_b_m: point_b.distance_m,
                    delta_m: point_b.distance_m - point_a.distance_m,
                    speed_delta_kph: point_a.speed_kph - point_b.speed_kph,
                })
        })
        .collect()
}

pub struct LapComparator {
    rules: RuleSet<ComparisonContext, ComparisonAdvice>,
}

impl LapComparator {
    pub fn new() -> Self {
        Self {
            rules: default_rules(),
        }
    }

    pub fn with_rules(mut self, rules: RuleSet<ComparisonContext, ComparisonAdvice>) -> Self {
        self.rules = rules;
        self
    }

    pub fn compare(
        &self,
        lap_a: &[TelemetrySample],
        lap_b: &[TelemetrySample],
    ) -> LapComparisonResult {
        let (lap_a, lap_b) = (sorted_by_time(lap_a), sorted_by_time(lap_b));
        let (profile_a, profile_b) = (LapProfile::new(&lap_a), LapProfile::new(&lap_b));
        let summary_a = summarize(&lap_a, &profile_a);
        let summary_b = summarize(&lap_b, &profile_b);

        let common_distance_m = profile_a
            .total_distance_m()
            .min(profile_b.total_distance_m());
        let (sector_deltas, delta_trace) = if lap_a.is_empty() || lap_b.is_empty() {
            (Vec::new(), Vec::new())
        } else {
            (
                sector_deltas(&profile_a, &profile_b, common_distance_m),
                delta_trace(&profile_a, &profile_b, common_distance_m),
            )
        };
        let braking_point_deltas =
            pair_braking_points(&summary_a.braking_points, &summary_b.braking_points);

        let context = ComparisonContext {
            lap_a: summary_a,
            lap_b: summary_b,
            sector_deltas,
            braking_point_deltas,
        };
        let recommendations = self
            .rules
            .evaluate_or(&context, || ComparisonAdvice::NoClearGain);
        let ComparisonContext {
            lap_a,
            lap_b,
            sector_deltas,
            braking_point_deltas,
        } = context;

        LapComparisonResult {
            time_difference_s: lap_a.lap_time_s - lap_b.lap_time_s,
            lap_a,
            lap_b,
            sector_deltas,
            delta_trace,
            braking_point_deltas,
            recommendations,
        }
    }
}

impl Default for LapComparator {
    fn default() -> Self {
        Self::new()
    }
}

fn sector_deltas(a: &LapProfile, b: &LapProfile, common_distance_m: f64) -> Vec<SectorDelta> {
    if common_distance_m <= 0. {
        return Vec::new();
    }
    let sector_length = common_distance_m / SECTOR_COUNT as f64;
    (0..SECTOR_COUNT)
        .map(|sector| {
            let (from, to) = (
                sector as f64 * sector_length,
                (sector + 1) as f64 * sector_length,
            );
            let time_a_s = a.at(to).0 - a.at(from).0;
            let time_b_s = b.at(to).0 - b.at(from).0;
            SectorDelta {
                sector,
                time_a_s,
                time_b_s,
                delta_s: time_a_s - time_b_s,
            }
        })
        .collect()
}

fn delta_trace(a: &LapProfile, b: &LapProfile, common_distance_m: f64) -> Vec<DeltaPoint> {
    // integrated distances land a hair short of round numbers
    let steps = (common_distance_m / DELTA_TRACE_STEP_M + 1e-9).floor() as usize;
    (0..=steps)
        .map(|step| {
            let distance_m = step as f64 * DELTA_TRACE_STEP_M;
            let ((time_a, speed_a), (time_b, speed_b)) = (a.at(distance_m), b.at(distance_m));
            DeltaPoint {
                distance_m,
                speed_delta_kph: speed_a - speed_b,
                time_delta_s: time_a - time_b,
            }
        })
        .collect()
}

/// Compare lap A against reference lap B with the default advice rules.
pub fn compare_laps(lap_a: &[TelemetrySample], lap_b: &[TelemetrySample]) -> LapComparisonResult {
    LapComparator::new().compare(lap_a, lap_b)
}

/// Sum of the best time seen in each sector across the valid laps.
///
/// Returns `None` when no valid lap has sector times.
pub fn theoretical_best_lap(laps: &[Lap]) -> Option<f64> {
    let sectored = laps
        .iter()
        .filter(|l| l.is_valid && !l.sector_times_s.is_empty())
        .collect_vec();
    let sector_count = sectored.iter().map(|l| l.sector_times_s.len()).max()?;
    (0..sector_count)
        .map(|i| {
            sectored
                .iter()
                .filter_map(|l| l.sector_times_s.get(i).copied())
                .min_by(f64::total_cmp)
        })
        .sum()
}
