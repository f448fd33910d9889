mod compound;

use std::fmt;

use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};

pub use compound::{CompoundKind, GripCurve, TireCompound};

use crate::{
    rules::RuleSet,
    telemetry::{LapsRemaining, TelemetrySample, Wheel, WheelSet, lap_slices, order_by_lap},
};

/// Wear below which a tire is no longer raceable
const MINIMUM_USABLE_WEAR: f64 = 0.3;
/// Wear gained between two laps that marks a tire change
const TIRE_CHANGE_WEAR_JUMP: f64 = 0.05;
/// Maximum difference in average wear between axles or sides
const MAX_WEAR_IMBALANCE: f64 = 0.1;
const MIN_GRIP_LEVEL: f64 = 0.8;
const PIT_WINDOW_OPENING: f64 = 0.7;

const FRESH_WEAR: f64 = 1.;
const FRESH_TEMP_C: f64 = 85.;
const FRESH_PRESSURE_BAR: f64 = 2.;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TireAnalysisConfig {
    pub minimum_usable_wear: f64,
    pub tire_change_wear_jump: f64,
}

impl Default for TireAnalysisConfig {
    fn default() -> Self {
        Self {
            minimum_usable_wear: MINIMUM_USABLE_WEAR,
            tire_change_wear_jump: TIRE_CHANGE_WEAR_JUMP,
        }
    }
}

/// Once-per-lap tire snapshot, taken from the first sample of the lap.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TireDataPoint {
    pub lap_number: u32,
    pub wear: WheelSet<f64>,
    pub temp_c: WheelSet<f64>,
    pub pressure_bar: WheelSet<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WheelTireState {
    pub wear: f64,
    /// Wear lost per lap over the current stint
    pub wear_rate: f64,
    pub estimated_laps_remaining: LapsRemaining,
    pub temp_c: f64,
    pub pressure_bar: f64,
    pub grip_level: f64,
    pub overheating: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PitUrgency {
    /// Three laps or fewer left on the critical tire
    Critical,
    /// Ten laps or fewer left on the critical tire
    Approaching,
    Flexible,
}

impl PitUrgency {
    fn from_laps_remaining(laps: LapsRemaining) -> Self {
        match laps {
            LapsRemaining::Finite(n) if n <= 3 => PitUrgency::Critical,
            LapsRemaining::Finite(n) if n <= 10 => PitUrgency::Approaching,
            _ => PitUrgency::Flexible,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PitWindow {
    pub earliest_lap: u32,
    pub latest_lap: u32,
    pub recommended_lap: u32,
    pub urgency: PitUrgency,
    pub reason: String,
}

/// Detected tire condition. The `Display` implementation renders the advice.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum TireAdvice {
    Overheating {
        wheel: Wheel,
        temp_c: f64,
        optimal_max_c: f64,
    },
    FrontRearImbalance {
        front_wear: f64,
        rear_wear: f64,
    },
    LeftRightImbalance {
        left_wear: f64,
        right_wear: f64,
    },
    LowGrip {
        wheel: Wheel,
        grip_level: f64,
    },
    PressureOutOfRange {
        wheel: Wheel,
        pressure_bar: f64,
        /// Positive to add pressure, negative to bleed it
        adjustment_bar: f64,
    },
    Optimal,
}

impl fmt::Display for TireAdvice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TireAdvice::Overheating {
                wheel,
                temp_c,
                optimal_max_c,
            } => write!(
                f,
                "{wheel} tire overheating at {temp_c:.1}°C (optimal max {optimal_max_c:.1}°C). Reduce sliding or open brake ducts"
            ),
            TireAdvice::FrontRearImbalance {
                front_wear,
                rear_wear,
            } => {
                if front_wear < rear_wear {
                    write!(
                        f,
                        "Front tires wearing faster than rears ({front_wear:.2} vs {rear_wear:.2}). Move brake bias rearward or brake less aggressively into corners"
                    )
                } else {
                    write!(
                        f,
                        "Rear tires wearing faster than fronts ({rear_wear:.2} vs {front_wear:.2}). Be smoother with the throttle on corner exit"
                    )
                }
            }
            TireAdvice::LeftRightImbalance {
                left_wear,
                right_wear,
            } => {
                let (worn, other) = if left_wear < right_wear {
                    ("Left", "right")
                } else {
                    ("Right", "left")
                };
                write!(
                    f,
                    "{worn} side tires wearing faster than the {other} side ({left_wear:.2} left, {right_wear:.2} right). Check alignment, this track may load one side"
                )
            }
            TireAdvice::LowGrip { wheel, grip_level } => write!(
                f,
                "{wheel} tire grip down to {:.0}%. Expect longer braking distances and lower cornering speed",
                grip_level * 100.
            ),
            TireAdvice::PressureOutOfRange {
                wheel,
                pressure_bar,
                adjustment_bar,
            } => {
                let direction = if *adjustment_bar > 0. {
                    "Increase"
                } else {
                    "Decrease"
                };
                write!(
                    f,
                    "{wheel} pressure {pressure_bar:.2} bar outside optimal range. {direction} by {:.2} bar",
                    adjustment_bar.abs()
                )
            }
            TireAdvice::Optimal => write!(f, "Tires performing within optimal parameters"),
        }
    }
}

/// Everything the tire advice rules get to look at.
#[derive(Clone, Debug)]
pub struct TireContext {
    pub compound: TireCompound,
    pub wheels: WheelSet<WheelTireState>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TirePerformanceResult {
    pub compound: CompoundKind,
    pub current_lap: u32,
    pub total_laps: u32,
    pub wheels: WheelSet<WheelTireState>,
    /// Wheel with the fewest estimated laps remaining
    pub critical_wheel: Wheel,
    pub pit_window: PitWindow,
    /// Nominal stint length for this compound
    pub expected_stint_laps: f64,
    pub history: Vec<TireDataPoint>,
    pub recommendations: Vec<TireAdvice>,
}

/// Default tire advice rules.
pub fn default_rules() -> RuleSet<TireContext, TireAdvice> {
    RuleSet::new()
        .with_rule("overheating", overheating_rule)
        .with_rule("front_rear_imbalance", front_rear_imbalance_rule)
        .with_rule("left_right_imbalance", left_right_imbalance_rule)
        .with_rule("low_grip", low_grip_rule)
        .with_rule("pressure", pressure_rule)
}

fn overheating_rule(context: &TireContext, output: &mut Vec<TireAdvice>) {
    for (wheel, state) in context.wheels.iter() {
        if state.overheating {
            output.push(TireAdvice::Overheating {
                wheel,
                temp_c: state.temp_c,
                optimal_max_c: context.compound.optimal_temp_c.1,
            });
        }
    }
}

fn average_wear(wheels: &WheelSet<WheelTireState>, filter: impl Fn(Wheel) -> bool) -> f64 {
    let (sum, count) = wheels
        .iter()
        .filter(|(wheel, _)| filter(*wheel))
        .fold((0., 0.), |(sum, count), (_, state)| (sum + state.wear, count + 1.));
    sum / count
}

fn front_rear_imbalance_rule(context: &TireContext, output: &mut Vec<TireAdvice>) {
    let front_wear = average_wear(&context.wheels, |w| w.is_front());
    let rear_wear = average_wear(&context.wheels, |w| !w.is_front());
    if (front_wear - rear_wear).abs() > MAX_WEAR_IMBALANCE {
        output.push(TireAdvice::FrontRearImbalance {
            front_wear,
            rear_wear,
        });
    }
}

fn left_right_imbalance_rule(context: &TireContext, output: &mut Vec<TireAdvice>) {
    let left_wear = average_wear(&context.wheels, |w| w.is_left());
    let right_wear = average_wear(&context.wheels, |w| !w.is_left());
    if (left_wear - right_wear).abs() > MAX_WEAR_IMBALANCE {
        output.push(TireAdvice::LeftRightImbalance {
            left_wear,
            right_wear,
        });
    }
}

fn low_grip_rule(context: &TireContext, output: &mut Vec<TireAdvice>) {
    for (wheel, state) in context.wheels.iter() {
        if state.grip_level < MIN_GRIP_LEVEL {
            output.push(TireAdvice::LowGrip {
                wheel,
                grip_level: state.grip_level,
            });
        }
    }
}

fn pressure_rule(context: &TireContext, output: &mut Vec<TireAdvice>) {
    let (low, high) = context.compound.optimal_pressure_bar;
    for (wheel, state) in context.wheels.iter() {
        let adjustment_bar = if state.pressure_bar < low {
            low - state.pressure_bar
        } else if state.pressure_bar > high {
            high - state.pressure_bar
        } else {
            continue;
        };
        output.push(TireAdvice::PressureOutOfRange {
            wheel,
            pressure_bar: state.pressure_bar,
            adjustment_bar,
        });
    }
}

pub struct TireAnalyzer {
    config: TireAnalysisConfig,
    rules: RuleSet<TireContext, TireAdvice>,
}

impl TireAnalyzer {
    pub fn new() -> Self {
        Self::with_config(TireAnalysisConfig::default())
    }

    pub fn with_config(config: TireAnalysisConfig) -> Self {
        Self {
            config,
            rules: default_rules(),
        }
    }

    pub fn with_rules(mut self, rules: RuleSet<TireContext, TireAdvice>) -> Self {
        self.rules = rules;
        self
    }

    /// One data point per lap, first sample seen in each lap.
    pub fn extract_history(samples: &[TelemetrySample]) -> Vec<TireDataPoint> {
        let ordered = order_by_lap(samples);
        lap_slices(&ordered)
            .filter_map(|lap| lap.first())
            .map(|s| TireDataPoint {
                lap_number: s.lap_number,
                wear: s.tire_wear,
                temp_c: s.tire_temp_c,
                pressure_bar: s.tire_pressure_bar,
            })
            .collect()
    }

    /// History since the most recent tire change.
    fn current_stint<'a>(&self, history: &'a [TireDataPoint]) -> &'a [TireDataPoint] {
        let start = history
            .iter()
            .tuple_windows()
            .positions(|(prev, next)| {
                Wheel::ALL.iter().any(|w| {
                    next.wear.get(*w) - prev.wear.get(*w) > self.config.tire_change_wear_jump
                })
            })
            .last()
            .map(|pos| pos + 1)
            .unwrap_or(0);
        if start > 0 {
            debug!(
                "Tire change detected before lap {}, using current stint only",
                history[start].lap_number
            );
        }
        &history[start..]
    }

    fn wheel_state(
        &self,
        wheel: Wheel,
        stint: &[TireDataPoint],
        compound: &TireCompound,
    ) -> WheelTireState {
        let (wear, temp_c, pressure_bar) = match stint.last() {
            Some(point) => (
                *point.wear.get(wheel),
                *point.temp_c.get(wheel),
                *point.pressure_bar.get(wheel),
            ),
            None => (FRESH_WEAR, FRESH_TEMP_C, FRESH_PRESSURE_BAR),
        };
        let wear = wear.clamp(0., 1.);

        let wear_rate = match (stint.first(), stint.last()) {
            (Some(first), Some(last)) if last.lap_number > first.lap_number => {
                let lap_span = (last.lap_number - first.lap_number) as f64;
                ((first.wear.get(wheel) - last.wear.get(wheel)) / lap_span).max(0.)
            }
            _ => 0.,
        };

        let estimated_laps_remaining = if wear_rate > 0. {
            LapsRemaining::from_projection((wear - self.config.minimum_usable_wear) / wear_rate)
        } else {
            LapsRemaining::Unbounded
        };

        WheelTireState {
            wear,
            wear_rate,
            estimated_laps_remaining,
            temp_c,
            pressure_bar,
            grip_level: compound.grip_level(wear, temp_c),
            overheating: temp_c > compound.optimal_temp_c.1,
        }
    }

    fn pit_window(&self, laps_remaining: LapsRemaining, current_lap: u32, total_laps: u32) -> PitWindow {
        let latest_lap = match laps_remaining {
            LapsRemaining::Finite(laps) => current_lap
                .saturating_add(laps)
                .saturating_sub(1)
                .min(total_laps),
            LapsRemaining::Unbounded => total_laps,
        }
        .max(current_lap);
        let earliest_lap = current_lap
            .max((latest_lap as f64 * PIT_WINDOW_OPENING).floor() as u32)
            .min(latest_lap);
        let recommended_lap = (earliest_lap + latest_lap) / 2;

        let urgency = PitUrgency::from_laps_remaining(laps_remaining);
        let reason = match urgency {
            PitUrgency::Critical => format!(
                "Critical tire wear, only {laps_remaining} laps of usable grip left. Pit by lap {latest_lap}"
            ),
            PitUrgency::Approaching => format!(
                "Tires approaching their limit with {laps_remaining} laps left. Plan to pit between laps {earliest_lap} and {latest_lap}"
            ),
            PitUrgency::Flexible => format!(
                "Tire wear under control. Pit window is flexible, laps {earliest_lap} to {latest_lap}"
            ),
        };

        PitWindow {
            earliest_lap,
            latest_lap,
            recommended_lap,
            urgency,
            reason,
        }
    }

    pub fn analyze(
        &self,
        samples: &[TelemetrySample],
        total_laps: u32,
        current_lap: u32,
        compound: &TireCompound,
    ) -> TirePerformanceResult {
        let history = Self::extract_history(samples);
        if history.is_empty() {
            debug!("No tire samples, reporting fresh tires");
        }
        let stint = self.current_stint(&history);
        let wheels = WheelSet::from_fn(|wheel| self.wheel_state(wheel, stint, compound));

        let critical_wheel = Wheel::ALL
            .into_iter()
            .min_by_key(|w| wheels.get(*w).estimated_laps_remaining)
            .unwrap_or(Wheel::FrontLeft);
        let pit_window = self.pit_window(
            wheels.get(critical_wheel).estimated_laps_remaining,
            current_lap,
            total_laps,
        );

        let context = TireContext {
            compound: compound.clone(),
            wheels,
        };
        let recommendations = self.rules.evaluate_or(&context, || TireAdvice::Optimal);

        TirePerformanceResult {
            compound: compound.kind,
            current_lap,
            total_laps,
            wheels,
            critical_wheel,
            pit_window,
            expected_stint_laps: compound.expected_stint_laps(self.config.minimum_usable_wear),
            history,
            recommendations,
        }
    }
}

impl Default for TireAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Analyze tire state over the session samples with the default rules.
pub fn analyze_tires(
    samples: &[TelemetrySample],
    total_laps: u32,
    current_lap: u32,
    compound: &TireCompound,
) -> TirePerformanceResult {
    TireAnalyzer::new().analyze(samples, total_laps, current_lap, compound)
}
