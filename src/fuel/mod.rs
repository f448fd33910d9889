mod pit;

use std::fmt;

use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};
use simple_moving_average::{SMA, SumTreeSMA};

pub use pit::PitStop;

use crate::{
    errors::RacecraftError,
    rules::RuleSet,
    telemetry::{
        LapsRemaining, TelemetrySample, average_speed_kph, cumulative_distance_m, lap_slices,
        order_by_lap, sorted_by_time,
    },
};

/// Number of laps in the rolling consumption average
const ROLLING_WINDOW_LAPS: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FuelStrategyConfig {
    /// Fraction of the tank kept in reserve when projecting laps
    pub safety_margin: f64,
    pub tank_capacity_pct: f64,
    /// Stationary time of a pit stop without refuelling
    pub pit_base_time_s: f64,
    pub refuel_rate_pct_per_s: f64,
    /// Extra fuel added on top of what is needed to finish
    pub finish_buffer: f64,
    pub critical_fuel_pct: f64,
    pub low_fuel_pct: f64,
    /// Coefficient of variation above which consumption is considered inconsistent
    pub max_consumption_variation: f64,
}

impl Default for FuelStrategyConfig {
    fn default() -> Self {
        Self {
            safety_margin: 0.05,
            tank_capacity_pct: 100.,
            pit_base_time_s: 22.,
            refuel_rate_pct_per_s: 2.5,
            finish_buffer: 0.05,
            critical_fuel_pct: 10.,
            low_fuel_pct: 20.,
            max_consumption_variation: 0.2,
        }
    }
}

impl FuelStrategyConfig {
    /// Share of the tank available for racing once the margin is set aside,
    /// always within `[0, 1]`.
    pub fn usable_fraction(&self) -> f64 {
        (1. - self.safety_margin).clamp(0., 1.)
    }

    pub fn validate(&self) -> Result<(), RacecraftError> {
        let invalid = |field: &str, reason: &str| {
            Err(RacecraftError::InvalidConfig {
                field: format!("fuel.{field}"),
                reason: reason.to_string(),
            })
        };
        if !(0. ..1.).contains(&self.safety_margin) {
            return invalid("safety_margin", "must be at least 0 and below 1");
        }
        if !(self.refuel_rate_pct_per_s.is_finite() && self.refuel_rate_pct_per_s > 0.) {
            return invalid("refuel_rate_pct_per_s", "must be a positive number");
        }
        if !(self.tank_capacity_pct.is_finite() && self.tank_capacity_pct > 0.) {
            return invalid("tank_capacity_pct", "must be a positive number");
        }
        if !(self.finish_buffer.is_finite() && self.finish_buffer >= 0.) {
            return invalid("finish_buffer", "must not be negative");
        }
        if !(self.pit_base_time_s.is_finite() && self.pit_base_time_s >= 0.) {
            return invalid("pit_base_time_s", "must not be negative");
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LapFuelUsage {
    pub lap_number: u32,
    pub fuel_start_pct: f64,
    pub fuel_end_pct: f64,
    /// Fuel burnt during the lap, refuelling excluded
    pub consumption_pct: f64,
    pub distance_km: f64,
    pub elapsed_s: f64,
    pub avg_speed_kph: f64,
    /// Fuel level rose at some point during the lap
    pub refuelled: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionStats {
    pub mean_per_lap: f64,
    pub min_per_lap: f64,
    pub max_per_lap: f64,
    /// Average over the most recent laps
    pub rolling_per_lap: f64,
    pub mean_per_100km: f64,
    /// Standard deviation over mean, 0 when there is no consumption
    pub coefficient_of_variation: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FuelMap {
    Lean,
    Normal,
    Rich,
}

impl fmt::Display for FuelMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FuelMap::Lean => write!(f, "Lean"),
            FuelMap::Normal => write!(f, "Normal"),
            FuelMap::Rich => write!(f, "Rich"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FuelMapRecommendation {
    pub map: FuelMap,
    /// Laps needed to finish minus laps the fuel lasts, `None` without consumption data
    pub deficit_laps: Option<i64>,
    pub justification: String,
    pub effect: String,
}

impl FuelMapRecommendation {
    fn from_deficit(deficit_laps: Option<i64>) -> Self {
        let Some(deficit) = deficit_laps else {
            return Self {
                map: FuelMap::Normal,
                deficit_laps,
                justification: "Not enough consumption data to change the fuel map".to_string(),
                effect: "No change in consumption or power".to_string(),
            };
        };
        let (map, justification, effect) = if deficit > 2 {
            (
                FuelMap::Lean,
                format!("Fuel runs out {deficit} laps before the finish, aggressive saving needed"),
                "About 20% less consumption at the cost of about 10% power",
            )
        } else if deficit > 0 {
            (
                FuelMap::Lean,
                format!("Fuel is {deficit} laps short, a conservative lean map covers it"),
                "About 20% less consumption at the cost of about 10% power",
            )
        } else if deficit < -3 {
            (
                FuelMap::Rich,
                format!("{} laps of spare fuel, there is room to push", -deficit),
                "About 15% more consumption for about 5% more power",
            )
        } else {
            (
                FuelMap::Normal,
                "Fuel matches the remaining race distance".to_string(),
                "No change in consumption or power",
            )
        };
        Self {
            map,
            deficit_laps,
            justification,
            effect: effect.to_string(),
        }
    }
}

/// Detected fuel condition. The `Display` implementation renders the advice.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum FuelAdvice {
    CriticalFuel { fuel_pct: f64 },
    LowFuel { fuel_pct: f64 },
    SaveFuel { deficit_laps: i64, effect: String },
    PushAllowed { surplus_laps: i64, effect: String },
    InconsistentConsumption { coefficient_of_variation: f64 },
    Optimal,
}

impl fmt::Display for FuelAdvice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FuelAdvice::CriticalFuel { fuel_pct } => write!(
                f,
                "Critical fuel level ({fuel_pct:.1}%). Pit immediately"
            ),
            FuelAdvice::LowFuel { fuel_pct } => write!(
                f,
                "Low fuel ({fuel_pct:.1}%). Plan your pit stop"
            ),
            FuelAdvice::SaveFuel {
                deficit_laps,
                effect,
            } => write!(
                f,
                "Switch to the lean fuel map, {deficit_laps} laps short of the finish. {effect}"
            ),
            FuelAdvice::PushAllowed {
                surplus_laps,
                effect,
            } => write!(
                f,
                "Rich fuel map available with {surplus_laps} laps of spare fuel. {effect}"
            ),
            FuelAdvice::InconsistentConsumption {
                coefficient_of_variation,
            } => write!(
                f,
                "Fuel consumption varies {:.0}% between laps. Work on consistent lifts and shift points",
                coefficient_of_variation * 100.
            ),
            FuelAdvice::Optimal => write!(f, "Fuel strategy optimal, maintain current pace"),
        }
    }
}

/// Everything the fuel advice rules get to look at.
#[derive(Clone, Debug)]
pub struct FuelContext {
    pub current_fuel_pct: Option<f64>,
    pub laps_analyzed: usize,
    pub stats: ConsumptionStats,
    pub fuel_map: FuelMapRecommendation,
    pub config: FuelStrategyConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FuelStrategyResult {
    /// Fuel in the tank at the most recent sample, `None` without samples
    pub current_fuel_pct: Option<f64>,
    pub current_lap: u32,
    pub total_laps: u32,
    pub laps: Vec<LapFuelUsage>,
    pub stats: ConsumptionStats,
    pub estimated_laps_remaining: LapsRemaining,
    pub estimated_distance_remaining_km: Option<f64>,
    pub laps_to_finish: u32,
    pub fuel_map: FuelMapRecommendation,
    pub pit_stops: Vec<PitStop>,
    pub recommendations: Vec<FuelAdvice>,
}

/// Default fuel advice rules.
pub fn default_rules() -> RuleSet<FuelContext, FuelAdvice> {
    RuleSet::new()
        .with_rule("fuel_level", fuel_level_rule)
        .with_rule("fuel_map", fuel_map_rule)
        .with_rule("consistency", consistency_rule)
}

fn fuel_level_rule(context: &FuelContext, output: &mut Vec<FuelAdvice>) {
    let Some(fuel_pct) = context.current_fuel_pct else {
        return;
    };
    if fuel_pct < context.config.critical_fuel_pct {
        output.push(FuelAdvice::CriticalFuel { fuel_pct });
    } else if fuel_pct < context.config.low_fuel_pct {
        output.push(FuelAdvice::LowFuel { fuel_pct });
    }
}

fn fuel_map_rule(context: &FuelContext, output: &mut Vec<FuelAdvice>) {
    let effect = context.fuel_map.effect.clone();
    match (context.fuel_map.map, context.fuel_map.deficit_laps) {
        (FuelMap::Lean, Some(deficit_laps)) => output.push(FuelAdvice::SaveFuel {
            deficit_laps,
            effect,
        }),
        (FuelMap::Rich, Some(deficit_laps)) => output.push(FuelAdvice::PushAllowed {
            surplus_laps: -deficit_laps,
            effect,
        }),
        _ => {}
    }
}

fn consistency_rule(context: &FuelContext, output: &mut Vec<FuelAdvice>) {
    if context.laps_analyzed >= 2
        && context.stats.coefficient_of_variation > context.config.max_consumption_variation
    {
        output.push(FuelAdvice::InconsistentConsumption {
            coefficient_of_variation: context.stats.coefficient_of_variation,
        });
    }
}

pub struct FuelStrategyCalculator {
    config: FuelStrategyConfig,
    rules: RuleSet<FuelContext, FuelAdvice>,
}

impl FuelStrategyCalculator {
    pub fn new() -> Self {
        Self::with_config(FuelStrategyConfig::default())
    }

    pub fn with_config(config: FuelStrategyConfig) -> Self {
        Self {
            config,
            rules: default_rules(),
        }
    }

    pub fn with_rules(mut self, rules: RuleSet<FuelContext, FuelAdvice>) -> Self {
        self.rules = rules;
        self
    }

    /// Fuel used on each lap that has at least two samples.
    pub fn lap_usage(samples: &[TelemetrySample]) -> Vec<LapFuelUsage> {
        let ordered = order_by_lap(samples);
        lap_slices(&ordered)
            .filter(|lap| lap.len() >= 2)
            .map(|lap| {
                let (first, last) = (&lap[0], &lap[lap.len() - 1]);
                let (consumption_pct, refuelled) = lap.iter().tuple_windows().fold(
                    (0., false),
                    |(used, refuelled), (prev, next)| {
                        let drop = prev.fuel_pct - next.fuel_pct;
                        if drop >= 0. {
                            (used + drop, refuelled)
                        } else {
                            (used, true)
                        }
                    },
                );
                if refuelled {
                    debug!("Refuel detected on lap {}", first.lap_number);
                }
                let distance_m = cumulative_distance_m(lap).last().copied().unwrap_or(0.);
                let elapsed_s = (last.timestamp_ms - first.timestamp_ms) as f64 / 1000.;
                LapFuelUsage {
                    lap_number: first.lap_number,
                    fuel_start_pct: first.fuel_pct,
                    fuel_end_pct: last.fuel_pct,
                    consumption_pct,
                    distance_km: distance_m / 1000.,
                    elapsed_s,
                    avg_speed_kph: average_speed_kph(distance_m, elapsed_s),
                    refuelled,
                }
            })
            .collect()
    }

    pub fn consumption_stats(laps: &[LapFuelUsage]) -> ConsumptionStats {
        if laps.is_empty() {
            return ConsumptionStats::default();
        }
        let count = laps.len() as f64;
        let mean_per_lap = laps.iter().map(|l| l.consumption_pct).sum::<f64>() / count;
        let (min_per_lap, max_per_lap) = laps
            .iter()
            .map(|l| l.consumption_pct)
            .minmax_by(f64::total_cmp)
            .into_option()
            .unwrap_or((0., 0.));

        let mut rolling = SumTreeSMA::<f64, f64, ROLLING_WINDOW_LAPS>::new();
        for lap in laps {
            rolling.add_sample(lap.consumption_pct);
        }

        let total_distance_km = laps.iter().map(|l| l.distance_km).sum::<f64>();
        let mean_per_100km = if total_distance_km > 0. {
            laps.iter().map(|l| l.consumption_pct).sum::<f64>() / total_distance_km * 100.
        } else {
            0.
        };

        let coefficient_of_variation = if mean_per_lap > 0. {
            let variance = laps
                .iter()
                .map(|l| (l.consumption_pct - mean_per_lap).powi(2))
                .sum::<f64>()
                / count;
            variance.sqrt() / mean_per_lap
        } else {
            0.
        };

        ConsumptionStats {
            mean_per_lap,
            min_per_lap,
            max_per_lap,
            rolling_per_lap: rolling.get_average(),
            mean_per_100km,
            coefficient_of_variation,
        }
    }

    pub fn analyze(
        &self,
        samples: &[TelemetrySample],
        current_lap: u32,
        total_laps: u32,
    ) -> FuelStrategyResult {
        let current_fuel_pct = sorted_by_time(samples).last().map(|s| s.fuel_pct);
        let laps = Self::lap_usage(samples);
        let stats = Self::consumption_stats(&laps);
        let laps_to_finish = total_laps.saturating_sub(current_lap);

        let estimated_laps_remaining = pit::laps_on_fuel(
            current_fuel_pct.unwrap_or(0.),
            stats.mean_per_lap,
            self.config.usable_fraction(),
        );
        let estimated_distance_remaining_km = current_fuel_pct
            .filter(|_| stats.mean_per_100km > 0.)
            .map(|fuel| fuel * self.config.usable_fraction() / stats.mean_per_100km * 100.);

        let deficit_laps = estimated_laps_remaining
            .finite()
            .map(|laps| laps_to_finish as i64 - laps as i64);
        let fuel_map = FuelMapRecommendation::from_deficit(deficit_laps);

        let pit_stops = match current_fuel_pct {
            Some(fuel) => {
                pit::plan_stops(fuel, stats.mean_per_lap, current_lap, total_laps, &self.config)
            }
            None => {
                debug!("No fuel samples, skipping pit strategy");
                Vec::new()
            }
        };

        let context = FuelContext {
            current_fuel_pct,
            laps_analyzed: laps.len(),
            stats,
            fuel_map: fuel_map.clone(),
            config: self.config,
        };
        let recommendations = self.rules.evaluate_or(&context, || FuelAdvice::Optimal);

        FuelStrategyResult {
            current_fuel_pct,
            current_lap,
            total_laps,
            laps,
            stats,
            estimated_laps_remaining,
            estimated_distance_remaining_km,
            laps_to_finish,
            fuel_map,
            pit_stops,
            recommendations,
        }
    }
}

impl Default for FuelStrategyCalculator {
    fn default() -> Self {
        Self::new()
    }
}

/// Analyze fuel usage and plan the rest of the race with the default rules.
pub fn analyze_fuel_strategy(
    samples: &[TelemetrySample],
    current_lap: u32,
    total_laps: u32,
) -> FuelStrategyResult {
    FuelStrategyCalculator::new().analyze(samples, current_lap, total_laps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Two samples per lap, one minute apart, fuel dropping `per_lap` each lap.
    fn stint(laps: u32, start_fuel: f64, per_lap: f64) -> Vec<TelemetrySample> {
        (1..=laps)
            .flat_map(|lap| {
                let start = start_fuel - per_lap * (lap - 1) as f64;
                let t0 = (lap as u64 - 1) * 60_000;
                [
                    TelemetrySample {
                        timestamp_ms: t0,
                        lap_number: lap,
                        speed_kph: 180.,
                        fuel_pct: start,
                        ..Default::default()
                    },
                    TelemetrySample {
                        timestamp_ms: t0 + 59_999,
                        lap_number: lap,
                        speed_kph: 180.,
                        fuel_pct: start - per_lap,
                        ..Default::default()
                    },
                ]
            })
            .collect()
    }

    #[test]
    fn test_empty_input() {
        let result = analyze_fuel_strategy(&[], 0, 20);
        assert_eq!(result.current_fuel_pct, None);
        assert!(result.laps.is_empty());
        assert_eq!(result.estimated_laps_remaining, LapsRemaining::Unbounded);
        assert_eq!(result.fuel_map.map, FuelMap::Normal);
        assert!(result.pit_stops.is_empty());
        assert_eq!(result.recommendations, vec![FuelAdvice::Optimal]);
    }

    #[test]
    fn test_consumption_stats() {
        let samples = stint(4, 90., 5.);
        let result = analyze_fuel_strategy(&samples, 4, 10);
        assert_eq!(result.laps.len(), 4);
        assert!((result.stats.mean_per_lap - 5.).abs() < 1e-9);
        assert!((result.stats.min_per_lap - 5.).abs() < 1e-9);
        assert!((result.stats.max_per_lap - 5.).abs() < 1e-9);
        assert!((result.stats.rolling_per_lap - 5.).abs() < 1e-9);
        assert!(result.stats.coefficient_of_variation < 1e-9);
        // 180 km/h for a minute is 3 km per lap
        assert!((result.laps[0].distance_km - 3.).abs() < 1e-3);
        assert!((result.stats.mean_per_100km - 5. / 3. * 100.).abs() < 0.1);
        assert!((result.laps[0].avg_speed_kph - 180.).abs() < 1e-6);
    }

    #[test]
    fn test_refuel_is_not_negative_consumption() {
        let mut samples = stint(2, 30., 5.);
        let mut refuel = samples[3].clone();
        refuel.timestamp_ms += 1;
        refuel.fuel_pct = 90.;
        samples.push(refuel.clone());
        let mut after = refuel;
        after.timestamp_ms += 10_000;
        after.fuel_pct = 89.;
        samples.push(after);

        let result = analyze_fuel_strategy(&samples, 2, 20);
        let lap_two = &result.laps[1];
        assert!(lap_two.refuelled);
        assert!((lap_two.consumption_pct - 6.).abs() < 1e-9);
        assert_eq!(result.current_fuel_pct, Some(89.));
    }

    #[test]
    fn test_fuel_map_tiers() {
        assert_eq!(FuelMapRecommendation::from_deficit(Some(5)).map, FuelMap::Lean);
        assert_eq!(FuelMapRecommendation::from_deficit(Some(1)).map, FuelMap::Lean);
        assert_eq!(FuelMapRecommendation::from_deficit(Some(0)).map, FuelMap::Normal);
        assert_eq!(FuelMapRecommendation::from_deficit(Some(-3)).map, FuelMap::Normal);
        assert_eq!(FuelMapRecommendation::from_deficit(Some(-4)).map, FuelMap::Rich);
        assert_eq!(FuelMapRecommendation::from_deficit(None).map, FuelMap::Normal);
        assert_ne!(
            FuelMapRecommendation::from_deficit(Some(5)).justification,
            FuelMapRecommendation::from_deficit(Some(1)).justification
        );
    }

    #[test]
    fn test_low_and_critical_fuel() {
        let samples = stint(3, 25., 4.);
        let result = analyze_fuel_strategy(&samples, 3, 4);
        assert!(result
            .recommendations
            .contains(&FuelAdvice::LowFuel { fuel_pct: 13. }));

        let samples = stint(3, 15., 3.);
        let result = analyze_fuel_strategy(&samples, 3, 4);
        assert!(result
            .recommendations
            .contains(&FuelAdvice::CriticalFuel { fuel_pct: 6. }));
    }

    #[test]
    fn test_plenty_of_fuel_allows_rich_map() {
        let samples = stint(2, 100., 2.);
        let result = analyze_fuel_strategy(&samples, 2, 10);
        // floor(96 * 0.95 / 2) = 45 laps for 8 to go
        assert_eq!(result.estimated_laps_remaining, LapsRemaining::Finite(45));
        assert_eq!(result.fuel_map.map, FuelMap::Rich);
        assert!(matches!(
            result.recommendations[0],
            FuelAdvice::PushAllowed { surplus_laps: 37, .. }
        ));
        assert!(result.pit_stops.is_empty());
    }

    #[test]
    fn test_inconsistent_consumption() {
        let mut samples = stint(2, 90., 2.);
        samples.extend(stint(2, 90., 2.).into_iter().map(|mut s| {
            s.lap_number += 2;
            s.timestamp_ms += 120_000;
            s
        }));
        // lap 4 burns 6% instead of 2%
        samples[7].fuel_pct = samples[6].fuel_pct - 6.;
        let result = analyze_fuel_strategy(&samples, 4, 6);
        assert!(result.stats.coefficient_of_variation > 0.2);
        assert!(result
            .recommendations
            .iter()
            .any(|a| matches!(a, FuelAdvice::InconsistentConsumption { .. })));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_laps_remaining_non_increasing(per_lap in 0.5f64..8.0, laps in 2u32..12) {
            let samples = stint(laps, 100., per_lap);
            let mut previous = LapsRemaining::Unbounded;
            for lap in 1..=laps {
                let upto = samples.iter().filter(|s| s.lap_number <= lap).cloned().collect_vec();
                let result = analyze_fuel_strategy(&upto, lap, 40);
                prop_assert!(result.estimated_laps_remaining <= previous);
                previous = result.estimated_laps_remaining;
            }
        }
    }
}
