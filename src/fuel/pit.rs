use serde::{Deserialize, Serialize};

use super::FuelStrategyConfig;
use crate::telemetry::LapsRemaining;

/// A planned refuelling stop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PitStop {
    pub lap: u32,
    /// Fuel expected in the tank when entering the pits
    pub fuel_at_stop_pct: f64,
    pub fuel_to_add_pct: f64,
    pub estimated_duration_s: f64,
}

/// Laps the car can complete on the `usable_fraction` of `fuel_pct`.
pub(crate) fn laps_on_fuel(fuel_pct: f64, consumption_per_lap: f64, usable_fraction: f64) -> LapsRemaining {
    if consumption_per_lap <= 0. {
        return LapsRemaining::Unbounded;
    }
    LapsRemaining::from_projection(fuel_pct * usable_fraction / consumption_per_lap)
}

/// Simulate the race forward and plan every stop needed to reach the finish.
///
/// Returns no stops when the car can already finish, or when consumption is
/// unknown and nothing can be projected. A config that leaves no usable fuel
/// or cannot refuel has no plan either.
pub(crate) fn plan_stops(
    current_fuel_pct: f64,
    consumption_per_lap: f64,
    current_lap: u32,
    total_laps: u32,
    config: &FuelStrategyConfig,
) -> Vec<PitStop> {
    let mut stops = Vec::new();
    let usable_fraction = config.usable_fraction();
    if consumption_per_lap <= 0. || usable_fraction <= 0. || config.refuel_rate_pct_per_s <= 0. {
        return stops;
    }

    let mut fuel = current_fuel_pct;
    let mut lap = current_lap;
    // every stop advances at least one lap, so this bounds the loop
    let max_stops = total_laps.saturating_sub(current_lap);

    while stops.len() < max_stops as usize {
        let laps_left = total_laps.saturating_sub(lap);
        let available = match laps_on_fuel(fuel, consumption_per_lap, usable_fraction) {
            LapsRemaining::Finite(laps) => laps,
            LapsRemaining::Unbounded => break,
        };
        if available >= laps_left {
            break;
        }

        let stop_lap = lap + available.saturating_sub(1).max(1);
        let fuel_at_stop_pct = (fuel - (stop_lap - lap) as f64 * consumption_per_lap).max(0.);
        let laps_after_stop = total_laps.saturating_sub(stop_lap) as f64;
        // the safety margin stays in the tank on top of the finish buffer
        let fuel_needed =
            laps_after_stop * consumption_per_lap * (1. + config.finish_buffer) / usable_fraction;
        let fuel_to_add_pct = (fuel_needed - fuel_at_stop_pct)
            .min(config.tank_capacity_pct - fuel_at_stop_pct)
            .max(0.);
        let estimated_duration_s =
            config.pit_base_time_s + fuel_to_add_pct / config.refuel_rate_pct_per_s;

        stops.push(PitStop {
            lap: stop_lap,
            fuel_at_stop_pct,
            fuel_to_add_pct,
            estimated_duration_s,
        });

        fuel = fuel_at_stop_pct + fuel_to_add_pct;
        lap = stop_lap;
    }

    stops
}
