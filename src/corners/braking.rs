use serde::{Deserialize, Serialize};

use super::{
    CornerDetectionConfig,
    segmenter::{Segment, segments},
};
use crate::telemetry::{TelemetrySample, cumulative_distance_m, sorted_by_time};

/// A contiguous region of the lap with brake pressure above the zone threshold.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BrakeZone {
    pub start_index: usize,
    pub end_index: usize,
    /// Distance from the start of the lap to the zone start
    pub start_distance_m: f64,
    pub length_m: f64,
    pub duration_s: f64,
    pub entry_speed_kph: f64,
    pub min_speed_kph: f64,
    pub max_brake: f64,
    /// Brake was still partially applied after turn-in
    pub trail_braking: bool,
}

pub(crate) fn brake_zones(
    samples: &[TelemetrySample],
    config: &CornerDetectionConfig,
) -> Vec<BrakeZone> {
    let samples = sorted_by_time(samples);
    if samples.is_empty() {
        return Vec::new();
    }
    let distances = cumulative_distance_m(&samples);

    segments(samples.iter().map(|s| s.brake), config.brake_zone_threshold)
        .into_iter()
        .map(|Segment { start, end }| {
            let zone = &samples[start..=end];
            let (peak, max_brake) = zone
                .iter()
                .map(|s| s.brake)
                .enumerate()
                .fold((0, f64::MIN), |best, (i, brake)| {
                    if brake > best.1 { (i, brake) } else { best }
                });
            // release has started and the driver is already turning
            let trail_braking = zone[peak..].iter().any(|s| {
                s.brake > 0.
                    && s.brake < max_brake
                    && s.steering_deg.abs() > config.turn_in_threshold_deg
            });

            BrakeZone {
                start_index: start,
                end_index: end,
                start_distance_m: distances[start],
                length_m: distances[end] - distances[start],
                duration_s: (zone[zone.len() - 1].timestamp_ms - zone[0].timestamp_ms) as f64
                    / 1000.,
                entry_speed_kph: zone[0].speed_kph,
                min_speed_kph: zone.iter().map(|s| s.speed_kph).fold(f64::INFINITY, f64::min),
                max_brake,
                trail_braking,
            }
        })
        .collect()
}

/// Share of brake zones where trail braking was used, `None` without zones.
pub fn trail_braking_ratio(zones: &[BrakeZone]) -> Option<f64> {
    if zones.is_empty() {
        return None;
    }
    let trailed = zones.iter().filter(|z| z.trail_braking).count();
    Some(trailed as f64 / zones.len() as f64)
}
