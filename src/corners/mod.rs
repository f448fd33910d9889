//! Corner and brake zone detection over a single lap.
//!
//! Both detectors walk the lap once with a [`Segmenter`], corners over the
//! absolute steering angle and brake zones over brake pressure. Sample
//! indices in the results refer to the lap's samples ordered by timestamp.

mod braking;
mod rating;
mod segmenter;

use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};

pub use braking::{BrakeZone, trail_braking_ratio};
pub use rating::{
    CornerAdvice, CornerContext, CornerGrade, CornerRater, CornerRating, default_rules,
    rate_corner,
};
pub use segmenter::{Segment, SegmentState, Segmenter};

use crate::telemetry::{Position, TelemetrySample, cumulative_distance_m, sorted_by_time};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CornerDetectionConfig {
    /// Absolute steering angle in degrees above which the car is cornering
    pub steering_threshold_deg: f64,
    /// Brake pressure marking the brake point ahead of a corner
    pub brake_point_threshold: f64,
    /// How many samples before corner entry to search for the brake point
    pub brake_point_lookback: usize,
    pub brake_zone_threshold: f64,
    /// Steering angle in degrees counted as turn-in for trail braking
    pub turn_in_threshold_deg: f64,
}

impl Default for CornerDetectionConfig {
    fn default() -> Self {
        Self {
            steering_threshold_deg: 30.,
            brake_point_threshold: 0.5,
            brake_point_lookback: 20,
            brake_zone_threshold: 0.2,
            turn_in_threshold_deg: 10.,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Corner {
    pub entry_index: usize,
    /// Sample with the least steering lock inside the corner
    pub apex_index: usize,
    pub exit_index: usize,
    pub entry_speed_kph: f64,
    pub apex_speed_kph: f64,
    pub exit_speed_kph: f64,
    /// Lowest speed anywhere in the corner, not necessarily at the apex
    pub min_speed_kph: f64,
    pub speed_delta_kph: f64,
    pub entry_brake: f64,
    pub entry_throttle: f64,
    pub apex_throttle: f64,
    pub exit_throttle: f64,
    pub entry_position: Position,
    pub apex_position: Position,
    pub exit_position: Position,
    pub brake_point_index: Option<usize>,
    /// Distance from the brake point to corner entry
    pub brake_point_distance_m: Option<f64>,
    pub duration_s: f64,
    /// Mean absolute throttle change per sample through the corner, 0 is perfectly smooth
    pub throttle_smoothness: f64,
    pub max_steering_deg: f64,
}

pub struct CornerDetector {
    config: CornerDetectionConfig,
}

impl CornerDetector {
    pub fn new() -> Self {
        Self::with_config(CornerDetectionConfig::default())
    }

    pub fn with_config(config: CornerDetectionConfig) -> Self {
        Self { config }
    }

    pub fn detect_corners(&self, samples: &[TelemetrySample]) -> Vec<Corner> {
        if samples.len() < 2 {
            return Vec::new();
        }
        let samples = sorted_by_time(samples);
        let distances = cumulative_distance_m(&samples);

        segmenter::segments(
            samples.iter().map(|s| s.steering_deg.abs()),
            self.config.steering_threshold_deg,
        )
        .into_iter()
        .filter_map(|segment| {
            if segment.end <= segment.start {
                debug!(
                    "Dropping corner opened on the last sample ({})",
                    segment.start
                );
                return None;
            }
            Some(self.build_corner(&samples, &distances, segment))
        })
        .collect()
    }

    fn build_corner(
        &self,
        samples: &[TelemetrySample],
        distances: &[f64],
        Segment { start, end }: Segment,
    ) -> Corner {
        let apex_index = (start + 1..end)
            .min_by(|&a, &b| {
                samples[a]
                    .steering_deg
                    .abs()
                    .total_cmp(&samples[b].steering_deg.abs())
            })
            .unwrap_or(end);
        let (entry, apex, exit) = (&samples[start], &samples[apex_index], &samples[end]);
        let segment = &samples[start..=end];

        let brake_point_index = (start.saturating_sub(self.config.brake_point_lookback)..start)
            .rev()
            .find(|&i| samples[i].brake > self.config.brake_point_threshold);

        let throttle_smoothness = segment
            .iter()
            .tuple_windows()
            .map(|(a, b)| (b.throttle - a.throttle).abs())
            .sum::<f64>()
            / (segment.len() - 1) as f64;

        Corner {
            entry_index: start,
            apex_index,
            exit_index: end,
            entry_speed_kph: entry.speed_kph,
            apex_speed_kph: apex.speed_kph,
            exit_speed_kph: exit.speed_kph,
            min_speed_kph: segment
                .iter()
                .map(|s| s.speed_kph)
                .fold(f64::INFINITY, f64::min),
            speed_delta_kph: exit.speed_kph - entry.speed_kph,
            entry_brake: entry.brake,
            entry_throttle: entry.throttle,
            apex_throttle: apex.throttle,
            exit_throttle: exit.throttle,
            entry_position: entry.position,
            apex_position: apex.position,
            exit_position: exit.position,
            brake_point_index,
            brake_point_distance_m: brake_point_index.map(|i| distances[start] - distances[i]),
            duration_s: (exit.timestamp_ms - entry.timestamp_ms) as f64 / 1000.,
            throttle_smoothness,
            max_steering_deg: segment
                .iter()
                .map(|s| s.steering_deg.abs())
                .fold(0., f64::max),
        }
    }

    pub fn detect_brake_zones(&self, samples: &[TelemetrySample]) -> Vec<BrakeZone> {
        braking::brake_zones(samples, &self.config)
    }
}

impl Default for CornerDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Split one lap into corners using the default thresholds.
pub fn detect_corners(samples: &[TelemetrySample]) -> Vec<Corner> {
    CornerDetector::new().detect_corners(samples)
}

/// Find the lap's brake zones using the default thresholds.
pub fn detect_brake_zones(samples: &[TelemetrySample]) -> Vec<BrakeZone> {
    CornerDetector::new().detect_brake_zones(samples)
}
