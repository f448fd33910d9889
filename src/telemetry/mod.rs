pub mod loader;

use std::{borrow::Cow, fmt};

use itertools::Itertools;
use log::warn;
use serde::{Deserialize, Serialize};
use uom::si::{
    angle::{degree, radian},
    f64::{Angle, Length, Time, Velocity},
    length::meter,
    time::{millisecond, second},
    velocity::kilometer_per_hour,
};

use crate::{errors::RacecraftError, tires::CompoundKind};

/// Tire position on the car.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum Wheel {
    FrontLeft,
    FrontRight,
    RearLeft,
    RearRight,
}

impl Wheel {
    pub const ALL: [Wheel; 4] = [
        Wheel::FrontLeft,
        Wheel::FrontRight,
        Wheel::RearLeft,
        Wheel::RearRight,
    ];

    pub fn is_front(&self) -> bool {
        matches!(self, Wheel::FrontLeft | Wheel::FrontRight)
    }

    pub fn is_left(&self) -> bool {
        matches!(self, Wheel::FrontLeft | Wheel::RearLeft)
    }
}

impl fmt::Display for Wheel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Wheel::FrontLeft => write!(f, "Front Left"),
            Wheel::FrontRight => write!(f, "Front Right"),
            Wheel::RearLeft => write!(f, "Rear Left"),
            Wheel::RearRight => write!(f, "Rear Right"),
        }
    }
}

/// One value per wheel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WheelSet<T> {
    pub front_left: T,
    pub front_right: T,
    pub rear_left: T,
    pub rear_right: T,
}

impl<T> WheelSet<T> {
    pub fn from_fn(mut f: impl FnMut(Wheel) -> T) -> Self {
        Self {
            front_left: f(Wheel::FrontLeft),
            front_right: f(Wheel::FrontRight),
            rear_left: f(Wheel::RearLeft),
            rear_right: f(Wheel::RearRight),
        }
    }

    pub fn get(&self, wheel: Wheel) -> &T {
        match wheel {
            Wheel::FrontLeft => &self.front_left,
            Wheel::FrontRight => &self.front_right,
            Wheel::RearLeft => &self.rear_left,
            Wheel::RearRight => &self.rear_right,
        }
    }

    pub fn map<U>(&self, mut f: impl FnMut(Wheel, &T) -> U) -> WheelSet<U> {
        WheelSet::from_fn(|wheel| f(wheel, self.get(wheel)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Wheel, &T)> {
        Wheel::ALL.into_iter().map(move |wheel| (wheel, self.get(wheel)))
    }
}

impl<T: Copy> WheelSet<T> {
    pub fn splat(value: T) -> Self {
        Self::from_fn(|_| value)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn distance_to(&self, other: &Position) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2) + (self.z - other.z).powi(2))
            .sqrt()
    }
}

/// A normalized telemetry observation.
///
/// Every signal has exactly one unit once it lives in a `TelemetrySample`:
/// pedals are fractions in `0.0..=1.0`, steering is in degrees, speed in km/h,
/// fuel in percent of the tank, tire wear a fraction where 1.0 is a new tire,
/// tire temperature in Celsius and tire pressure in bar.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Milliseconds since the start of the session
    pub timestamp_ms: u64,
    pub lap_number: u32,
    /// World position in meters
    pub position: Position,
    pub speed_kph: f64,
    pub throttle: f64,
    pub brake: f64,
    pub clutch: f64,
    /// Steering wheel angle in degrees, negative to the left
    pub steering_deg: f64,
    pub gear: i8,
    pub engine_rpm: f64,
    /// Fuel level, 0-100% of tank capacity
    pub fuel_pct: f64,
    pub tire_wear: WheelSet<f64>,
    pub tire_temp_c: WheelSet<f64>,
    pub tire_pressure_bar: WheelSet<f64>,
}

/// Scale of pedal inputs as delivered by the telemetry source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PedalScale {
    #[default]
    Unit,
    Percent,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SteeringUnit {
    #[default]
    Degrees,
    Radians,
}

/// Describes how a telemetry source encodes the signals that vary between games.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputScale {
    pub pedals: PedalScale,
    pub steering: SteeringUnit,
}

/// A sample as decoded from a telemetry source, before normalization.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub timestamp_ms: u64,
    pub lap_number: u32,
    pub position: Position,
    pub speed_kph: f64,
    pub throttle: f64,
    pub brake: f64,
    #[serde(default)]
    pub clutch: f64,
    pub steering: f64,
    #[serde(default)]
    pub gear: i8,
    #[serde(default)]
    pub engine_rpm: f64,
    pub fuel_pct: f64,
    pub tire_wear: WheelSet<f64>,
    pub tire_temp_c: WheelSet<f64>,
    pub tire_pressure_bar: WheelSet<f64>,
}

impl RawSample {
    /// Convert the sample to the normalized units used by every analyzer.
    ///
    /// Ranged signals are clamped into their domain. Non-finite values cannot
    /// be corrected and are rejected.
    pub fn normalize(self, scale: &InputScale) -> Result<TelemetrySample, RacecraftError> {
        let timestamp_ms = self.timestamp_ms;
        let finite = |field: &str, value: f64| -> Result<f64, RacecraftError> {
            if value.is_finite() {
                Ok(value)
            } else {
                Err(RacecraftError::InvalidSample {
                    timestamp_ms,
                    field: field.to_string(),
                    reason: format!("{value} is not a finite number"),
                })
            }
        };
        let pedal = |field: &str, value: f64| -> Result<f64, RacecraftError> {
            let value = finite(field, value)?;
            let value = match scale.pedals {
                PedalScale::Unit => value,
                PedalScale::Percent => value / 100.,
            };
            Ok(value.clamp(0., 1.))
        };
        let wheels = |field: &str, set: WheelSet<f64>| -> Result<WheelSet<f64>, RacecraftError> {
            for (wheel, value) in set.iter() {
                finite(&format!("{field} ({wheel})"), *value)?;
            }
            Ok(set)
        };

        let steering = finite("steering", self.steering)?;
        let steering_deg = match scale.steering {
            SteeringUnit::Degrees => steering,
            SteeringUnit::Radians => Angle::new::<radian>(steering).get::<degree>(),
        };

        Ok(TelemetrySample {
            timestamp_ms,
            lap_number: self.lap_number,
            position: Position {
                x: finite("position.x", self.position.x)?,
                y: finite("position.y", self.position.y)?,
                z: finite("position.z", self.position.z)?,
            },
            speed_kph: finite("speed", self.speed_kph)?.max(0.),
            throttle: pedal("throttle", self.throttle)?,
            brake: pedal("brake", self.brake)?,
            clutch: pedal("clutch", self.clutch)?,
            steering_deg,
            gear: self.gear,
            engine_rpm: finite("engine_rpm", self.engine_rpm)?.max(0.),
            fuel_pct: finite("fuel", self.fuel_pct)?.clamp(0., 100.),
            tire_wear: wheels("tire_wear", self.tire_wear)?.map(|_, w| w.clamp(0., 1.)),
            tire_temp_c: wheels("tire_temp", self.tire_temp_c)?,
            tire_pressure_bar: wheels("tire_pressure", self.tire_pressure_bar)?,
        })
    }
}

/// Projection of how many laps something will last.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LapsRemaining {
    Finite(u32),
    /// Nothing is being consumed, there is no limit to project
    Unbounded,
}

impl LapsRemaining {
    /// Floors a projected lap count, absorbing floating point noise so that a
    /// ratio like `0.3 / 0.1` counts as 3 laps.
    pub(crate) fn from_projection(laps: f64) -> Self {
        if laps.is_infinite() && laps > 0. {
            return LapsRemaining::Unbounded;
        }
        if !laps.is_finite() || laps <= 0. {
            return LapsRemaining::Finite(0);
        }
        LapsRemaining::Finite((laps + 1e-9).floor() as u32)
    }

    pub fn finite(&self) -> Option<u32> {
        match self {
            LapsRemaining::Finite(laps) => Some(*laps),
            LapsRemaining::Unbounded => None,
        }
    }
}

impl PartialOrd for LapsRemaining {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LapsRemaining {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        match (self, other) {
            (LapsRemaining::Finite(a), LapsRemaining::Finite(b)) => a.cmp(b),
            (LapsRemaining::Finite(_), LapsRemaining::Unbounded) => Ordering::Less,
            (LapsRemaining::Unbounded, LapsRemaining::Finite(_)) => Ordering::Greater,
            (LapsRemaining::Unbounded, LapsRemaining::Unbounded) => Ordering::Equal,
        }
    }
}

impl fmt::Display for LapsRemaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LapsRemaining::Finite(laps) => write!(f, "{laps}"),
            LapsRemaining::Unbounded => write!(f, "unlimited"),
        }
    }
}

/// Summary record of a completed lap.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Lap {
    pub lap_number: u32,
    pub lap_time_s: f64,
    #[serde(default)]
    pub sector_times_s: Vec<f64>,
    pub is_valid: bool,
    #[serde(default)]
    pub top_speed_kph: f64,
    #[serde(default)]
    pub avg_speed_kph: f64,
    #[serde(default)]
    pub fuel_remaining_pct: Option<f64>,
}

impl Lap {
    /// Build a lap summary from the lap's own samples.
    ///
    /// Sector times are not derivable from samples alone and are left empty.
    pub fn from_samples(lap_number: u32, samples: &[TelemetrySample]) -> Self {
        let samples = sorted_by_time(samples);
        let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
            return Lap {
                lap_number,
                is_valid: false,
                ..Default::default()
            };
        };
        let lap_time_s = (last.timestamp_ms - first.timestamp_ms) as f64 / 1000.;
        let top_speed_kph = samples.iter().map(|s| s.speed_kph).fold(0., f64::max);
        let distance_m = cumulative_distance_m(&samples).last().copied().unwrap_or(0.);
        let avg_speed_kph = average_speed_kph(distance_m, lap_time_s);

        Lap {
            lap_number,
            lap_time_s,
            sector_times_s: Vec::new(),
            is_valid: lap_time_s > 0.,
            top_speed_kph,
            avg_speed_kph,
            fuel_remaining_pct: Some(last.fuel_pct),
        }
    }
}

/// A recorded session: one track, car and tire compound.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Session {
    pub track_name: String,
    pub car_name: String,
    pub compound: CompoundKind,
    /// Planned race length in laps
    pub total_laps: u32,
    pub laps: Vec<Lap>,
    pub samples: Vec<TelemetrySample>,
}

impl Session {
    pub fn new(
        track_name: impl Into<String>,
        car_name: impl Into<String>,
        compound: CompoundKind,
        total_laps: u32,
        laps: Vec<Lap>,
        samples: Vec<TelemetrySample>,
    ) -> Result<Self, RacecraftError> {
        if let Some((prev, next)) = laps
            .iter()
            .tuple_windows()
            .find(|(prev, next)| next.lap_number < prev.lap_number)
        {
            return Err(RacecraftError::LapOrder {
                lap_number: next.lap_number,
                previous: prev.lap_number,
            });
        }
        Ok(Self {
            track_name: track_name.into(),
            car_name: car_name.into(),
            compound,
            total_laps,
            laps,
            samples,
        })
    }

    /// Samples belonging to one lap, ordered by time.
    pub fn lap_samples(&self, lap_number: u32) -> Vec<TelemetrySample> {
        let mut samples = self
            .samples
            .iter()
            .filter(|s| s.lap_number == lap_number)
            .cloned()
            .collect_vec();
        samples.sort_by_key(|s| s.timestamp_ms);
        samples
    }

    /// The lap currently being driven, taken from the most recent sample.
    pub fn current_lap(&self) -> u32 {
        self.samples
            .iter()
            .max_by_key(|s| s.timestamp_ms)
            .map(|s| s.lap_number)
            .or_else(|| self.laps.last().map(|l| l.lap_number))
            .unwrap_or(0)
    }
}

/// Returns the samples ordered by timestamp, borrowing when they already are.
pub fn sorted_by_time(samples: &[TelemetrySample]) -> Cow<'_, [TelemetrySample]> {
    if samples.is_sorted_by_key(|s| s.timestamp_ms) {
        Cow::Borrowed(samples)
    } else {
        warn!("Telemetry samples out of order, re-sorting by timestamp");
        let mut owned = samples.to_vec();
        owned.sort_by_key(|s| s.timestamp_ms);
        Cow::Owned(owned)
    }
}

/// Orders the samples by lap and time.
///
/// Use [`lap_slices`] on the result to walk the laps.
pub fn order_by_lap(samples: &[TelemetrySample]) -> Vec<TelemetrySample> {
    let mut ordered = samples.to_vec();
    ordered.sort_by_key(|s| (s.lap_number, s.timestamp_ms));
    ordered
}

/// One slice per lap of samples already ordered by [`order_by_lap`].
pub fn lap_slices(ordered: &[TelemetrySample]) -> impl Iterator<Item = &[TelemetrySample]> {
    ordered.chunk_by(|a, b| a.lap_number == b.lap_number)
}

/// Distance travelled at each sample, integrating speed over time with the
/// trapezoidal rule. The first sample is at 0 m.
pub fn cumulative_distance_m(samples: &[TelemetrySample]) -> Vec<f64> {
    let mut distances = Vec::with_capacity(samples.len());
    let mut total = Length::new::<meter>(0.);
    if !samples.is_empty() {
        distances.push(0.);
    }
    for (prev, next) in samples.iter().tuple_windows() {
        let elapsed = Time::new::<millisecond>(
            next.timestamp_ms.saturating_sub(prev.timestamp_ms) as f64,
        );
        let speed = Velocity::new::<kilometer_per_hour>((prev.speed_kph + next.speed_kph) / 2.);
        let step: Length = speed * elapsed;
        total += step;
        distances.push(total.get::<meter>());
    }
    distances
}

/// Average speed over a distance, 0 when no time has elapsed.
pub fn average_speed_kph(distance_m: f64, elapsed_s: f64) -> f64 {
    if elapsed_s <= 0. {
        return 0.;
    }
    let speed: Velocity = Length::new::<meter>(distance_m) / Time::new::<second>(elapsed_s);
    speed.get::<kilometer_per_hour>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(timestamp_ms: u64, lap_number: u32, speed_kph: f64) -> TelemetrySample {
        TelemetrySample {
            timestamp_ms,
            lap_number,
            speed_kph,
            ..Default::default()
        }
    }

    #[test]
    fn test_normalize_percent_pedals_and_radians() {
        let raw = RawSample {
            throttle: 80.,
            brake: 120.,
            steering: std::f64::consts::FRAC_PI_2,
            fuel_pct: 55.,
            tire_wear: WheelSet::splat(1.2),
            ..Default::default()
        };
        let scale = InputScale {
            pedals: PedalScale::Percent,
            steering: SteeringUnit::Radians,
        };
        let sample = raw.normalize(&scale).unwrap();
        assert!((sample.throttle - 0.8).abs() < 1e-9);
        assert_eq!(sample.brake, 1.);
        assert!((sample.steering_deg - 90.).abs() < 1e-9);
        assert_eq!(sample.tire_wear, WheelSet::splat(1.));
    }

    #[test]
    fn test_normalize_rejects_nan() {
        let raw = RawSample {
            timestamp_ms: 42,
            speed_kph: f64::NAN,
            ..Default::default()
        };
        let err = raw.normalize(&InputScale::default()).unwrap_err();
        assert!(matches!(
            err,
            RacecraftError::InvalidSample { timestamp_ms: 42, .. }
        ));
    }

    #[test]
    fn test_sorted_by_time_borrows_when_ordered() {
        let samples = vec![sample(0, 1, 0.), sample(10, 1, 0.)];
        assert!(matches!(sorted_by_time(&samples), Cow::Borrowed(_)));

        let unordered = vec![sample(10, 1, 0.), sample(0, 1, 0.)];
        let sorted = sorted_by_time(&unordered);
        assert_eq!(sorted[0].timestamp_ms, 0);
        assert_eq!(sorted[1].timestamp_ms, 10);
    }

    #[test]
    fn test_lap_slices() {
        let samples = vec![
            sample(30, 2, 0.),
            sample(0, 1, 0.),
            sample(20, 2, 0.),
            sample(10, 1, 0.),
        ];
        let ordered = order_by_lap(&samples);
        let laps = lap_slices(&ordered).collect_vec();
        assert_eq!(laps.len(), 2);
        assert_eq!(laps[0][0].timestamp_ms, 0);
        assert_eq!(laps[1][0].timestamp_ms, 20);
        assert!(laps.iter().all(|l| l.len() == 2));
    }

    #[test]
    fn test_cumulative_distance() {
        // 36 km/h is 10 m/s
        let samples = vec![sample(0, 1, 36.), sample(1000, 1, 36.), sample(3000, 1, 36.)];
        let distances = cumulative_distance_m(&samples);
        assert_eq!(distances.len(), 3);
        assert!((distances[1] - 10.).abs() < 1e-9);
        assert!((distances[2] - 30.).abs() < 1e-9);
        assert!(cumulative_distance_m(&[]).is_empty());
    }

    #[test]
    fn test_laps_remaining_projection() {
        assert_eq!(
            LapsRemaining::from_projection(0.3 / 0.1),
            LapsRemaining::Finite(3)
        );
        assert_eq!(
            LapsRemaining::from_projection(f64::INFINITY),
            LapsRemaining::Unbounded
        );
        assert_eq!(LapsRemaining::from_projection(-2.), LapsRemaining::Finite(0));
        assert!(LapsRemaining::Finite(100) < LapsRemaining::Unbounded);
    }

    #[test]
    fn test_session_rejects_decreasing_laps() {
        let laps = vec![
            Lap {
                lap_number: 2,
                ..Default::default()
            },
            Lap {
                lap_number: 1,
                ..Default::default()
            },
        ];
        let result = Session::new("Spa", "GT3", CompoundKind::Medium, 10, laps, vec![]);
        assert!(matches!(
            result,
            Err(RacecraftError::LapOrder {
                lap_number: 1,
                previous: 2
            })
        ));
    }

    #[test]
    fn test_lap_from_samples() {
        let mut samples = vec![sample(0, 3, 100.), sample(60_000, 3, 200.)];
        samples[1].fuel_pct = 40.;
        let lap = Lap::from_samples(3, &samples);
        assert_eq!(lap.lap_time_s, 60.);
        assert_eq!(lap.top_speed_kph, 200.);
        assert!((lap.avg_speed_kph - 150.).abs() < 1e-6);
        assert_eq!(lap.fuel_remaining_pct, Some(40.));
        assert!(!Lap::from_samples(1, &[]).is_valid);
    }
}
