use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::errors::RacecraftError;

/// Wear lost per lap by a compound with a wear multiplier of 1.0
const BASE_WEAR_PER_LAP: f64 = 0.025;

#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum CompoundKind {
    Soft,
    #[default]
    Medium,
    Hard,
    Rain,
}

impl fmt::Display for CompoundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompoundKind::Soft => write!(f, "Soft"),
            CompoundKind::Medium => write!(f, "Medium"),
            CompoundKind::Hard => write!(f, "Hard"),
            CompoundKind::Rain => write!(f, "Rain"),
        }
    }
}

/// Maps remaining tire wear (1.0 = new) to a grip multiplier.
///
/// The curve is piecewise linear between its points, flat outside them, and
/// never decreases as wear increases.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<(f64, f64)>", into = "Vec<(f64, f64)>")]
pub struct GripCurve {
    points: Vec<(f64, f64)>,
}

impl GripCurve {
    pub fn new(points: Vec<(f64, f64)>) -> Result<Self, RacecraftError> {
        if points.is_empty() {
            return Err(RacecraftError::InvalidGripCurve {
                reason: "a grip curve needs at least one point".to_string(),
            });
        }
        for &(wear, grip) in &points {
            if !(0.0..=1.0).contains(&wear) || !(0.0..=1.0).contains(&grip) {
                return Err(RacecraftError::InvalidGripCurve {
                    reason: format!("point ({wear}, {grip}) is outside [0, 1]"),
                });
            }
        }
        for (a, b) in points.iter().tuple_windows() {
            if b.0 <= a.0 {
                return Err(RacecraftError::InvalidGripCurve {
                    reason: format!("wear values must increase, {} follows {}", b.0, a.0),
                });
            }
            if b.1 < a.1 {
                return Err(RacecraftError::InvalidGripCurve {
                    reason: format!("grip must not drop as wear rises, at wear {}", b.0),
                });
            }
        }
        Ok(Self { points })
    }

    pub fn grip_at(&self, wear: f64) -> f64 {
        let wear = wear.clamp(0., 1.);
        let first = self.points[0];
        if wear <= first.0 {
            return first.1;
        }
        for (a, b) in self.points.iter().tuple_windows() {
            if wear <= b.0 {
                let t = (wear - a.0) / (b.0 - a.0);
                return a.1 + t * (b.1 - a.1);
            }
        }
        self.points[self.points.len() - 1].1
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }
}

impl TryFrom<Vec<(f64, f64)>> for GripCurve {
    type Error = RacecraftError;

    fn try_from(points: Vec<(f64, f64)>) -> Result<Self, Self::Error> {
        GripCurve::new(points)
    }
}

impl From<GripCurve> for Vec<(f64, f64)> {
    fn from(curve: GripCurve) -> Self {
        curve.points
    }
}

/// Static characteristics of a tire compound.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TireCompound {
    pub kind: CompoundKind,
    /// Optimal operating temperature range in Celsius
    pub optimal_temp_c: (f64, f64),
    /// Optimal pressure range in bar
    pub optimal_pressure_bar: (f64, f64),
    pub wear_multiplier: f64,
    pub grip_curve: GripCurve,
}

impl TireCompound {
    pub fn builtin(kind: CompoundKind) -> Self {
        // The curves are hand-checked against GripCurve::new's invariants.
        let curve = |points: &[(f64, f64)]| GripCurve {
            points: points.to_vec(),
        };
        match kind {
            CompoundKind::Soft => Self {
                kind,
                optimal_temp_c: (80., 100.),
                optimal_pressure_bar: (1.8, 2.1),
                wear_multiplier: 1.5,
                grip_curve: curve(&[(0., 0.55), (0.3, 0.75), (0.6, 0.92), (1., 1.)]),
            },
            CompoundKind::Medium => Self {
                kind,
                optimal_temp_c: (85., 105.),
                optimal_pressure_bar: (1.9, 2.2),
                wear_multiplier: 1.,
                grip_curve: curve(&[(0., 0.6), (0.3, 0.78), (0.6, 0.9), (1., 0.97)]),
            },
            CompoundKind::Hard => Self {
                kind,
                optimal_temp_c: (95., 115.),
                optimal_pressure_bar: (2.0, 2.3),
                wear_multiplier: 0.7,
                grip_curve: curve(&[(0., 0.65), (0.3, 0.8), (0.6, 0.88), (1., 0.93)]),
            },
            CompoundKind::Rain => Self {
                kind,
                optimal_temp_c: (50., 75.),
                optimal_pressure_bar: (1.7, 2.0),
                wear_multiplier: 1.2,
                grip_curve: curve(&[(0., 0.5), (0.5, 0.7), (1., 0.85)]),
            },
        }
    }

    /// Nominal number of laps from new down to `minimum_usable_wear`.
    pub fn expected_stint_laps(&self, minimum_usable_wear: f64) -> f64 {
        let per_lap = BASE_WEAR_PER_LAP * self.wear_multiplier;
        if per_lap <= 0. {
            return f64::INFINITY;
        }
        (1. - minimum_usable_wear).max(0.) / per_lap
    }

    /// 1.0 inside the optimal range, decaying linearly outside of it and
    /// never below 0.5.
    pub fn temperature_factor(&self, temp_c: f64) -> f64 {
        let (low, high) = self.optimal_temp_c;
        let factor = if temp_c < low {
            1. - (low - temp_c) / 30.
        } else if temp_c > high {
            1. - (temp_c - high) / 20.
        } else {
            1.
        };
        factor.clamp(0.5, 1.)
    }

    /// Grip level in [0, 1] for a wheel at the given wear and temperature.
    pub fn grip_level(&self, wear: f64, temp_c: f64) -> f64 {
        (self.grip_curve.grip_at(wear) * self.temperature_factor(temp_c)).clamp(0., 1.)
    }
}

impl Default for TireCompound {
    fn default() -> Self {
        Self::builtin(CompoundKind::default())
    }
}

impl From<CompoundKind> for TireCompound {
    fn from(kind: CompoundKind) -> Self {
        Self::builtin(kind)
    }
}
