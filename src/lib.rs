// Library interface for racecraft
// The binary and integration tests go through these modules

pub mod comparison;
pub mod config;
pub mod corners;
pub mod errors;
pub mod fuel;
pub mod insights;
pub mod rules;
pub mod session;
pub mod telemetry;
pub mod tires;
pub mod writer;

// Re-export commonly used types
pub use comparison::{LapComparisonResult, compare_laps, theoretical_best_lap};
pub use config::AnalysisConfig;
pub use corners::{
    BrakeZone, Corner, CornerGrade, CornerRating, detect_brake_zones, detect_corners, rate_corner,
};
pub use errors::RacecraftError;
pub use fuel::{FuelStrategyResult, analyze_fuel_strategy};
pub use insights::{Insight, InsightCategory, Severity, generate_insights};
pub use session::{SessionReport, analyze_session};
pub use telemetry::{Lap, LapsRemaining, RawSample, Session, TelemetrySample, Wheel, WheelSet};
pub use tires::{CompoundKind, TireCompound, TirePerformanceResult, analyze_tires};
