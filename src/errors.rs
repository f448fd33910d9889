// Error types for racecraft

use snafu::Snafu;
use std::io;

/// Errors surfaced to callers of racecraft.
///
/// Analysis functions never fail on missing or degenerate data, they return
/// neutral results instead. These errors cover ingestion, configuration and
/// file handling, where the caller has to act on the problem.
#[derive(Debug, Snafu)]
pub enum RacecraftError {
    // Ingestion errors
    #[snafu(display("Invalid telemetry sample at {timestamp_ms}ms: {field} - {reason}"))]
    InvalidSample {
        timestamp_ms: u64,
        field: String,
        reason: String,
    },
    #[snafu(display("Lap {lap_number} appears after lap {previous} in the session"))]
    LapOrder { lap_number: u32, previous: u32 },
    #[snafu(display("Invalid grip curve: {reason}"))]
    InvalidGripCurve { reason: String },
    #[snafu(display("Lap {lap_number} not found in session"))]
    LapNotFound { lap_number: u32 },

    // Config management errors
    #[snafu(display("Could not find application config directory"))]
    NoConfigDir,
    #[snafu(display("Error reading or writing config file"))]
    ConfigIOError { source: io::Error },
    #[snafu(display("Error (de)serializing config file"))]
    ConfigSerializeError { source: serde_json::Error },
    #[snafu(display("Invalid config value {field}: {reason}"))]
    InvalidConfig { field: String, reason: String },

    // Telemetry file errors
    #[snafu(display("Invalid telemetry file: {path}"))]
    InvalidTelemetryFile { path: String },
    #[snafu(display("Error loading telemetry file"))]
    TelemetryLoaderError { source: io::Error },

    // Report writer errors
    #[snafu(display("Error writing analysis report"))]
    WriterError { source: io::Error },
    #[snafu(display("Error serializing analysis report"))]
    ReportSerializeError { source: serde_json::Error },
}
