//! Session files: JSON lines of tagged records.
//!
//! A file holds one or more sessions. Each session starts with a
//! `SessionStart` record followed by any number of `Lap` and `Sample`
//! records in recording order.

use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::{InputScale, Lap, RawSample, Session, TelemetrySample};
use crate::{errors::RacecraftError, tires::CompoundKind};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionHeader {
    pub track_name: String,
    pub car_name: String,
    #[serde(default)]
    pub compound: CompoundKind,
    pub total_laps: u32,
    /// Encoding of the samples that follow, the loader's default when absent
    #[serde(default)]
    pub input_scale: Option<InputScale>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SessionRecord {
    SessionStart(SessionHeader),
    Lap(Lap),
    Sample(Box<RawSample>),
}

impl From<&TelemetrySample> for RawSample {
    fn from(sample: &TelemetrySample) -> Self {
        RawSample {
            timestamp_ms: sample.timestamp_ms,
            lap_number: sample.lap_number,
            position: sample.position,
            speed_kph: sample.speed_kph,
            throttle: sample.throttle,
            brake: sample.brake,
            clutch: sample.clutch,
            steering: sample.steering_deg,
            gear: sample.gear,
            engine_rpm: sample.engine_rpm,
            fuel_pct: sample.fuel_pct,
            tire_wear: sample.tire_wear,
            tire_temp_c: sample.tire_temp_c,
            tire_pressure_bar: sample.tire_pressure_bar,
        }
    }
}

/// Records describing a session, samples written in normalized units.
pub fn session_records(session: &Session) -> Vec<SessionRecord> {
    let header = SessionHeader {
        track_name: session.track_name.clone(),
        car_name: session.car_name.clone(),
        compound: session.compound,
        total_laps: session.total_laps,
        input_scale: Some(InputScale::default()),
    };
    std::iter::once(SessionRecord::SessionStart(header))
        .chain(session.laps.iter().cloned().map(SessionRecord::Lap))
        .chain(
            session
                .samples
                .iter()
                .map(|s| SessionRecord::Sample(Box::new(RawSample::from(s)))),
        )
        .collect()
}

#[derive(Default)]
struct SessionBuilder {
    header: SessionHeader,
    laps: Vec<Lap>,
    samples: Vec<TelemetrySample>,
}

impl SessionBuilder {
    fn build(self) -> Result<Session, RacecraftError> {
        Session::new(
            self.header.track_name,
            self.header.car_name,
            self.header.compound,
            self.header.total_laps,
            self.laps,
            self.samples,
        )
    }
}

/// Turn a stream of records into sessions, normalizing every sample.
pub fn sessions_from_records(
    records: impl IntoIterator<Item = SessionRecord>,
    default_scale: &InputScale,
) -> Result<Vec<Session>, RacecraftError> {
    let mut sessions = Vec::new();
    let mut current: Option<SessionBuilder> = None;
    for record in records {
        match record {
            SessionRecord::SessionStart(header) => {
                if let Some(builder) = current.take() {
                    sessions.push(builder.build()?);
                }
                current = Some(SessionBuilder {
                    header,
                    ..Default::default()
                });
            }
            SessionRecord::Lap(lap) => {
                current
                    .get_or_insert_with(headless_session)
                    .laps
                    .push(lap);
            }
            SessionRecord::Sample(raw) => {
                let builder = current.get_or_insert_with(headless_session);
                let scale = builder.header.input_scale.unwrap_or(*default_scale);
                builder.samples.push(raw.normalize(&scale)?);
            }
        }
    }
    if let Some(builder) = current {
        sessions.push(builder.build()?);
    }
    Ok(sessions)
}

fn headless_session() -> SessionBuilder {
    warn!("Telemetry records before any session start, using an unnamed session");
    SessionBuilder::default()
}

/// Load every session in a JSON lines session file.
pub fn load_sessions(
    source_file: &Path,
    default_scale: &InputScale,
) -> Result<Vec<Session>, RacecraftError> {
    if !source_file.exists() {
        return Err(RacecraftError::InvalidTelemetryFile {
            path: format!("{}", source_file.display()),
        });
    }
    let records = serde_jsonlines::json_lines(source_file)
        .map_err(|e| RacecraftError::TelemetryLoaderError { source: e })?
        .collect::<Result<Vec<SessionRecord>, std::io::Error>>()
        .map_err(|e| RacecraftError::TelemetryLoaderError { source: e })?;

    let sessions = sessions_from_records(records, default_scale)?;
    let sessions = sessions
        .into_iter()
        .filter(|s| {
            let keep = !s.samples.is_empty() || !s.laps.is_empty();
            if !keep {
                info!("Skipping empty session at {}", s.track_name);
            }
            keep
        })
        .collect::<Vec<_>>();
    info!(
        "Loaded {}, found {} sessions with a total of {} samples",
        source_file.display(),
        sessions.len(),
        sessions.iter().map(|s| s.samples.len()).sum::<usize>()
    );
    Ok(sessions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{PedalScale, SteeringUnit};

    fn raw(lap_number: u32, timestamp_ms: u64, throttle: f64) -> SessionRecord {
        SessionRecord::Sample(Box::new(RawSample {
            timestamp_ms,
            lap_number,
            throttle,
            fuel_pct: 50.,
            ..Default::default()
        }))
    }

    fn header(track: &str, input_scale: Option<InputScale>) -> SessionRecord {
        SessionRecord::SessionStart(SessionHeader {
            track_name: track.to_string(),
            total_laps: 10,
            input_scale,
            ..Default::default()
        })
    }

    #[test]
    fn test_records_split_into_sessions() {
        let records = vec![
            header("Spa", None),
            raw(1, 0, 0.5),
            raw(1, 100, 0.6),
            header("Imola", None),
            SessionRecord::Lap(Lap {
                lap_number: 1,
                lap_time_s: 80.,
                is_valid: true,
                ..Default::default()
            }),
            raw(1, 0, 0.7),
        ];
        let sessions = sessions_from_records(records, &InputScale::default()).unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].track_name, "Spa");
        assert_eq!(sessions[0].samples.len(), 2);
        assert_eq!(sessions[1].laps.len(), 1);
        assert_eq!(sessions[1].samples[0].throttle, 0.7);
    }

    #[test]
    fn test_header_scale_overrides_default() {
        let percent = InputScale {
            pedals: PedalScale::Percent,
            steering: SteeringUnit::Degrees,
        };
        let records = vec![header("Spa", Some(percent)), raw(1, 0, 80.)];
        let sessions = sessions_from_records(records, &InputScale::default()).unwrap();
        assert_eq!(sessions[0].samples[0].throttle, 0.8);

        let records = vec![header("Spa", None), raw(1, 0, 80.)];
        let sessions = sessions_from_records(records, &percent).unwrap();
        assert_eq!(sessions[0].samples[0].throttle, 0.8);
    }

    #[test]
    fn test_laps_out_of_order_rejected() {
        let lap = |lap_number| {
            SessionRecord::Lap(Lap {
                lap_number,
                ..Default::default()
            })
        };
        let records = vec![header("Spa", None), lap(2), lap(1)];
        assert!(matches!(
            sessions_from_records(records, &InputScale::default()),
            Err(RacecraftError::LapOrder {
                lap_number: 1,
                previous: 2
            })
        ));
    }

    #[test]
    fn test_invalid_sample_rejected() {
        let records = vec![header("Spa", None), raw(1, 0, f64::NAN)];
        assert!(matches!(
            sessions_from_records(records, &InputScale::default()),
            Err(RacecraftError::InvalidSample { .. })
        ));
    }

    #[test]
    fn test_headless_records() {
        let sessions =
            sessions_from_records(vec![raw(1, 0, 0.5)], &InputScale::default()).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].track_name, "");
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_sessions(Path::new("/does/not/exist.jsonl"), &InputScale::default()),
            Err(RacecraftError::InvalidTelemetryFile { .. })
        ));
    }
}
