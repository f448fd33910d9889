// End to end tests going through session files on disk

use std::io::Write;

use racecraft::{
    AnalysisConfig, CompoundKind, RacecraftError, Session, TelemetrySample, WheelSet,
    analyze_session,
    session::compare_session_laps,
    telemetry::{InputScale, loader::load_sessions},
    writer::{write_reports, write_sessions},
};
use tempfile::{NamedTempFile, tempdir};

fn race_session() -> Session {
    let samples = (1..=4u32)
        .flat_map(|lap| {
            (0..30u64).map(move |i| TelemetrySample {
                timestamp_ms: (lap as u64 - 1) * 30_000 + i * 1000,
                lap_number: lap,
                speed_kph: if (10..15).contains(&i) { 90. } else { 200. },
                throttle: if (8..15).contains(&i) { 0.2 } else { 1. },
                brake: if (8..10).contains(&i) { 0.9 } else { 0. },
                steering_deg: if (10..15).contains(&i) { 60. } else { 2. },
                fuel_pct: 70. - (lap - 1) as f64 * 4. - i as f64 * 0.1,
                tire_wear: WheelSet::splat(1. - (lap - 1) as f64 * 0.03),
                tire_temp_c: WheelSet::splat(92.),
                tire_pressure_bar: WheelSet::splat(2.),
                ..Default::default()
            })
        })
        .collect();
    Session::new("Spa", "GT3", CompoundKind::Medium, 25, Vec::new(), samples).unwrap()
}

#[test]
fn test_analyze_written_session() {
    let dir = tempdir().unwrap();
    let session_file = dir.path().join("spa.jsonl");
    write_sessions(&session_file, &[race_session()]).unwrap();

    let sessions = load_sessions(&session_file, &InputScale::default()).unwrap();
    assert_eq!(sessions.len(), 1);
    let report = analyze_session(&sessions[0], &AnalysisConfig::default());

    assert_eq!(report.track_name, "Spa");
    assert_eq!(report.current_lap, 4);
    assert_eq!(report.laps.len(), 4);
    assert!(report.laps.iter().all(|l| l.corners.len() == 1));
    assert!(report.laps.iter().all(|l| l.brake_zones.len() == 1));
    assert_eq!(report.fuel.laps.len(), 4);
    assert_eq!(report.consistency_score, Some(100.));

    let report_file = dir.path().join("report.jsonl");
    write_reports(&report_file, &[report]).unwrap();
    let written = std::fs::read_to_string(&report_file).unwrap();
    assert_eq!(written.lines().count(), 1);
    let json: serde_json::Value = serde_json::from_str(written.trim()).unwrap();
    assert_eq!(json["track_name"], "Spa");
}

#[test]
fn test_percent_pedals_and_radians_are_normalized() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"{{"SessionStart":{{"track_name":"Monza","car_name":"F4","total_laps":10,"input_scale":{{"pedals":"Percent","steering":"Radians"}}}}}}"#
    )
    .unwrap();
    writeln!(
        file,
        r#"{{"Sample":{{"timestamp_ms":0,"lap_number":1,"position":{{"x":0.0,"y":0.0,"z":0.0}},"speed_kph":100.0,"throttle":50.0,"brake":0.0,"steering":1.0,"fuel_pct":80.0,"tire_wear":{{"front_left":1.0,"front_right":1.0,"rear_left":1.0,"rear_right":1.0}},"tire_temp_c":{{"front_left":80.0,"front_right":80.0,"rear_left":80.0,"rear_right":80.0}},"tire_pressure_bar":{{"front_left":2.0,"front_right":2.0,"rear_left":2.0,"rear_right":2.0}}}}}}"#
    )
    .unwrap();
    file.flush().unwrap();

    let sessions = load_sessions(file.path(), &InputScale::default()).unwrap();
    let sample = &sessions[0].samples[0];
    assert_eq!(sessions[0].compound, CompoundKind::Medium);
    assert_eq!(sample.throttle, 0.5);
    assert!((sample.steering_deg - 57.29577951308232).abs() < 1e-9);
    assert_eq!(sessions[0].samples.len(), 1);
}

#[test]
fn test_malformed_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{{\"Unknown\": 1}}").unwrap();
    file.flush().unwrap();
    assert!(matches!(
        load_sessions(file.path(), &InputScale::default()),
        Err(RacecraftError::TelemetryLoaderError { .. })
    ));
}

#[test]
fn test_compare_laps_from_file() {
    let dir = tempdir().unwrap();
    let session_file = dir.path().join("spa.jsonl");
    write_sessions(&session_file, &[race_session()]).unwrap();
    let sessions = load_sessions(&session_file, &InputScale::default()).unwrap();

    let comparison = compare_session_laps(&sessions[0], 2, 1).unwrap();
    assert!(comparison.time_difference_s.abs() < 1e-9);
    assert_eq!(comparison.sector_deltas.len(), 3);
    assert!(matches!(
        compare_session_laps(&sessions[0], 2, 7),
        Err(RacecraftError::LapNotFound { lap_number: 7 })
    ));
}
