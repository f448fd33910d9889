use itertools::Itertools;
use log::{debug, info};
use rayon::prelude::*;
use serde::Serialize;

use crate::{
    RacecraftError,
    comparison::{LapComparator, LapComparisonResult, theoretical_best_lap},
    config::AnalysisConfig,
    corners::{BrakeZone, Corner, CornerDetector, CornerRater, CornerRating, trail_braking_ratio},
    fuel::{FuelStrategyCalculator, FuelStrategyResult},
    insights::{Insight, InsightGenerator, consistency_score},
    telemetry::{Lap, Session},
    tires::{TireAnalyzer, TirePerformanceResult},
};

/// Corners and brake zones of one lap.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LapCornering {
    pub lap_number: u32,
    pub corners: Vec<Corner>,
    pub ratings: Vec<CornerRating>,
    pub brake_zones: Vec<BrakeZone>,
    pub trail_braking_ratio: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionReport {
    pub track_name: String,
    pub car_name: String,
    pub current_lap: u32,
    pub total_laps: u32,
    pub tires: TirePerformanceResult,
    pub fuel: FuelStrategyResult,
    pub laps: Vec<LapCornering>,
    /// Lap the insights were generated for
    pub focus_lap: Option<u32>,
    pub consistency_score: Option<f64>,
    pub theoretical_best_lap_s: Option<f64>,
    pub insights: Vec<Insight>,
}

/// Lap summaries of the session, derived from the samples when the session
/// carries none.
fn session_laps(session: &Session) -> Vec<Lap> {
    if !session.laps.is_empty() {
        return session.laps.clone();
    }
    debug!("Session has no lap records, deriving them from samples");
    session
        .samples
        .iter()
        .map(|s| s.lap_number)
        .sorted()
        .dedup()
        .map(|lap_number| Lap::from_samples(lap_number, &session.lap_samples(lap_number)))
        .collect()
}

fn analyze_lap(
    session: &Session,
    lap_number: u32,
    detector: &CornerDetector,
    rater: &CornerRater,
) -> LapCornering {
    let samples = session.lap_samples(lap_number);
    let corners = detector.detect_corners(&samples);
    let ratings = corners.iter().map(|c| rater.rate(c)).collect_vec();
    let brake_zones = detector.detect_brake_zones(&samples);
    LapCornering {
        lap_number,
        trail_braking_ratio: trail_braking_ratio(&brake_zones),
        corners,
        ratings,
        brake_zones,
    }
}

/// Run every analyzer over a session.
///
/// Tires, fuel and the per-lap corner analysis run concurrently. Insights
/// are generated for the fastest valid lap once they are all done.
pub fn analyze_session(session: &Session, config: &AnalysisConfig) -> SessionReport {
    let current_lap = session.current_lap();
    let laps = session_laps(session);
    let compound = config.compound(session.compound);
    info!(
        "Analyzing {} samples over {} laps at {}",
        session.samples.len(),
        laps.len(),
        session.track_name
    );

    let detector = CornerDetector::with_config(config.corners);
    let rater = CornerRater::new();
    let ((tires, fuel), cornering) = rayon::join(
        || {
            rayon::join(
                || {
                    TireAnalyzer::with_config(config.tires).analyze(
                        &session.samples,
                        session.total_laps,
                        current_lap,
                        &compound,
                    )
                },
                || {
                    FuelStrategyCalculator::with_config(config.fuel).analyze(
                        &session.samples,
                        current_lap,
                        session.total_laps,
                    )
                },
            )
        },
        || {
            laps.par_iter()
                .map(|lap| analyze_lap(session, lap.lap_number, &detector, &rater))
                .collect::<Vec<_>>()
        },
    );

    let focus = laps
        .iter()
        .filter(|l| l.is_valid)
        .min_by(|a, b| a.lap_time_s.total_cmp(&b.lap_time_s));
    let insights = match focus.and_then(|f| cornering.iter().find(|c| c.lap_number == f.lap_number))
    {
        Some(focus_lap) => InsightGenerator::new().generate(
            &focus_lap.ratings,
            &focus_lap.brake_zones,
            &laps,
            &session.lap_samples(focus_lap.lap_number),
        ),
        None => {
            debug!("No valid lap to focus insights on");
            InsightGenerator::new().generate(&[], &[], &laps, &[])
        }
    };

    let valid_times = laps
        .iter()
        .filter(|l| l.is_valid)
        .map(|l| l.lap_time_s)
        .collect_vec();

    SessionReport {
        track_name: session.track_name.clone(),
        car_name: session.car_name.clone(),
        current_lap,
        total_laps: session.total_laps,
        tires,
        fuel,
        focus_lap: focus.map(|l| l.lap_number),
        consistency_score: consistency_score(&valid_times),
        theoretical_best_lap_s: theoretical_best_lap(&laps),
        laps: cornering,
        insights,
    }
}

/// Compare two laps of a session, lap B being the reference.
pub fn compare_session_laps(
    session: &Session,
    lap_a: u32,
    lap_b: u32,
) -> Result<LapComparisonResult, RacecraftError> {
    let samples_a = session.lap_samples(lap_a);
    if samples_a.is_empty() {
        return Err(RacecraftError::LapNotFound { lap_number: lap_a });
    }
    let samples_b = session.lap_samples(lap_b);
    if samples_b.is_empty() {
        return Err(RacecraftError::LapNotFound { lap_number: lap_b });
    }
    Ok(LapComparator::new().compare(&samples_a, &samples_b))
}
