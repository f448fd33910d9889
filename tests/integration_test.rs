// Integration tests for the analysis engine
//
// Each scenario builds a synthetic session and runs it through the public
// entry points the way a reporting layer would.

use racecraft::{
    CompoundKind, CornerGrade, CornerRating, InsightCategory, Lap, LapsRemaining, Severity,
    TelemetrySample, TireCompound, Wheel, WheelSet, analyze_fuel_strategy, analyze_tires,
    compare_laps, detect_brake_zones, detect_corners, fuel::FuelMap, generate_insights,
    rate_corner, tires::TireAdvice,
};

/// Ten samples per lap, one second apart.
fn session_samples(
    laps: u32,
    mut sample: impl FnMut(u32, u64) -> TelemetrySample,
) -> Vec<TelemetrySample> {
    (1..=laps)
        .flat_map(|lap| (0..10u64).map(move |i| (lap, i)))
        .map(|(lap, i)| TelemetrySample {
            timestamp_ms: (lap as u64 - 1) * 10_000 + i * 1000,
            lap_number: lap,
            ..sample(lap, i)
        })
        .collect()
}

fn valid_lap(lap_number: u32, lap_time_s: f64) -> Lap {
    Lap {
        lap_number,
        lap_time_s,
        is_valid: true,
        ..Default::default()
    }
}

#[test]
fn test_front_left_wearing_fastest_is_critical() {
    let samples = session_samples(5, |lap, _| {
        let laps_done = (lap - 1) as f64;
        TelemetrySample {
            speed_kph: 150.,
            tire_wear: WheelSet {
                front_left: 1. - 0.1 * laps_done,
                front_right: 1. - 0.025 * laps_done,
                rear_left: 1. - 0.025 * laps_done,
                rear_right: 1. - 0.025 * laps_done,
            },
            tire_temp_c: WheelSet::splat(95.),
            tire_pressure_bar: WheelSet::splat(2.),
            ..Default::default()
        }
    });
    let result = analyze_tires(
        &samples,
        30,
        5,
        &TireCompound::builtin(CompoundKind::Medium),
    );

    assert_eq!(result.critical_wheel, Wheel::FrontLeft);
    let front_left = result.wheels.get(Wheel::FrontLeft);
    let front_right = result.wheels.get(Wheel::FrontRight);
    assert!((front_left.wear - 0.6).abs() < 1e-9);
    assert!(front_left.wear_rate > 3. * front_right.wear_rate);
    assert_eq!(front_left.estimated_laps_remaining, LapsRemaining::Finite(3));
    assert!(result.recommendations.iter().any(|r| matches!(
        r,
        TireAdvice::FrontRearImbalance { .. } | TireAdvice::LeftRightImbalance { .. }
    )));
}

#[test]
fn test_fuel_short_of_the_finish_needs_lean_map() {
    let samples = session_samples(10, |lap, i| {
        let lap_start = 100. - 6. * (lap - 1) as f64;
        TelemetrySample {
            speed_kph: 180.,
            // the last sample of each lap reads the lap end level
            fuel_pct: lap_start - 6. * i as f64 / 9.,
            ..Default::default()
        }
    });
    let result = analyze_fuel_strategy(&samples, 10, 30);

    assert!((result.stats.mean_per_lap - 6.).abs() < 1e-9);
    assert_eq!(result.current_fuel_pct, Some(40.));
    assert_eq!(result.estimated_laps_remaining, LapsRemaining::Finite(6));
    assert_eq!(result.laps_to_finish, 20);
    assert_eq!(result.fuel_map.map, FuelMap::Lean);
    assert_eq!(result.fuel_map.deficit_laps, Some(14));
    assert!(!result.pit_stops.is_empty());
}

#[test]
fn test_gentle_lap_has_no_corners() {
    let samples = session_samples(1, |_, i| TelemetrySample {
        speed_kph: 200.,
        steering_deg: (i as f64 * 3.).min(29.),
        ..Default::default()
    });
    assert!(detect_corners(&samples).is_empty());
}

#[test]
fn test_identical_lap_times_are_excellent_consistency() {
    let laps = vec![valid_lap(1, 92.5), valid_lap(2, 92.5), valid_lap(3, 92.5)];
    let insights = generate_insights(&[], &[], &laps, &[]);

    assert_eq!(racecraft::insights::consistency_score(&[92.5; 3]), Some(100.));
    let consistency = insights
        .iter()
        .filter(|i| i.category == InsightCategory::Consistency)
        .collect::<Vec<_>>();
    assert_eq!(consistency.len(), 1);
    assert_eq!(consistency[0].title, "Excellent consistency");
    assert_eq!(consistency[0].severity, Severity::Info);
}

#[test]
fn test_empty_input_defaults() {
    let tires = analyze_tires(&[], 20, 0, &TireCompound::default());
    assert!(tires.wheels.iter().all(|(_, w)| w.wear == 1.));
    assert!(tires.wheels.iter().all(|(_, w)| w.temp_c == 85.));
    assert!(tires.wheels.iter().all(|(_, w)| w.pressure_bar == 2.));
    assert!(!tires.recommendations.is_empty());

    let fuel = analyze_fuel_strategy(&[], 0, 20);
    assert_eq!(fuel.estimated_laps_remaining, LapsRemaining::Unbounded);
    assert!(fuel.pit_stops.is_empty());

    assert!(detect_corners(&[]).is_empty());
    assert!(detect_brake_zones(&[]).is_empty());
    assert!(compare_laps(&[], &[]).delta_trace.is_empty());
    assert!(generate_insights(&[], &[], &[], &[]).is_empty());
}

#[test]
fn test_analysis_is_deterministic() {
    let samples = session_samples(3, |lap, i| TelemetrySample {
        speed_kph: 120. + i as f64 * 5.,
        throttle: if i < 5 { 1. } else { 0.3 },
        brake: if i == 5 { 0.9 } else { 0. },
        steering_deg: if (5..8).contains(&i) { 50. } else { 0. },
        fuel_pct: 90. - lap as f64 * 2. - i as f64 * 0.1,
        tire_wear: WheelSet::splat(1. - lap as f64 * 0.03),
        tire_temp_c: WheelSet::splat(110.),
        tire_pressure_bar: WheelSet::splat(2.4),
        ..Default::default()
    });
    let compound = TireCompound::builtin(CompoundKind::Soft);
    assert_eq!(
        analyze_tires(&samples, 20, 3, &compound),
        analyze_tires(&samples, 20, 3, &compound)
    );
    assert_eq!(
        analyze_fuel_strategy(&samples, 3, 20),
        analyze_fuel_strategy(&samples, 3, 20)
    );
    let lap_one = &samples[..10];
    let lap_two = &samples[10..20];
    assert_eq!(detect_corners(lap_one), detect_corners(lap_one));
    assert_eq!(compare_laps(lap_one, lap_two), compare_laps(lap_one, lap_two));

    let ratings = detect_corners(lap_one).iter().map(rate_corner).collect::<Vec<_>>();
    let zones = detect_brake_zones(lap_one);
    let laps = vec![valid_lap(1, 9.), valid_lap(2, 9.5), valid_lap(3, 9.2)];
    assert_eq!(
        generate_insights(&ratings, &zones, &laps, lap_one),
        generate_insights(&ratings, &zones, &laps, lap_one)
    );
}

#[test]
fn test_insight_ranking_ignores_input_order() {
    let rating = |grade, time_loss_s| CornerRating {
        grade,
        score: 0.,
        entry_apex_ratio: 1.,
        exit_entry_ratio: 1.,
        throttle_smoothness: 0.,
        time_loss_s,
        suggestions: Vec::new(),
    };
    let ratings = vec![
        rating(CornerGrade::Poor, 0.25),
        rating(CornerGrade::Excellent, 0.),
        rating(CornerGrade::Bad, 0.5),
    ];
    let laps = vec![valid_lap(1, 90.), valid_lap(2, 90.), valid_lap(3, 90.)];
    let forward = generate_insights(&ratings, &[], &laps, &[]);

    let mut reversed = ratings.clone();
    reversed.reverse();
    let mut reversed_laps = laps.clone();
    reversed_laps.reverse();
    let backward = generate_insights(&reversed, &[], &reversed_laps, &[]);

    assert_eq!(forward, backward);
    assert!(
        forward
            .windows(2)
            .all(|w| w[0].potential_gain_s >= w[1].potential_gain_s)
    );
    // the zero gain consistency insight ranks after the corner loss
    assert_eq!(forward[0].category, InsightCategory::Cornering);
}
