use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, arg};
use log::{info, warn};
use racecraft::{
    AnalysisConfig, RacecraftError, SessionReport, analyze_session,
    session::compare_session_laps,
    telemetry::loader::load_sessions,
    writer::write_reports,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    /// Analysis config file, defaults to the one in the user config directory
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze every session in a session file
    Analyze {
        #[arg(short, long)]
        input: PathBuf,

        /// Write the full reports as JSON lines
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Compare two laps of a session, the second lap is the reference
    Compare {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long, default_value_t = 0)]
        session: usize,

        lap_a: u32,
        lap_b: u32,
    },
    /// Save the default analysis config to the user config directory
    InitConfig,
}

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig, RacecraftError> {
    match path {
        Some(path) => AnalysisConfig::from_path(path),
        None => match AnalysisConfig::from_local_file() {
            Ok(config) => Ok(config.unwrap_or_default()),
            Err(RacecraftError::NoConfigDir) => {
                warn!("No config directory on this platform, using defaults");
                Ok(AnalysisConfig::default())
            }
            Err(e) => Err(e),
        },
    }
}

fn print_report(report: &SessionReport) {
    println!(
        "{} / {} - lap {} of {}",
        report.track_name, report.car_name, report.current_lap, report.total_laps
    );

    let tires = &report.tires;
    println!(
        "Tires ({}): critical {} with {} laps left, pit laps {}-{} (recommended {})",
        tires.compound,
        tires.critical_wheel,
        tires.wheels.get(tires.critical_wheel).estimated_laps_remaining,
        tires.pit_window.earliest_lap,
        tires.pit_window.latest_lap,
        tires.pit_window.recommended_lap
    );
    for advice in &tires.recommendations {
        println!("  - {advice}");
    }

    let fuel = &report.fuel;
    println!(
        "Fuel: {:.2}%/lap, {} laps left, map {} ({} stops planned)",
        fuel.stats.mean_per_lap,
        fuel.estimated_laps_remaining,
        fuel.fuel_map.map,
        fuel.pit_stops.len()
    );
    for advice in &fuel.recommendations {
        println!("  - {advice}");
    }

    if let Some(score) = report.consistency_score {
        println!("Consistency: {score:.1}");
    }
    if let Some(best) = report.theoretical_best_lap_s {
        println!("Theoretical best: {best:.3}s");
    }

    if report.insights.is_empty() {
        println!("No critical issues found");
    }
    for insight in &report.insights {
        println!(
            "[{}] {} ({}): {} ~{:.2}s",
            insight.severity,
            insight.title,
            insight.category,
            insight.improvement,
            insight.potential_gain_s
        );
    }
}

fn analyze(
    input: &Path,
    output: Option<&Path>,
    config: &AnalysisConfig,
) -> Result<(), RacecraftError> {
    let sessions = load_sessions(input, &config.input_scale)?;
    let reports = sessions
        .iter()
        .map(|session| analyze_session(session, config))
        .collect::<Vec<_>>();
    for report in &reports {
        print_report(report);
    }
    if let Some(output) = output {
        write_reports(output, &reports)?;
        info!("Reports written to {}", output.display());
    }
    Ok(())
}

fn compare(
    input: &Path,
    session: usize,
    lap_a: u32,
    lap_b: u32,
    config: &AnalysisConfig,
) -> Result<(), RacecraftError> {
    let sessions = load_sessions(input, &config.input_scale)?;
    let session = sessions
        .get(session)
        .ok_or_else(|| RacecraftError::InvalidTelemetryFile {
            path: format!("{} has no session {session}", input.display()),
        })?;
    let comparison = compare_session_laps(session, lap_a, lap_b)?;
    println!(
        "Lap {lap_a} vs lap {lap_b}: {:+.3}s",
        comparison.time_difference_s
    );
    for sector in &comparison.sector_deltas {
        println!("  Sector {}: {:+.3}s", sector.sector + 1, sector.delta_s);
    }
    for advice in &comparison.recommendations {
        println!("  - {advice}");
    }
    Ok(())
}

fn run(cli: &Args) -> Result<(), RacecraftError> {
    if let Commands::InitConfig = cli.command {
        AnalysisConfig::default().save()?;
        if let Some(path) = AnalysisConfig::default_path() {
            println!("Config saved to {}", path.display());
        }
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    match &cli.command {
        Commands::Analyze { input, output } => analyze(input, output.as_deref(), &config),
        Commands::Compare {
            input,
            session,
            lap_a,
            lap_b,
        } => compare(input, *session, *lap_a, *lap_b, &config),
        Commands::InitConfig => Ok(()),
    }
}

fn main() {
    #[cfg(debug_assertions)]
    colog::init();

    let cli = Args::parse();
    if let Err(e) = run(&cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
