//! temp-lag-model - select a lagged-temperature energy model and forecast with it
//!
//! Reads a training file, a forecast input file and a holiday file, searches
//! the lag × window grid for the best quadratic model and writes the daily
//! forecast next to the forecast input.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use temp_lag_model::io::{
    naics_working_days, output_path, parse_workday_end, parse_working_days, read_forecast_file,
    read_holiday_file, read_supp_file, read_training_file, write_forecast_file, ForecastReport,
};
use temp_lag_model::{
    find_best_model, forecast, CalendarPolicy, ModelError, SearchOptions, TrainingSeason,
};

#[derive(Parser, Debug)]
#[command(name = "temp-lag-model")]
#[command(author, version, about = "Lagged outdoor temperature energy model")]
#[command(
    long_about = "Finds the lag and window size whose average outdoor temperature best predicts\n\
    daily energy use (quadratic fit, highest R²), then forecasts daily energy for a new\n\
    temperature series.\n\
    \nThe forecast is written next to the forecast input as YYYY.MM.DD.<forecast file name>.\n\
    \nExamples:\n  \
    temp-lag-model MAIN_b7.csv PRED_b7.csv HOL_us.csv\n  \
    temp-lag-model MAIN_b7.csv PRED_b7.csv HOL_us.csv --working-week 234567 --workday-end 1730\n  \
    temp-lag-model MAIN_b7.csv PRED_b7.csv HOL_us.csv --supp SUPP_b7.csv --parallel"
)]
struct Cli {
    /// Training file (header + interval temperature and energy readings)
    training: PathBuf,

    /// Forecast input file (header + interval temperature readings)
    forecast: PathBuf,

    /// Holiday file (one date per line after a DATE line)
    holidays: PathBuf,

    /// Supplementary settings file (fixed lag, window range, non-working days)
    #[arg(long)]
    supp: Option<PathBuf>,

    /// Output debug messages
    #[arg(short, long)]
    debug: bool,

    /// Working weekdays as digits, 1 = Sunday ... 7 = Saturday (e.g. 23456)
    #[arg(long, value_name = "DIGITS")]
    working_week: Option<String>,

    /// End of the working day, HH:MM or HHMM
    #[arg(long, value_name = "TIME")]
    workday_end: Option<String>,

    /// First day of the training season, MMDD
    #[arg(long, value_name = "MMDD")]
    training_start: Option<String>,

    /// Last day of the training season, MMDD
    #[arg(long, value_name = "MMDD")]
    training_end: Option<String>,

    /// Energy readings at or below this value are treated as "plant off"
    #[arg(long, value_name = "F")]
    threshold: Option<f64>,

    /// Evaluate grid points in parallel
    #[arg(long)]
    parallel: bool,

    /// Also write the selected model as JSON
    #[arg(long, value_name = "FILE")]
    model_json: Option<PathBuf>,

    /// Output path (default: YYYY.MM.DD.<forecast name> beside the forecast file)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn check_file_exists(path: &Path, kind: &str) -> Result<()> {
    if !path.is_file() {
        bail!("{} does not exist [{}]", kind, path.display());
    }
    Ok(())
}

fn check_inputs(cli: &Cli) -> Result<()> {
    check_file_exists(&cli.training, "Training file")?;
    check_file_exists(&cli.forecast, "Forecast file")?;
    check_file_exists(&cli.holidays, "Holiday file")?;
    if let Some(supp) = &cli.supp {
        check_file_exists(supp, "Supplementary file")?;
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<()> {
    info!("Training file: [{}]", cli.training.display());
    info!("Forecast file: [{}]", cli.forecast.display());
    info!("Holiday  file: [{}]", cli.holidays.display());

    let supp = cli
        .supp
        .as_deref()
        .map(read_supp_file)
        .transpose()
        .context("Failed to read supplementary file")?;

    let mut season = supp.as_ref().map(|s| s.season).unwrap_or_default();
    if let Some(start) = &cli.training_start {
        season.start_mmdd = TrainingSeason::parse_mmdd(start).context("Invalid --training-start")?;
    }
    if let Some(end) = &cli.training_end {
        season.end_mmdd = TrainingSeason::parse_mmdd(end).context("Invalid --training-end")?;
    }

    let holidays = match read_holiday_file(&cli.holidays) {
        Ok(days) => days,
        Err(e) => {
            warn!(
                "Holiday file [{}] has not been read correctly, continuing anyway: {}",
                cli.holidays.display(),
                e
            );
            Default::default()
        }
    };

    let energy_field = supp.as_ref().map(|s| s.energy_to_model.as_str());
    let training = read_training_file(&cli.training, &season, energy_field)
        .with_context(|| format!("Failed to read training file [{}]", cli.training.display()))?;

    let mut policy = CalendarPolicy::default()
        .with_working_weekdays(naics_working_days(training.naics.as_deref()));
    let mut opts = SearchOptions {
        parallel: cli.parallel,
        ..SearchOptions::default()
    };
    if let Some(supp) = &supp {
        if supp.building_id != training.building_id {
            warn!(
                "Supplementary file is for [{}], training file for [{}]",
                supp.building_id, training.building_id
            );
        }
        policy = supp.apply_to(policy);
        opts = supp.search_options(cli.parallel);
    }
    if let Some(days) = &cli.working_week {
        let days = parse_working_days(days).context("Invalid --working-week")?;
        policy = policy.with_working_weekdays(days);
    }
    if let Some(end) = &cli.workday_end {
        let end = parse_workday_end(end).context("Invalid --workday-end")?;
        policy = policy.with_working_day_end(end);
    }
    if let Some(threshold) = cli.threshold {
        policy = policy.with_energy_threshold(threshold);
    }
    policy = policy.with_non_working_days(holidays);

    let best = match find_best_model(&training.temperatures, &training.energy, &policy, &opts) {
        Ok(best) => best,
        Err(ModelError::EmptyGridResult) => {
            bail!(
                "No usable model for [{}]: every lag/window combination scored R² = 0, \
                 no forecast written",
                training.building_id
            );
        }
        Err(e) => return Err(e).context("Model search failed"),
    };
    if best.is_weak() {
        warn!(
            "Best model RSQ [{:.4}] is low, the forecast is unlikely to be accurate",
            best.r_squared
        );
    }

    if let Some(path) = &cli.model_json {
        let json = serde_json::to_string_pretty(&best).context("Failed to serialize model")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write model JSON [{}]", path.display()))?;
        info!("Model written to [{}]", path.display());
    }

    let input = read_forecast_file(&cli.forecast)
        .with_context(|| format!("Failed to read forecast file [{}]", cli.forecast.display()))?;
    let predicted =
        forecast(&best, &input.temperatures, &policy).context("Forecast failed")?;

    let now = chrono::Local::now().naive_local();
    let out_path = cli
        .output
        .clone()
        .unwrap_or_else(|| output_path(&cli.forecast, now.date()));
    let report = ForecastReport {
        model: &best,
        energy_field: &training.energy_field,
        input: &input,
        predicted: &predicted,
        generated_at: now,
    };
    write_forecast_file(&out_path, &report)
        .with_context(|| format!("Failed to write forecast [{}]", out_path.display()))?;
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);
    info!("Program starting");

    if let Err(e) = check_inputs(&cli) {
        error!("{:#} - program ending", e);
        return ExitCode::from(2);
    }

    let code = match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    };
    info!("Program ending");
    code
}
