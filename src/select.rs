use rayon::prelude::*;
use tracing::{debug, info};

use crate::aggregate::{average_hourly_energy, daily_total_energy, lagged_window_average};
use crate::ols::fit_quadratic;
use crate::types::{
    BestModel, CalendarPolicy, DailyAggregate, EnergyAggregation, IntervalSeries, ModelCandidate,
    ModelError, QuadraticFit, SearchOptions,
};

/// Daily energy aggregates, computed once per run (independent of lag/window).
struct EnergyTargets {
    daily_total: DailyAggregate,
    average_hourly: DailyAggregate,
}

impl EnergyTargets {
    fn new(energy: &IntervalSeries, policy: &CalendarPolicy) -> Self {
        Self {
            daily_total: daily_total_energy(energy, policy),
            average_hourly: average_hourly_energy(energy, policy),
        }
    }
}

/// A single `(lag, window)` combination with its position in iteration order.
#[derive(Clone, Copy, Debug, PartialEq)]
struct GridPoint {
    index: usize,
    lag_hours: f64,
    window_hours: u32,
}

/// Enumerate the grid: lag ascending (outer), window ascending (inner).
fn enumerate_grid(opts: &SearchOptions) -> Result<Vec<GridPoint>, ModelError> {
    let lags = opts.lags.values()?;
    let windows = opts.windows.values()?;
    let mut grid = Vec::with_capacity(lags.len() * windows.len());
    for &lag_hours in &lags {
        for &window_hours in &windows {
            grid.push(GridPoint {
                index: grid.len(),
                lag_hours,
                window_hours,
            });
        }
    }
    Ok(grid)
}

/// Turn a failed or non-finite fit into a zero score.
///
/// This is the only place regression failures are absorbed.
fn score(result: Result<QuadraticFit, ModelError>) -> QuadraticFit {
    match result {
        Ok(fit) if fit.r_squared.is_finite() => fit,
        Ok(_) => QuadraticFit::zero(),
        Err(err) => {
            debug!("Regression scored as zero: {}", err);
            QuadraticFit::zero()
        }
    }
}

/// Pick the better-scoring energy aggregate. Ties favour `DailyTotal`.
fn choose_aggregation(
    daily_total: QuadraticFit,
    average_hourly: QuadraticFit,
) -> (EnergyAggregation, QuadraticFit) {
    if daily_total.r_squared >= average_hourly.r_squared {
        (EnergyAggregation::DailyTotal, daily_total)
    } else {
        (EnergyAggregation::AverageHourly, average_hourly)
    }
}

fn evaluate_point(
    point: GridPoint,
    temperatures: &IntervalSeries,
    policy: &CalendarPolicy,
    targets: &EnergyTargets,
) -> ModelCandidate {
    let avg_temp = lagged_window_average(temperatures, policy, point.window_hours, point.lag_hours);

    let vs_total = score(fit_quadratic(&avg_temp, &targets.daily_total));
    let vs_hourly = score(fit_quadratic(&avg_temp, &targets.average_hourly));
    debug!(
        "Regression done for window [{}] lag [{}]: RSQ daily=[{:.6}] hourly=[{:.6}]",
        point.window_hours, point.lag_hours, vs_total.r_squared, vs_hourly.r_squared
    );

    let (aggregation, fit) = choose_aggregation(vs_total, vs_hourly);
    ModelCandidate {
        grid_index: point.index,
        lag_hours: point.lag_hours,
        window_hours: point.window_hours,
        aggregation,
        coefficients: fit.coefficients,
        r_squared: fit.r_squared,
        rmse: fit.rmse,
        n_points: fit.n_points,
    }
}

/// `true` if `a` should replace `b` as best: higher R², then earlier grid index.
fn is_better(a: &ModelCandidate, b: &ModelCandidate) -> bool {
    a.r_squared > b.r_squared || (a.r_squared == b.r_squared && a.grid_index < b.grid_index)
}

/// Stable reduction to the best candidate; the earliest grid index wins ties.
pub fn select_best<'a, I>(candidates: I) -> Option<&'a ModelCandidate>
where
    I: IntoIterator<Item = &'a ModelCandidate>,
{
    candidates.into_iter().fold(None, |best, cand| match best {
        Some(current) if !is_better(cand, current) => Some(current),
        _ => Some(cand),
    })
}

/// Evaluate every grid point and return all candidates in grid order.
///
/// Regression failures are scored as R² = 0. With `opts.parallel`, points are
/// evaluated on the rayon pool; the returned order is still grid order.
pub fn search_grid(
    temperatures: &IntervalSeries,
    energy: &IntervalSeries,
    policy: &CalendarPolicy,
    opts: &SearchOptions,
) -> Result<Vec<ModelCandidate>, ModelError> {
    let grid = enumerate_grid(opts)?;
    let targets = EnergyTargets::new(energy, policy);
    info!(
        "Daily energy computed: {} total days, {} hourly days; searching {} grid points",
        targets.daily_total.len(),
        targets.average_hourly.len(),
        grid.len()
    );

    let candidates = if opts.parallel {
        grid.par_iter()
            .map(|&point| evaluate_point(point, temperatures, policy, &targets))
            .collect()
    } else {
        grid.iter()
            .map(|&point| evaluate_point(point, temperatures, policy, &targets))
            .collect()
    };
    Ok(candidates)
}

/// Find the lag/window model with the highest R² over the grid.
///
/// # Errors
/// * `ModelError::InvalidConfig` for an invalid grid
/// * `ModelError::EmptyGridResult` if no grid point reaches R² > 0
pub fn find_best_model(
    temperatures: &IntervalSeries,
    energy: &IntervalSeries,
    policy: &CalendarPolicy,
    opts: &SearchOptions,
) -> Result<BestModel, ModelError> {
    let candidates = search_grid(temperatures, energy, policy, opts)?;
    let best = select_best(&candidates)
        .filter(|best| best.r_squared > 0.0)
        .cloned()
        .ok_or(ModelError::EmptyGridResult)?;

    info!(
        "Best model: lag [{}] window [{}] {} RSQ [{:.6}] RMSE [{:.4}]",
        best.lag_hours, best.window_hours, best.aggregation, best.r_squared, best.rmse
    );
    Ok(best)
}
