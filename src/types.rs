use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::defaults::{
    DEFAULT_ENERGY_THRESHOLD, DEFAULT_LAG_END, DEFAULT_LAG_START, DEFAULT_LAG_STEP,
    DEFAULT_SEASON_END, DEFAULT_SEASON_START, DEFAULT_WINDOW_END, DEFAULT_WINDOW_START,
    DEFAULT_WINDOW_STEP, DEFAULT_WORKDAY_END_HOUR, MAX_LAG_POINTS, WEAK_MODEL_R2,
};

/// Interval readings keyed by local timestamp. `NaN` marks a missing value.
pub type IntervalSeries = BTreeMap<NaiveDateTime, f64>;

/// One scalar per calendar date.
pub type DailyAggregate = BTreeMap<NaiveDate, f64>;

/// Calendar rules consulted by the aggregator.
///
/// Invariant: `working_day_end` and `energy_threshold` apply to every date of a run.
///
/// # Example
/// ```
/// use chrono::{NaiveDate, NaiveTime};
/// use temp_lag_model::CalendarPolicy;
///
/// let policy = CalendarPolicy::default()
///     .with_non_working_days([NaiveDate::from_ymd_opt(2014, 12, 25).unwrap()])
///     .with_working_day_end(NaiveTime::from_hms_opt(17, 30, 0).unwrap())
///     .with_energy_threshold(1.5);
/// assert!(policy.is_non_working(NaiveDate::from_ymd_opt(2014, 12, 25).unwrap()));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct CalendarPolicy {
    /// Holidays, excluded from every aggregate.
    pub non_working_days: BTreeSet<NaiveDate>,
    /// Operational weekdays. Informational only; aggregation does not filter on it.
    pub working_weekdays: Vec<Weekday>,
    /// Anchor from which lag and window are measured backward.
    pub working_day_end: NaiveTime,
    /// Energy readings at or below this value count as "plant off".
    pub energy_threshold: f64,
}

impl Default for CalendarPolicy {
    fn default() -> Self {
        Self {
            non_working_days: BTreeSet::new(),
            working_weekdays: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            working_day_end: NaiveTime::from_hms_opt(DEFAULT_WORKDAY_END_HOUR, 0, 0)
                .unwrap_or(NaiveTime::MIN),
            energy_threshold: DEFAULT_ENERGY_THRESHOLD,
        }
    }
}

impl CalendarPolicy {
    pub fn with_non_working_days<I>(mut self, days: I) -> Self
    where
        I: IntoIterator<Item = NaiveDate>,
    {
        self.non_working_days.extend(days);
        self
    }

    pub fn with_working_weekdays(mut self, days: Vec<Weekday>) -> Self {
        self.working_weekdays = days;
        self
    }

    pub fn with_working_day_end(mut self, end: NaiveTime) -> Self {
        self.working_day_end = end;
        self
    }

    pub fn with_energy_threshold(mut self, threshold: f64) -> Self {
        self.energy_threshold = threshold;
        self
    }

    pub fn is_non_working(&self, date: NaiveDate) -> bool {
        self.non_working_days.contains(&date)
    }

    pub fn is_working_weekday(&self, date: NaiveDate) -> bool {
        self.working_weekdays.contains(&date.weekday())
    }
}

/// Which daily energy aggregate a model was scored against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnergyAggregation {
    DailyTotal,
    AverageHourly,
}

impl fmt::Display for EnergyAggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DailyTotal => write!(f, "DailyTotal"),
            Self::AverageHourly => write!(f, "AverageHourly"),
        }
    }
}

/// `energy = intercept + linear * t + quadratic * t²`
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QuadraticCoefficients {
    pub intercept: f64,
    pub linear: f64,
    pub quadratic: f64,
}

impl QuadraticCoefficients {
    pub fn evaluate(&self, t: f64) -> f64 {
        self.intercept + self.linear * t + self.quadratic * t * t
    }
}

/// Result of a quadratic least-squares fit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QuadraticFit {
    pub coefficients: QuadraticCoefficients,
    /// R² (coefficient of determination) on the fit window
    pub r_squared: f64,
    /// Root mean squared error on the fit window
    pub rmse: f64,
    /// Number of (temperature, energy) pairs used
    pub n_points: usize,
}

impl QuadraticFit {
    /// Score used when a fit fails inside the search: never beats a real candidate.
    pub fn zero() -> Self {
        Self::default()
    }
}

/// One evaluated point of the lag × window grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelCandidate {
    /// Position in grid iteration order (lag outer, window inner).
    pub grid_index: usize,
    pub lag_hours: f64,
    pub window_hours: u32,
    pub aggregation: EnergyAggregation,
    pub coefficients: QuadraticCoefficients,
    pub r_squared: f64,
    pub rmse: f64,
    pub n_points: usize,
}

impl ModelCandidate {
    /// Models below R² 0.5 are unlikely to produce a useful forecast.
    pub fn is_weak(&self) -> bool {
        self.r_squared < WEAK_MODEL_R2
    }
}

/// The candidate with the highest R² over the whole grid.
pub type BestModel = ModelCandidate;

/// Inclusive range of lag hours, enumerated as `start + i * step`.
#[derive(Clone, Debug, PartialEq)]
pub struct LagGrid {
    pub start: f64,
    pub end: f64,
    pub step: f64,
}

impl Default for LagGrid {
    fn default() -> Self {
        Self {
            start: DEFAULT_LAG_START,
            end: DEFAULT_LAG_END,
            step: DEFAULT_LAG_STEP,
        }
    }
}

impl LagGrid {
    pub fn single(lag_hours: f64) -> Self {
        Self {
            start: lag_hours,
            end: lag_hours,
            step: 1.0,
        }
    }

    pub fn values(&self) -> Result<Vec<f64>, ModelError> {
        if self.step.is_nan()
            || self.step <= 0.0
            || !self.start.is_finite()
            || !self.end.is_finite()
        {
            return Err(ModelError::InvalidConfig(format!(
                "lag grid needs finite bounds and a positive step (start={}, end={}, step={})",
                self.start, self.end, self.step
            )));
        }
        if self.start < 0.0 || self.start > self.end {
            return Err(ModelError::InvalidConfig(format!(
                "lag grid start {} must be >= 0 and <= end {}",
                self.start, self.end
            )));
        }
        let span = (self.end - self.start) / self.step + 1e-9;
        if span >= MAX_LAG_POINTS as f64 {
            return Err(ModelError::InvalidConfig(format!(
                "lag grid {}..={} step {} has more than {} values",
                self.start, self.end, self.step, MAX_LAG_POINTS
            )));
        }
        // Index-based enumeration so 0.25 steps do not accumulate rounding error.
        let count = span.floor() as usize + 1;
        Ok((0..count)
            .map(|i| self.start + i as f64 * self.step)
            .collect())
    }
}

/// Inclusive range of window sizes in whole hours.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowGrid {
    pub start: u32,
    pub end: u32,
    pub step: u32,
}

impl Default for WindowGrid {
    fn default() -> Self {
        Self {
            start: DEFAULT_WINDOW_START,
            end: DEFAULT_WINDOW_END,
            step: DEFAULT_WINDOW_STEP,
        }
    }
}

impl WindowGrid {
    pub fn values(&self) -> Result<Vec<u32>, ModelError> {
        if self.step == 0 {
            return Err(ModelError::InvalidConfig(
                "window grid step must be positive".to_string(),
            ));
        }
        if self.start > self.end {
            return Err(ModelError::InvalidConfig(format!(
                "window grid start {} exceeds end {}",
                self.start, self.end
            )));
        }
        Ok((self.start..=self.end).step_by(self.step as usize).collect())
    }
}

/// Options for the lag × window search.
///
/// # Example
/// ```
/// use temp_lag_model::{LagGrid, SearchOptions, WindowGrid};
/// let opts = SearchOptions {
///     lags: LagGrid { start: 0.0, end: 2.0, step: 0.5 },
///     windows: WindowGrid { start: 6, end: 10, step: 2 },
///     parallel: false,
/// };
/// assert_eq!(opts.grid_size().unwrap(), 5 * 3);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchOptions {
    pub lags: LagGrid,
    pub windows: WindowGrid,
    /// Evaluate grid points on the rayon thread pool. Selection stays deterministic.
    pub parallel: bool,
}

impl SearchOptions {
    pub fn grid_size(&self) -> Result<usize, ModelError> {
        Ok(self.lags.values()?.len() * self.windows.values()?.len())
    }
}

/// Month/day range limiting which readings are used for training.
///
/// Winter seasons wrap the new year: start `1101`, end `0301`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrainingSeason {
    pub start_mmdd: u32,
    pub end_mmdd: u32,
}

impl Default for TrainingSeason {
    fn default() -> Self {
        Self {
            start_mmdd: DEFAULT_SEASON_START,
            end_mmdd: DEFAULT_SEASON_END,
        }
    }
}

impl TrainingSeason {
    /// Parse an `MMDD` value such as `"0315"`.
    pub fn parse_mmdd(text: &str) -> Result<u32, ModelError> {
        let value: u32 = text
            .trim()
            .parse()
            .map_err(|_| ModelError::InvalidConfig(format!("invalid MMDD value '{text}'")))?;
        if value < 101 || value / 100 > 12 || value % 100 > 31 {
            return Err(ModelError::InvalidConfig(format!(
                "MMDD value '{text}' out of range"
            )));
        }
        Ok(value)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        let mmdd = date.month() * 100 + date.day();
        if self.start_mmdd < self.end_mmdd {
            mmdd >= self.start_mmdd && mmdd <= self.end_mmdd
        } else {
            mmdd > self.start_mmdd || mmdd < self.end_mmdd
        }
    }
}

/// Library error type.
#[derive(thiserror::Error, Debug)]
pub enum ModelError {
    #[error("input lengths mismatch")]
    LengthMismatch,
    #[error("insufficient data: need at least {needed} aligned days, got {got}")]
    InsufficientData { needed: usize, got: usize },
    #[error("numerically degenerate regression: {0}")]
    NumericalDegenerate(String),
    #[error("zero elapsed span for average hourly energy on {date}")]
    DegenerateElapsedSpan { date: NaiveDate },
    #[error("no grid point produced a usable model")]
    EmptyGridResult,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("parse error at line {line}: {message}")]
    Parse { line: u64, message: String },
    #[error("missing field: {0}")]
    MissingField(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
}
