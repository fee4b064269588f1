use tracing::info;

use crate::aggregate::lagged_window_average;
use crate::types::{
    BestModel, CalendarPolicy, DailyAggregate, IntervalSeries, ModelError, QuadraticCoefficients,
};

/// Evaluate the fitted quadratic for every date of a daily temperature aggregate.
pub fn apply_coefficients(
    coefficients: &QuadraticCoefficients,
    temperatures: &DailyAggregate,
) -> DailyAggregate {
    temperatures
        .iter()
        .map(|(&date, &t)| (date, coefficients.evaluate(t)))
        .collect()
}

/// Predict daily energy for a new temperature series with the selected model.
///
/// The lagged-window average is recomputed with the model's lag and window
/// under `policy`; dates without a window average get no prediction.
///
/// A model whose lag is negative or not finite (e.g. from hand-edited JSON)
/// is rejected with [`ModelError::InvalidConfig`].
///
/// # Example
/// ```
/// use chrono::{NaiveDate, NaiveTime};
/// use temp_lag_model::{
///     forecast, CalendarPolicy, EnergyAggregation, IntervalSeries, ModelCandidate,
///     QuadraticCoefficients,
/// };
///
/// let model = ModelCandidate {
///     grid_index: 0,
///     lag_hours: 0.0,
///     window_hours: 8,
///     aggregation: EnergyAggregation::DailyTotal,
///     coefficients: QuadraticCoefficients { intercept: 10.0, linear: 2.0, quadratic: 0.0 },
///     r_squared: 0.9,
///     rmse: 1.0,
///     n_points: 30,
/// };
/// let date = NaiveDate::from_ymd_opt(2014, 7, 1).unwrap();
/// let mut temps = IntervalSeries::new();
/// temps.insert(date.and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap()), 70.0);
///
/// let predicted = forecast(&model, &temps, &CalendarPolicy::default()).unwrap();
/// assert_eq!(predicted[&date], 150.0);
/// ```
pub fn forecast(
    best: &BestModel,
    temperatures: &IntervalSeries,
    policy: &CalendarPolicy,
) -> Result<DailyAggregate, ModelError> {
    if !best.lag_hours.is_finite() || best.lag_hours < 0.0 {
        return Err(ModelError::InvalidConfig(format!(
            "model lag must be a finite, non-negative number of hours (got {})",
            best.lag_hours
        )));
    }
    let avg_temp = lagged_window_average(temperatures, policy, best.window_hours, best.lag_hours);
    let predicted = apply_coefficients(&best.coefficients, &avg_temp);
    info!(
        "Forecast computed for {} day(s) with lag [{}] window [{}]",
        predicted.len(),
        best.lag_hours,
        best.window_hours
    );
    Ok(predicted)
}
