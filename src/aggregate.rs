use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use tracing::{debug, warn};

use crate::types::{CalendarPolicy, DailyAggregate, IntervalSeries, ModelError};

/// Running per-day sums of qualifying readings.
#[derive(Clone, Copy, Debug)]
struct DayAccumulator {
    sum: f64,
    count: usize,
    first: NaiveDateTime,
    last: NaiveDateTime,
}

impl DayAccumulator {
    fn new(ts: NaiveDateTime, value: f64) -> Self {
        Self {
            sum: value,
            count: 1,
            first: ts,
            last: ts,
        }
    }

    fn push(&mut self, ts: NaiveDateTime, value: f64) {
        self.sum += value;
        self.count += 1;
        self.first = self.first.min(ts);
        self.last = self.last.max(ts);
    }

    fn elapsed_hours(&self) -> f64 {
        (self.last - self.first).num_milliseconds() as f64 / 3_600_000.0
    }
}

/// Group readings passing `keep` by calendar date.
///
/// Holidays and `NaN` readings are always dropped. Grouping is explicit on the
/// date part of each key, so correctness does not depend on container order.
fn accumulate_by_date<F>(
    series: &IntervalSeries,
    policy: &CalendarPolicy,
    keep: F,
) -> BTreeMap<NaiveDate, DayAccumulator>
where
    F: Fn(&NaiveDateTime, f64) -> bool,
{
    let mut days: BTreeMap<NaiveDate, DayAccumulator> = BTreeMap::new();
    for (&ts, &value) in series {
        if value.is_nan() || policy.is_non_working(ts.date()) || !keep(&ts, value) {
            continue;
        }
        days.entry(ts.date())
            .and_modify(|acc| acc.push(ts, value))
            .or_insert_with(|| DayAccumulator::new(ts, value));
    }
    days
}

/// Offset of `h` hours reduced to one day; only the time of day is used.
fn hours(h: f64) -> TimeDelta {
    TimeDelta::milliseconds((h.rem_euclid(24.0) * 3_600_000.0).round() as i64)
}

/// Compute the `[start, end]` time-of-day window for a lag and window size.
///
/// `end = working_day_end - lag`, `start = end - window`, both as time of day.
/// When `start` would fall on the previous day (i.e. `end < start` after
/// wrapping), `start` is clamped to midnight: the window never crosses 00:00.
///
/// # Example
/// ```
/// use chrono::NaiveTime;
/// use temp_lag_model::aggregate::window_bounds;
///
/// let end = NaiveTime::from_hms_opt(18, 0, 0).unwrap();
/// let (start, stop) = window_bounds(end, 10, 10.0);
/// assert_eq!(start, NaiveTime::from_hms_opt(0, 0, 0).unwrap());
/// assert_eq!(stop, NaiveTime::from_hms_opt(8, 0, 0).unwrap());
/// ```
pub fn window_bounds(
    working_day_end: NaiveTime,
    window_hours: u32,
    lag_hours: f64,
) -> (NaiveTime, NaiveTime) {
    let (end, _) = working_day_end.overflowing_sub_signed(hours(lag_hours));
    let (mut start, _) =
        working_day_end.overflowing_sub_signed(hours(lag_hours + f64::from(window_hours)));
    if end < start {
        start = NaiveTime::MIN;
    }
    (start, end)
}

/// Largest window size that keeps `end - window` on the same day.
///
/// Returns `max_window` unchanged when it already fits, otherwise the hour of
/// `working_day_end - lag`.
pub fn cap_max_window(working_day_end: NaiveTime, lag_hours: f64, max_window: u32) -> u32 {
    let (end, _) = working_day_end.overflowing_sub_signed(hours(lag_hours));
    let limit = end.hour();
    if limit < max_window {
        warn!(
            "Max window size reduced to {} from {} (lag {} h before {})",
            limit, max_window, lag_hours, working_day_end
        );
        limit
    } else {
        max_window
    }
}

/// Average temperature per date over the lagged window.
///
/// A reading qualifies when its time of day lies in `[start, end]` (see
/// [`window_bounds`]), its date is not a holiday and its value is not `NaN`.
/// Dates with no qualifying reading are absent from the result.
pub fn lagged_window_average(
    temperatures: &IntervalSeries,
    policy: &CalendarPolicy,
    window_hours: u32,
    lag_hours: f64,
) -> DailyAggregate {
    let (start, end) = window_bounds(policy.working_day_end, window_hours, lag_hours);
    accumulate_by_date(temperatures, policy, |ts, _| {
        let tod = ts.time();
        tod >= start && tod <= end
    })
    .into_iter()
    .map(|(date, acc)| (date, acc.sum / acc.count as f64))
    .collect()
}

/// Sum per date of readings strictly above the energy threshold.
pub fn daily_total_energy(energy: &IntervalSeries, policy: &CalendarPolicy) -> DailyAggregate {
    let threshold = policy.energy_threshold;
    accumulate_by_date(energy, policy, |_, v| v > threshold)
        .into_iter()
        .map(|(date, acc)| (date, acc.sum))
        .collect()
}

/// Energy per operational hour for each date.
///
/// `sum(readings > threshold) / hours(last qualifying - first qualifying)`.
/// A day whose qualifying readings span zero time (a single reading) is
/// skipped rather than producing an infinite value.
pub fn average_hourly_energy(energy: &IntervalSeries, policy: &CalendarPolicy) -> DailyAggregate {
    let threshold = policy.energy_threshold;
    let mut out = DailyAggregate::new();
    for (date, acc) in accumulate_by_date(energy, policy, |_, v| v > threshold) {
        match hourly_rate(date, &acc) {
            Ok(rate) => {
                out.insert(date, rate);
            }
            Err(err) => debug!("Skipping day: {}", err),
        }
    }
    out
}

fn hourly_rate(date: NaiveDate, acc: &DayAccumulator) -> Result<f64, ModelError> {
    let elapsed = acc.elapsed_hours();
    if elapsed <= 0.0 {
        return Err(ModelError::DegenerateElapsedSpan { date });
    }
    Ok(acc.sum / elapsed)
}
