//! # temp_lag_model
//!
//! Energy-vs-outdoor-temperature modelling with a lagged averaging window.
//!
//! For each `(lag, window)` combination the interval temperature series is
//! averaged per day over `[end - lag - window, end - lag]`, where `end` is the
//! working-day end time. Daily energy (total, or average per operational hour)
//! is regressed on that average with a quadratic, and the combination with the
//! highest R² is kept:
//!
//! * **Search**: evaluate the whole lag × window grid, optionally on the rayon pool
//! * **Forecast**: apply the selected model to a new temperature series
//!
//! ## Example
//!
//! ```
//! use chrono::{Days, NaiveDate, NaiveTime};
//! use temp_lag_model::{
//!     find_best_model, forecast, CalendarPolicy, IntervalSeries, LagGrid, SearchOptions,
//!     WindowGrid,
//! };
//!
//! let start = NaiveDate::from_ymd_opt(2014, 6, 2).unwrap();
//! let mut temps = IntervalSeries::new();
//! let mut energy = IntervalSeries::new();
//! for i in 0..20u32 {
//!     let date = start + Days::new(u64::from(i));
//!     let base = 55.0 + f64::from(i % 7) * 4.0 + f64::from(i % 3);
//!     for h in 0..24 {
//!         let ts = date.and_time(NaiveTime::from_hms_opt(h, 0, 0).unwrap());
//!         temps.insert(ts, base);
//!         if (8..=18).contains(&h) {
//!             energy.insert(ts, 5.0 + 0.1 * base + 0.002 * base * base);
//!         }
//!     }
//! }
//!
//! let policy = CalendarPolicy::default();
//! let opts = SearchOptions {
//!     lags: LagGrid { start: 0.0, end: 1.0, step: 0.5 },
//!     windows: WindowGrid { start: 6, end: 8, step: 1 },
//!     parallel: false,
//! };
//! let best = find_best_model(&temps, &energy, &policy, &opts).unwrap();
//! println!(
//!     "lag {} h, window {} h, {}: R² {:.4}  RMSE {:.4}",
//!     best.lag_hours, best.window_hours, best.aggregation, best.r_squared, best.rmse
//! );
//!
//! let predicted = forecast(&best, &temps, &policy).unwrap();
//! assert_eq!(predicted.len(), 20);
//! ```

// Module declarations
pub mod aggregate;
pub mod data;
mod defaults;
pub mod forecast;
pub mod io;
pub mod ols;
mod select;
mod types;

// Re-export public types
pub use types::{
    BestModel, CalendarPolicy, DailyAggregate, EnergyAggregation, IntervalSeries, LagGrid,
    ModelCandidate, ModelError, QuadraticCoefficients, QuadraticFit, SearchOptions,
    TrainingSeason, WindowGrid,
};

// Re-export main public functions
pub use forecast::{apply_coefficients, forecast};
pub use ols::fit_quadratic;
pub use select::{find_best_model, search_grid, select_best};

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::aggregate::{daily_total_energy, lagged_window_average, window_bounds};
    use approx::assert_abs_diff_eq;
    use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::io::Cursor;

    fn day(i: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2014, 9, 1).unwrap() + Days::new(u64::from(i))
    }

    fn quarter(i: u32, q: u32) -> NaiveDateTime {
        day(i).and_time(NaiveTime::from_hms_opt(q / 4, (q % 4) * 15, 0).unwrap())
    }

    #[test]
    fn test_two_day_quarter_hour_scenario() {
        let mut temps = IntervalSeries::new();
        let mut energy = IntervalSeries::new();
        for i in 0..2 {
            for q in 0..96 {
                temps.insert(quarter(i, q), 50.0 + f64::from(i) * 10.0 + f64::from(q) * 0.1);
                energy.insert(quarter(i, q), 3.0 + f64::from(q % 4));
            }
        }
        let policy = CalendarPolicy::default();
        let (start, end) = window_bounds(policy.working_day_end, 8, 0.0);
        assert_eq!(start, NaiveTime::from_hms_opt(10, 0, 0).unwrap());
        assert_eq!(end, NaiveTime::from_hms_opt(18, 0, 0).unwrap());

        let avg = lagged_window_average(&temps, &policy, 8, 0.0);
        assert_eq!(avg.len(), 2);
        for i in 0..2 {
            // Quarters 40..=72 inclusive: 33 samples.
            let expected: f64 = (40..=72_u32)
                .map(|q| 50.0 + f64::from(i) * 10.0 + f64::from(q) * 0.1)
                .sum::<f64>()
                / 33.0;
            assert_abs_diff_eq!(avg[&day(i)], expected, epsilon = 1e-9);
        }

        let totals = daily_total_energy(&energy, &policy);
        assert!(matches!(
            fit_quadratic(&avg, &totals),
            Err(ModelError::InsufficientData { needed: 3, got: 2 })
        ));

        let opts = SearchOptions {
            lags: LagGrid::single(0.0),
            windows: WindowGrid {
                start: 8,
                end: 8,
                step: 1,
            },
            parallel: false,
        };
        let candidates = search_grid(&temps, &energy, &policy, &opts).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].r_squared, 0.0);
        assert!(matches!(
            find_best_model(&temps, &energy, &policy, &opts),
            Err(ModelError::EmptyGridResult)
        ));
    }

    #[test]
    fn test_holidays_absent_from_every_aggregate() {
        let mut temps = IntervalSeries::new();
        let mut energy = IntervalSeries::new();
        for i in 0..5 {
            for q in 0..96 {
                temps.insert(quarter(i, q), 60.0);
                energy.insert(quarter(i, q), 10.0);
            }
        }
        let policy = CalendarPolicy::default().with_non_working_days([day(1), day(3)]);
        let aggregates = [
            lagged_window_average(&temps, &policy, 8, 0.0),
            daily_total_energy(&energy, &policy),
            aggregate::average_hourly_energy(&energy, &policy),
        ];
        for agg in &aggregates {
            assert_eq!(agg.len(), 3);
            assert!(!agg.contains_key(&day(1)));
            assert!(!agg.contains_key(&day(3)));
        }
    }

    #[test]
    fn test_full_search_recovers_lagged_driver() {
        // Energy depends on the 09:00-15:00 average (lag 3 h, window 6 h).
        let mut rng = StdRng::seed_from_u64(42);
        let mut temps = IntervalSeries::new();
        let mut energy = IntervalSeries::new();
        for i in 0..90 {
            let base = 40.0 + rng.gen_range(0.0..50.0);
            let mut driver = Vec::new();
            for h in 0..24 {
                let swing = 8.0 * ((f64::from(h) - 6.0) / 24.0 * std::f64::consts::TAU).sin();
                let t = base + swing + rng.gen_range(-2.0..2.0);
                if (9..=15).contains(&h) {
                    driver.push(t);
                }
                temps.insert(day(i).and_time(NaiveTime::from_hms_opt(h, 0, 0).unwrap()), t);
            }
            let avg = driver.iter().sum::<f64>() / driver.len() as f64;
            let daily = 900.0 - 20.0 * avg + 0.2 * avg * avg + rng.gen_range(-5.0..5.0);
            for h in 7..=19 {
                energy.insert(
                    day(i).and_time(NaiveTime::from_hms_opt(h, 0, 0).unwrap()),
                    daily / 13.0,
                );
            }
        }

        let policy = CalendarPolicy::default();
        let opts = SearchOptions {
            lags: LagGrid {
                start: 0.0,
                end: 5.0,
                step: 0.5,
            },
            windows: WindowGrid {
                start: 4,
                end: 8,
                step: 1,
            },
            parallel: true,
        };
        let best = find_best_model(&temps, &energy, &policy, &opts).unwrap();
        assert!(best.r_squared > 0.9, "r2 = {}", best.r_squared);
        assert!(!best.is_weak());

        let again = find_best_model(&temps, &energy, &policy, &opts).unwrap();
        assert_eq!(best, again);

        let json = serde_json::to_string(&best).unwrap();
        let restored: ModelCandidate = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, best);
    }

    #[test]
    fn test_files_to_forecast() {
        let mut training = String::from(
            "# training\nBUILDINGID,BUILDINGTYPE.NAICS\nB-9,611110\nTIME.LOCAL,DBOAT.F,WBELECTRICITY.KWH\n",
        );
        let mut rng = StdRng::seed_from_u64(8);
        for i in 0..30 {
            let base: f64 = 45.0 + rng.gen_range(0.0..40.0);
            let daily = 200.0 + 3.0 * base + 0.01 * base * base;
            for h in 0..24 {
                let ts = day(i).and_time(NaiveTime::from_hms_opt(h, 0, 0).unwrap());
                let e = if (8..=17).contains(&h) { daily / 10.0 } else { 0.5 };
                training.push_str(&format!(
                    "{},{:.3},{:.4}\n",
                    ts.format("%m/%d/%Y %H:%M"),
                    base,
                    e
                ));
            }
        }
        let data = io::parse_training(
            Cursor::new(training),
            &TrainingSeason::default(),
            None,
        )
        .unwrap();
        assert_eq!(data.energy_field, "WBELECTRICITY.KWH");
        assert_eq!(data.temperatures.len(), 30 * 24);

        let policy = CalendarPolicy::default()
            .with_working_weekdays(io::naics_working_days(data.naics.as_deref()));
        let opts = SearchOptions {
            lags: LagGrid::single(0.0),
            windows: WindowGrid {
                start: 8,
                end: 10,
                step: 1,
            },
            parallel: false,
        };
        let best = find_best_model(&data.temperatures, &data.energy, &policy, &opts).unwrap();
        assert!(best.r_squared > 0.99);

        let forecast_text = "BUILDINGID\nB-9\nTIME.LOCAL,DBOAT.F\n\
                             10/01/2014 00:00,60\n10/01/2014 12:00,60\n";
        let input = io::parse_forecast_input(Cursor::new(forecast_text)).unwrap();
        let predicted = forecast(&best, &input.temperatures, &policy).unwrap();
        assert_eq!(predicted.len(), 1);

        let report = io::ForecastReport {
            model: &best,
            energy_field: &data.energy_field,
            input: &input,
            predicted: &predicted,
            generated_at: day(30).and_time(NaiveTime::MIN),
        };
        let mut buf = Vec::new();
        io::write_forecast(&mut buf, &report).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let expected = format!(
            "10/01/2014 00:00:00,60,{:.2}",
            predicted.values().next().copied().unwrap()
        );
        assert!(text.lines().any(|l| l == expected), "{text}");
        assert!(text.lines().any(|l| l == "10/01/2014 12:00:00,60,0.0"));
    }
}
