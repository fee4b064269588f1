use crate::data::validate_and_align;
use crate::defaults::MIN_REGRESSION_POINTS;
use crate::types::{DailyAggregate, ModelError, QuadraticCoefficients, QuadraticFit};
use linfa::dataset::Dataset;
use linfa::traits::Fit;
use linfa_linear::LinearRegression;
use ndarray::{Array1, Array2};

/// Relative spacing below which two temperatures count as the same design point.
const DISTINCT_EPS: f64 = 1e-9;
/// `SS_tot` at or below this share of `n·mean²` counts as a flat target.
const FLAT_RELATIVE_TOLERANCE: f64 = 1e-12;

/// Build the design matrix `[x, x²]` (the intercept column is added by the solver).
pub fn build_design(xs: &[f64]) -> Array2<f64> {
    let mut x = Array2::<f64>::zeros((xs.len(), 2));
    for (r, &v) in xs.iter().enumerate() {
        x[[r, 0]] = v;
        x[[r, 1]] = v * v;
    }
    x
}

/// Number of distinct values in `xs`, up to a relative tolerance.
///
/// The design `[1, x, x²]` has full column rank iff this is at least 3.
fn distinct_values(xs: &[f64]) -> usize {
    let mut sorted = xs.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let scale = sorted
        .iter()
        .fold(1.0_f64, |acc, v| acc.max(v.abs()));
    let tol = DISTINCT_EPS * scale;

    let mut count = 0;
    let mut last: Option<f64> = None;
    for &v in &sorted {
        match last {
            Some(prev) if (v - prev).abs() <= tol => {}
            _ => {
                count += 1;
                last = Some(v);
            }
        }
    }
    count
}

/// Fit daily energy against daily temperature with a degree-2 polynomial.
///
/// Dates are inner-joined and non-finite pairs dropped before fitting
/// (see [`validate_and_align`]).
///
/// # Errors
/// * `ModelError::InsufficientData` if fewer than three clean pairs remain
/// * `ModelError::NumericalDegenerate` if the design matrix is singular
pub fn fit_quadratic(
    temperatures: &DailyAggregate,
    energy: &DailyAggregate,
) -> Result<QuadraticFit, ModelError> {
    let pairs = validate_and_align(temperatures, energy)?;
    fit_quadratic_points(&pairs.temperatures, &pairs.energy)
}

/// Ordinary least squares of `y = a + b·x + c·x²` over already aligned points.
pub fn fit_quadratic_points(xs: &[f64], ys: &[f64]) -> Result<QuadraticFit, ModelError> {
    if xs.len() != ys.len() {
        return Err(ModelError::LengthMismatch);
    }
    if xs.len() < MIN_REGRESSION_POINTS {
        return Err(ModelError::InsufficientData {
            needed: MIN_REGRESSION_POINTS,
            got: xs.len(),
        });
    }
    let distinct = distinct_values(xs);
    if distinct < 3 {
        return Err(ModelError::NumericalDegenerate(format!(
            "only {distinct} distinct temperature value(s) for a quadratic fit"
        )));
    }
    if is_flat(ys) {
        return Err(ModelError::NumericalDegenerate(
            "energy has zero variance".to_string(),
        ));
    }

    let x = build_design(xs);
    let y = Array1::from(ys.to_vec());

    let dataset = Dataset::new(x, y.clone());
    let linreg = LinearRegression::new().with_intercept(true);
    let fitted = linreg
        .fit(&dataset)
        .map_err(|e| ModelError::NumericalDegenerate(format!("{:?}", e)))?;

    let params = fitted.params();
    let coefficients = QuadraticCoefficients {
        intercept: fitted.intercept(),
        linear: params[0],
        quadratic: params[1],
    };
    if !coefficients.intercept.is_finite()
        || !coefficients.linear.is_finite()
        || !coefficients.quadratic.is_finite()
    {
        return Err(ModelError::NumericalDegenerate(
            "solver returned non-finite coefficients".to_string(),
        ));
    }

    let y_hat: Array1<f64> = xs.iter().map(|&t| coefficients.evaluate(t)).collect();
    let (rmse, r_squared) = compute_metrics(&y, &y_hat);

    Ok(QuadraticFit {
        coefficients,
        r_squared,
        rmse,
        n_points: xs.len(),
    })
}

/// True when `ys` has no variance left relative to its magnitude; R² is
/// undefined there.
fn is_flat(ys: &[f64]) -> bool {
    let n = ys.len() as f64;
    let mean = ys.iter().sum::<f64>() / n;
    let ss_tot: f64 = ys.iter().map(|&v| (v - mean).powi(2)).sum();
    ss_tot <= FLAT_RELATIVE_TOLERANCE * n * mean.abs().max(1.0).powi(2)
}

/// Compute RMSE and R² metrics.
///
/// # Arguments
/// * `y_actual` - Actual target values
/// * `y_pred` - Predicted values from the model
///
/// # Returns
/// Tuple of (RMSE, R²) fit quality metrics
pub(crate) fn compute_metrics(y_actual: &Array1<f64>, y_pred: &Array1<f64>) -> (f64, f64) {
    let n = y_actual.len() as f64;

    let ss_res: f64 = y_actual
        .iter()
        .zip(y_pred.iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum();
    let rmse = (ss_res / n).sqrt();

    let y_mean = y_actual.mean().unwrap_or(0.0);
    let ss_tot: f64 = y_actual.iter().map(|&v| (v - y_mean).powi(2)).sum();
    let r2 = 1.0 - ss_res / ss_tot.max(1e-12);

    (rmse, r2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::NaiveDate;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_recovers_exact_quadratic() {
        let xs: Vec<f64> = (0..12).map(|i| i as f64 - 5.0).collect();
        let ys: Vec<f64> = xs.iter().map(|&t| 12.0 - 2.5 * t + 0.4 * t * t).collect();

        let fit = fit_quadratic_points(&xs, &ys).unwrap();
        assert_abs_diff_eq!(fit.coefficients.intercept, 12.0, epsilon = 1e-8);
        assert_abs_diff_eq!(fit.coefficients.linear, -2.5, epsilon = 1e-8);
        assert_abs_diff_eq!(fit.coefficients.quadratic, 0.4, epsilon = 1e-8);
        assert_abs_diff_eq!(fit.r_squared, 1.0, epsilon = 1e-9);
        assert!(fit.rmse < 1e-6);
        assert_eq!(fit.n_points, 12);
    }

    #[test]
    fn test_noisy_fit_metrics_consistent() {
        let mut rng = StdRng::seed_from_u64(11);
        let xs: Vec<f64> = (0..60).map(|i| 50.0 + 0.5 * i as f64).collect();
        let ys: Vec<f64> = xs
            .iter()
            .map(|&t| 300.0 - 4.0 * t + 0.05 * t * t + rng.gen_range(-2.0..2.0))
            .collect();

        let fit = fit_quadratic_points(&xs, &ys).unwrap();
        assert!(fit.r_squared > 0.5 && fit.r_squared <= 1.0);

        let residual_ss: f64 = xs
            .iter()
            .zip(ys.iter())
            .map(|(&t, &y)| (y - fit.coefficients.evaluate(t)).powi(2))
            .sum();
        assert_abs_diff_eq!(
            fit.rmse,
            (residual_ss / xs.len() as f64).sqrt(),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_fewer_than_three_points() {
        let result = fit_quadratic_points(&[1.0, 2.0], &[3.0, 4.0]);
        assert!(matches!(
            result,
            Err(ModelError::InsufficientData { needed: 3, got: 2 })
        ));
    }

    #[test]
    fn test_constant_temperature_is_degenerate() {
        let result = fit_quadratic_points(&[20.0; 6], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert!(matches!(result, Err(ModelError::NumericalDegenerate(_))));
    }

    #[test]
    fn test_two_distinct_temperatures_is_degenerate() {
        let result = fit_quadratic_points(&[20.0, 25.0, 20.0, 25.0], &[1.0, 2.0, 1.5, 2.5]);
        assert!(matches!(result, Err(ModelError::NumericalDegenerate(_))));
    }

    #[test]
    fn test_constant_energy_is_degenerate() {
        let result = fit_quadratic_points(&[40.0, 50.0, 60.0, 70.0, 80.0], &[7.0; 5]);
        assert!(matches!(result, Err(ModelError::NumericalDegenerate(_))));

        // Rounding noise on a large constant is still flat.
        let ys = [5500.0, 5500.0 + 1e-10, 5500.0, 5500.0 - 1e-10, 5500.0];
        assert!(fit_quadratic_points(&[40.0, 50.0, 60.0, 70.0, 80.0], &ys).is_err());
    }

    #[test]
    fn test_length_mismatch() {
        let result = fit_quadratic_points(&[1.0, 2.0, 3.0], &[1.0, 2.0]);
        assert!(matches!(result, Err(ModelError::LengthMismatch)));
    }

    #[test]
    fn test_fit_from_daily_aggregates() {
        let d = |day| NaiveDate::from_ymd_opt(2014, 7, day).unwrap();
        let temps: DailyAggregate = (1..=6).map(|i| (d(i), 40.0 + 5.0 * i as f64)).collect();
        let mut energy: DailyAggregate = temps
            .iter()
            .map(|(&date, &t)| (date, 10.0 + 0.5 * t + 0.01 * t * t))
            .collect();
        energy.insert(d(20), 999.0); // no matching temperature
        energy.insert(d(3), f64::NAN);

        let fit = fit_quadratic(&temps, &energy).unwrap();
        assert_eq!(fit.n_points, 5);
        assert_abs_diff_eq!(fit.r_squared, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_compute_metrics() {
        let y = Array1::from(vec![1.0, 2.0, 3.0, 4.0]);
        let y_hat = Array1::from(vec![1.0, 2.0, 3.0, 5.0]);
        let (rmse, r2) = compute_metrics(&y, &y_hat);
        assert_abs_diff_eq!(rmse, 0.5, epsilon = 1e-12);
        // ss_tot = 5, ss_res = 1
        assert_abs_diff_eq!(r2, 0.8, epsilon = 1e-12);
    }

    #[test]
    fn test_build_design_columns() {
        let x = build_design(&[2.0, 3.0]);
        assert_eq!(x.shape(), &[2, 2]);
        assert_eq!(x[[0, 0]], 2.0);
        assert_eq!(x[[0, 1]], 4.0);
        assert_eq!(x[[1, 1]], 9.0);
    }
}
