use chrono::{Days, NaiveDate, NaiveTime};
use temp_lag_model::{
    find_best_model, search_grid, select_best, CalendarPolicy, IntervalSeries, SearchOptions,
};

fn main() {
    let start = NaiveDate::from_ymd_opt(2014, 6, 2).unwrap();
    let mut temps = IntervalSeries::new();
    let mut energy = IntervalSeries::new();

    for i in 0..120u32 {
        let date = start + Days::new(u64::from(i));
        let base = 62.0 + 15.0 * (f64::from(i) / 9.0).sin() + 5.0 * (f64::from(i) / 3.3).cos();
        let mut afternoon = 0.0;
        for q in 0..96u32 {
            let ts = date.and_time(NaiveTime::from_hms_opt(q / 4, (q % 4) * 15, 0).unwrap());
            let hour = f64::from(q) / 4.0;
            let t = base + 9.0 * ((hour - 9.0) / 24.0 * std::f64::consts::TAU).sin();
            if (44..=60).contains(&q) {
                afternoon += t / 17.0;
            }
            temps.insert(ts, t);
        }
        let kwh = 250.0 - 4.0 * afternoon + 0.06 * afternoon * afternoon;
        for q in 28..=76u32 {
            let ts = date.and_time(NaiveTime::from_hms_opt(q / 4, (q % 4) * 15, 0).unwrap());
            energy.insert(ts, kwh / 49.0);
        }
    }

    let policy = CalendarPolicy::default();
    let opts = SearchOptions {
        parallel: true,
        ..SearchOptions::default()
    };

    let candidates = search_grid(&temps, &energy, &policy, &opts).unwrap();
    println!("Evaluated {} lag/window combinations", candidates.len());

    let mut ranked: Vec<_> = candidates.iter().collect();
    ranked.sort_by(|a, b| b.r_squared.total_cmp(&a.r_squared));
    for cand in ranked.iter().take(5) {
        println!(
            "lag={:>5.2}h window={:>2}h {:<13} R2={:.5} RMSE={:.3}",
            cand.lag_hours, cand.window_hours, cand.aggregation, cand.r_squared, cand.rmse
        );
    }

    let best = find_best_model(&temps, &energy, &policy, &opts).unwrap();
    assert_eq!(Some(&best), select_best(&candidates));
    let c = best.coefficients;
    println!(
        "Best: Energy = {:.5} * Temp^2 + {:.4} * Temp + {:.3}",
        c.quadratic, c.linear, c.intercept
    );
}
