use std::fmt::Write as _;
use std::io::Cursor;

use chrono::{Days, NaiveDate, NaiveTime};
use temp_lag_model::io::{
    naics_working_days, parse_forecast_input, parse_holidays, parse_training, write_forecast,
    ForecastReport,
};
use temp_lag_model::{find_best_model, forecast, CalendarPolicy, SearchOptions, TrainingSeason};

fn training_file() -> String {
    let mut text = String::from(
        "# Hourly whole-building electricity\n\
         BUILDINGID,ZIP,BUILDINGTYPE.NAICS\n\
         DEMO-1,94720,452112\n\
         TIME.LOCAL,DBOAT.F,WBELECTRICITY.KWH\n",
    );
    let start = NaiveDate::from_ymd_opt(2014, 5, 1).unwrap();
    for i in 0..90u32 {
        let date = start + Days::new(u64::from(i));
        let base = 60.0 + 12.0 * (f64::from(i) / 6.0).sin();
        for h in 0..24u32 {
            let ts = date.and_time(NaiveTime::from_hms_opt(h, 0, 0).unwrap());
            let temp = base + 6.0 * ((f64::from(h) - 8.0) / 24.0 * std::f64::consts::TAU).sin();
            let kwh = if (7..=19).contains(&h) {
                20.0 + 0.02 * (base - 55.0).powi(2)
            } else {
                1.0
            };
            writeln!(text, "{},{:.2},{:.3}", ts.format("%m/%d/%Y %H:%M"), temp, kwh).unwrap();
        }
    }
    text
}

fn main() {
    let holidays = parse_holidays(Cursor::new("DATE\n2014-05-26\n2014-07-04\n")).unwrap();
    let training = parse_training(
        Cursor::new(training_file()),
        &TrainingSeason::default(),
        None,
    )
    .unwrap();

    let policy = CalendarPolicy::default()
        .with_working_weekdays(naics_working_days(training.naics.as_deref()))
        .with_non_working_days(holidays);
    println!("Working weekdays: {:?}", policy.working_weekdays);

    let best = find_best_model(
        &training.temperatures,
        &training.energy,
        &policy,
        &SearchOptions::default(),
    )
    .unwrap();

    let input = parse_forecast_input(Cursor::new(
        "BUILDINGID\nDEMO-1\nTIME.LOCAL,DBOAT.F\n\
         08/01/2014 00:00,71\n08/01/2014 12:00,78\n08/01/2014 16:00,80\n\
         08/02/2014 00:00,66\n08/02/2014 12:00,70\n08/02/2014 16:00,72\n",
    ))
    .unwrap();
    let predicted = forecast(&best, &input.temperatures, &policy).unwrap();

    let report = ForecastReport {
        model: &best,
        energy_field: &training.energy_field,
        input: &input,
        predicted: &predicted,
        generated_at: chrono::Local::now().naive_local(),
    };
    write_forecast(std::io::stdout().lock(), &report).unwrap();
}
