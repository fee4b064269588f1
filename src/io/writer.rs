use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tracing::{info, warn};

use super::{ForecastInput, TIME_SERIES_MARKER};
use crate::types::{BestModel, DailyAggregate, EnergyAggregation, ModelError};

/// Everything needed to write a forecast file.
#[derive(Clone, Copy, Debug)]
pub struct ForecastReport<'a> {
    pub model: &'a BestModel,
    /// Energy column the model was trained on.
    pub energy_field: &'a str,
    pub input: &'a ForecastInput,
    pub predicted: &'a DailyAggregate,
    pub generated_at: NaiveDateTime,
}

/// `<dir>/YYYY.MM.DD.<name>` next to the forecast input file.
pub fn output_path(forecast_path: &Path, run_date: NaiveDate) -> PathBuf {
    let name = forecast_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = format!("{}.{}", run_date.format("%Y.%m.%d"), name);
    match forecast_path.parent() {
        Some(dir) => dir.join(file_name),
        None => PathBuf::from(file_name),
    }
}

fn write_record<W, I, T>(out: &mut W, fields: I) -> Result<(), ModelError>
where
    W: Write,
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut wtr = csv::WriterBuilder::new().flexible(true).from_writer(out);
    wtr.write_record(fields)?;
    wtr.flush()?;
    Ok(())
}

fn energy_cell(predicted: &DailyAggregate, ts: NaiveDateTime) -> String {
    if ts.time() != NaiveTime::MIN {
        return "0.0".to_string();
    }
    predicted
        .get(&ts.date())
        .map_or_else(|| "0.0".to_string(), |e| format!("{:.2}", e))
}

/// Write the forecast: model summary comments, the input header, then one row
/// per input timestamp.
///
/// The daily prediction is written on the `00:00:00` row of its date; every
/// other row carries `0.0`.
pub fn write_forecast<W: Write>(mut out: W, report: &ForecastReport<'_>) -> Result<(), ModelError> {
    let model = report.model;
    let c = &model.coefficients;

    writeln!(
        out,
        "# Forecast generated by temp-lag-model {}",
        report.generated_at.format("%Y-%m-%d %H:%M:%S")
    )?;
    writeln!(out, "# Model type: [{}]", model.aggregation)?;
    writeln!(out, "# Lag window: [{}]", model.lag_hours)?;
    writeln!(out, "# Window size: [{}]", model.window_hours)?;
    writeln!(out, "#")?;
    writeln!(
        out,
        "# Formula: Energy = {} * Temp^2 + {} * Temp + {}",
        c.quadratic, c.linear, c.intercept
    )?;
    writeln!(out, "# RSQ = [{}]", model.r_squared)?;
    writeln!(out, "# RMSE = [{}]", model.rmse)?;
    if model.is_weak() {
        writeln!(
            out,
            "# the low RSQ value indicates that this model will not produce a good forecast"
        )?;
    }
    writeln!(out)?;

    let header = &report.input.header;
    write_record(&mut out, header.names())?;
    write_record(&mut out, header.values())?;

    writeln!(out)?;
    writeln!(out, "# One energy figure is calculated per day")?;
    match model.aggregation {
        EnergyAggregation::DailyTotal => writeln!(
            out,
            "# this is the total energy used for {} for that day",
            report.energy_field
        )?,
        EnergyAggregation::AverageHourly => writeln!(
            out,
            "# this is the average hourly [{}] energy used for that day \
             whilst the building is operational.",
            report.energy_field
        )?,
    }
    writeln!(out)?;

    let mut wtr = csv::Writer::from_writer(&mut out);
    wtr.write_record([
        TIME_SERIES_MARKER,
        report.input.temperature_field.as_str(),
        report.energy_field,
    ])?;
    for (&ts, &temp) in &report.input.temperatures {
        wtr.write_record([
            ts.format("%m/%d/%Y %H:%M:%S").to_string(),
            temp.to_string(),
            energy_cell(report.predicted, ts),
        ])?;
    }
    wtr.flush()?;
    drop(wtr);
    out.flush()?;
    Ok(())
}

/// Create (or overwrite) `path` and write the forecast into it.
pub fn write_forecast_file(path: &Path, report: &ForecastReport<'_>) -> Result<(), ModelError> {
    if path.exists() {
        warn!("Output file [{}] already exists, overwriting...", path.display());
    }
    let file = File::create(path)?;
    write_forecast(BufWriter::new(file), report)?;
    info!(
        "Forecast written to [{}]: {} day(s)",
        path.display(),
        report.predicted.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::parse_forecast_input;
    use crate::types::{ModelCandidate, QuadraticCoefficients};
    use std::io::Cursor;

    const INPUT: &str = "\
BUILDINGID,ZIP
B-7,94720
TIME.LOCAL,DBOAT.F
07/01/2014 00:00,60
07/01/2014 12:00,75.5
07/02/2014 00:00,62
";

    fn model(r_squared: f64, aggregation: EnergyAggregation) -> ModelCandidate {
        ModelCandidate {
            grid_index: 3,
            lag_hours: 1.5,
            window_hours: 9,
            aggregation,
            coefficients: QuadraticCoefficients {
                intercept: 12.0,
                linear: -0.5,
                quadratic: 0.25,
            },
            r_squared,
            rmse: 4.0,
            n_points: 100,
        }
    }

    fn render(model: &ModelCandidate, predicted: &DailyAggregate) -> String {
        let input = parse_forecast_input(Cursor::new(INPUT)).unwrap();
        let report = ForecastReport {
            model,
            energy_field: "WBELECTRICITY.KWH",
            input: &input,
            predicted,
            generated_at: NaiveDate::from_ymd_opt(2014, 6, 30)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
        };
        let mut buf = Vec::new();
        write_forecast(&mut buf, &report).unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn july(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2014, 7, day).unwrap()
    }

    #[test]
    fn test_write_forecast_layout() {
        let predicted: DailyAggregate = [(july(1), 123.456)].into_iter().collect();
        let text = render(&model(0.9, EnergyAggregation::DailyTotal), &predicted);
        let lines: Vec<&str> = text.lines().collect();

        assert!(lines.contains(&"# Model type: [DailyTotal]"));
        assert!(lines.contains(&"# Formula: Energy = 0.25 * Temp^2 + -0.5 * Temp + 12"));
        assert!(lines.contains(&"# RSQ = [0.9]"));
        assert!(!text.contains("low RSQ"));
        assert!(lines.contains(&"BUILDINGID,ZIP"));
        assert!(lines.contains(&"B-7,94720"));
        assert!(lines.contains(&"TIME.LOCAL,DBOAT.F,WBELECTRICITY.KWH"));
        assert!(lines.contains(&"07/01/2014 00:00:00,60,123.46"));
        assert!(lines.contains(&"07/01/2014 12:00:00,75.5,0.0"));
        // No prediction for July 2.
        assert!(lines.contains(&"07/02/2014 00:00:00,62,0.0"));
        assert_eq!(lines.last(), Some(&"07/02/2014 00:00:00,62,0.0"));
    }

    #[test]
    fn test_weak_model_warning_and_hourly_note() {
        let text = render(
            &model(0.3, EnergyAggregation::AverageHourly),
            &DailyAggregate::new(),
        );
        assert!(text.contains("# the low RSQ value indicates"));
        assert!(text.contains("average hourly [WBELECTRICITY.KWH]"));
    }

    #[test]
    fn test_output_path() {
        let path = output_path(Path::new("/data/in/PRED_b7.csv"), july(15));
        assert_eq!(path, PathBuf::from("/data/in/2014.07.15.PRED_b7.csv"));
        assert_eq!(
            output_path(Path::new("PRED_b7.csv"), july(15)),
            PathBuf::from("2014.07.15.PRED_b7.csv")
        );
    }

    #[test]
    fn test_write_forecast_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = output_path(&dir.path().join("PRED.csv"), july(1));
        let input = parse_forecast_input(Cursor::new(INPUT)).unwrap();
        let predicted: DailyAggregate = [(july(2), 10.0)].into_iter().collect();
        let best = model(0.8, EnergyAggregation::DailyTotal);
        let report = ForecastReport {
            model: &best,
            energy_field: "WBGAS.KBTU",
            input: &input,
            predicted: &predicted,
            generated_at: july(1).and_hms_opt(0, 0, 0).unwrap(),
        };

        write_forecast_file(&path, &report).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("07/02/2014 00:00:00,62,10.00"));
    }
}
