use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use csv::StringRecord;
use tracing::{debug, info, warn};

use super::{
    line_of, parse_timestamp, read_header, records, seek_section, Header, Records,
    FIELD_BUILDING_ID, FIELD_NAICS, TIME_SERIES_MARKER,
};
use crate::types::{IntervalSeries, ModelError, TrainingSeason};

/// Outdoor air temperature columns, any of which may drive the model.
pub const TEMPERATURE_FIELDS: &[&str] = &["DBOAT.F", "WBOAT.F"];

/// Energy columns that can be modelled.
pub const ENERGY_FIELDS: &[&str] = &[
    "WBELECTRICITY.KWH",
    "WBGAS.KBTU",
    "CHW.KBTU",
    "HW.KBTU",
    "STEAM.KBTU",
    "COOLINGELECTRICITY.KWH",
    "COOLINGGAS.KBTU",
    "HEATINGELECTRICITY.KWH",
    "HEATINGGAS.KBTU",
    "VENTILIATIONELECTRICITY.KWH",
    "LIGHTINGELECTRICITY.KWH",
];

/// Training file contents: header plus aligned temperature and energy series.
#[derive(Clone, Debug, Default)]
pub struct TrainingData {
    pub header: Header,
    pub building_id: String,
    pub naics: Option<String>,
    pub temperature_field: String,
    pub energy_field: String,
    pub temperatures: IntervalSeries,
    pub energy: IntervalSeries,
}

/// Forecast input contents: header plus the temperature series to forecast on.
#[derive(Clone, Debug, Default)]
pub struct ForecastInput {
    pub header: Header,
    pub building_id: String,
    pub temperature_field: String,
    pub temperatures: IntervalSeries,
}

/// Column layout of the time-series section.
struct Columns {
    names: Vec<String>,
    timestamp: usize,
}

impl Columns {
    fn from_record(record: &StringRecord) -> Self {
        let names: Vec<String> = record.iter().map(str::to_uppercase).collect();
        let timestamp = names
            .iter()
            .position(|n| n == TIME_SERIES_MARKER)
            .unwrap_or(0);
        Self { names, timestamp }
    }

    /// First column, in file order, whose name is one of `candidates`.
    fn first_of(&self, candidates: &[&str]) -> Option<usize> {
        self.names
            .iter()
            .position(|n| candidates.contains(&n.as_str()))
    }

    fn find(&self, name: &str) -> Option<usize> {
        let name = name.to_uppercase();
        self.names.iter().position(|n| *n == name)
    }
}

fn read_value(record: &StringRecord, column: usize) -> f64 {
    let raw = record.get(column).unwrap_or_default();
    raw.parse::<f64>().unwrap_or_else(|_| {
        debug!("Unreadable value [{}] at line {}", raw, line_of(record));
        f64::NAN
    })
}

fn open_time_series<R: Read>(records: &mut Records<R>) -> Result<Columns, ModelError> {
    let marker = seek_section(records, TIME_SERIES_MARKER)?.ok_or_else(|| {
        ModelError::MissingField(TIME_SERIES_MARKER.to_string())
    })?;
    Ok(Columns::from_record(&marker))
}

/// Yield `(timestamp, record)` for each well-formed data row.
fn data_rows<'a, R: Read + 'a>(
    records: &'a mut Records<R>,
    columns: &'a Columns,
) -> impl Iterator<Item = Result<(chrono::NaiveDateTime, StringRecord), ModelError>> + 'a {
    records.filter_map(move |record| {
        let record = match record {
            Ok(r) => r,
            Err(e) => return Some(Err(e.into())),
        };
        if record.len() != columns.names.len() {
            warn!(
                "Line {}: expected {} field(s), found {}, skipping...",
                line_of(&record),
                columns.names.len(),
                record.len()
            );
            return None;
        }
        let raw = record.get(columns.timestamp).unwrap_or_default();
        match parse_timestamp(raw) {
            Some(ts) => Some(Ok((ts, record))),
            None => {
                warn!("Invalid date format: [{}], skipping...", raw);
                None
            }
        }
    })
}

fn building_id(header: &Header) -> Result<String, ModelError> {
    header.require(FIELD_BUILDING_ID).map(str::to_string)
}

/// Parse a training file.
///
/// Temperature and energy columns are the first matching columns in file
/// order, unless `energy_field` names the energy column explicitly. Rows
/// outside `season` are not loaded. Unreadable numbers are kept as `NaN` so
/// both series share the same timestamps.
///
/// # Errors
/// * `ModelError::MissingField` if `BUILDINGID`, the time-series section, or a
///   usable temperature/energy column is missing
/// * `ModelError::Parse` for a malformed header
pub fn parse_training<R: Read>(
    reader: R,
    season: &TrainingSeason,
    energy_field: Option<&str>,
) -> Result<TrainingData, ModelError> {
    let mut recs = records(reader);
    let header = read_header(&mut recs)?;
    let building_id = building_id(&header)?;
    let naics = header
        .get(FIELD_NAICS)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    let columns = open_time_series(&mut recs)?;
    let temp_col = columns
        .first_of(TEMPERATURE_FIELDS)
        .ok_or_else(|| ModelError::MissingField(TEMPERATURE_FIELDS.join("|")))?;
    let energy_col = match energy_field {
        Some(name) => columns
            .find(name)
            .ok_or_else(|| ModelError::MissingField(name.to_uppercase()))?,
        None => columns
            .first_of(ENERGY_FIELDS)
            .ok_or_else(|| ModelError::MissingField(ENERGY_FIELDS.join("|")))?,
    };

    let mut data = TrainingData {
        temperature_field: columns.names[temp_col].clone(),
        energy_field: columns.names[energy_col].clone(),
        header,
        building_id,
        naics,
        ..TrainingData::default()
    };

    for row in data_rows(&mut recs, &columns) {
        let (ts, record) = row?;
        if !season.contains(ts.date()) {
            continue;
        }
        if data.temperatures.contains_key(&ts) {
            warn!("Duplicate timestamp [{}], later reading kept", ts);
        }
        data.temperatures.insert(ts, read_value(&record, temp_col));
        data.energy.insert(ts, read_value(&record, energy_col));
    }

    info!(
        "Training data for [{}]: {} reading(s) of [{}] vs [{}]",
        data.building_id,
        data.temperatures.len(),
        data.energy_field,
        data.temperature_field
    );
    Ok(data)
}

/// Open and parse a training file from disk.
pub fn read_training_file(
    path: &Path,
    season: &TrainingSeason,
    energy_field: Option<&str>,
) -> Result<TrainingData, ModelError> {
    let file = File::open(path)?;
    parse_training(BufReader::new(file), season, energy_field)
}

/// Parse a forecast input file: header and temperature series only.
pub fn parse_forecast_input<R: Read>(reader: R) -> Result<ForecastInput, ModelError> {
    let mut recs = records(reader);
    let header = read_header(&mut recs)?;
    let building_id = building_id(&header)?;

    let columns = open_time_series(&mut recs)?;
    let temp_col = columns
        .first_of(TEMPERATURE_FIELDS)
        .ok_or_else(|| ModelError::MissingField(TEMPERATURE_FIELDS.join("|")))?;

    let mut temperatures = IntervalSeries::new();
    for row in data_rows(&mut recs, &columns) {
        let (ts, record) = row?;
        temperatures.insert(ts, read_value(&record, temp_col));
    }

    info!(
        "Forecast input for [{}]: {} temperature reading(s)",
        building_id,
        temperatures.len()
    );
    Ok(ForecastInput {
        header,
        building_id,
        temperature_field: columns.names[temp_col].clone(),
        temperatures,
    })
}

/// Open and parse a forecast input file from disk.
pub fn read_forecast_file(path: &Path) -> Result<ForecastInput, ModelError> {
    let file = File::open(path)?;
    parse_forecast_input(BufReader::new(file))
}
