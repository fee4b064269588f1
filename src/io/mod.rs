//! Readers and writers for the building data files.
//!
//! Every file is comma separated. Blank lines and lines starting with `#` are
//! comments. Field names are trimmed and compared upper-case.

use std::io::Read;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use csv::StringRecord;

use crate::types::ModelError;

mod calendar;
mod timeseries;
mod writer;

pub use calendar::{
    naics_working_days, parse_holidays, parse_supp, parse_workday_end, parse_working_days,
    read_holiday_file, read_supp_file, SuppSettings,
};
pub use timeseries::{
    parse_forecast_input, parse_training, read_forecast_file, read_training_file, ForecastInput,
    TrainingData, ENERGY_FIELDS, TEMPERATURE_FIELDS,
};
pub use writer::{output_path, write_forecast, write_forecast_file, ForecastReport};

pub const FIELD_BUILDING_ID: &str = "BUILDINGID";
pub const FIELD_NAICS: &str = "BUILDINGTYPE.NAICS";
pub const TIME_SERIES_MARKER: &str = "TIME.LOCAL";

const TIMESTAMP_FORMATS: &[&str] = &[
    "%m/%d/%y %H:%M:%S",
    "%m/%d/%y %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%y", "%m/%d/%Y", "%Y/%m/%d"];

type Records<R> = csv::StringRecordsIntoIter<R>;

fn records<R: Read>(reader: R) -> Records<R> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(reader)
        .into_records()
}

fn line_of(record: &StringRecord) -> u64 {
    record.position().map_or(0, |p| p.line())
}

fn first_field_upper(record: &StringRecord) -> String {
    record.get(0).unwrap_or_default().to_uppercase()
}

/// Name/value pairs from the first two non-comment lines, in file order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Header {
    fields: Vec<(String, String)>,
}

impl Header {
    /// Pair up a names line with a values line. Columns with an empty name are dropped.
    pub fn from_records(names: &StringRecord, values: &StringRecord) -> Result<Self, ModelError> {
        if names.len() != values.len() {
            return Err(ModelError::Parse {
                line: line_of(values),
                message: format!(
                    "header has {} field(s) but {} value(s)",
                    names.len(),
                    values.len()
                ),
            });
        }
        let fields = names
            .iter()
            .zip(values.iter())
            .filter(|(name, _)| !name.is_empty())
            .map(|(name, value)| (name.to_uppercase(), value.to_string()))
            .collect();
        Ok(Self { fields })
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        let name = name.to_uppercase();
        self.fields
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Value of a mandatory field.
    pub fn require(&self, name: &str) -> Result<&str, ModelError> {
        self.get(name)
            .ok_or_else(|| ModelError::MissingField(name.to_uppercase()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Consume records up to and including the header values line.
fn read_header<R: Read>(records: &mut Records<R>) -> Result<Header, ModelError> {
    let names = records.next().ok_or_else(|| ModelError::Parse {
        line: 0,
        message: "file has no header line".to_string(),
    })??;
    let values = records.next().ok_or_else(|| ModelError::Parse {
        line: line_of(&names),
        message: "header names are not followed by a values line".to_string(),
    })??;
    Header::from_records(&names, &values)
}

/// Skip records until one whose first field starts with `marker`, and return it.
fn seek_section<R: Read>(
    records: &mut Records<R>,
    marker: &str,
) -> Result<Option<StringRecord>, ModelError> {
    for record in records.by_ref() {
        let record = record?;
        if first_field_upper(&record).starts_with(marker) {
            return Ok(Some(record));
        }
    }
    Ok(None)
}

/// Parse a time-series timestamp. A bare date reads as midnight.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| parse_date(text).map(|d| d.and_time(NaiveTime::MIN)))
}

/// Parse a calendar date, ignoring any trailing time of day.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .or_else(|| {
            text.split_whitespace()
                .next()
                .filter(|head| head.len() < text.len())
                .and_then(parse_date)
        })
}
