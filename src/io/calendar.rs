use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime, Weekday};
use tracing::{info, warn};

use super::{parse_date, read_header, records, seek_section, Header, Records, FIELD_BUILDING_ID};
use crate::aggregate::cap_max_window;
use crate::defaults::{
    DEFAULT_ENERGY_THRESHOLD, DEFAULT_SUPP_MAX_WINDOW, DEFAULT_SUPP_MIN_WINDOW,
    DEFAULT_WORKDAY_END_HOUR,
};
use crate::types::{CalendarPolicy, LagGrid, ModelError, SearchOptions, TrainingSeason, WindowGrid};

const HOLIDAY_MARKER: &str = "DATE";
const NON_WORKING_MARKER: &str = "NONWORKINGDAYS";

const FIELD_LAG_WINDOW: &str = "LAGWINDOW";
const FIELD_WORKING_DAYS: &str = "WORKINGDAYS";
const FIELD_ENERGY_TO_MODEL: &str = "ENERGYTOMODEL";
const FIELD_SEASON_START: &str = "TRAININGSEASONSTARTDATE";
const FIELD_SEASON_END: &str = "TRAININGSEASONENDDATE";
const FIELD_WORKING_DAY_END: &str = "WORKINGDAYEND";
const FIELD_MIN_WINDOW: &str = "MINWINDOWSIZE";
const FIELD_MAX_WINDOW: &str = "MAXWINDOWSIZE";
const FIELD_ENERGY_THRESHOLD: &str = "ENERGYTHRESHOLD";

const RETAIL_NAICS_PREFIXES: &[&str] = &["44", "45"];

/// Settings read from a supplementary building file.
#[derive(Clone, Debug, PartialEq)]
pub struct SuppSettings {
    pub building_id: String,
    pub lag_hours: f64,
    pub working_weekdays: Vec<Weekday>,
    pub energy_to_model: String,
    pub season: TrainingSeason,
    pub working_day_end: NaiveTime,
    pub min_window: u32,
    pub max_window: u32,
    pub energy_threshold: f64,
    pub non_working_days: BTreeSet<NaiveDate>,
}

impl SuppSettings {
    /// Search a single lag over `min_window..=max_window`, with the maximum
    /// capped so no window starts before midnight.
    ///
    /// If the cap falls below `min_window`, the minimum is lowered to the cap.
    pub fn search_options(&self, parallel: bool) -> SearchOptions {
        let end = cap_max_window(self.working_day_end, self.lag_hours, self.max_window);
        let start = if self.min_window > end {
            warn!(
                "{} [{}] exceeds the largest window that fits before {} with lag {} h, using {}",
                FIELD_MIN_WINDOW, self.min_window, self.working_day_end, self.lag_hours, end
            );
            end
        } else {
            self.min_window
        };
        SearchOptions {
            lags: LagGrid::single(self.lag_hours),
            windows: WindowGrid {
                start,
                end,
                step: 1,
            },
            parallel,
        }
    }

    /// Overlay these settings on an existing policy.
    pub fn apply_to(&self, policy: CalendarPolicy) -> CalendarPolicy {
        policy
            .with_non_working_days(self.non_working_days.iter().copied())
            .with_working_weekdays(self.working_weekdays.clone())
            .with_working_day_end(self.working_day_end)
            .with_energy_threshold(self.energy_threshold)
    }
}

/// Parse a working-week digit string such as `"23456"` (1 = Sunday, 7 = Saturday).
///
/// Duplicate digits are ignored; the first occurrence keeps its position.
pub fn parse_working_days(text: &str) -> Result<Vec<Weekday>, ModelError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ModelError::InvalidConfig(
            "working days must name at least one weekday".to_string(),
        ));
    }
    let mut days = Vec::with_capacity(7);
    for ch in text.chars() {
        let day = match ch {
            '1' => Weekday::Sun,
            '2' => Weekday::Mon,
            '3' => Weekday::Tue,
            '4' => Weekday::Wed,
            '5' => Weekday::Thu,
            '6' => Weekday::Fri,
            '7' => Weekday::Sat,
            other => {
                return Err(ModelError::InvalidConfig(format!(
                    "weekday '{other}' not in range 1..7"
                )))
            }
        };
        if !days.contains(&day) {
            days.push(day);
        }
    }
    Ok(days)
}

/// Monday to Friday, plus the weekend for retail NAICS codes (`44xxxx`, `45xxxx`).
pub fn naics_working_days(naics: Option<&str>) -> Vec<Weekday> {
    let mut days = vec![
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
    ];
    let retail = naics.map(str::trim).is_some_and(|code| {
        code.len() > 2 && RETAIL_NAICS_PREFIXES.iter().any(|p| code.starts_with(p))
    });
    if retail {
        days.push(Weekday::Sat);
        days.push(Weekday::Sun);
    }
    days
}

/// Parse a working-day end time: `HH:MM`, `HH:MM:SS` or `HHMM`.
pub fn parse_workday_end(text: &str) -> Result<NaiveTime, ModelError> {
    let text = text.trim();
    let normalized = if text.len() == 4 && text.chars().all(|c| c.is_ascii_digit()) {
        format!("{}:{}", &text[..2], &text[2..])
    } else {
        text.to_string()
    };
    NaiveTime::parse_from_str(&normalized, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(&normalized, "%H:%M"))
        .map_err(|_| ModelError::InvalidConfig(format!("invalid working day end '{text}'")))
}

/// Read every date after the first line starting with `marker`. Bad lines are skipped.
fn read_date_section<R: Read>(
    records: &mut Records<R>,
    marker: &str,
) -> Result<BTreeSet<NaiveDate>, ModelError> {
    let mut dates = BTreeSet::new();
    if seek_section(records, marker)?.is_none() {
        warn!("No [{}] section found", marker);
        return Ok(dates);
    }
    for record in records {
        let record = record?;
        let raw = record.get(0).unwrap_or_default();
        match parse_date(raw) {
            Some(date) => {
                dates.insert(date);
            }
            None => warn!("Invalid date format: [{}], skipping...", raw),
        }
    }
    Ok(dates)
}

/// Parse a holiday file: one date per line after a `DATE` line.
pub fn parse_holidays<R: Read>(reader: R) -> Result<BTreeSet<NaiveDate>, ModelError> {
    let mut recs = records(reader);
    let holidays = read_date_section(&mut recs, HOLIDAY_MARKER)?;
    info!("Holiday file read: {} date(s)", holidays.len());
    Ok(holidays)
}

pub fn read_holiday_file(path: &Path) -> Result<BTreeSet<NaiveDate>, ModelError> {
    let file = File::open(path)?;
    parse_holidays(BufReader::new(file))
}

/// Optional numeric header field, falling back to `default` with a warning.
fn optional<T>(header: &Header, name: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match header.get(name).filter(|v| !v.is_empty()) {
        Some(raw) => match raw.parse::<T>() {
            Ok(value) => {
                info!("Extracted [{}] = [{}]", name, value);
                value
            }
            Err(_) => {
                warn!("[{}] format error, using default value: [{}]", name, default);
                default
            }
        },
        None => {
            warn!("[{}] absent or empty, using default value: [{}]", name, default);
            default
        }
    }
}

/// Parse a supplementary settings file.
///
/// # Errors
/// * `ModelError::MissingField` for a missing mandatory header field
/// * `ModelError::InvalidConfig` for an unreadable lag, working-day string or
///   training season
pub fn parse_supp<R: Read>(reader: R) -> Result<SuppSettings, ModelError> {
    let mut recs = records(reader);
    let header = read_header(&mut recs)?;

    let building_id = header.require(FIELD_BUILDING_ID)?.to_string();
    let lag_raw = header.require(FIELD_LAG_WINDOW)?;
    let lag_hours: f64 = lag_raw
        .parse()
        .ok()
        .filter(|lag: &f64| lag.is_finite() && *lag >= 0.0)
        .ok_or_else(|| ModelError::InvalidConfig(format!("invalid lag window '{lag_raw}'")))?;
    let working_weekdays = parse_working_days(header.require(FIELD_WORKING_DAYS)?)?;
    let energy_to_model = header.require(FIELD_ENERGY_TO_MODEL)?.to_uppercase();
    let season = TrainingSeason {
        start_mmdd: TrainingSeason::parse_mmdd(header.require(FIELD_SEASON_START)?)?,
        end_mmdd: TrainingSeason::parse_mmdd(header.require(FIELD_SEASON_END)?)?,
    };

    let default_end =
        NaiveTime::from_hms_opt(DEFAULT_WORKDAY_END_HOUR, 0, 0).unwrap_or(NaiveTime::MIN);
    let working_day_end = match header.get(FIELD_WORKING_DAY_END).filter(|v| !v.is_empty()) {
        Some(raw) => parse_workday_end(raw).unwrap_or_else(|_| {
            warn!(
                "[{}] format error, using default value: [{}]",
                FIELD_WORKING_DAY_END, default_end
            );
            default_end
        }),
        None => {
            warn!(
                "[{}] absent or empty, using default value: [{}]",
                FIELD_WORKING_DAY_END, default_end
            );
            default_end
        }
    };
    let min_window = optional(&header, FIELD_MIN_WINDOW, DEFAULT_SUPP_MIN_WINDOW);
    let max_window = optional(&header, FIELD_MAX_WINDOW, DEFAULT_SUPP_MAX_WINDOW);
    let energy_threshold = optional(&header, FIELD_ENERGY_THRESHOLD, DEFAULT_ENERGY_THRESHOLD);

    let non_working_days = read_date_section(&mut recs, NON_WORKING_MARKER)?;

    info!(
        "Supplementary settings for [{}]: lag [{}] windows [{}..={}] {} non-working day(s)",
        building_id,
        lag_hours,
        min_window,
        max_window,
        non_working_days.len()
    );
    Ok(SuppSettings {
        building_id,
        lag_hours,
        working_weekdays,
        energy_to_model,
        season,
        working_day_end,
        min_window,
        max_window,
        energy_threshold,
        non_working_days,
    })
}

pub fn read_supp_file(path: &Path) -> Result<SuppSettings, ModelError> {
    let file = File::open(path)?;
    parse_supp(BufReader::new(file))
}
