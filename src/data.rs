use chrono::NaiveDate;
use tracing::warn;

use crate::defaults::MIN_REGRESSION_POINTS;
use crate::types::{DailyAggregate, ModelError};

/// Date-aligned (temperature, energy) pairs ready for regression.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AlignedPairs {
    pub dates: Vec<NaiveDate>,
    pub temperatures: Vec<f64>,
    pub energy: Vec<f64>,
}

impl AlignedPairs {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

/// Inner-join two daily aggregates on date and drop non-finite pairs.
///
/// Dates present in only one aggregate are ignored. A pair where either side
/// is `NaN` or infinite is omitted with a warning.
///
/// # Errors
/// Returns `ModelError::InsufficientData` if fewer than three clean pairs remain.
pub fn validate_and_align(
    temperatures: &DailyAggregate,
    energy: &DailyAggregate,
) -> Result<AlignedPairs, ModelError> {
    let mut pairs = AlignedPairs::default();

    for (&date, &temp) in temperatures {
        let Some(&e) = energy.get(&date) else {
            continue;
        };
        if !temp.is_finite() || !e.is_finite() {
            warn!("Omitting data from [{}]", date.format("%Y-%m-%d"));
            continue;
        }
        pairs.dates.push(date);
        pairs.temperatures.push(temp);
        pairs.energy.push(e);
    }

    if pairs.len() < MIN_REGRESSION_POINTS {
        return Err(ModelError::InsufficientData {
            needed: MIN_REGRESSION_POINTS,
            got: pairs.len(),
        });
    }

    Ok(pairs)
}
