use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// One station-day of observations. Absent values stay `None`, never zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub station_id: String,
    pub date: NaiveDate,
    /// Degrees Celsius
    pub max_temp: Option<f64>,
    /// Degrees Celsius
    pub min_temp: Option<f64>,
    /// Millimetres
    pub precip: Option<f64>,
}

impl ObservationRecord {
    pub fn new(
        station_id: impl Into<String>,
        date: NaiveDate,
        max_temp: Option<f64>,
        min_temp: Option<f64>,
        precip: Option<f64>,
    ) -> Self {
        Self {
            station_id: station_id.into(),
            date,
            max_temp,
            min_temp,
            precip,
        }
    }

    pub fn year(&self) -> i32 {
        self.date.year()
    }
}

/// An observation as persisted in the raw store, with its surrogate key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredObservation {
    pub id: i64,
    #[serde(flatten)]
    pub record: ObservationRecord,
}
