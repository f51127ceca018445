use crate::error::{ProcessingError, Result};
use crate::utils::constants::DEFAULT_PAGE_LIMIT;
use chrono::NaiveDate;
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Skip/limit window over an id-ordered result set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Pagination {
    pub skip: u32,

    #[validate(range(min = 1, max = 1000))]
    pub limit: u32,
}

impl Pagination {
    pub fn new(skip: u32, limit: u32) -> Self {
        Self { skip, limit }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

/// Filter over raw observations. Date bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservationFilter {
    pub station_id: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl ObservationFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_station(mut self, station_id: impl Into<String>) -> Self {
        self.station_id = Some(station_id.into());
        self
    }

    pub fn with_start_date(mut self, start: NaiveDate) -> Self {
        self.start_date = Some(start);
        self
    }

    pub fn with_end_date(mut self, end: NaiveDate) -> Self {
        self.end_date = Some(end);
        self
    }

    pub fn check(&self) -> Result<()> {
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(ProcessingError::InvalidQuery(format!(
                    "start date {} is after end date {}",
                    start, end
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn where_clause(&self) -> (String, Vec<Value>) {
        let mut clauses = Vec::new();
        let mut params = Vec::new();

        if let Some(ref station) = self.station_id {
            clauses.push("station_id = ?");
            params.push(Value::Text(station.clone()));
        }
        if let Some(start) = self.start_date {
            clauses.push("date >= ?");
            params.push(date_value(start));
        }
        if let Some(end) = self.end_date {
            clauses.push("date <= ?");
            params.push(date_value(end));
        }

        (join_clauses(&clauses), params)
    }
}

/// Filter over yearly statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsFilter {
    pub station_id: Option<String>,
    pub year: Option<i32>,
}

impl StatsFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_station(mut self, station_id: impl Into<String>) -> Self {
        self.station_id = Some(station_id.into());
        self
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub(crate) fn where_clause(&self) -> (String, Vec<Value>) {
        let mut clauses = Vec::new();
        let mut params = Vec::new();

        if let Some(ref station) = self.station_id {
            clauses.push("station_id = ?");
            params.push(Value::Text(station.clone()));
        }
        if let Some(year) = self.year {
            clauses.push("year = ?");
            params.push(Value::Integer(i64::from(year)));
        }

        (join_clauses(&clauses), params)
    }
}

// Same text layout rusqlite uses when binding a NaiveDate.
fn date_value(date: NaiveDate) -> Value {
    Value::Text(date.format("%Y-%m-%d").to_string())
}

fn join_clauses(clauses: &[&str]) -> String {
    if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    }
}
