use serde::{Deserialize, Serialize};

/// Aggregates for one station-year, derived entirely from raw observations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearlyStats {
    pub station_id: String,
    pub year: i32,
    /// Degrees Celsius
    pub avg_max_temp: Option<f64>,
    /// Degrees Celsius
    pub avg_min_temp: Option<f64>,
    /// Centimetres
    pub total_precip: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredYearlyStats {
    pub id: i64,
    #[serde(flatten)]
    pub stats: YearlyStats,
}
