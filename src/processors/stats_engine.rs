use crate::error::Result;
use crate::models::{ObservationRecord, YearlyStats};
use crate::store::WeatherStore;
use crate::utils::constants::MM_PER_CM;
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};
use tracing::{error, info};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsReport {
    pub observations_scanned: usize,
    pub stations: usize,
    pub keys_written: usize,
    pub elapsed: Duration,
}

impl StatsReport {
    pub fn summary(&self) -> String {
        format!(
            "=== Statistics Report ===\nObservations scanned: {}\n\
             Station-years written: {} across {} stations\nElapsed: {:.2?}\n",
            self.observations_scanned, self.keys_written, self.stations, self.elapsed
        )
    }
}

#[derive(Debug, Default)]
struct Accumulator {
    max_sum: f64,
    max_count: usize,
    min_sum: f64,
    min_count: usize,
    precip_sum_mm: f64,
    precip_count: usize,
}

impl Accumulator {
    fn add(&mut self, record: &ObservationRecord) {
        if let Some(t) = record.max_temp {
            self.max_sum += t;
            self.max_count += 1;
        }
        if let Some(t) = record.min_temp {
            self.min_sum += t;
            self.min_count += 1;
        }
        if let Some(p) = record.precip {
            self.precip_sum_mm += p;
            self.precip_count += 1;
        }
    }

    fn finish(self, station_id: String, year: i32) -> YearlyStats {
        YearlyStats {
            station_id,
            year,
            avg_max_temp: mean(self.max_sum, self.max_count),
            avg_min_temp: mean(self.min_sum, self.min_count),
            total_precip: (self.precip_count > 0).then(|| self.precip_sum_mm / MM_PER_CM),
        }
    }
}

fn mean(sum: f64, count: usize) -> Option<f64> {
    (count > 0).then(|| sum / count as f64)
}

/// Aggregate raw observations per (station, calendar year).
///
/// Averages cover non-missing values only; a key with no values for a field gets `None`
/// for that field. Precipitation is summed in millimetres and reported in centimetres.
/// Output is ordered by station then year.
pub fn aggregate_yearly(records: &[ObservationRecord]) -> Vec<YearlyStats> {
    let mut groups: BTreeMap<(String, i32), Accumulator> = BTreeMap::new();
    for record in records {
        groups
            .entry((record.station_id.clone(), record.year()))
            .or_default()
            .add(record);
    }

    groups
        .into_iter()
        .map(|((station_id, year), acc)| acc.finish(station_id, year))
        .collect()
}

/// Rebuilds the derived yearly table from the full raw table
#[derive(Debug, Default)]
pub struct StatisticsEngine;

impl StatisticsEngine {
    pub fn new() -> Self {
        Self
    }

    /// Full scan, aggregate, then replace every computed key in a single transaction.
    /// On failure the derived table keeps its previous contents.
    pub fn recompute(&self, store: &mut WeatherStore) -> Result<StatsReport> {
        let start = Instant::now();
        info!("Statistics recomputation started");

        let records = store.all_observations()?;
        let stats = aggregate_yearly(&records);
        let stations: BTreeSet<&str> = stats.iter().map(|s| s.station_id.as_str()).collect();

        let mut report = StatsReport {
            observations_scanned: records.len(),
            stations: stations.len(),
            ..Default::default()
        };

        report.keys_written = store.replace_yearly_stats(&stats).inspect_err(|e| {
            error!(error = %e, "Statistics replacement rolled back");
        })?;
        report.elapsed = start.elapsed();

        info!(
            keys = report.keys_written,
            stations = report.stations,
            elapsed = ?report.elapsed,
            "Statistics recomputation finished"
        );
        Ok(report)
    }
}
