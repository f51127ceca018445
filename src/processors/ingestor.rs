use crate::config::Settings;
use crate::error::{ProcessingError, Result};
use crate::models::ObservationRecord;
use crate::readers::{ConcurrentReader, ParseBatch};
use crate::store::WeatherStore;
use crate::utils::progress::ProgressReporter;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Counters for one ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub files_discovered: usize,
    pub files_parsed: usize,
    pub files_failed: usize,
    pub skipped_lines: usize,
    pub candidates: usize,
    pub batch_duplicates: usize,
    pub already_present: usize,
    pub inserted: usize,
    pub stations: usize,
    pub elapsed: Duration,
}

impl IngestReport {
    pub fn summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str("=== Ingestion Report ===\n");
        summary.push_str(&format!(
            "Files: {} discovered, {} parsed, {} failed\n",
            self.files_discovered, self.files_parsed, self.files_failed
        ));
        summary.push_str(&format!("Malformed lines skipped: {}\n", self.skipped_lines));
        summary.push_str(&format!(
            "Candidates: {} ({} repeated within batch, {} already stored)\n",
            self.candidates, self.batch_duplicates, self.already_present
        ));
        summary.push_str(&format!(
            "New records inserted: {} across {} stations\n",
            self.inserted, self.stations
        ));
        summary.push_str(&format!("Elapsed: {:.2?}\n", self.elapsed));
        summary
    }
}

/// Loads a directory of station files into the raw store, each observation exactly once.
///
/// Parsing fans out across the reader's worker pool; everything after the join runs on
/// the calling thread against the one store handle it was given.
pub struct Ingestor {
    reader: ConcurrentReader,
}

impl Ingestor {
    pub fn new(reader: ConcurrentReader) -> Self {
        Self { reader }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            ConcurrentReader::new(settings.max_workers)
                .with_sequential(settings.sequential)
                .with_extension(&settings.file_extension)
                .with_mmap(settings.use_mmap),
        )
    }

    pub fn ingest_directory(
        &self,
        store: &mut WeatherStore,
        data_dir: &Path,
        progress: Option<&ProgressReporter>,
    ) -> Result<IngestReport> {
        let start = Instant::now();
        info!(data_dir = %data_dir.display(), "Ingestion started");

        let files = self.reader.discover_files(data_dir)?;
        info!(files = files.len(), "Discovered station files");
        if let Some(p) = progress {
            p.set_length(files.len() as u64);
            p.set_message("Parsing station files...");
        }

        let batch = self.reader.read_all(&files, progress)?;

        if let Some(p) = progress {
            p.finish_with_message(&format!("Parsed {} files", files.len()));
        }

        let mut report = IngestReport {
            files_discovered: files.len(),
            ..Default::default()
        };
        let result = self.ingest_batch(store, batch, &mut report);
        report.elapsed = start.elapsed();

        match result {
            Ok(()) => {
                info!(
                    files = report.files_parsed,
                    failed = report.files_failed,
                    skipped_lines = report.skipped_lines,
                    inserted = report.inserted,
                    elapsed = ?report.elapsed,
                    "Ingestion finished"
                );
                Ok(report)
            }
            Err(e) => {
                error!(
                    inserted = report.inserted,
                    elapsed = ?report.elapsed,
                    error = %e,
                    "Ingestion aborted; re-run to resume"
                );
                Err(ProcessingError::IngestAborted {
                    inserted: report.inserted,
                    source: Box::new(e),
                })
            }
        }
    }

    /// Deduplicate a joined parse batch and write it station by station.
    /// `report.inserted` only ever counts committed rows.
    pub fn ingest_batch(
        &self,
        store: &mut WeatherStore,
        batch: ParseBatch,
        report: &mut IngestReport,
    ) -> Result<()> {
        report.files_parsed = batch.parsed_count();
        report.files_failed = batch.failed_count();
        report.skipped_lines = batch.skipped_lines();
        report.candidates = batch.candidate_count();
        if report.files_failed > 0 {
            warn!(failed = report.files_failed, "Some station files contributed no records");
        }

        let (by_station, batch_duplicates) = group_by_station(batch.into_candidates());
        report.batch_duplicates = batch_duplicates;
        report.stations = by_station.len();

        for (station_id, candidates) in &by_station {
            let outcome = store.insert_new_observations(station_id, candidates)?;
            report.inserted += outcome.inserted;
            report.already_present += outcome.already_present;
            if outcome.inserted == 0 {
                debug!(station = %station_id, "No new records");
            } else {
                debug!(station = %station_id, inserted = outcome.inserted, "Inserted new records");
            }
        }

        Ok(())
    }
}

impl Default for Ingestor {
    fn default() -> Self {
        Self::new(ConcurrentReader::default())
    }
}

/// Group candidates by station, keeping the first occurrence of each (station, date).
/// Returns the groups and how many later repeats were dropped.
pub fn group_by_station(
    candidates: Vec<ObservationRecord>,
) -> (BTreeMap<String, Vec<ObservationRecord>>, usize) {
    let mut seen = HashSet::new();
    let mut duplicates = 0;
    let mut groups: BTreeMap<String, Vec<ObservationRecord>> = BTreeMap::new();

    for record in candidates {
        if !seen.insert((record.station_id.clone(), record.date)) {
            duplicates += 1;
            continue;
        }
        groups
            .entry(record.station_id.clone())
            .or_default()
            .push(record);
    }

    (groups, duplicates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 1, d).unwrap()
    }

    #[test]
    fn test_group_by_station_drops_repeats() {
        let candidates = vec![
            ObservationRecord::new("B", day(1), Some(1.0), None, None),
            ObservationRecord::new("A", day(1), Some(2.0), None, None),
            ObservationRecord::new("B", day(1), Some(9.0), None, None),
            ObservationRecord::new("B", day(2), Some(3.0), None, None),
        ];

        let (groups, duplicates) = group_by_station(candidates);
        assert_eq!(duplicates, 1);
        assert_eq!(groups.keys().collect::<Vec<_>>(), vec!["A", "B"]);
        assert_eq!(groups["B"].len(), 2);
        assert_eq!(groups["B"][0].max_temp, Some(1.0));
    }

    #[test]
    fn test_ingest_directory_counts() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("S1.txt"),
            "20220101\t100\t0\t10\n20220102\t120\t20\t-9999\nshort\tline\n",
        )
        .unwrap();
        fs::write(dir.path().join("S2.txt"), "20220101\t-9999\t50\t10\n").unwrap();

        let mut store = WeatherStore::open_in_memory().unwrap();
        let ingestor = Ingestor::new(ConcurrentReader::new(2));
        let report = ingestor
            .ingest_directory(&mut store, dir.path(), None)
            .unwrap();

        assert_eq!(report.files_discovered, 2);
        assert_eq!(report.files_parsed, 2);
        assert_eq!(report.files_failed, 0);
        assert_eq!(report.skipped_lines, 1);
        assert_eq!(report.candidates, 3);
        assert_eq!(report.inserted, 3);
        assert_eq!(report.stations, 2);
        assert!(report.summary().contains("New records inserted: 3"));

        let again = ingestor
            .ingest_directory(&mut store, dir.path(), None)
            .unwrap();
        assert_eq!(again.inserted, 0);
        assert_eq!(again.already_present, 3);
        assert_eq!(store.count_observations().unwrap(), 3);
    }

    #[test]
    fn test_store_failure_reports_committed_count() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("A1.txt"), "20220101\t100\t0\t10\n").unwrap();
        fs::write(
            dir.path().join("B2.txt"),
            "20220101\t100\t0\t10\n20220102\t100\t0\t10\n",
        )
        .unwrap();

        let mut store = WeatherStore::open_in_memory().unwrap();
        store
            .connection()
            .execute_batch(
                "CREATE TRIGGER reject_b2 BEFORE INSERT ON weather_records
                 WHEN NEW.station_id = 'B2' AND NEW.date = '2022-01-02'
                 BEGIN SELECT RAISE(ABORT, 'simulated write failure'); END;",
            )
            .unwrap();

        let err = Ingestor::new(ConcurrentReader::new(1))
            .ingest_directory(&mut store, dir.path(), None)
            .unwrap_err();

        assert_eq!(err.committed_records(), Some(1));
        // A1 committed; B2 rolled back in full, including its first row.
        assert_eq!(store.list_stations().unwrap(), vec!["A1"]);
        assert_eq!(store.count_observations().unwrap(), 1);
    }
}
