use crate::error::{ProcessingError, Result};
use crate::models::{ObservationRecord, StoredObservation, StoredYearlyStats, YearlyStats};
use crate::store::query::{ObservationFilter, Pagination, StatsFilter};
use crate::utils::constants::SQLITE_BUSY_TIMEOUT_MS;
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row, TransactionBehavior};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use validator::Validate;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS weather_records (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  station_id TEXT NOT NULL CHECK (length(station_id) > 0),
  date TEXT NOT NULL,
  max_temp REAL,
  min_temp REAL,
  precip REAL,
  CONSTRAINT uix_station_date UNIQUE (station_id, date)
);

CREATE INDEX IF NOT EXISTS idx_weather_records_date ON weather_records(date);

CREATE TABLE IF NOT EXISTS weather_stats (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  station_id TEXT NOT NULL CHECK (length(station_id) > 0),
  year INTEGER NOT NULL,
  avg_max_temp REAL,
  avg_min_temp REAL,
  total_precip REAL,
  CONSTRAINT uix_station_year UNIQUE (station_id, year)
);

CREATE INDEX IF NOT EXISTS idx_weather_stats_year ON weather_stats(year);
";

const INSERT_OBSERVATION: &str = "INSERT INTO weather_records
     (station_id, date, max_temp, min_temp, precip)
     VALUES (?1, ?2, ?3, ?4, ?5)";

const DELETE_STATS_KEY: &str = "DELETE FROM weather_stats WHERE station_id = ?1 AND year = ?2";

const INSERT_STATS: &str = "INSERT INTO weather_stats
     (station_id, year, avg_max_temp, avg_min_temp, total_precip)
     VALUES (?1, ?2, ?3, ?4, ?5)";

/// Counts from one per-station insert transaction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    pub inserted: usize,
    pub already_present: usize,
}

/// Raw and derived weather tables behind one SQLite connection.
///
/// The handle is opened explicitly for a run and the connection is released when it drops.
/// Every write goes through a transaction; an uncommitted transaction rolls back on drop,
/// including on early return through `?`.
pub struct WeatherStore {
    conn: Connection,
}

impl WeatherStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(path = %path.display(), journal_mode = %mode, "Opened weather store");
        Self::initialise(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::initialise(Connection::open_in_memory()?)
    }

    fn initialise(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_millis(u64::from(SQLITE_BUSY_TIMEOUT_MS)))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Dates already stored for a station
    pub fn existing_dates(&self, station_id: &str) -> Result<HashSet<NaiveDate>> {
        dates_for_station(&self.conn, station_id)
    }

    /// Insert the candidates whose date is not yet stored for `station_id`, in one transaction.
    ///
    /// The existing-date snapshot is read inside the same IMMEDIATE transaction that writes,
    /// so no other writer can slip rows in between. The table's unique constraint still
    /// rejects anything that gets past the filter, failing the whole transaction.
    pub fn insert_new_observations(
        &mut self,
        station_id: &str,
        candidates: &[ObservationRecord],
    ) -> Result<InsertOutcome> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing = dates_for_station(&tx, station_id)?;
        let mut outcome = InsertOutcome::default();
        {
            let mut stmt = tx.prepare_cached(INSERT_OBSERVATION)?;
            for record in candidates {
                if existing.contains(&record.date) {
                    outcome.already_present += 1;
                    continue;
                }
                stmt.execute(params![
                    station_id,
                    record.date,
                    record.max_temp,
                    record.min_temp,
                    record.precip,
                ])?;
                outcome.inserted += 1;
            }
        }

        tx.commit()?;
        Ok(outcome)
    }

    /// Full scan of the raw table
    pub fn all_observations(&self) -> Result<Vec<ObservationRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT station_id, date, max_temp, min_temp, precip FROM weather_records ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ObservationRecord {
                station_id: row.get(0)?,
                date: row.get(1)?,
                max_temp: row.get(2)?,
                min_temp: row.get(3)?,
                precip: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Replace the derived row for every key in `stats`: delete then insert, one transaction.
    /// Rows for keys not in `stats` are left alone.
    pub fn replace_yearly_stats(&mut self, stats: &[YearlyStats]) -> Result<usize> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
            let mut delete = tx.prepare_cached(DELETE_STATS_KEY)?;
            let mut insert = tx.prepare_cached(INSERT_STATS)?;
            for row in stats {
                delete.execute(params![row.station_id, row.year])?;
                insert.execute(params![
                    row.station_id,
                    row.year,
                    row.avg_max_temp,
                    row.avg_min_temp,
                    row.total_precip,
                ])?;
            }
        }
        tx.commit()?;
        Ok(stats.len())
    }

    pub fn count_observations(&self) -> Result<usize> {
        count_rows(&self.conn, "SELECT COUNT(*) FROM weather_records")
    }

    pub fn count_stats(&self) -> Result<usize> {
        count_rows(&self.conn, "SELECT COUNT(*) FROM weather_stats")
    }

    /// Raw records matching `filter`, in insertion order
    pub fn list_observations(
        &self,
        filter: &ObservationFilter,
        page: Pagination,
    ) -> Result<Vec<StoredObservation>> {
        page.validate()?;
        filter.check()?;

        let (where_sql, params) = filter.where_clause();
        let sql = format!(
            "SELECT id, station_id, date, max_temp, min_temp, precip \
             FROM weather_records{} ORDER BY id LIMIT ? OFFSET ?",
            where_sql
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(with_page(params, page)), observation_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Yearly statistics matching `filter`, in insertion order
    pub fn list_yearly_stats(
        &self,
        filter: &StatsFilter,
        page: Pagination,
    ) -> Result<Vec<StoredYearlyStats>> {
        page.validate()?;

        let (where_sql, params) = filter.where_clause();
        let sql = format!(
            "SELECT id, station_id, year, avg_max_temp, avg_min_temp, total_precip \
             FROM weather_stats{} ORDER BY id LIMIT ? OFFSET ?",
            where_sql
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(with_page(params, page)), stats_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Distinct station ids in the raw table, ascending
    pub fn list_stations(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT station_id FROM weather_records ORDER BY station_id")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<String>>>()?)
    }
}

fn dates_for_station(conn: &Connection, station_id: &str) -> Result<HashSet<NaiveDate>> {
    let mut stmt = conn.prepare_cached("SELECT date FROM weather_records WHERE station_id = ?1")?;
    let rows = stmt.query_map(params![station_id], |row| row.get::<_, NaiveDate>(0))?;
    Ok(rows.collect::<rusqlite::Result<HashSet<_>>>()?)
}

fn count_rows(conn: &Connection, sql: &str) -> Result<usize> {
    let count: i64 = conn.query_row(sql, [], |row| row.get(0))?;
    usize::try_from(count)
        .map_err(|_| ProcessingError::InvalidFormat(format!("Invalid row count: {}", count)))
}

fn with_page(mut params: Vec<Value>, page: Pagination) -> Vec<Value> {
    params.push(Value::Integer(i64::from(page.limit)));
    params.push(Value::Integer(i64::from(page.skip)));
    params
}

fn observation_row(row: &Row<'_>) -> rusqlite::Result<StoredObservation> {
    Ok(StoredObservation {
        id: row.get(0)?,
        record: ObservationRecord {
            station_id: row.get(1)?,
            date: row.get(2)?,
            max_temp: row.get(3)?,
            min_temp: row.get(4)?,
            precip: row.get(5)?,
        },
    })
}

fn stats_row(row: &Row<'_>) -> rusqlite::Result<StoredYearlyStats> {
    Ok(StoredYearlyStats {
        id: row.get(0)?,
        stats: YearlyStats {
            station_id: row.get(1)?,
            year: row.get(2)?,
            avg_max_temp: row.get(3)?,
            avg_min_temp: row.get(4)?,
            total_precip: row.get(5)?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn seeded_store() -> WeatherStore {
        let mut store = WeatherStore::open_in_memory().unwrap();
        store
            .insert_new_observations(
                "TEST01",
                &[
                    ObservationRecord::new(
                        "TEST01",
                        day(2022, 1, 1),
                        Some(10.0),
                        Some(0.0),
                        Some(5.0),
                    ),
                    ObservationRecord::new(
                        "TEST01",
                        day(2022, 1, 2),
                        Some(12.0),
                        Some(2.0),
                        Some(0.0),
                    ),
                ],
            )
            .unwrap();
        store
            .insert_new_observations(
                "TEST02",
                &[ObservationRecord::new(
                    "TEST02",
                    day(2022, 1, 1),
                    Some(15.0),
                    Some(5.0),
                    Some(1.0),
                )],
            )
            .unwrap();
        store
    }

    #[test]
    fn test_insert_skips_existing_dates() {
        let mut store = seeded_store();
        let outcome = store
            .insert_new_observations(
                "TEST01",
                &[
                    ObservationRecord::new("TEST01", day(2022, 1, 2), Some(99.0), None, None),
                    ObservationRecord::new("TEST01", day(2022, 1, 3), None, None, None),
                ],
            )
            .unwrap();

        assert_eq!(outcome, InsertOutcome { inserted: 1, already_present: 1 });
        assert_eq!(store.count_observations().unwrap(), 4);

        // The pre-existing row is never overwritten.
        let jan2 = store
            .list_observations(
                &ObservationFilter::new()
                    .with_station("TEST01")
                    .with_start_date(day(2022, 1, 2))
                    .with_end_date(day(2022, 1, 2)),
                Pagination::default(),
            )
            .unwrap();
        assert_eq!(jan2.len(), 1);
        assert_eq!(jan2[0].record.max_temp, Some(12.0));
    }

    #[test]
    fn test_unique_constraint_rolls_back_whole_station() {
        let mut store = WeatherStore::open_in_memory().unwrap();
        let dup = ObservationRecord::new("S1", day(2022, 5, 1), Some(1.0), None, None);
        let result = store.insert_new_observations(
            "S1",
            &[
                ObservationRecord::new("S1", day(2022, 4, 30), Some(1.0), None, None),
                dup.clone(),
                dup,
            ],
        );

        assert!(matches!(result, Err(ProcessingError::Database(_))));
        assert_eq!(store.count_observations().unwrap(), 0);
    }

    #[test]
    fn test_null_round_trip() {
        let mut store = WeatherStore::open_in_memory().unwrap();
        let record = ObservationRecord::new("S1", day(1999, 12, 31), None, Some(-3.5), None);
        store.insert_new_observations("S1", &[record.clone()]).unwrap();

        assert_eq!(store.all_observations().unwrap(), vec![record]);
        assert_eq!(
            store.existing_dates("S1").unwrap(),
            HashSet::from([day(1999, 12, 31)])
        );
    }

    #[test]
    fn test_list_observations_filters() {
        let store = seeded_store();

        let all = store
            .list_observations(&ObservationFilter::new(), Pagination::default())
            .unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].record.station_id, "TEST01");

        let station = store
            .list_observations(
                &ObservationFilter::new().with_station("TEST02"),
                Pagination::default(),
            )
            .unwrap();
        assert_eq!(station.len(), 1);
        assert_eq!(station[0].record.station_id, "TEST02");

        let from_jan2 = store
            .list_observations(
                &ObservationFilter::new().with_start_date(day(2022, 1, 2)),
                Pagination::default(),
            )
            .unwrap();
        assert_eq!(from_jan2.len(), 1);
        assert_eq!(from_jan2[0].record.date, day(2022, 1, 2));

        let until_jan1 = store
            .list_observations(
                &ObservationFilter::new().with_end_date(day(2022, 1, 1)),
                Pagination::default(),
            )
            .unwrap();
        assert_eq!(until_jan1.len(), 2);
    }

    #[test]
    fn test_list_observations_pagination() {
        let store = seeded_store();
        let page = store
            .list_observations(&ObservationFilter::new(), Pagination::new(1, 1))
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].record.date, day(2022, 1, 2));

        let past_end = store
            .list_observations(&ObservationFilter::new(), Pagination::new(10, 5))
            .unwrap();
        assert!(past_end.is_empty());

        let invalid = store.list_observations(&ObservationFilter::new(), Pagination::new(0, 0));
        assert!(matches!(invalid, Err(ProcessingError::Validation(_))));
    }

    #[test]
    fn test_replace_yearly_stats_by_key() {
        let mut store = WeatherStore::open_in_memory().unwrap();
        let first = YearlyStats {
            station_id: "TEST01".to_string(),
            year: 2022,
            avg_max_temp: Some(11.0),
            avg_min_temp: Some(1.0),
            total_precip: Some(0.5),
        };
        let other = YearlyStats {
            station_id: "TEST02".to_string(),
            year: 2022,
            avg_max_temp: Some(15.0),
            avg_min_temp: Some(5.0),
            total_precip: Some(0.1),
        };
        store.replace_yearly_stats(&[first.clone(), other.clone()]).unwrap();

        let updated = YearlyStats {
            avg_max_temp: None,
            ..first
        };
        store.replace_yearly_stats(&[updated.clone()]).unwrap();
        assert_eq!(store.count_stats().unwrap(), 2);

        let rows = store
            .list_yearly_stats(
                &StatsFilter::new().with_station("TEST01").with_year(2022),
                Pagination::default(),
            )
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].stats, updated);

        let untouched = store
            .list_yearly_stats(&StatsFilter::new().with_station("TEST02"), Pagination::default())
            .unwrap();
        assert_eq!(untouched[0].stats, other);

        let wrong_year = store
            .list_yearly_stats(&StatsFilter::new().with_year(2021), Pagination::default())
            .unwrap();
        assert!(wrong_year.is_empty());
    }

    #[test]
    fn test_negative_count_is_an_error() {
        let store = WeatherStore::open_in_memory().unwrap();
        let result = count_rows(store.connection(), "SELECT -1");
        assert!(matches!(result, Err(ProcessingError::InvalidFormat(_))));
        assert_eq!(count_rows(store.connection(), "SELECT 7").unwrap(), 7);
    }

    #[test]
    fn test_list_stations_is_distinct_and_sorted() {
        let store = seeded_store();
        assert_eq!(store.list_stations().unwrap(), vec!["TEST01", "TEST02"]);
    }

    #[test]
    fn test_open_on_disk_is_reusable() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("weather.db");
        {
            let mut store = WeatherStore::open(&path).unwrap();
            store
                .insert_new_observations(
                    "S1",
                    &[ObservationRecord::new("S1", day(2020, 2, 29), None, None, Some(1.2))],
                )
                .unwrap();
        }

        let reopened = WeatherStore::open(&path).unwrap();
        assert_eq!(reopened.count_observations().unwrap(), 1);
    }
}
