use crate::error::{ProcessingError, Result};
use crate::models::ObservationRecord;
use crate::utils::constants::{
    DATE_FORMAT, DEFAULT_BUFFER_SIZE, FIELDS_PER_LINE, FIELD_SEPARATOR, MISSING_VALUE_SENTINEL,
    TENTHS_DIVISOR,
};
use chrono::NaiveDate;
use memmap2::Mmap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Observations parsed from one station file, not yet persisted.
#[derive(Debug, Clone, Default)]
pub struct ParsedFile {
    pub station_id: String,
    pub records: Vec<ObservationRecord>,
    /// Non-blank lines dropped for invalid UTF-8, a wrong field count or an unparsable field
    pub skipped_lines: usize,
}

/// Parses `YYYYMMDD<TAB>max<TAB>min<TAB>precip` station files.
///
/// Pure transformation: no store access, so any number of readers can run in parallel.
pub struct ObservationReader {
    use_mmap: bool,
}

impl ObservationReader {
    pub fn new() -> Self {
        Self { use_mmap: false }
    }

    pub fn with_mmap(use_mmap: bool) -> Self {
        Self { use_mmap }
    }

    /// Read every valid observation in a file, tagging it with the station id from the filename
    pub fn read_observations(&self, path: &Path) -> Result<ParsedFile> {
        let station_id = Self::station_id_from_path(path)?;
        if self.use_mmap {
            self.read_mmap(path, station_id)
        } else {
            self.read_buffered(path, station_id)
        }
    }

    /// Station id is the file name with directory and extension stripped
    /// (e.g. `wx_data/USC00110072.txt` -> `USC00110072`)
    pub fn station_id_from_path(path: &Path) -> Result<String> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::trim)
            .unwrap_or_default();

        if stem.is_empty() {
            return Err(ProcessingError::InvalidFormat(format!(
                "Cannot derive station id from path: {}",
                path.display()
            )));
        }

        Ok(stem.to_string())
    }

    fn read_buffered(&self, path: &Path, station_id: String) -> Result<ParsedFile> {
        let file = File::open(path)?;
        let mut reader = BufReader::with_capacity(DEFAULT_BUFFER_SIZE, file);
        let mut parsed = ParsedFile {
            station_id,
            ..Default::default()
        };

        let mut buf = Vec::new();
        while reader.read_until(b'\n', &mut buf)? > 0 {
            self.consume_bytes(&buf, &mut parsed);
            buf.clear();
        }

        Ok(parsed)
    }

    /// Memory-mapped variant for very large station histories
    fn read_mmap(&self, path: &Path, station_id: String) -> Result<ParsedFile> {
        let file = File::open(path)?;
        // Empty files cannot be mapped on every platform.
        if file.metadata()?.len() == 0 {
            return Ok(ParsedFile {
                station_id,
                ..Default::default()
            });
        }

        let mmap = unsafe { Mmap::map(&file)? };

        let mut parsed = ParsedFile {
            station_id,
            ..Default::default()
        };
        for line in mmap.split(|&b| b == b'\n') {
            self.consume_bytes(line, &mut parsed);
        }

        Ok(parsed)
    }

    /// A line that is not valid UTF-8 counts as skipped; the rest of the file still loads.
    fn consume_bytes(&self, raw: &[u8], parsed: &mut ParsedFile) {
        let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        match std::str::from_utf8(raw) {
            Ok(line) => self.consume_line(line, parsed),
            Err(_) => parsed.skipped_lines += 1,
        }
    }

    fn consume_line(&self, line: &str, parsed: &mut ParsedFile) {
        if line.trim().is_empty() {
            return;
        }

        match self.parse_line(line, &parsed.station_id) {
            Some(record) => parsed.records.push(record),
            None => parsed.skipped_lines += 1,
        }
    }

    /// Parse one line. `None` means the line is malformed and should be skipped.
    pub fn parse_line(&self, line: &str, station_id: &str) -> Option<ObservationRecord> {
        let parts: Vec<&str> = line.trim().split(FIELD_SEPARATOR).map(str::trim).collect();
        if parts.len() != FIELDS_PER_LINE {
            return None;
        }

        let date = NaiveDate::parse_from_str(parts[0], DATE_FORMAT).ok()?;
        let max_temp = parse_tenths(parts[1])?;
        let min_temp = parse_tenths(parts[2])?;
        let precip = parse_tenths(parts[3])?;

        Some(ObservationRecord::new(
            station_id, date, max_temp, min_temp, precip,
        ))
    }
}

impl Default for ObservationReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Outer `None`: not an integer. Inner `None`: the missing-value sentinel.
fn parse_tenths(field: &str) -> Option<Option<f64>> {
    let raw = field.parse::<i32>().ok()?;
    if raw == MISSING_VALUE_SENTINEL {
        Some(None)
    } else {
        Some(Some(f64::from(raw) / TENTHS_DIVISOR))
    }
}
