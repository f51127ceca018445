use crate::error::{ProcessingError, Result};
use crate::models::ObservationRecord;
use crate::readers::{ObservationReader, ParsedFile};
use crate::utils::constants::DEFAULT_FILE_EXTENSION;
use crate::utils::progress::ProgressReporter;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Result of parsing one station file
#[derive(Debug)]
pub enum FileOutcome {
    Parsed { path: PathBuf, file: ParsedFile },
    Failed { path: PathBuf, error: String },
}

impl FileOutcome {
    pub fn path(&self) -> &Path {
        match self {
            FileOutcome::Parsed { path, .. } | FileOutcome::Failed { path, .. } => path,
        }
    }
}

/// Everything the parse phase produced, joined before any store access
#[derive(Debug, Default)]
pub struct ParseBatch {
    pub outcomes: Vec<FileOutcome>,
}

impl ParseBatch {
    pub fn parsed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, FileOutcome::Parsed { .. }))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.parsed_count()
    }

    pub fn skipped_lines(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| match o {
                FileOutcome::Parsed { file, .. } => file.skipped_lines,
                FileOutcome::Failed { .. } => 0,
            })
            .sum()
    }

    pub fn candidate_count(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| match o {
                FileOutcome::Parsed { file, .. } => file.records.len(),
                FileOutcome::Failed { .. } => 0,
            })
            .sum()
    }

    /// Flatten every parsed file into one candidate list; failed files contribute nothing
    pub fn into_candidates(self) -> Vec<ObservationRecord> {
        self.outcomes
            .into_iter()
            .flat_map(|o| match o {
                FileOutcome::Parsed { file, .. } => file.records,
                FileOutcome::Failed { .. } => Vec::new(),
            })
            .collect()
    }
}

/// Discovers station files and fans parsing out across a worker pool.
///
/// Workers share nothing: each receives a path and returns an owned `FileOutcome`.
pub struct ConcurrentReader {
    max_workers: usize,
    sequential: bool,
    extension: String,
    use_mmap: bool,
}

impl ConcurrentReader {
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
            sequential: false,
            extension: DEFAULT_FILE_EXTENSION.to_string(),
            use_mmap: false,
        }
    }

    pub fn with_sequential(mut self, sequential: bool) -> Self {
        self.sequential = sequential;
        self
    }

    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = extension.trim_start_matches('.').to_string();
        self
    }

    pub fn with_mmap(mut self, use_mmap: bool) -> Self {
        self.use_mmap = use_mmap;
        self
    }

    pub fn is_sequential(&self) -> bool {
        self.sequential || self.max_workers == 1
    }

    /// List every `*.<extension>` file directly inside `dir`, sorted by name
    pub fn discover_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        if !dir.is_dir() {
            return Err(ProcessingError::InvalidFormat(format!(
                "Path is not a directory: {}",
                dir.display()
            )));
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }

            let matches_extension = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.extension));
            if matches_extension {
                files.push(path);
            }
        }

        files.sort();
        Ok(files)
    }

    /// Parse all files. Per-file failures are captured in the batch, never propagated.
    pub fn read_all(
        &self,
        files: &[PathBuf],
        progress: Option<&ProgressReporter>,
    ) -> Result<ParseBatch> {
        let parse_one = |path: &PathBuf| {
            let outcome = self.parse_file(path);
            if let Some(p) = progress {
                p.increment(1);
            }
            outcome
        };

        let outcomes: Vec<FileOutcome> = if self.is_sequential() {
            debug!(files = files.len(), "Parsing station files sequentially");
            files.iter().map(parse_one).collect()
        } else {
            debug!(
                files = files.len(),
                workers = self.max_workers,
                "Parsing station files in parallel"
            );
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.max_workers)
                .build()
                .map_err(|e| ProcessingError::ThreadPool(e.to_string()))?;

            pool.install(|| files.par_iter().map(parse_one).collect())
        };

        Ok(ParseBatch { outcomes })
    }

    fn parse_file(&self, path: &Path) -> FileOutcome {
        let reader = ObservationReader::with_mmap(self.use_mmap);
        match reader.read_observations(path) {
            Ok(file) => {
                debug!(
                    station = %file.station_id,
                    records = file.records.len(),
                    skipped = file.skipped_lines,
                    "Parsed station file"
                );
                FileOutcome::Parsed {
                    path: path.to_path_buf(),
                    file,
                }
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable station file");
                FileOutcome::Failed {
                    path: path.to_path_buf(),
                    error: e.to_string(),
                }
            }
        }
    }
}

impl Default for ConcurrentReader {
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}
