use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProcessingError>;

#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Worker pool error: {0}")]
    ThreadPool(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Ingestion aborted after {inserted} committed records: {source}")]
    IngestAborted {
        inserted: usize,
        #[source]
        source: Box<ProcessingError>,
    },
}

impl ProcessingError {
    /// Records committed before the failure, when the error came from an ingestion run.
    pub fn committed_records(&self) -> Option<usize> {
        match self {
            ProcessingError::IngestAborted { inserted, .. } => Some(*inserted),
            _ => None,
        }
    }
}
