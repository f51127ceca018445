pub mod concurrent_reader;
pub mod observation_reader;

pub use concurrent_reader::{ConcurrentReader, FileOutcome, ParseBatch};
pub use observation_reader::{ObservationReader, ParsedFile};
