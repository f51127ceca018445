pub mod observation;
pub mod stats;

pub use observation::{ObservationRecord, StoredObservation};
pub use stats::{StoredYearlyStats, YearlyStats};
