pub mod query;
pub mod sqlite;

pub use query::{ObservationFilter, Pagination, StatsFilter};
pub use sqlite::{InsertOutcome, WeatherStore};
