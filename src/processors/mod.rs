pub mod ingestor;
pub mod stats_engine;

pub use ingestor::{group_by_station, IngestReport, Ingestor};
pub use stats_engine::{aggregate_yearly, StatisticsEngine, StatsReport};
