use crate::cli::args::{Cli, Commands};
use crate::config::Settings;
use crate::error::{ProcessingError, Result};
use crate::processors::{Ingestor, StatisticsEngine};
use crate::store::{ObservationFilter, Pagination, StatsFilter, WeatherStore};
use crate::utils::logging::init_logging;
use crate::utils::progress::ProgressReporter;
use serde::Serialize;
use tracing::info;

pub fn run(cli: Cli) -> Result<()> {
    init_logging(cli.verbose, cli.log_file.as_deref())?;

    let mut settings = Settings::load()?;
    if let Some(database) = cli.database {
        settings.database_path = database;
    }

    // Opened once per invocation; released when it drops at the end of this scope.
    let mut store = WeatherStore::open(&settings.database_path)?;

    match cli.command {
        Commands::Ingest {
            data_dir,
            sequential,
            max_workers,
            with_stats,
        } => {
            if let Some(dir) = data_dir {
                settings.data_dir = dir;
            }
            if sequential {
                settings.sequential = true;
            }
            if let Some(workers) = max_workers {
                settings.max_workers = workers.max(1);
            }

            info!(
                data_dir = %settings.data_dir.display(),
                database = %settings.database_path.display(),
                sequential = settings.sequential,
                workers = settings.max_workers,
                "Configured ingestion"
            );

            let progress = ProgressReporter::new(0, "Discovering station files...", cli.quiet);
            let ingestor = Ingestor::from_settings(&settings);
            let report =
                ingestor.ingest_directory(&mut store, &settings.data_dir, Some(&progress))?;
            println!("\n{}", report.summary());

            if with_stats {
                let stats = StatisticsEngine::new().recompute(&mut store)?;
                println!("{}", stats.summary());
            }
        }

        Commands::Stats => {
            let progress =
                ProgressReporter::new_spinner("Recomputing yearly statistics...", cli.quiet);
            let report = StatisticsEngine::new().recompute(&mut store)?;
            progress.finish_with_message(&format!("Wrote {} station-years", report.keys_written));
            println!("\n{}", report.summary());
        }

        Commands::Records {
            station_id,
            start_date,
            end_date,
            skip,
            limit,
        } => {
            let filter = ObservationFilter {
                station_id,
                start_date,
                end_date,
            };
            let rows = store.list_observations(&filter, Pagination::new(skip, limit))?;
            print_json(&rows)?;
        }

        Commands::Yearly {
            station_id,
            year,
            skip,
            limit,
        } => {
            let filter = StatsFilter { station_id, year };
            let rows = store.list_yearly_stats(&filter, Pagination::new(skip, limit))?;
            print_json(&rows)?;
        }

        Commands::Stations => {
            print_json(&store.list_stations()?)?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| ProcessingError::InvalidFormat(format!("Cannot serialize output: {}", e)))?;
    println!("{}", json);
    Ok(())
}
