use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "wx-ingest")]
#[command(about = "Ingest daily station weather files and serve yearly statistics")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Hide progress bars")]
    pub quiet: bool,

    #[arg(long, global = true, help = "Log file path")]
    pub log_file: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        help = "SQLite database path [default: $WX_DATABASE_PATH or weather.db]"
    )]
    pub database: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load every station file in a directory into the raw store
    Ingest {
        #[arg(
            short,
            long,
            help = "Directory of station files [default: $WX_DATA_DIR or wx_data]"
        )]
        data_dir: Option<PathBuf>,

        #[arg(long, help = "Parse files one at a time on the main thread")]
        sequential: bool,

        #[arg(long, help = "Parser worker threads [default: $WX_MAX_WORKERS or CPU count]")]
        max_workers: Option<usize>,

        #[arg(long, help = "Recompute yearly statistics after a successful ingest")]
        with_stats: bool,
    },

    /// Recompute yearly statistics from all raw records
    Stats,

    /// List raw daily records
    Records {
        #[arg(short, long)]
        station_id: Option<String>,

        #[arg(long, help = "Inclusive start date (YYYY-MM-DD)")]
        start_date: Option<NaiveDate>,

        #[arg(long, help = "Inclusive end date (YYYY-MM-DD)")]
        end_date: Option<NaiveDate>,

        #[arg(long, default_value = "0")]
        skip: u32,

        #[arg(long, default_value = "100")]
        limit: u32,
    },

    /// List computed yearly statistics
    Yearly {
        #[arg(short, long)]
        station_id: Option<String>,

        #[arg(short, long)]
        year: Option<i32>,

        #[arg(long, default_value = "0")]
        skip: u32,

        #[arg(long, default_value = "100")]
        limit: u32,
    },

    /// List station ids present in the raw store
    Stations,
}
