use crate::error::Result;
use crate::utils::constants::{
    CONFIG_FILE_NAME, DEFAULT_DATABASE_PATH, DEFAULT_DATA_DIR, DEFAULT_FILE_EXTENSION, ENV_PREFIX,
};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

/// Runtime settings, layered: built-in defaults, then an optional `wx-ingest.toml`
/// (or any format `config` recognises) in the working directory, then `WX_*` environment
/// variables. CLI flags are applied on top by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub database_path: PathBuf,
    pub data_dir: PathBuf,
    pub file_extension: String,
    /// Parse files on the calling thread; for hosts with constrained shared memory
    pub sequential: bool,
    pub max_workers: usize,
    /// Memory-map station files instead of buffered reads
    pub use_mmap: bool,
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::build(
            Config::builder()
                .add_source(File::with_name(CONFIG_FILE_NAME).required(false))
                .add_source(Self::environment()),
        )
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX).try_parsing(true)
    }

    fn build(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        let settings = builder
            .set_default("database_path", DEFAULT_DATABASE_PATH)?
            .set_default("data_dir", DEFAULT_DATA_DIR)?
            .set_default("file_extension", DEFAULT_FILE_EXTENSION)?
            .set_default("sequential", false)?
            .set_default("max_workers", num_cpus::get() as i64)?
            .set_default("use_mmap", false)?
            .build()?
            .try_deserialize::<Settings>()?;

        Ok(settings.normalised())
    }

    fn normalised(mut self) -> Self {
        self.max_workers = self.max_workers.max(1);
        self
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            file_extension: DEFAULT_FILE_EXTENSION.to_string(),
            sequential: false,
            max_workers: num_cpus::get(),
            use_mmap: false,
        }
    }
}
