/// Raw-file value meaning "no observation"
pub const MISSING_VALUE_SENTINEL: i32 = -9999;

/// Raw values are recorded in tenths of a unit
pub const TENTHS_DIVISOR: f64 = 10.0;

/// Millimetres per centimetre, applied only at aggregation
pub const MM_PER_CM: f64 = 10.0;

/// Fields per observation line: date, max temp, min temp, precipitation
pub const FIELDS_PER_LINE: usize = 4;
pub const FIELD_SEPARATOR: char = '\t';
pub const DATE_FORMAT: &str = "%Y%m%d";

/// File discovery and configuration defaults
pub const DEFAULT_FILE_EXTENSION: &str = "txt";
pub const DEFAULT_DATA_DIR: &str = "wx_data";
pub const DEFAULT_DATABASE_PATH: &str = "weather.db";
pub const CONFIG_FILE_NAME: &str = "wx-ingest";
pub const ENV_PREFIX: &str = "WX";

/// Processing defaults
pub const DEFAULT_BUFFER_SIZE: usize = 8192 * 16; // 128KB
pub const SQLITE_BUSY_TIMEOUT_MS: u32 = 5000;

/// Query pagination
pub const DEFAULT_PAGE_LIMIT: u32 = 100;
