use std::path::PathBuf;

#[derive(Debug)]
pub struct Config {
    // data store configuration
    /// a path to a sqlite database, if not set then an
    ///  in-memory database will be used
    pub sqlite_path: Option<PathBuf>,

    // misc
    pub log_level: tracing::Level,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sqlite_path: None,
            log_level: tracing::Level::INFO,
        }
    }
}
