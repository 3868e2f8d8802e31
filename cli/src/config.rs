use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use std::path::PathBuf;
use std::time::Duration;

use ladle_core::StoreOptions;
use ladle_core::db::{DEFAULT_TIMEOUT, MAX_TIMEOUT};

pub struct Config {
    pub db_path: PathBuf,
    pub timeout: Duration,
}

impl Config {
    /// Resolve the database location and store deadline. `LADLE_DB` and
    /// `LADLE_TIMEOUT_MS` override the platform defaults.
    pub fn load() -> Result<Self> {
        let db_path = match std::env::var_os("LADLE_DB") {
            Some(path) => PathBuf::from(path),
            None => {
                let proj_dirs = ProjectDirs::from("", "", "ladle")
                    .context("Could not determine home directory")?;
                proj_dirs.data_dir().join("ladle.db")
            }
        };
        let timeout_ms = std::env::var("LADLE_TIMEOUT_MS").ok();
        Self::resolve(db_path, timeout_ms.as_deref())
    }

    fn resolve(db_path: PathBuf, timeout_ms: Option<&str>) -> Result<Self> {
        if let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create data directory: {}", dir.display()))?;
        }

        let timeout = match timeout_ms {
            Some(ms) => Duration::from_millis(
                ms.trim()
                    .parse()
                    .with_context(|| format!("Invalid LADLE_TIMEOUT_MS '{ms}'"))?,
            ),
            None => DEFAULT_TIMEOUT,
        };
        if timeout > MAX_TIMEOUT {
            bail!(
                "LADLE_TIMEOUT_MS must be at most {} ms",
                MAX_TIMEOUT.as_millis()
            );
        }

        Ok(Config { db_path, timeout })
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            timeout: self.timeout,
        }
    }
}
