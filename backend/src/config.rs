use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

/// Runtime configuration, read from the environment at startup.
pub struct Config {
    /// Port the HTTP server binds to
    pub port: u16,
    /// Directory holding the document tree (children, attendance, photos)
    pub data_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        let port = load_or("ATTENDANCE_PORT", "3000")
            .parse()
            .context("Invalid ATTENDANCE_PORT value")?;
        let data_dir = PathBuf::from(load_or("ATTENDANCE_DATA_DIR", "data"));

        Ok(Self { port, data_dir })
    }
}

fn load_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    })
}
