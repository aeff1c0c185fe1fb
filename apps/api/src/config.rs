use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::warn;

const DEFAULT_ADMIN_PASSWORD: &str = "change-this-password";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the analytics JSON store.
    pub data_dir: PathBuf,
    /// Bearer token required by the admin analytics endpoint.
    pub admin_password: String,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let admin_password =
            std::env::var("ADMIN_PASSWORD").unwrap_or_else(|_| DEFAULT_ADMIN_PASSWORD.to_string());
        if admin_password == DEFAULT_ADMIN_PASSWORD {
            warn!("ADMIN_PASSWORD is unset, using the default. Set it in production.");
        }

        Ok(Config {
            data_dir: std::env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
            admin_password,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }

    pub fn analytics_file(&self) -> PathBuf {
        self.data_dir.join("analytics.json")
    }
}
