use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Placeholder secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me", "dev-secret-change-me"];

pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub media_root: PathBuf,
    pub secret_key: String,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let secret_key = std::env::var("YATUBE_SECRET_KEY").unwrap_or_default();
        if secret_key.is_empty() || PLACEHOLDER_SECRETS.contains(&secret_key.as_str()) {
            bail!("YATUBE_SECRET_KEY is unset or still a placeholder; set it in .env");
        }

        let host = std::env::var("YATUBE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = std::env::var("YATUBE_PORT")
            .unwrap_or_else(|_| "8000".into())
            .parse()
            .context("YATUBE_PORT must be a port number")?;
        let db_path: PathBuf = std::env::var("YATUBE_DB_PATH")
            .unwrap_or_else(|_| "yatube.db".into())
            .into();
        let media_root: PathBuf = std::env::var("YATUBE_MEDIA_ROOT")
            .unwrap_or_else(|_| "./media".into())
            .into();
        let max_upload_mb: usize = std::env::var("YATUBE_MAX_UPLOAD_MB")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        Ok(Self {
            host,
            port,
            db_path,
            media_root,
            secret_key,
            max_upload_bytes: max_upload_mb * 1024 * 1024,
        })
    }
}
