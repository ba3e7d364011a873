//! Application configuration
//!
//! Loaded once at startup from `SWEETLIFE_*` environment variables (a `.env`
//! file is honoured) and handed to the service constructors.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

/// Fallback HMAC key for local development
const DEV_APP_KEY: &str = "sweetlife-dev-key";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: '{value}' ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub mailgun_domain: String,
    pub mailgun_api_key: String,
    pub from: String,
}

impl MailConfig {
    /// Mailgun is only used when both domain and key are set
    pub fn is_configured(&self) -> bool {
        !self.mailgun_domain.is_empty() && !self.mailgun_api_key.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub app_host: String,
    pub app_key: String,
    pub ml_base_url: String,
    pub fdc_api_key: String,
    pub fdc_base_url: String,
    pub storage_dir: PathBuf,
    pub storage_public_url: String,
    pub asset_base_url: String,
    pub mail: MailConfig,
    pub http_timeout: Duration,
    pub retry_attempts: u32,
    pub verification_attempts: u32,
    pub verification_backoff: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!("No .env file loaded: {}", e);
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let data_dir = default_data_dir();
        let database_path = var("SWEETLIFE_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("sweetlife.db"));
        let storage_dir = var("SWEETLIFE_STORAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("storage"));
        let storage_public_url = var("SWEETLIFE_STORAGE_PUBLIC_URL")
            .unwrap_or_else(|| format!("file://{}", storage_dir.display()));

        let app_key = match var("SWEETLIFE_APP_KEY") {
            Some(key) => key,
            None => {
                warn!("SWEETLIFE_APP_KEY is not set, using the development key");
                DEV_APP_KEY.to_string()
            }
        };

        Ok(Self {
            database_path,
            app_host: trim_slash(var("SWEETLIFE_APP_HOST").unwrap_or_else(|| "http://127.0.0.1:3000".into())),
            app_key,
            ml_base_url: trim_slash(var("SWEETLIFE_ML_BASE_URL").unwrap_or_else(|| "https://ml.sweetlife.my.id".into())),
            fdc_api_key: var("SWEETLIFE_FDC_API_KEY").unwrap_or_default(),
            fdc_base_url: trim_slash(
                var("SWEETLIFE_FDC_BASE_URL").unwrap_or_else(|| "https://api.nal.usda.gov/fdc/v1".into()),
            ),
            storage_dir,
            storage_public_url: trim_slash(storage_public_url),
            asset_base_url: trim_slash(var("SWEETLIFE_ASSET_BASE_URL").unwrap_or_else(|| {
                "https://storage.googleapis.com/sweetlife-go/website".into()
            })),
            mail: MailConfig {
                mailgun_domain: var("SWEETLIFE_MAILGUN_DOMAIN").unwrap_or_default(),
                mailgun_api_key: var("SWEETLIFE_MAILGUN_KEY").unwrap_or_default(),
                from: var("SWEETLIFE_MAIL_FROM").unwrap_or_else(|| "SweetLife <no-reply@sweetlife.my.id>".into()),
            },
            http_timeout: Duration::from_secs(parse_number(
                "SWEETLIFE_HTTP_TIMEOUT_SECS",
                var("SWEETLIFE_HTTP_TIMEOUT_SECS"),
                10,
            )?),
            retry_attempts: parse_attempts("SWEETLIFE_RETRY_ATTEMPTS", var("SWEETLIFE_RETRY_ATTEMPTS"))?,
            verification_attempts: parse_attempts(
                "SWEETLIFE_VERIFICATION_ATTEMPTS",
                var("SWEETLIFE_VERIFICATION_ATTEMPTS"),
            )?,
            verification_backoff: Duration::from_millis(parse_number(
                "SWEETLIFE_VERIFICATION_BACKOFF_MS",
                var("SWEETLIFE_VERIFICATION_BACKOFF_MS"),
                2000,
            )?),
        })
    }
}

fn parse_number(name: &'static str, value: Option<String>, default: u64) -> Result<u64, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
            name,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn parse_attempts(name: &'static str, value: Option<String>) -> Result<u32, ConfigError> {
    let raw = value.clone().unwrap_or_default();
    let n = parse_number(name, value, 3)?;
    match u32::try_from(n) {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(ConfigError::Invalid {
            name,
            value: raw,
            reason: "must be at least 1".into(),
        }),
    }
}

fn trim_slash(s: String) -> String {
    s.trim_end_matches('/').to_string()
}

/// `<project>/data`, found by walking up from the executable out of
/// `target/{debug,release}`
pub fn default_data_dir() -> PathBuf {
    let mut path = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."));

    if path.ends_with("release") || path.ends_with("debug") {
        if let Some(grandparent) = path.parent().and_then(|p| p.parent()) {
            path = grandparent.to_path_buf();
        }
    }

    path.push("data");
    path
}
