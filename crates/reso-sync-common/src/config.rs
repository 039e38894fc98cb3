use std::{
    env,
    time::Duration,
};

use url::Url;

const ENV_IDX_TOKEN: &str = "IDX_TOKEN";
const ENV_VOW_TOKEN: &str = "VOW_TOKEN";
const ENV_IDX_BASE_URL: &str = "IDX_BASE_URL";
const ENV_VOW_BASE_URL: &str = "VOW_BASE_URL";
const ENV_MEDIA_BASE_URL: &str = "MEDIA_BASE_URL";
const ENV_BATCH_SIZE: &str = "BATCH_SIZE";
const ENV_MEDIA_SYNC_START_DATE: &str = "MEDIA_SYNC_START_DATE";
const ENV_DATABASE_URL: &str = "DATABASE_URL";
const ENV_DEBUG: &str = "DEBUG";

const DEFAULT_IDX_BASE_URL: &str = "https://api.reso.example/idx";
const DEFAULT_VOW_BASE_URL: &str = "https://api.reso.example/vow";
const DEFAULT_MEDIA_BASE_URL: &str = "https://api.reso.example/media";
const DEFAULT_BATCH_SIZE: u32 = 5000;
const DEFAULT_MEDIA_SYNC_START_DATE: &str = "2024-01-01T00:00:00Z";

/// Configuration loaded from the process environment (optionally seeded from
/// a `.env` file). Required values are checked eagerly and malformed URLs
/// are rejected before any network call is attempted.
#[derive(Debug, Clone)]
pub struct Config {
    pub idx_token: String,
    pub vow_token: String,
    pub idx_base_url: Url,
    pub vow_base_url: Url,
    pub media_base_url: Url,
    pub batch_size: u32,
    pub media_sync_start_date: chrono::DateTime<chrono::Utc>,
    pub database_url: String,
    pub debug: bool,
}

impl Config {
    /// Loads configuration from the environment, first attempting to load a
    /// `.env` file in the current directory (a missing file is not an
    /// error).
    pub fn load() -> anyhow::Result<Self> {
        match dotenvy::dotenv() {
            Ok(_) | Err(dotenvy::Error::Io(_)) => {},
            Err(e) => return Err(e.into()),
        }
        Self::from_env()
    }

    fn from_env() -> anyhow::Result<Self> {
        let idx_token = require_env(ENV_IDX_TOKEN)?;
        let vow_token = require_env(ENV_VOW_TOKEN)?;
        let database_url = require_env(ENV_DATABASE_URL)?;

        let idx_base_url = parse_base_url(ENV_IDX_BASE_URL, DEFAULT_IDX_BASE_URL)?;
        let vow_base_url = parse_base_url(ENV_VOW_BASE_URL, DEFAULT_VOW_BASE_URL)?;
        let media_base_url = parse_base_url(ENV_MEDIA_BASE_URL, DEFAULT_MEDIA_BASE_URL)?;

        let batch_size = match env::var(ENV_BATCH_SIZE) {
            Ok(value) => value
                .parse::<u32>()
                .map_err(|_| anyhow::anyhow!("Invalid {ENV_BATCH_SIZE}: must be a positive integer"))?,
            Err(_) => DEFAULT_BATCH_SIZE,
        };
        anyhow::ensure!(batch_size > 0, "{ENV_BATCH_SIZE} must be greater than zero");

        let media_sync_start_date_str = env::var(ENV_MEDIA_SYNC_START_DATE)
            .unwrap_or_else(|_| DEFAULT_MEDIA_SYNC_START_DATE.to_string());
        let media_sync_start_date = chrono::DateTime::parse_from_rfc3339(&media_sync_start_date_str)
            .map_err(|_| {
                anyhow::anyhow!("Invalid {ENV_MEDIA_SYNC_START_DATE}: must be an ISO-8601 timestamp")
            })?
            .with_timezone(&chrono::Utc);

        let debug = matches!(
            env::var(ENV_DEBUG).as_deref(),
            Ok("1") | Ok("true") | Ok("TRUE") | Ok("yes")
        );

        Ok(Config {
            idx_token,
            vow_token,
            idx_base_url,
            vow_base_url,
            media_base_url,
            batch_size,
            media_sync_start_date,
            database_url,
            debug,
        })
    }

    /// Per-request HTTP timeout. Recommended by spec as 60s; kept as an
    /// associated constant rather than a config knob since no environment
    /// variable is defined for it.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
}

fn require_env(key: &str) -> anyhow::Result<String> {
    env::var(key).map_err(|_| anyhow::anyhow!("Missing required environment variable {key}"))
}

fn parse_base_url(key: &str, default: &str) -> anyhow::Result<Url> {
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    let url = Url::parse(&raw).map_err(|_| anyhow::anyhow!("Invalid {key}: must be a URL"))?;

    if url.host_str().is_none() {
        anyhow::bail!("Invalid {key}: must contain a host");
    }
    if url.scheme() != "http" && url.scheme() != "https" {
        anyhow::bail!("Invalid {key}: must use http or https");
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    // Environment variable mutation races across tests in the same process;
    // serialize access to keep this deterministic.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for key in [
            ENV_IDX_TOKEN,
            ENV_VOW_TOKEN,
            ENV_IDX_BASE_URL,
            ENV_VOW_BASE_URL,
            ENV_MEDIA_BASE_URL,
            ENV_BATCH_SIZE,
            ENV_MEDIA_SYNC_START_DATE,
            ENV_DATABASE_URL,
            ENV_DEBUG,
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn refuses_missing_tokens() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var(ENV_DATABASE_URL, "postgres://localhost/reso");
        assert!(Config::from_env().is_err());
    }

    #[test]
    fn accepts_minimal_valid_config() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var(ENV_IDX_TOKEN, "idx-token");
        env::set_var(ENV_VOW_TOKEN, "vow-token");
        env::set_var(ENV_DATABASE_URL, "postgres://localhost/reso");

        let config = Config::from_env().unwrap();
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.idx_base_url.as_str(), DEFAULT_IDX_BASE_URL.to_owned() + "/");
        assert!(!config.debug);
    }

    #[test]
    fn refuses_invalid_batch_size() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var(ENV_IDX_TOKEN, "idx-token");
        env::set_var(ENV_VOW_TOKEN, "vow-token");
        env::set_var(ENV_DATABASE_URL, "postgres://localhost/reso");
        env::set_var(ENV_BATCH_SIZE, "0");
        assert!(Config::from_env().is_err());
    }

    #[test]
    fn refuses_invalid_urls() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var(ENV_IDX_TOKEN, "idx-token");
        env::set_var(ENV_VOW_TOKEN, "vow-token");
        env::set_var(ENV_DATABASE_URL, "postgres://localhost/reso");
        env::set_var(ENV_IDX_BASE_URL, "not a url");
        assert!(Config::from_env().is_err());
    }

    #[test]
    fn parses_debug_flag() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var(ENV_IDX_TOKEN, "idx-token");
        env::set_var(ENV_VOW_TOKEN, "vow-token");
        env::set_var(ENV_DATABASE_URL, "postgres://localhost/reso");
        env::set_var(ENV_DEBUG, "true");
        assert!(Config::from_env().unwrap().debug);
    }
}
