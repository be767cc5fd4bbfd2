use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::Deserialize;
use tracing::warn;

pub const APP_NAME: &str = "e2e-agent";
pub const LITELLM_URL: &str =
    "https://raw.githubusercontent.com/BerriAI/litellm/main/model_prices_and_context_window.json";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";
pub const CACHE_FILENAME: &str = "litellm_pricing_cache.json";
const DEFAULT_CACHE_VALIDITY_HOURS: u64 = 24;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
const CACHE_HOURS_ENV: &str = "PRICING_CACHE_HOURS";

/// Optional keys from `config.toml`.
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    pub cache_dir: Option<PathBuf>,
    pub cache_validity_hours: Option<u64>,
    pub fetch_timeout_secs: Option<u64>,
    pub pricing_url: Option<String>,
    pub default_model: Option<String>,
}

pub fn load_config() -> Config {
    let Some(dirs) = ProjectDirs::from("", "", APP_NAME) else {
        return Config::default();
    };

    let path = dirs.config_dir().join("config.toml");
    let Ok(data) = fs::read_to_string(&path) else {
        return Config::default();
    };

    parse_config(&data).unwrap_or_else(|e| {
        warn!("invalid config at {}: {}", path.display(), e);
        Config::default()
    })
}

fn parse_config(data: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(data)
}

/// Fully resolved settings for the pricing chain.
#[derive(Debug, Clone)]
pub struct PricingSettings {
    pub cache_dir: PathBuf,
    pub validity: Duration,
    pub fetch_timeout: Duration,
    pub pricing_url: String,
    pub default_model: String,
    pub offline: bool,
}

impl PricingSettings {
    /// Defaults, then `config.toml`, then `PRICING_CACHE_HOURS`.
    pub fn resolve(config: Config) -> Self {
        let env_hours = std::env::var(CACHE_HOURS_ENV).ok();
        Self::resolve_with_env(config, env_hours.as_deref())
    }

    fn resolve_with_env(config: Config, env_hours: Option<&str>) -> Self {
        let mut hours = config
            .cache_validity_hours
            .unwrap_or(DEFAULT_CACHE_VALIDITY_HOURS);
        if let Some(raw) = env_hours {
            match raw.trim().parse::<u64>() {
                Ok(h) => hours = h,
                Err(_) => warn!("ignoring {CACHE_HOURS_ENV}={raw:?}: not a whole number of hours"),
            }
        }

        Self {
            cache_dir: config.cache_dir.unwrap_or_else(default_cache_dir),
            validity: Duration::from_secs(hours * 60 * 60),
            fetch_timeout: Duration::from_secs(
                config.fetch_timeout_secs.unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS),
            ),
            pricing_url: config.pricing_url.unwrap_or_else(|| LITELLM_URL.to_string()),
            default_model: config
                .default_model
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            offline: false,
        }
    }

    pub fn cache_file(&self) -> PathBuf {
        self.cache_dir.join(CACHE_FILENAME)
    }
}

fn default_cache_dir() -> PathBuf {
    ProjectDirs::from("", "", APP_NAME)
        .map(|d| d.cache_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join(APP_NAME))
}
