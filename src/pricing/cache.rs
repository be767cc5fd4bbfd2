use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::litellm::FeedTable;
use crate::storage;

/// On-disk pricing snapshot. `rates` keeps the feed's per-token units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingCache {
    pub fetched_at: f64,
    pub source_url: String,
    #[serde(alias = "pricing")]
    pub rates: FeedTable,
}

pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

impl PricingCache {
    pub fn new(source_url: &str, rates: FeedTable) -> Self {
        Self {
            fetched_at: unix_now(),
            source_url: source_url.to_string(),
            rates,
        }
    }

    pub fn age_secs(&self, now: f64) -> f64 {
        now - self.fetched_at
    }

    pub fn is_fresh(&self, now: f64, validity: Duration) -> bool {
        self.age_secs(now) < validity.as_secs_f64()
    }

    /// Load the cache file. Missing or unreadable caches are `None`; the
    /// latter with a warning.
    pub fn load(path: &Path) -> Option<Self> {
        match storage::read_json(path) {
            Ok(cache) => cache,
            Err(e) => {
                warn!("ignoring pricing cache: {e:#}");
                None
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        storage::write_json_atomic(path, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample(fetched_at: f64) -> PricingCache {
        let rates = match json!({"m": {"input_cost_per_token": 1e-6}}) {
            serde_json::Value::Object(m) => m,
            _ => unreachable!(),
        };
        PricingCache {
            fetched_at,
            source_url: "https://example.invalid/prices.json".into(),
            rates,
        }
    }

    #[test]
    fn freshness_window() {
        let day = Duration::from_secs(24 * 3600);
        let now = 1_000_000.0;
        assert!(sample(now - 3600.0).is_fresh(now, day));
        assert!(!sample(now - 25.0 * 3600.0).is_fresh(now, day));
        assert!(!sample(now - 24.0 * 3600.0).is_fresh(now, day));
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        sample(42.0).save(&path).unwrap();
        let loaded = PricingCache::load(&path).unwrap();
        assert_eq!(loaded.fetched_at, 42.0);
        assert!(loaded.rates.contains_key("m"));
    }

    #[test]
    fn legacy_pricing_key_is_accepted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(
            &path,
            r#"{"fetched_at": 1.5, "source_url": "u", "pricing": {"m": {}}}"#,
        )
        .unwrap();
        assert!(PricingCache::load(&path).unwrap().rates.contains_key("m"));
    }

    #[test]
    fn corrupt_cache_is_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "{\"fetched_at\": 1.0, \"sou").unwrap();
        assert!(PricingCache::load(&path).is_none());
        assert!(PricingCache::load(&dir.path().join("missing.json")).is_none());
    }
}
