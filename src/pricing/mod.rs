mod cache;
mod fallback;
mod litellm;
mod normalize;

use std::fmt;
use std::fs;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::config::PricingSettings;
use crate::cost::ModelRates;

use cache::PricingCache;
use fallback::FALLBACK_RATES;
use litellm::HttpFeed;
pub use litellm::{FeedError, FeedTable, PricingFeed};

/// Where a set of rates came from, in resolution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    FreshCache,
    Remote,
    StaleCache,
    Fallback,
    DefaultModel,
}

impl Tier {
    /// Strategies tried in order; `DefaultModel` is the unconditional end.
    const CHAIN: [Tier; 4] = [Tier::FreshCache, Tier::Remote, Tier::StaleCache, Tier::Fallback];
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Tier::FreshCache => "cached pricing",
            Tier::Remote => "live pricing feed",
            Tier::StaleCache => "expired cached pricing",
            Tier::Fallback => "built-in fallback table",
            Tier::DefaultModel => "default model rates",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRates {
    pub rates: ModelRates,
    pub tier: Tier,
    /// Key the rates were found under (a normalized variant, or the default model).
    pub matched_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchState {
    NotTried,
    Fetched,
    Failed,
}

/// Resolves per-model rates through the cache/feed/fallback chain.
/// Never fails a lookup; degraded tiers are logged.
pub struct PricingSource {
    settings: PricingSettings,
    feed: Box<dyn PricingFeed>,
    fallback: &'static [(&'static str, ModelRates)],
    fetch_state: FetchState,
    /// Table from this source's successful fetch; outlives a failed cache write.
    fetched: Option<PricingCache>,
}

impl PricingSource {
    /// Build a source using the HTTP feed from `settings`.
    pub fn from_settings(settings: PricingSettings) -> Result<Self> {
        let feed = HttpFeed::new(settings.pricing_url.clone(), settings.fetch_timeout);
        Self::new(settings, Box::new(feed))
    }

    /// Creates the cache directory; that is the only fallible step.
    pub fn new(settings: PricingSettings, feed: Box<dyn PricingFeed>) -> Result<Self> {
        fs::create_dir_all(&settings.cache_dir).with_context(|| {
            format!(
                "Failed to create pricing cache dir {}",
                settings.cache_dir.display()
            )
        })?;
        Ok(Self {
            settings,
            feed,
            fallback: FALLBACK_RATES,
            fetch_state: FetchState::NotTried,
            fetched: None,
        })
    }

    pub fn get_rates(&mut self, model: &str) -> ModelRates {
        self.resolve(model).rates
    }

    pub fn resolve(&mut self, model: &str) -> ResolvedRates {
        let on_disk = match self.fetched {
            Some(_) => None,
            None => PricingCache::load(&self.settings.cache_file()),
        };

        for tier in Tier::CHAIN {
            if let Some((matched_key, rates)) = self.try_tier(tier, model, on_disk.as_ref()) {
                return ResolvedRates {
                    rates,
                    tier,
                    matched_key,
                };
            }
        }

        self.default_rates(model)
    }

    fn try_tier(
        &mut self,
        tier: Tier,
        model: &str,
        on_disk: Option<&PricingCache>,
    ) -> Option<(String, ModelRates)> {
        match tier {
            Tier::FreshCache => {
                let cache = self.fetched.as_ref().or(on_disk)?;
                if !cache.is_fresh(cache::unix_now(), self.settings.validity) {
                    if self.fetch_pending() {
                        info!("pricing cache is stale, refreshing");
                    } else {
                        debug!("pricing cache is stale");
                    }
                    return None;
                }
                let found = litellm::extract_rates(&cache.rates, model)?;
                debug!("using cached rates for {model} ({})", found.0);
                Some(found)
            }
            Tier::Remote => {
                if !self.fetch_once() {
                    return None;
                }
                let fresh = self.fetched.as_ref()?;
                let found = litellm::extract_rates(&fresh.rates, model)?;
                info!("using live rates for {model} ({})", found.0);
                Some(found)
            }
            Tier::StaleCache => {
                let cache = self.fetched.as_ref().or(on_disk)?;
                let found = litellm::extract_rates(&cache.rates, model)?;
                let age_hours = cache.age_secs(cache::unix_now()) / 3600.0;
                warn!(
                    "pricing feed unavailable, using expired cache ({age_hours:.1}h old) for {model}"
                );
                Some(found)
            }
            Tier::Fallback => {
                let (key, rates) = fallback::lookup(self.fallback, model)?;
                let reason = self.fallback_reason(on_disk.is_some());
                warn!("{reason}, using built-in rates for {model}");
                Some((key.to_string(), rates))
            }
            Tier::DefaultModel => None,
        }
    }

    fn fetch_pending(&self) -> bool {
        !self.settings.offline && self.fetch_state == FetchState::NotTried
    }

    fn fallback_reason(&self, cache_loaded: bool) -> &'static str {
        match self.fetch_state {
            FetchState::Fetched => "model not listed in the pricing feed",
            _ if self.settings.offline && cache_loaded => {
                "offline and model not in the pricing cache"
            }
            _ if self.settings.offline => "offline with no pricing cache",
            _ if cache_loaded => "pricing feed unavailable and model not in the cache",
            _ => "pricing feed and cache unavailable",
        }
    }

    /// Fetch the remote table at most once per source into `self.fetched`,
    /// writing it through to the cache file. `false` if offline, already
    /// attempted, or the fetch failed.
    fn fetch_once(&mut self) -> bool {
        if !self.fetch_pending() {
            return false;
        }

        info!("fetching pricing from {}", self.feed.url());
        let table = match self.feed.fetch() {
            Ok(table) => table,
            Err(e) => {
                warn!("pricing fetch failed: {e}");
                self.fetch_state = FetchState::Failed;
                return false;
            }
        };
        self.fetch_state = FetchState::Fetched;

        let fresh = PricingCache::new(self.feed.url(), table);
        let path = self.settings.cache_file();
        match fresh.save(&path) {
            Ok(()) => info!("pricing cache updated at {}", path.display()),
            Err(e) => warn!("could not write pricing cache: {e:#}"),
        }
        self.fetched = Some(fresh);
        true
    }

    fn default_rates(&self, model: &str) -> ResolvedRates {
        let default_model = self.settings.default_model.as_str();
        let (key, rates) = fallback::lookup(self.fallback, default_model)
            .or_else(|| self.fallback.first().copied())
            .unwrap_or(("claude-sonnet-4-5-20250929", ModelRates::new(3.00, 15.00, 3.75, 0.30)));
        warn!("unknown model '{model}', using {key} rates");
        ResolvedRates {
            rates,
            tier: Tier::DefaultModel,
            matched_key: key.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Duration;

    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::config::Config;

    const URL: &str = "https://prices.invalid/model_prices.json";

    struct StubFeed {
        table: Option<FeedTable>,
        calls: Rc<Cell<usize>>,
    }

    impl PricingFeed for StubFeed {
        fn url(&self) -> &str {
            URL
        }

        fn fetch(&self) -> Result<FeedTable, FeedError> {
            self.calls.set(self.calls.get() + 1);
            self.table
                .clone()
                .ok_or_else(|| FeedError::Malformed("stub offline".into()))
        }
    }

    fn feed_table(input_per_token: f64) -> FeedTable {
        match json!({
            "claude-sonnet-4-5-20250929": {
                "input_cost_per_token": input_per_token,
                "output_cost_per_token": 0.000015,
                "cache_creation_input_token_cost": 0.00000375,
                "cache_read_input_token_cost": 0.0000003
            }
        }) {
            serde_json::Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    fn settings(dir: &TempDir) -> PricingSettings {
        let mut s = PricingSettings::resolve(Config {
            cache_dir: Some(dir.path().join("cache")),
            cache_validity_hours: Some(24),
            ..Config::default()
        });
        s.validity = Duration::from_secs(24 * 3600);
        s.default_model = crate::config::DEFAULT_MODEL.to_string();
        s
    }

    fn source(dir: &TempDir, table: Option<FeedTable>) -> (PricingSource, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        let feed = StubFeed {
            table,
            calls: calls.clone(),
        };
        let src = PricingSource::new(settings(dir), Box::new(feed)).unwrap();
        (src, calls)
    }

    fn write_cache(dir: &TempDir, age_secs: f64, input_per_token: f64) {
        fs::create_dir_all(&settings(dir).cache_dir).unwrap();
        let cache = PricingCache {
            fetched_at: cache::unix_now() - age_secs,
            source_url: URL.into(),
            rates: feed_table(input_per_token),
        };
        cache.save(&settings(dir).cache_file()).unwrap();
    }

    #[test]
    fn fresh_cache_answers_without_network() {
        let dir = TempDir::new().unwrap();
        write_cache(&dir, 60.0, 0.000004);
        let (mut src, calls) = source(&dir, Some(feed_table(0.000003)));

        let r = src.resolve("claude-sonnet-4-5-20250929");
        assert_eq!(r.tier, Tier::FreshCache);
        assert!((r.rates.input_rate - 4.0).abs() < 1e-9);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn stale_cache_is_refreshed_from_feed() {
        let dir = TempDir::new().unwrap();
        write_cache(&dir, 48.0 * 3600.0, 0.000004);
        let (mut src, calls) = source(&dir, Some(feed_table(0.000003)));

        let r = src.resolve("claude-sonnet-4-5-20250929");
        assert_eq!(r.tier, Tier::Remote);
        assert!((r.rates.input_rate - 3.0).abs() < 1e-9);
        assert_eq!(calls.get(), 1);

        let written = PricingCache::load(&settings(&dir).cache_file()).unwrap();
        assert_eq!(written.source_url, URL);
        assert!(written.is_fresh(cache::unix_now(), Duration::from_secs(60)));
    }

    #[test]
    fn failed_fetch_falls_back_to_stale_cache() {
        let dir = TempDir::new().unwrap();
        write_cache(&dir, 48.0 * 3600.0, 0.000004);
        let (mut src, _) = source(&dir, None);

        let r = src.resolve("us.anthropic.claude-sonnet-4-5-20250929-v1:0");
        assert_eq!(r.tier, Tier::StaleCache);
        assert!((r.rates.input_rate - 4.0).abs() < 1e-9);
    }

    #[test]
    fn no_cache_and_no_network_uses_builtin_table() {
        let dir = TempDir::new().unwrap();
        let (mut src, _) = source(&dir, None);

        let r = src.resolve("claude-opus-4-20250514");
        assert_eq!(r.tier, Tier::Fallback);
        assert_eq!(r.rates, ModelRates::new(15.0, 75.0, 18.75, 1.5));
    }

    #[test]
    fn unknown_model_gets_default_rates() {
        let dir = TempDir::new().unwrap();
        let (mut src, _) = source(&dir, None);

        let r = src.resolve("gpt-unknown-9000");
        assert_eq!(r.tier, Tier::DefaultModel);
        assert_eq!(r.matched_key, "claude-sonnet-4-5-20250929");
        assert_eq!(r.rates, ModelRates::new(3.0, 15.0, 3.75, 0.30));
    }

    #[test]
    fn profile_and_bare_ids_agree_within_a_tier() {
        let dir = TempDir::new().unwrap();
        let (mut src, _) = source(&dir, None);

        let a = src.resolve("us.anthropic.claude-sonnet-4-5-20250929-v1:0");
        let b = src.resolve("claude-sonnet-4-5-20250929");
        assert_eq!(a.tier, b.tier);
        assert_eq!(a.rates, b.rates);
    }

    #[test]
    fn feed_is_hit_once_per_source() {
        let dir = TempDir::new().unwrap();
        let (mut src, calls) = source(&dir, None);

        src.resolve("gpt-unknown-9000");
        src.resolve("gpt-unknown-9000");
        src.resolve("claude-opus-4-20250514");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn model_missing_from_fresh_cache_triggers_one_fetch() {
        let dir = TempDir::new().unwrap();
        write_cache(&dir, 60.0, 0.000003);
        let (mut src, calls) = source(&dir, Some(feed_table(0.000003)));

        let r = src.resolve("claude-haiku-4-5-20251001");
        assert_eq!(calls.get(), 1);
        assert_eq!(r.tier, Tier::Fallback);
    }

    #[test]
    fn model_missing_from_fresh_cache_is_found_in_feed() {
        let dir = TempDir::new().unwrap();
        let mut fresh = feed_table(0.000003);
        fresh.remove("claude-sonnet-4-5-20250929");
        fresh.insert(
            "claude-opus-4-20250514".into(),
            json!({"input_cost_per_token": 0.000015}),
        );
        fs::create_dir_all(&settings(&dir).cache_dir).unwrap();
        PricingCache {
            fetched_at: cache::unix_now() - 60.0,
            source_url: URL.into(),
            rates: fresh,
        }
        .save(&settings(&dir).cache_file())
        .unwrap();
        let (mut src, calls) = source(&dir, Some(feed_table(0.000005)));

        let r = src.resolve("claude-sonnet-4-5-20250929");
        assert_eq!(r.tier, Tier::Remote);
        assert!((r.rates.input_rate - 5.0).abs() < 1e-9);
        assert_eq!(calls.get(), 1);

        let written = PricingCache::load(&settings(&dir).cache_file()).unwrap();
        assert!(written.rates.contains_key("claude-sonnet-4-5-20250929"));
    }

    #[test]
    fn fetched_rates_survive_unwritable_cache() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(settings(&dir).cache_file()).unwrap();
        let (mut src, calls) = source(&dir, Some(feed_table(0.000004)));

        let first = src.resolve("claude-sonnet-4-5-20250929");
        let second = src.resolve("claude-sonnet-4-5-20250929");
        assert_eq!(first.tier, Tier::Remote);
        assert_eq!(second.tier, Tier::FreshCache);
        assert_eq!(first.rates, second.rates);
        assert!((second.rates.input_rate - 4.0).abs() < 1e-9);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn fallback_reason_names_what_failed() {
        let dir = TempDir::new().unwrap();
        let (mut src, _) = source(&dir, Some(feed_table(0.000003)));
        assert_eq!(
            src.fallback_reason(false),
            "pricing feed and cache unavailable"
        );
        src.resolve("claude-haiku-4-5-20251001");
        assert_eq!(
            src.fallback_reason(true),
            "model not listed in the pricing feed"
        );

        let (mut failed, _) = source(&dir, None);
        failed.resolve("claude-haiku-4-5-20251001");
        assert_eq!(
            failed.fallback_reason(true),
            "pricing feed unavailable and model not in the cache"
        );
    }

    #[test]
    fn refresh_only_pending_while_a_fetch_can_happen() {
        let dir = TempDir::new().unwrap();
        let (mut src, _) = source(&dir, None);
        assert!(src.fetch_pending());
        src.resolve("claude-sonnet-4-5-20250929");
        assert!(!src.fetch_pending());

        let mut s = settings(&dir);
        s.offline = true;
        let offline = PricingSource::new(
            s,
            Box::new(StubFeed {
                table: None,
                calls: Rc::new(Cell::new(0)),
            }),
        )
        .unwrap();
        assert!(!offline.fetch_pending());
        assert_eq!(offline.fallback_reason(false), "offline with no pricing cache");
    }

    #[test]
    fn offline_skips_the_feed() {
        let dir = TempDir::new().unwrap();
        let calls = Rc::new(Cell::new(0));
        let mut s = settings(&dir);
        s.offline = true;
        let feed = StubFeed {
            table: Some(feed_table(0.000003)),
            calls: calls.clone(),
        };
        let mut src = PricingSource::new(s, Box::new(feed)).unwrap();

        let r = src.resolve("claude-sonnet-4-5-20250929");
        assert_eq!(r.tier, Tier::Fallback);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn get_rates_matches_resolve() {
        let dir = TempDir::new().unwrap();
        let (mut src, _) = source(&dir, None);
        let rates = src.get_rates("claude-haiku-4-5-20251001");
        assert_eq!(rates, ModelRates::new(1.0, 5.0, 1.25, 0.10));
    }
}
