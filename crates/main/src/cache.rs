use std::{
    collections::HashMap,
    hash::Hash,
    time::{Duration, Instant},
};

use db::campaign::{Campaign, CampaignOption};
use parking_lot::Mutex;

use crate::config::AppConfig;

/// A map whose entries are forgotten `ttl` after insertion.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: HashMap<K, (Instant, V)>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        TtlCache {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn get(&mut self, key: &K, now: Instant) -> Option<V> {
        let fresh = match self.entries.get(key) {
            Some((stored_at, _)) => {
                now.saturating_duration_since(*stored_at) < self.ttl
            }
            None => return None,
        };
        if fresh {
            self.entries.get(key).map(|(_, value)| value.clone())
        } else {
            self.entries.remove(key);
            None
        }
    }

    pub fn insert(&mut self, key: K, value: V, now: Instant) {
        self.entries.insert(key, (now, value));
    }

    pub fn invalidate(&mut self, key: &K) {
        self.entries.remove(key);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Lookups shared between requests: campaigns by public id and each
/// campaign's options by campaign id.
pub struct Caches {
    pub campaigns: Mutex<TtlCache<String, Campaign>>,
    pub options: Mutex<TtlCache<i64, Vec<CampaignOption>>>,
}

impl Caches {
    pub fn new(config: &AppConfig) -> Caches {
        Caches {
            campaigns: Mutex::new(TtlCache::new(Duration::from_secs(
                config.campaign_cache_secs,
            ))),
            options: Mutex::new(TtlCache::new(Duration::from_secs(
                config.options_cache_secs,
            ))),
        }
    }

    pub fn campaign(&self, public_id: &str) -> Option<Campaign> {
        self.campaigns
            .lock()
            .get(&public_id.to_string(), Instant::now())
    }

    pub fn store_campaign(&self, campaign: Campaign) {
        self.campaigns.lock().insert(
            campaign.public_id.clone(),
            campaign,
            Instant::now(),
        );
    }

    pub fn options(&self, campaign_id: i64) -> Option<Vec<CampaignOption>> {
        self.options.lock().get(&campaign_id, Instant::now())
    }

    pub fn store_options(&self, campaign_id: i64, options: Vec<CampaignOption>) {
        self.options
            .lock()
            .insert(campaign_id, options, Instant::now());
    }

    pub fn invalidate_options(&self, campaign_id: i64) {
        self.options.lock().invalidate(&campaign_id);
    }

    /// Forgets everything, for when rows changed behind the application's
    /// back.
    pub fn clear(&self) {
        self.campaigns.lock().clear();
        self.options.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_expire_after_their_ttl() {
        let start = Instant::now();
        let mut cache = TtlCache::new(Duration::from_secs(300));
        cache.insert(1, "a", start);

        assert_eq!(cache.get(&1, start + Duration::from_secs(299)), Some("a"));
        assert_eq!(cache.get(&1, start + Duration::from_secs(300)), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidated_entries_are_gone() {
        let now = Instant::now();
        let mut cache = TtlCache::new(Duration::from_secs(600));
        cache.insert("c", 1, now);
        cache.insert("d", 2, now);
        cache.invalidate(&"c");
        assert_eq!(cache.get(&"c", now), None);
        assert_eq!(cache.get(&"d", now), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn missing_keys_are_misses() {
        let mut cache: TtlCache<i64, ()> = TtlCache::new(Duration::ZERO);
        assert_eq!(cache.get(&5, Instant::now()), None);
    }
}
