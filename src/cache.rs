use dashmap::DashMap;
use std::sync::Arc;

/// Process-local cache of token usage, keyed by auth token.
///
/// Non-authoritative: entries are overwritten on every validity check from
/// the store's values and evicted when a lookup finds no matching record —
/// there is no TTL. The cache is only ever mutated from inside the gate's
/// serialized admission section, so a single writer is guaranteed.
#[derive(Clone, Default)]
pub struct UsageCache {
    /// token -> (call_count, call_count_limit); `None` limit means unlimited.
    counts: Arc<DashMap<String, (i64, Option<i64>)>>,
    descriptions: Arc<DashMap<String, String>>,
}

impl UsageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, token: &str) -> Option<(i64, Option<i64>)> {
        self.counts.get(token).map(|e| *e)
    }

    pub fn get_description(&self, token: &str) -> Option<String> {
        self.descriptions.get(token).map(|e| e.clone())
    }

    /// Overwrite the cached entry with the store's current values.
    pub fn refresh(&self, token: &str, count: i64, limit: Option<i64>, description: Option<&str>) {
        self.counts.insert(token.to_string(), (count, limit));
        self.descriptions
            .insert(token.to_string(), description.unwrap_or_default().to_string());
    }

    /// Evict a token the store no longer knows about.
    pub fn invalidate(&self, token: &str) {
        self.counts.remove(token);
        self.descriptions.remove(token);
    }

    /// Local add alongside the store increment. Best-effort: if the entry is
    /// not cached the next validity check rebuilds it from the store anyway.
    pub fn bump(&self, token: &str, units: i64) {
        if let Some(mut entry) = self.counts.get_mut(token) {
            entry.0 += units;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_then_get() {
        let cache = UsageCache::new();
        cache.refresh("tok", 3, Some(10), Some("test token"));

        assert_eq!(cache.get("tok"), Some((3, Some(10))));
        assert_eq!(cache.get_description("tok").as_deref(), Some("test token"));
    }

    #[test]
    fn test_refresh_overwrites() {
        let cache = UsageCache::new();
        cache.refresh("tok", 3, Some(10), Some("old"));
        cache.refresh("tok", 7, None, Some("new"));

        assert_eq!(cache.get("tok"), Some((7, None)));
        assert_eq!(cache.get_description("tok").as_deref(), Some("new"));
    }

    #[test]
    fn test_bump_only_touches_cached_entries() {
        let cache = UsageCache::new();
        cache.bump("missing", 5);
        assert_eq!(cache.get("missing"), None);

        cache.refresh("tok", 1, Some(4), None);
        cache.bump("tok", 2);
        assert_eq!(cache.get("tok"), Some((3, Some(4))));
    }

    #[test]
    fn test_invalidate_removes_both_maps() {
        let cache = UsageCache::new();
        cache.refresh("tok", 1, None, Some("desc"));
        cache.invalidate("tok");

        assert_eq!(cache.get("tok"), None);
        assert_eq!(cache.get_description("tok"), None);
    }

    #[test]
    fn test_missing_description_cached_as_empty() {
        let cache = UsageCache::new();
        cache.refresh("tok", 0, None, None);
        assert_eq!(cache.get_description("tok").as_deref(), Some(""));
    }
}
