//! In-memory monitor cache
//!
//! Holds the two views the application reads: the collection view (every
//! monitor visible to the session, in server order) and singular views (one
//! record per id). Both views share one record per id, so a single merge
//! updates whichever views reference it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::model::{MonitorPatch, MonitorRecord};

/// Cache shared between the API client and the push channel
pub type SharedCache = Arc<RwLock<MonitorCache>>;

/// Create an empty shared cache
pub fn shared_cache() -> SharedCache {
    Arc::new(RwLock::new(MonitorCache::default()))
}

/// Invalidation tag
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Every monitor view, list and singular
    Monitors,
    /// The singular view of one monitor
    Monitor(String),
}

/// Which views a patch landed in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub list: bool,
    pub single: bool,
}

impl MergeOutcome {
    pub fn applied(&self) -> bool {
        self.list || self.single
    }
}

#[derive(Debug, Default)]
pub struct MonitorCache {
    records: HashMap<String, MonitorRecord>,
    list: Option<Vec<String>>,
    singles: HashSet<String>,
}

impl MonitorCache {
    /// Replace the collection view
    ///
    /// Records without an id cannot be addressed by updates and are skipped.
    /// A list entry for a monitor whose singular view is loaded is merged
    /// into that record, so fields only the detail endpoint returns survive.
    pub fn store_list(&mut self, records: Vec<MonitorRecord>) {
        let mut order = Vec::with_capacity(records.len());
        for record in records {
            match record.id().map(str::to_string) {
                Some(id) => {
                    order.push(id.clone());
                    if self.singles.contains(&id) {
                        if let Some(existing) = self.records.get_mut(&id) {
                            existing.merge(&record);
                            continue;
                        }
                    }
                    self.records.insert(id, record);
                }
                None => debug!("Skipping monitor record without id"),
            }
        }
        debug!("Cached monitor list ({} entries)", order.len());
        self.list = Some(order);
        self.evict();
    }

    /// Load the singular view of one record, returning false if it has no id
    pub fn store_monitor(&mut self, record: MonitorRecord) -> bool {
        let Some(id) = record.id().map(str::to_string) else {
            debug!("Not caching monitor record without id");
            return false;
        };
        self.singles.insert(id.clone());
        self.records.insert(id, record);
        true
    }

    /// Collection view, if it has been loaded
    pub fn list(&self) -> Option<Vec<MonitorRecord>> {
        self.list.as_ref().map(|ids| {
            ids.iter()
                .filter_map(|id| self.records.get(id).cloned())
                .collect()
        })
    }

    /// Singular view for `id`, if it has been loaded
    pub fn get(&self, id: &str) -> Option<&MonitorRecord> {
        if self.singles.contains(id) {
            self.records.get(id)
        } else {
            None
        }
    }

    pub fn is_list_loaded(&self) -> bool {
        self.list.is_some()
    }

    fn list_contains(&self, id: &str) -> bool {
        self.list
            .as_ref()
            .is_some_and(|ids| ids.iter().any(|listed| listed == id))
    }

    /// Merge a server-pushed partial record into the cached views
    ///
    /// Only records already present in a view are touched: an unknown id
    /// leaves the cache unchanged, and a view that was never loaded is
    /// skipped without affecting the other one. Applying the same patch
    /// twice is the same as applying it once.
    pub fn apply_patch(&mut self, patch: &MonitorPatch) -> MergeOutcome {
        let Some(id) = patch.id() else {
            debug!("Ignoring monitor patch without id");
            return MergeOutcome::default();
        };

        let outcome = MergeOutcome {
            list: self.list_contains(id),
            single: self.singles.contains(id),
        };

        if outcome.applied() {
            if let Some(record) = self.records.get_mut(id) {
                record.merge(patch);
            }
        }
        debug!(
            "Monitor patch {}: list={}, single={}",
            id, outcome.list, outcome.single
        );
        outcome
    }

    /// Drop the views covered by `tags`
    pub fn invalidate(&mut self, tags: &[Tag]) {
        for tag in tags {
            match tag {
                Tag::Monitors => {
                    self.list = None;
                    self.singles.clear();
                }
                Tag::Monitor(id) => {
                    self.singles.remove(id);
                }
            }
        }
        self.evict();
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.list = None;
        self.singles.clear();
    }

    fn evict(&mut self) {
        let listed: HashSet<&String> = self.list.iter().flatten().collect();
        let singles = &self.singles;
        self.records
            .retain(|id, _| listed.contains(id) || singles.contains(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MonitorStatus;
    use serde_json::{json, Value};

    fn record(value: Value) -> MonitorRecord {
        MonitorRecord::from_value(value).unwrap()
    }

    fn sample_cache() -> MonitorCache {
        let mut cache = MonitorCache::default();
        cache.store_list(vec![
            record(json!({"_id": "a", "status": "online", "uptime": 99.5})),
            record(json!({"_id": "b", "status": "offline"})),
        ]);
        cache
    }

    #[test]
    fn test_merge_preserves_order_and_untouched_fields() {
        let mut cache = sample_cache();
        let outcome = cache.apply_patch(&record(json!({"_id": "a", "status": "offline"})));

        assert!(outcome.list);
        assert!(!outcome.single);
        assert_eq!(
            cache.list().unwrap(),
            vec![
                record(json!({"_id": "a", "status": "offline", "uptime": 99.5})),
                record(json!({"_id": "b", "status": "offline"})),
            ]
        );
    }

    #[test]
    fn test_unknown_id_leaves_list_unchanged() {
        let mut cache = sample_cache();
        let before = serde_json::to_string(&cache.list()).unwrap();

        let outcome = cache.apply_patch(&record(json!({"_id": "z", "status": "online"})));

        assert!(!outcome.applied());
        assert_eq!(serde_json::to_string(&cache.list()).unwrap(), before);
        assert!(cache.get("z").is_none());
    }

    #[test]
    fn test_patch_is_idempotent() {
        let patch = record(json!({"_id": "b", "status": "online", "totalChecks": 7}));

        let mut once = sample_cache();
        once.apply_patch(&patch);

        let mut twice = sample_cache();
        twice.apply_patch(&patch);
        twice.apply_patch(&patch);

        assert_eq!(once.list(), twice.list());
    }

    #[test]
    fn test_patch_without_id_is_ignored() {
        let mut cache = sample_cache();
        let outcome = cache.apply_patch(&record(json!({"status": "paused"})));
        assert_eq!(outcome, MergeOutcome::default());
        assert_eq!(cache.list(), sample_cache().list());
    }

    #[test]
    fn test_singular_view_updated_without_list() {
        let mut cache = MonitorCache::default();
        cache.store_monitor(record(json!({"_id": "a", "name": "Docs", "status": "online"})));

        let outcome = cache.apply_patch(&record(json!({"_id": "a", "status": "offline"})));

        assert_eq!(
            outcome,
            MergeOutcome {
                list: false,
                single: true
            }
        );
        assert!(cache.list().is_none());
        assert_eq!(
            cache.get("a"),
            Some(&record(json!({"_id": "a", "name": "Docs", "status": "offline"})))
        );
    }

    #[test]
    fn test_list_and_singular_both_updated() {
        let mut cache = sample_cache();
        cache.store_monitor(record(json!({"_id": "b", "status": "offline"})));

        let outcome = cache.apply_patch(&record(json!({"id": "b", "status": "online"})));

        assert!(outcome.list && outcome.single);
        assert_eq!(cache.get("b").unwrap().status().to_string(), "online");
        assert_eq!(cache.list().unwrap()[1].status().to_string(), "online");
    }

    #[test]
    fn test_list_member_is_not_a_singular_view() {
        let cache = sample_cache();
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn test_store_list_skips_records_without_id() {
        let mut cache = MonitorCache::default();
        cache.store_list(vec![
            record(json!({"name": "orphan"})),
            record(json!({"_id": "a"})),
        ]);
        assert_eq!(cache.list().unwrap(), vec![record(json!({"_id": "a"}))]);
    }

    #[test]
    fn test_invalidate_monitor_keeps_list() {
        let mut cache = sample_cache();
        cache.store_monitor(record(json!({"_id": "a", "status": "online"})));

        cache.invalidate(&[Tag::Monitor("a".to_string())]);

        assert!(cache.get("a").is_none());
        assert_eq!(cache.list().unwrap().len(), 2);
    }

    #[test]
    fn test_invalidate_all_monitors() {
        let mut cache = sample_cache();
        cache.store_monitor(record(json!({"_id": "c"})));

        cache.invalidate(&[Tag::Monitors]);

        assert!(!cache.is_list_loaded());
        assert!(cache.get("c").is_none());
        assert!(cache.records.is_empty());
    }

    #[test]
    fn test_list_refresh_keeps_detail_fields() {
        let mut cache = MonitorCache::default();
        cache.store_monitor(record(
            json!({"_id": "a", "status": "online", "authType": "bearer", "name": "A"}),
        ));

        cache.store_list(vec![record(json!({"_id": "a", "status": "offline", "name": "A2"}))]);

        let single = cache.get("a").unwrap();
        assert_eq!(single.get("authType"), Some(&json!("bearer")));
        assert_eq!(single.get("name"), Some(&json!("A2")));
        assert_eq!(single.status(), MonitorStatus::Offline);
        assert_eq!(cache.list().unwrap()[0].get("authType"), Some(&json!("bearer")));
    }

    #[test]
    fn test_replacing_list_evicts_dropped_records() {
        let mut cache = sample_cache();
        cache.store_monitor(record(json!({"_id": "b"})));
        cache.store_list(vec![record(json!({"_id": "c"}))]);

        assert!(!cache.records.contains_key("a"));
        assert!(cache.records.contains_key("b"));
        assert!(cache.records.contains_key("c"));
    }
}
