// Last-known-good reports, read only when an upstream fetch fails.
use moka::sync::Cache;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::config::{FallbackPolicy, MAX_CACHE_TTL};
use crate::types::{Report, TrackerId};

pub struct ReportCache<R: Report> {
    /// Most recent successful report of this kind, from any tracker.
    latest: Mutex<Option<(TrackerId, R)>>,
    by_tracker: Cache<TrackerId, R>,
}

impl<R: Report> ReportCache<R> {
    /// `ttl` is capped at [`MAX_CACHE_TTL`].
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        let by_tracker = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl.min(MAX_CACHE_TTL))
            .build();

        ReportCache {
            latest: Mutex::new(None),
            by_tracker,
        }
    }

    /// Record a successful fetch. Last write wins.
    pub fn store(&self, tracker_id: &TrackerId, report: R) {
        self.by_tracker.insert(tracker_id.clone(), report.clone());
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) =
            Some((tracker_id.clone(), report));
    }

    /// The last report stored, whichever tracker it belongs to.
    pub fn latest(&self) -> Option<(TrackerId, R)> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn for_tracker(&self, tracker_id: &TrackerId) -> Option<R> {
        self.by_tracker.get(tracker_id)
    }

    /// Report to serve in place of a failed fetch for `tracker_id`.
    pub fn fallback(&self, tracker_id: &TrackerId, policy: FallbackPolicy) -> Option<R> {
        match policy {
            FallbackPolicy::SharedSlot => self.latest().map(|(_, report)| report),
            FallbackPolicy::PerTracker => self.for_tracker(tracker_id),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HardwareReport;

    fn report(id: &str, battery_level: u8) -> HardwareReport {
        HardwareReport {
            time: Some(1_700_000_000),
            battery_level: Some(battery_level),
            id: Some(id.to_string()),
            report_type: None,
            version: None,
            report_id: None,
            extra: serde_json::Map::new(),
        }
    }

    fn id(raw: &str) -> TrackerId {
        TrackerId::parse(raw).unwrap()
    }

    #[test]
    fn test_empty_cache() {
        let cache: ReportCache<HardwareReport> = ReportCache::new(10, Duration::from_secs(60));
        assert!(cache.is_empty());
        assert!(cache.fallback(&id("AAAAAAAA"), FallbackPolicy::SharedSlot).is_none());
        assert!(cache.fallback(&id("AAAAAAAA"), FallbackPolicy::PerTracker).is_none());
    }

    #[test]
    fn test_shared_slot_crosses_trackers() {
        let cache = ReportCache::new(10, Duration::from_secs(60));
        cache.store(&id("AAAAAAAA"), report("AAAAAAAA", 40));

        let fallback = cache.fallback(&id("BBBBBBBB"), FallbackPolicy::SharedSlot);
        assert_eq!(fallback.unwrap().id.as_deref(), Some("AAAAAAAA"));
    }

    #[test]
    fn test_per_tracker_is_keyed() {
        let cache = ReportCache::new(10, Duration::from_secs(60));
        cache.store(&id("AAAAAAAA"), report("AAAAAAAA", 40));
        cache.store(&id("BBBBBBBB"), report("BBBBBBBB", 70));

        let a = cache.fallback(&id("AAAAAAAA"), FallbackPolicy::PerTracker);
        assert_eq!(a.unwrap().battery_level, Some(40));
        assert!(cache.fallback(&id("CCCCCCCC"), FallbackPolicy::PerTracker).is_none());
    }

    #[test]
    fn test_last_write_wins() {
        let cache = ReportCache::new(10, Duration::from_secs(60));
        cache.store(&id("AAAAAAAA"), report("AAAAAAAA", 40));
        cache.store(&id("AAAAAAAA"), report("AAAAAAAA", 39));

        let (tracker, latest) = cache.latest().unwrap();
        assert_eq!(tracker.as_str(), "AAAAAAAA");
        assert_eq!(latest.battery_level, Some(39));
        assert_eq!(
            cache.for_tracker(&id("AAAAAAAA")).unwrap().battery_level,
            Some(39)
        );
    }

    #[test]
    fn test_per_tracker_entries_expire() {
        let cache = ReportCache::new(10, Duration::from_millis(50));
        cache.store(&id("AAAAAAAA"), report("AAAAAAAA", 40));
        assert!(cache.for_tracker(&id("AAAAAAAA")).is_some());

        std::thread::sleep(Duration::from_millis(150));

        assert!(cache.for_tracker(&id("AAAAAAAA")).is_none());
        assert!(cache.fallback(&id("AAAAAAAA"), FallbackPolicy::PerTracker).is_none());
        // the shared slot has no lifetime
        assert!(cache.fallback(&id("AAAAAAAA"), FallbackPolicy::SharedSlot).is_some());
    }

    #[test]
    fn test_per_tracker_capacity_is_bounded() {
        let cache = ReportCache::new(10, Duration::from_secs(60));
        for n in 0..100 {
            let raw = format!("TRACK{n:03}");
            cache.store(&id(&raw), report(&raw, 50));
        }
        cache.by_tracker.run_pending_tasks();

        assert!(cache.by_tracker.entry_count() <= 10);
        assert_eq!(cache.latest().unwrap().0.as_str(), "TRACK099");
    }

    #[test]
    fn test_oversized_ttl_is_capped() {
        let cache = ReportCache::new(10, Duration::from_secs(u64::MAX));
        cache.store(&id("AAAAAAAA"), report("AAAAAAAA", 40));
        assert!(cache.for_tracker(&id("AAAAAAAA")).is_some());
    }
}
