//! Bounded recent-alerts cache.
//!
//! `RecentAlertsCache` keeps the last `capacity` alerts, newest first, in a
//! `VecDeque` behind a single mutex. It is a best-effort live view: the
//! listener pushes into it whether or not the store write succeeded, and it
//! is simply empty again after a restart.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::alert::Alert;

/// Default number of alerts kept in memory.
pub const DEFAULT_CAPACITY: usize = 10;

/// Largest bound the configuration accepts.
pub const MAX_CAPACITY: usize = 10_000;

#[derive(Debug)]
pub struct RecentAlertsCache {
    alerts: Mutex<VecDeque<Alert>>,
    capacity: usize,
}

impl RecentAlertsCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            alerts: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    // Every critical section leaves the deque consistent, so a poisoned
    // lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, VecDeque<Alert>> {
        self.alerts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert at the front, evicting from the back beyond capacity.
    pub fn push(&self, alert: Alert) {
        let mut alerts = self.lock();
        alerts.push_front(alert);
        alerts.truncate(self.capacity);
    }

    /// Point-in-time copy, newest first.
    pub fn snapshot(&self) -> Vec<Alert> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for RecentAlertsCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use proptest::prelude::*;

    fn make_alert(n: usize) -> Alert {
        Alert::new(format!("2024-01-01 10:00:{:02}", n % 60), format!("type_{}", n), 0.5, Utc::now())
    }

    #[test]
    fn new_cache_is_empty() {
        let cache = RecentAlertsCache::new(10);
        assert!(cache.is_empty());
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.capacity(), 10);
    }

    #[test]
    fn push_places_newest_first() {
        let cache = RecentAlertsCache::new(10);
        cache.push(make_alert(1));
        cache.push(make_alert(2));

        let snapshot = cache.snapshot();
        assert_eq!(snapshot[0].defect_type, "type_2");
        assert_eq!(snapshot[1].defect_type, "type_1");
    }

    #[test]
    fn push_evicts_oldest_when_at_capacity() {
        let cache = RecentAlertsCache::new(3);
        for i in 1..=4 {
            cache.push(make_alert(i));
        }

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[0].defect_type, "type_4");
        assert!(snapshot.iter().all(|a| a.defect_type != "type_1"));
    }

    #[test]
    fn zero_capacity_holds_nothing() {
        let cache = RecentAlertsCache::new(0);
        cache.push(make_alert(1));
        assert!(cache.is_empty());
        assert!(cache.snapshot().is_empty());
    }

    #[test]
    fn huge_capacity_does_not_preallocate() {
        let cache = RecentAlertsCache::new(usize::MAX);
        cache.push(make_alert(1));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.capacity(), usize::MAX);
    }

    #[test]
    fn snapshot_is_detached_from_later_pushes() {
        let cache = RecentAlertsCache::new(5);
        cache.push(make_alert(1));
        let before = cache.snapshot();
        cache.push(make_alert(2));

        assert_eq!(before.len(), 1);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn default_capacity_is_ten() {
        assert_eq!(RecentAlertsCache::default().capacity(), DEFAULT_CAPACITY);
    }

    #[test]
    fn concurrent_pushes_respect_the_bound() {
        let cache = Arc::new(RecentAlertsCache::new(10));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        cache.push(make_alert(t * 100 + i));
                        assert!(cache.snapshot().len() <= 10);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 10);
    }

    proptest! {
        #[test]
        fn never_exceeds_capacity_and_keeps_latest(capacity in 0usize..20, pushes in 0usize..60) {
            let cache = RecentAlertsCache::new(capacity);
            for i in 0..pushes {
                cache.push(make_alert(i));
            }

            let snapshot = cache.snapshot();
            prop_assert_eq!(snapshot.len(), pushes.min(capacity));
            for (offset, alert) in snapshot.iter().enumerate() {
                prop_assert_eq!(&alert.defect_type, &format!("type_{}", pushes - 1 - offset));
            }
        }
    }
}
