use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::limits::MAX_LOCK_KEYS;
use crate::model::{ShopId, StylistId};
use crate::store::StoreError;

/// Unit of booking exclusion. Operations on different keys never wait on each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockKey {
    ShopDay(ShopId, NaiveDate),
    StylistDay(StylistId, NaiveDate),
}

/// Held scope locks. Dropping the guard releases every key.
#[derive(Debug)]
pub struct ScopeGuard {
    keys: Vec<LockKey>,
    _held: Vec<OwnedMutexGuard<()>>,
}

impl ScopeGuard {
    pub fn keys(&self) -> &[LockKey] {
        &self.keys
    }
}

/// Advisory lock table keyed by `(shop, day)` and `(stylist, day)`.
#[derive(Default)]
pub struct DayLocks {
    slots: DashMap<LockKey, Arc<Mutex<()>>>,
}

impl DayLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: LockKey) -> Arc<Mutex<()>> {
        self.slots.entry(key).or_default().value().clone()
    }

    /// Lock every key, in sorted order so overlapping key sets cannot deadlock.
    /// Gives up after `timeout`, releasing anything acquired so far.
    pub async fn acquire(&self, keys: &[LockKey], timeout: Duration) -> Result<ScopeGuard, StoreError> {
        let mut ordered = keys.to_vec();
        ordered.sort();
        ordered.dedup();
        if ordered.len() > MAX_LOCK_KEYS {
            return Err(StoreError::LimitExceeded("too many lock keys"));
        }

        let started = Instant::now();
        let acquire_all = async {
            let mut held = Vec::with_capacity(ordered.len());
            for key in &ordered {
                held.push(self.slot(*key).lock_owned().await);
            }
            held
        };

        match tokio::time::timeout(timeout, acquire_all).await {
            Ok(held) => {
                metrics::histogram!(crate::observability::LOCK_WAIT_SECONDS)
                    .record(started.elapsed().as_secs_f64());
                Ok(ScopeGuard { keys: ordered, _held: held })
            }
            Err(_) => {
                metrics::counter!(crate::observability::LOCK_TIMEOUTS_TOTAL).increment(1);
                let waited = started.elapsed();
                tracing::warn!(?ordered, ?waited, "scope lock timed out");
                Err(StoreError::LockTimeout { waited })
            }
        }
    }

    /// Drop slots nobody holds or waits on. Returns how many were removed.
    pub fn prune_idle(&self) -> usize {
        let before = self.slots.len();
        // The map holds one reference; any other means a holder or waiter.
        self.slots.retain(|_, slot| Arc::strong_count(slot) > 1);
        let after = self.slots.len();
        metrics::gauge!(crate::observability::LOCK_SLOTS).set(after as f64);
        before - after
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use ulid::Ulid;

    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 6, d).unwrap()
    }

    const WAIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locks = DayLocks::new();
        let key = LockKey::ShopDay(Ulid::new(), day(3));
        let _held = locks.acquire(&[key], WAIT).await.unwrap();

        let result = locks.acquire(&[key], Duration::from_millis(50)).await;
        assert!(matches!(result, Err(StoreError::LockTimeout { .. })));
    }

    #[tokio::test]
    async fn different_days_do_not_contend() {
        let locks = DayLocks::new();
        let shop = Ulid::new();
        let _monday = locks.acquire(&[LockKey::ShopDay(shop, day(3))], WAIT).await.unwrap();
        let tuesday = locks
            .acquire(&[LockKey::ShopDay(shop, day(4))], Duration::from_millis(50))
            .await;
        assert!(tuesday.is_ok());
    }

    #[tokio::test]
    async fn different_shops_do_not_contend() {
        let locks = DayLocks::new();
        let _a = locks.acquire(&[LockKey::ShopDay(Ulid::new(), day(3))], WAIT).await.unwrap();
        let b = locks
            .acquire(&[LockKey::ShopDay(Ulid::new(), day(3))], Duration::from_millis(50))
            .await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn keys_are_sorted_and_deduplicated() {
        let locks = DayLocks::new();
        let shop = Ulid::new();
        let stylist = Ulid::new();
        let keys = [
            LockKey::StylistDay(stylist, day(3)),
            LockKey::ShopDay(shop, day(3)),
            LockKey::ShopDay(shop, day(3)),
        ];
        let guard = locks.acquire(&keys, WAIT).await.unwrap();
        assert_eq!(
            guard.keys(),
            &[LockKey::ShopDay(shop, day(3)), LockKey::StylistDay(stylist, day(3))]
        );
    }

    #[tokio::test]
    async fn release_on_drop_wakes_waiter() {
        let locks = Arc::new(DayLocks::new());
        let key = LockKey::ShopDay(Ulid::new(), day(3));
        let held = locks.acquire(&[key], WAIT).await.unwrap();

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire(&[key], WAIT).await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);
        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn crossing_key_orders_do_not_deadlock() {
        let locks = Arc::new(DayLocks::new());
        let a = LockKey::ShopDay(Ulid::new(), day(3));
        let b = LockKey::StylistDay(Ulid::new(), day(3));
        let done = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..20 {
            let locks = locks.clone();
            let done = done.clone();
            let keys = if i % 2 == 0 { [a, b] } else { [b, a] };
            handles.push(tokio::spawn(async move {
                let _g = locks.acquire(&keys, WAIT).await.unwrap();
                tokio::task::yield_now().await;
                done.fetch_add(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(done.load(Ordering::SeqCst), 20);
    }

    #[tokio::test]
    async fn too_many_keys_rejected() {
        let locks = DayLocks::new();
        let keys: Vec<LockKey> = (0..=MAX_LOCK_KEYS)
            .map(|_| LockKey::ShopDay(Ulid::new(), day(3)))
            .collect();
        let result = locks.acquire(&keys, WAIT).await;
        assert!(matches!(result, Err(StoreError::LimitExceeded(_))));
    }

    #[tokio::test]
    async fn prune_keeps_held_slots() {
        let locks = DayLocks::new();
        let held_key = LockKey::ShopDay(Ulid::new(), day(3));
        let idle_key = LockKey::ShopDay(Ulid::new(), day(4));
        let held = locks.acquire(&[held_key], WAIT).await.unwrap();
        drop(locks.acquire(&[idle_key], WAIT).await.unwrap());
        assert_eq!(locks.len(), 2);

        assert_eq!(locks.prune_idle(), 1);
        assert_eq!(locks.len(), 1);

        drop(held);
        assert_eq!(locks.prune_idle(), 1);
        assert!(locks.is_empty());
    }
}
