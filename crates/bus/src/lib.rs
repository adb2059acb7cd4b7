//! In-process subscription bus.
//!
//! Synchronous fan-out of values to registered callbacks. Delivery is
//! best-effort: a panicking subscriber is logged and skipped, the rest of
//! the pass still runs.

use serde::Serialize;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// Callback invoked with every published value.
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync + 'static>;

struct Registry<T> {
    next_id: u64,
    // Ordered by registration so delivery order is stable.
    callbacks: BTreeMap<u64, Callback<T>>,
}

struct Shared<T> {
    registry: Mutex<Registry<T>>,
    published: AtomicU64,
    panics: AtomicU64,
}

impl<T> Shared<T> {
    fn registry(&self) -> MutexGuard<'_, Registry<T>> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Fan-out bus for values of type `T`.
///
/// Cloning yields another handle to the same subscriber list.
pub struct SubscriptionBus<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for SubscriptionBus<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Default for SubscriptionBus<T> {
    fn default() -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: Mutex::new(Registry {
                    next_id: 0,
                    callbacks: BTreeMap::new(),
                }),
                published: AtomicU64::new(0),
                panics: AtomicU64::new(0),
            }),
        }
    }
}

impl<T: 'static> SubscriptionBus<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for future publications.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = {
            let mut registry = self.shared.registry();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.callbacks.insert(id, Arc::new(callback));
            id
        };
        tracing::debug!(id, subscribers = self.len(), "subscriber added");

        let weak: Weak<Shared<T>> = Arc::downgrade(&self.shared);
        Subscription {
            id,
            detach: Some(Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.registry().callbacks.remove(&id);
                }
            })),
        }
    }

    /// Register `callback` and call it once, synchronously, with `current`.
    pub fn subscribe_with_current<F>(&self, callback: F, current: &T) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let callback: Callback<T> = Arc::new(callback);
        let initial = Arc::clone(&callback);
        let subscription = self.subscribe(move |value: &T| callback(value));
        self.deliver(subscription.id, &initial, current);
        subscription
    }

    /// Deliver `value` to every subscriber registered when the pass starts.
    ///
    /// Returns how many callbacks completed without panicking.
    pub fn publish(&self, value: &T) -> usize {
        // Stable copy: callbacks may (un)subscribe while we iterate.
        let snapshot: Vec<(u64, Callback<T>)> = self
            .shared
            .registry()
            .callbacks
            .iter()
            .map(|(id, cb)| (*id, Arc::clone(cb)))
            .collect();

        self.shared.published.fetch_add(1, Ordering::Relaxed);
        snapshot
            .iter()
            .filter(|(id, cb)| self.deliver(*id, cb, value))
            .count()
    }

    fn deliver(&self, id: u64, callback: &Callback<T>, value: &T) -> bool {
        match catch_unwind(AssertUnwindSafe(|| callback(value))) {
            Ok(()) => true,
            Err(payload) => {
                let panics = self.shared.panics.fetch_add(1, Ordering::Relaxed) + 1;
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic".to_string());
                tracing::error!(id, panics, %message, "subscriber panicked");
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.shared.registry().callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every subscriber. Outstanding handles become no-ops.
    pub fn clear(&self) {
        let removed = {
            let mut registry = self.shared.registry();
            let n = registry.callbacks.len();
            registry.callbacks.clear();
            n
        };
        tracing::debug!(removed, "subscribers cleared");
    }

    pub fn stats(&self) -> BusStats {
        BusStats {
            subscribers: self.len(),
            published: self.shared.published.load(Ordering::Relaxed),
            subscriber_panics: self.shared.panics.load(Ordering::Relaxed),
        }
    }
}

/// Handle returned by `subscribe`.
///
/// Dropping the handle does not unsubscribe; call [`Subscription::unsubscribe`].
pub struct Subscription {
    id: u64,
    detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Deregister. Safe to call after the bus is gone or cleared.
    pub fn unsubscribe(mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusStats {
    pub subscribers: usize,
    pub published: u64,
    pub subscriber_panics: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&u32) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        (count, move |_: &u32| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_subscribe_with_current_calls_once_immediately() {
        let bus = SubscriptionBus::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);

        let _sub = bus.subscribe_with_current(
            move |v: &u32| seen_clone.lock().unwrap().push(*v),
            &7,
        );
        assert_eq!(*seen.lock().unwrap(), vec![7]);

        bus.publish(&8);
        assert_eq!(*seen.lock().unwrap(), vec![7, 8]);
    }

    #[test]
    fn test_plain_subscribe_has_no_initial_call() {
        let bus = SubscriptionBus::<u32>::new();
        let (count, cb) = counter();
        let _sub = bus.subscribe(cb);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(bus.publish(&1), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = SubscriptionBus::<u32>::new();
        let (count, cb) = counter();
        let sub = bus.subscribe(cb);
        bus.publish(&1);
        sub.unsubscribe();
        bus.publish(&2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(bus.is_empty());
    }

    #[test]
    fn test_drop_does_not_unsubscribe() {
        let bus = SubscriptionBus::<u32>::new();
        let (count, cb) = counter();
        drop(bus.subscribe(cb));
        bus.publish(&1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_subscriber_does_not_block_others() {
        let bus = SubscriptionBus::<u32>::new();
        let (count, cb) = counter();
        let _bad = bus.subscribe(|_: &u32| panic!("boom"));
        let _good = bus.subscribe(cb);

        assert_eq!(bus.publish(&1), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.stats().subscriber_panics, 1);
    }

    #[test]
    fn test_unsubscribe_during_pass_does_not_skip_others() {
        let bus = SubscriptionBus::<u32>::new();
        let (count, cb) = counter();

        let victim: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let victim_clone = Arc::clone(&victim);
        let _first = bus.subscribe(move |_: &u32| {
            if let Some(sub) = victim_clone.lock().unwrap().take() {
                sub.unsubscribe();
            }
        });
        *victim.lock().unwrap() = Some(bus.subscribe(|_: &u32| {}));
        let _third = bus.subscribe(cb);

        // The victim was in the snapshot, so all three run this pass.
        assert_eq!(bus.publish(&1), 3);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.len(), 2);
    }

    #[test]
    fn test_subscribe_during_pass_waits_for_next() {
        let bus = SubscriptionBus::<u32>::new();
        let bus_clone = bus.clone();
        let added = Arc::new(AtomicUsize::new(0));
        let added_clone = Arc::clone(&added);
        let _sub = bus.subscribe(move |_: &u32| {
            if added_clone.fetch_add(1, Ordering::SeqCst) == 0 {
                std::mem::forget(bus_clone.subscribe(|_: &u32| {}));
            }
        });

        assert_eq!(bus.publish(&1), 1);
        assert_eq!(bus.publish(&2), 2);
    }

    #[test]
    fn test_clear_and_stale_handles() {
        let bus = SubscriptionBus::<u32>::new();
        let (count, cb) = counter();
        let sub = bus.subscribe(cb);
        bus.clear();
        bus.publish(&1);
        sub.unsubscribe();
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(bus.stats().published, 1);
    }

    #[test]
    fn test_unsubscribe_after_bus_dropped() {
        let bus = SubscriptionBus::<u32>::new();
        let sub = bus.subscribe(|_: &u32| {});
        drop(bus);
        sub.unsubscribe();
    }
}
