//! Shared, deduplicated polling of widget requests
//!
//! One background task per request key fetches on a fixed interval and
//! publishes each outcome through a `watch` channel. That task is the only
//! writer of its entry; subscribers just read. Entries whose last subscriber
//! leaves stop polling and are removed after a grace period unless someone
//! subscribes again.

use async_trait::async_trait;
use futures::stream::{self, Stream};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify, watch};
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::errors::Result;
use crate::models::cache::CacheEntry;
use crate::models::widget::RequestDescriptor;

/// Performs the actual request for a descriptor.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, descriptor: &RequestDescriptor) -> Result<Value>;
}

struct Slot {
    key: String,
    descriptor: RequestDescriptor,
    interval_ms: AtomicU64,
    subscribers: AtomicUsize,
    revived: Notify,
    entry: watch::Sender<CacheEntry>,
}

impl Slot {
    fn subscribers(&self) -> usize {
        self.subscribers.load(Ordering::SeqCst)
    }

    fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.load(Ordering::SeqCst))
    }
}

/// A live interest in one request key. Dropping it unsubscribes.
pub struct Subscription {
    id: Uuid,
    slot: Arc<Slot>,
    rx: watch::Receiver<CacheEntry>,
}

impl Subscription {
    fn attach(slot: Arc<Slot>) -> Self {
        slot.subscribers.fetch_add(1, Ordering::SeqCst);
        slot.revived.notify_one();
        let rx = slot.entry.subscribe();
        Self {
            id: Uuid::new_v4(),
            slot,
            rx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.slot.key
    }

    pub fn descriptor(&self) -> &RequestDescriptor {
        &self.slot.descriptor
    }

    /// Latest entry, without waiting.
    pub fn current(&self) -> CacheEntry {
        let mut entry = self.rx.borrow().clone();
        entry.subscriber_count = self.slot.subscribers();
        entry
    }

    /// Wait for the next update. `None` once the entry is gone.
    pub async fn changed(&mut self) -> Option<CacheEntry> {
        self.rx.changed().await.ok()?;
        let mut entry = self.rx.borrow_and_update().clone();
        entry.subscriber_count = self.slot.subscribers();
        Some(entry)
    }

    /// The current entry followed by every update.
    pub fn into_stream(self) -> impl Stream<Item = CacheEntry> + Send + 'static {
        stream::unfold((self, true), |(mut subscription, first)| async move {
            if first {
                let entry = subscription.current();
                return Some((entry, (subscription, false)));
            }
            let entry = subscription.changed().await?;
            Some((entry, (subscription, false)))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let remaining = self.slot.subscribers.fetch_sub(1, Ordering::SeqCst) - 1;
        debug!("Subscription {} left {} ({} remaining)", self.id, self.slot.key, remaining);
    }
}

struct Inner {
    fetcher: Arc<dyn Fetcher>,
    grace: Duration,
    generation: AtomicU64,
    entries: Mutex<HashMap<String, Arc<Slot>>>,
}

impl Inner {
    async fn run(self: Arc<Self>, slot: Arc<Slot>) {
        loop {
            let outcome = self.fetcher.fetch(&slot.descriptor).await;

            let subscribers = slot.subscribers();
            if subscribers == 0 {
                debug!("Discarding result for {}: no subscribers", slot.key);
            } else {
                match &outcome {
                    Err(e) if e.is_transient() => warn!("Fetch for {} failed: {}", slot.key, e),
                    Err(e) => error!("Fetch for {} failed permanently: {}", slot.key, e),
                    Ok(_) => debug!("Fetched {}", slot.key),
                }
                slot.entry.send_modify(|entry| {
                    entry.apply(outcome);
                    entry.subscriber_count = subscribers;
                });
            }

            sleep(slot.interval()).await;

            if slot.subscribers() == 0 && self.idle(&slot).await {
                break;
            }
        }

        info!("Stopped polling {}", slot.key);
    }

    /// Wait out the grace period. Returns true if the entry was removed,
    /// false if a subscriber came back.
    async fn idle(&self, slot: &Arc<Slot>) -> bool {
        let deadline = Instant::now() + self.grace;
        loop {
            if slot.subscribers() > 0 {
                return false;
            }
            tokio::select! {
                _ = slot.revived.notified() => {}
                _ = sleep_until(deadline) => return self.retire(slot).await,
            }
        }
    }

    async fn retire(&self, slot: &Arc<Slot>) -> bool {
        let mut entries = self.entries.lock().await;
        if slot.subscribers() > 0 {
            return false;
        }
        // After a reset the key may belong to a newer slot.
        if entries.get(&slot.key).is_some_and(|s| Arc::ptr_eq(s, slot)) {
            entries.remove(&slot.key);
        }
        true
    }
}

/// Process-wide cache of widget fetch results.
#[derive(Clone)]
pub struct PollingCache {
    inner: Arc<Inner>,
}

impl PollingCache {
    pub fn new(fetcher: Arc<dyn Fetcher>, grace: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                fetcher,
                grace,
                generation: AtomicU64::new(0),
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    fn key_for(&self, descriptor: &RequestDescriptor) -> String {
        format!(
            "{}#{}",
            self.inner.generation.load(Ordering::SeqCst),
            descriptor.cache_key()
        )
    }

    /// Subscribe to a descriptor, starting its fetch cycle if needed.
    ///
    /// Subscribers of the same key share one cycle; it runs at the shortest
    /// interval any of them asked for.
    pub async fn subscribe(&self, descriptor: RequestDescriptor, interval: Duration) -> Subscription {
        let key = self.key_for(&descriptor);
        let interval_ms = (interval.as_millis() as u64).max(1);

        let mut entries = self.inner.entries.lock().await;
        if let Some(slot) = entries.get(&key) {
            slot.interval_ms.fetch_min(interval_ms, Ordering::SeqCst);
            return Subscription::attach(Arc::clone(slot));
        }

        let (entry, _) = watch::channel(CacheEntry::pending(key.clone()));
        let slot = Arc::new(Slot {
            key: key.clone(),
            descriptor,
            interval_ms: AtomicU64::new(interval_ms),
            subscribers: AtomicUsize::new(0),
            revived: Notify::new(),
            entry,
        });
        entries.insert(key.clone(), Arc::clone(&slot));
        let subscription = Subscription::attach(Arc::clone(&slot));
        drop(entries);

        info!("Started polling {} every {}ms", key, interval_ms);
        tokio::spawn(Arc::clone(&self.inner).run(slot));

        subscription
    }

    pub fn unsubscribe(&self, subscription: Subscription) {
        drop(subscription);
    }

    /// Start a new generation: later subscriptions never share entries with
    /// earlier ones. Existing subscriptions keep working until dropped.
    pub async fn reset(&self) {
        let mut entries = self.inner.entries.lock().await;
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let detached = entries.len();
        entries.clear();
        info!("Cache generation {} started, {} entries detached", generation, detached);
    }

    /// Snapshot of a descriptor's entry, if one is live.
    pub async fn peek(&self, descriptor: &RequestDescriptor) -> Option<CacheEntry> {
        let key = self.key_for(descriptor);
        let entries = self.inner.entries.lock().await;
        entries.get(&key).map(|slot| {
            let mut entry = slot.entry.borrow().clone();
            entry.subscriber_count = slot.subscribers();
            entry
        })
    }

    pub async fn len(&self) -> usize {
        self.inner.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
