//! Detection event bus.
//!
//! Fan-out of published batches to independent observers. Each subscriber
//! owns a bounded queue and a delivery task:
//! - `publish` never blocks; a full queue drops its oldest batch
//! - one observer failing, panicking or stalling affects only its own queue
//! - batches are enqueued to subscribers in subscription order
//!
//! The last published batch is also kept as an `Arc` snapshot in a `watch`
//! channel, so readers never hold a lock across an await.

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use futures_util::stream::{self, Stream};
use futures_util::FutureExt;
use lens_models::DetectionBatch;
use tokio::sync::{watch, Notify};
use tracing::{debug, error, warn};

use crate::metrics;

/// Error type observers may return.
pub type ObserverError = Box<dyn StdError + Send + Sync>;

/// Consumer of published batches.
#[async_trait]
pub trait Observer: Send + Sync + 'static {
    /// Name used in logs and metrics.
    fn name(&self) -> &str;

    async fn on_batch(&self, batch: Arc<DetectionBatch>) -> Result<(), ObserverError>;
}

/// Bounded drop-oldest queue feeding one subscriber.
struct SubscriberQueue {
    items: Mutex<VecDeque<Arc<DetectionBatch>>>,
    capacity: usize,
    notify: Notify,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl SubscriberQueue {
    fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue, evicting the oldest item when full. Returns true on eviction.
    fn push(&self, batch: Arc<DetectionBatch>) -> bool {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        let evicted = if items.len() >= self.capacity {
            items.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        };
        items.push_back(batch);
        drop(items);
        self.notify.notify_one();
        evicted
    }

    /// Next item; `None` once closed and drained.
    async fn pop(&self) -> Option<Arc<DetectionBatch>> {
        loop {
            if let Some(batch) = self
                .items
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front()
            {
                return Some(batch);
            }
            if self.closed.load(Ordering::SeqCst) {
                return None;
            }
            self.notify.notified().await;
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    fn len(&self) -> usize {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

struct Subscriber {
    id: u64,
    name: String,
    queue: Arc<SubscriberQueue>,
}

struct BusInner {
    subscribers: RwLock<Vec<Subscriber>>,
    next_id: AtomicU64,
    queue_depth: usize,
    latest: watch::Sender<Option<Arc<DetectionBatch>>>,
    closed: AtomicBool,
}

/// Handle returned by `subscribe`; pass it to `unsubscribe`.
#[derive(Clone)]
pub struct SubscriptionHandle {
    id: u64,
    queue: Arc<SubscriberQueue>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Batches dropped from this subscriber's full queue so far.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped.load(Ordering::Relaxed)
    }

    /// Batches waiting for delivery.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// True once the subscription has been closed by `unsubscribe` or `close`.
    pub fn is_closed(&self) -> bool {
        self.queue.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("dropped", &self.dropped())
            .finish()
    }
}

/// Publish/subscribe hub for detection batches. Clones share the same bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new(queue_depth: usize) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            inner: Arc::new(BusInner {
                subscribers: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
                queue_depth: queue_depth.max(1),
                latest,
                closed: AtomicBool::new(false),
            }),
        }
    }

    fn register(&self, name: &str) -> SubscriptionHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(SubscriberQueue::new(self.inner.queue_depth));

        // `close` drains under the same lock, so a subscriber is either
        // pushed before the drain or sees the flag here.
        let mut subscribers = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if self.is_closed() {
            queue.close();
        } else {
            subscribers.push(Subscriber {
                id,
                name: name.to_string(),
                queue: Arc::clone(&queue),
            });
        }
        drop(subscribers);

        debug!(subscriber = %name, id, "Subscribed to event bus");
        SubscriptionHandle { id, queue }
    }

    /// Register an observer and start its delivery task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn subscribe(&self, observer: Arc<dyn Observer>) -> SubscriptionHandle {
        let name = observer.name().to_string();
        let handle = self.register(&name);
        let queue = Arc::clone(&handle.queue);

        tokio::spawn(async move {
            while let Some(batch) = queue.pop().await {
                let frame_id = batch.frame_id;
                match AssertUnwindSafe(observer.on_batch(batch)).catch_unwind().await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        metrics::record_observer_failure(&name);
                        warn!(subscriber = %name, frame_id, error = %e, "Observer failed");
                    }
                    Err(_) => {
                        metrics::record_observer_failure(&name);
                        error!(subscriber = %name, frame_id, "Observer panicked");
                    }
                }
            }
            debug!(subscriber = %name, "Delivery task finished");
        });

        handle
    }

    /// Subscribe as an async stream.
    ///
    /// Uses the same bounded drop-oldest queue as observers. The stream ends
    /// after the bus is closed and its queue is drained; dropping it
    /// unsubscribes.
    pub fn subscribe_stream(
        &self,
        name: &str,
    ) -> (SubscriptionHandle, impl Stream<Item = Arc<DetectionBatch>> + Send + 'static) {
        let handle = self.register(name);
        let guard = StreamGuard {
            bus: self.clone(),
            handle: handle.clone(),
        };

        let stream = stream::unfold(guard, |guard| async move {
            let batch = guard.handle.queue.pop().await?;
            Some((batch, guard))
        });

        (handle, stream)
    }

    /// Remove a subscription. Batches already queued are still delivered.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let mut subscribers = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();
        subscribers.retain(|s| s.id != handle.id);
        handle.queue.close();
        subscribers.len() != before
    }

    /// Publish a batch to every subscriber and replace the latest snapshot.
    ///
    /// Never blocks on subscribers.
    pub fn publish(&self, batch: DetectionBatch) -> Arc<DetectionBatch> {
        let batch = Arc::new(batch);
        self.inner.latest.send_replace(Some(Arc::clone(&batch)));

        let subscribers = self
            .inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        for subscriber in subscribers.iter() {
            if subscriber.queue.push(Arc::clone(&batch)) {
                metrics::record_bus_drop(&subscriber.name);
                debug!(
                    subscriber = %subscriber.name,
                    frame_id = batch.frame_id,
                    "Subscriber queue full, dropped oldest batch"
                );
            }
        }
        drop(subscribers);

        metrics::record_published();
        batch
    }

    /// Last published batch, if any.
    pub fn latest(&self) -> Option<Arc<DetectionBatch>> {
        self.inner.latest.borrow().clone()
    }

    /// Receiver that observes every snapshot replacement.
    pub fn watch_latest(&self) -> watch::Receiver<Option<Arc<DetectionBatch>>> {
        self.inner.latest.subscribe()
    }

    /// End every subscription. Queued batches are still delivered.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let subscribers = std::mem::take(
            &mut *self
                .inner
                .subscribers
                .write()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for subscriber in &subscribers {
            subscriber.queue.close();
        }
        debug!(subscribers = subscribers.len(), "Event bus closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn queue_depth(&self) -> usize {
        self.inner.queue_depth
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(4)
    }
}

struct StreamGuard {
    bus: EventBus,
    handle: SubscriptionHandle,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.bus.unsubscribe(&self.handle);
    }
}
