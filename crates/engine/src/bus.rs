// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed pub/sub event bus with synchronous and task-pool dispatch
//!
//! Each subscriber owns an ordered delivery queue, so a subscriber observes
//! asynchronous dispatches in exactly the order the bus accepted them. A
//! failing handler is isolated: its error is collected and logged, and the
//! remaining handlers still run.

use parking_lot::{ReentrantMutex, RwLock};
use pk_core::{Clock, Delivery, Event, EventKind, SystemClock};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::warn;

/// What a subscriber wants to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    /// Every event.
    All,
    /// Only one concrete event kind.
    Only(EventKind),
}

impl EventFilter {
    fn matches(self, kind: EventKind) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Only(only) => only == kind,
        }
    }
}

/// Error returned by a handler instead of propagating.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandlerError {
    #[error("handler failed: {0}")]
    Failed(String),
    #[error("subscriber unsubscribed before delivery")]
    Unsubscribed,
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}

/// Handlers may contribute a result value collected by async dispatch.
pub type HandlerResult = Result<Option<serde_json::Value>, HandlerError>;

type Handler = Arc<dyn Fn(&Delivery) -> HandlerResult + Send + Sync>;

struct AsyncJob {
    delivery: Arc<Delivery>,
    ack: oneshot::Sender<HandlerResult>,
}

struct SubscriberHandle {
    id: u64,
    name: String,
    filter: EventFilter,
    handler: Handler,
    queue: mpsc::UnboundedSender<AsyncJob>,
    closed: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

/// Token identifying a subscription; pass back to [`EventBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription(u64);

/// One subscriber's contribution to an async dispatch.
#[derive(Debug)]
pub struct SubscriberResult {
    pub subscriber: String,
    pub result: HandlerResult,
}

/// Completion signal for an async dispatch; resolves once every handler has
/// terminated, successfully or not.
pub struct DispatchHandle {
    delivery: Arc<Delivery>,
    pending: Vec<(String, oneshot::Receiver<HandlerResult>)>,
}

impl DispatchHandle {
    pub fn delivery(&self) -> &Delivery {
        &self.delivery
    }

    /// Wait for every handler and collect the per-subscriber results in
    /// registration order.
    pub async fn wait(self) -> Vec<SubscriberResult> {
        let mut results = Vec::with_capacity(self.pending.len());
        for (subscriber, rx) in self.pending {
            let result = rx.await.unwrap_or(Err(HandlerError::Unsubscribed));
            results.push(SubscriberResult { subscriber, result });
        }
        results
    }
}

struct BusInner<C: Clock> {
    clock: C,
    seq: AtomicU64,
    next_id: AtomicU64,
    subscribers: RwLock<Vec<SubscriberHandle>>,
    /// Serializes acceptance so per-subscriber delivery order equals bus
    /// acceptance order. Reentrant: a handler may publish from inside a
    /// synchronous dispatch.
    dispatch_lock: ReentrantMutex<()>,
}

/// The process-wide event bus.
pub struct EventBus<C: Clock = SystemClock> {
    inner: Arc<BusInner<C>>,
}

impl<C: Clock> Clone for EventBus<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: Clock> fmt::Debug for EventBus<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.inner.subscribers.read().len())
            .field("seq", &self.inner.seq.load(Ordering::Relaxed))
            .finish()
    }
}

impl EventBus<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for EventBus<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> EventBus<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            inner: Arc::new(BusInner {
                clock,
                seq: AtomicU64::new(0),
                next_id: AtomicU64::new(1),
                subscribers: RwLock::new(Vec::new()),
                dispatch_lock: ReentrantMutex::new(()),
            }),
        }
    }

    /// Register a handler. Must be called from within a tokio runtime; the
    /// subscriber's ordered delivery worker is spawned immediately.
    pub fn subscribe(
        &self,
        name: impl Into<String>,
        filter: EventFilter,
        handler: impl Fn(&Delivery) -> HandlerResult + Send + Sync + 'static,
    ) -> Subscription {
        let name = name.into();
        let handler: Handler = Arc::new(handler);
        let (tx, rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let worker = tokio::spawn(Self::delivery_worker(
            name.clone(),
            handler.clone(),
            rx,
            closed.clone(),
        ));
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.write().push(SubscriberHandle {
            id,
            name,
            filter,
            handler,
            queue: tx,
            closed,
            worker: Some(worker),
        });
        Subscription(id)
    }

    /// Remove a subscription. After this returns, no further event reaches
    /// the handler: queued deliveries are acked as unsubscribed and the
    /// worker is joined.
    pub async fn unsubscribe(&self, subscription: Subscription) {
        let handle = {
            // serialize against in-flight dispatches so no handler call can
            // start after removal
            let _accept = self.inner.dispatch_lock.lock();
            let mut subscribers = self.inner.subscribers.write();
            let idx = subscribers.iter().position(|s| s.id == subscription.0);
            idx.map(|idx| subscribers.remove(idx))
        };
        let Some(mut handle) = handle else {
            return;
        };
        handle.closed.store(true, Ordering::Release);
        drop(handle.queue);
        if let Some(worker) = handle.worker.take() {
            let _ = worker.await;
        }
    }

    async fn delivery_worker(
        name: String,
        handler: Handler,
        mut rx: mpsc::UnboundedReceiver<AsyncJob>,
        closed: Arc<AtomicBool>,
    ) {
        while let Some(job) = rx.recv().await {
            if closed.load(Ordering::Acquire) {
                let _ = job.ack.send(Err(HandlerError::Unsubscribed));
                continue;
            }
            let result = handler(&job.delivery);
            if let Err(err) = &result {
                warn!(subscriber = %name, error = %err, "async handler failed");
            }
            let _ = job.ack.send(result);
        }
    }

    fn stamp(&self, event: Event) -> Delivery {
        Delivery {
            seq: self.inner.seq.fetch_add(1, Ordering::Relaxed) + 1,
            epoch_ms: self.inner.clock.epoch_ms(),
            event,
        }
    }

    /// Dispatch on the caller's thread, in registration order.
    ///
    /// Handler errors are logged and isolated; this call never fails.
    pub fn publish(&self, event: Event) -> Delivery {
        let _accept = self.inner.dispatch_lock.lock();
        let delivery = self.stamp(event);
        let targets: Vec<(String, Handler)> = {
            let subscribers = self.inner.subscribers.read();
            subscribers
                .iter()
                .filter(|s| s.filter.matches(delivery.event.kind()))
                .filter(|s| !s.closed.load(Ordering::Acquire))
                .map(|s| (s.name.clone(), s.handler.clone()))
                .collect()
        };
        for (name, handler) in targets {
            if let Err(err) = handler(&delivery) {
                warn!(subscriber = %name, error = %err, "handler failed");
            }
        }
        delivery
    }

    /// Dispatch through each subscriber's delivery worker.
    ///
    /// Returns a handle resolving once every handler has terminated, with
    /// the collected results.
    pub fn publish_async(&self, event: Event) -> DispatchHandle {
        let _accept = self.inner.dispatch_lock.lock();
        let delivery = Arc::new(self.stamp(event));
        let mut pending = Vec::new();
        let subscribers = self.inner.subscribers.read();
        for subscriber in subscribers
            .iter()
            .filter(|s| s.filter.matches(delivery.event.kind()))
        {
            let (ack, rx) = oneshot::channel();
            let job = AsyncJob {
                delivery: delivery.clone(),
                ack,
            };
            if subscriber.queue.send(job).is_ok() {
                pending.push((subscriber.name.clone(), rx));
            }
        }
        drop(subscribers);
        DispatchHandle { delivery, pending }
    }

    /// Count of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
