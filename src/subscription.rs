//! Observer registration for message notifications.
//!
//! # Responsibilities
//! - Let a component expose `subscribe(handler) -> Subscription`
//! - Invoke every live handler per message
//! - Unsubscribe explicitly or when the `Subscription` is dropped
//!
//! # Design Decisions
//! - Handlers are snapshotted before invocation; no lock is held while they run
//! - Unsubscribing is idempotent

use futures_util::future::BoxFuture;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Asynchronous message handler.
pub type Handler<T> = Arc<dyn Fn(T) -> BoxFuture<'static, ()> + Send + Sync>;

/// Box an async closure into a [`Handler`].
pub fn handler<T, F, Fut>(f: F) -> Handler<T>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |value| Box::pin(f(value)))
}

type HandlerList<T> = Mutex<Vec<(u64, Handler<T>)>>;

/// A set of handlers notified for each message.
pub struct Subscribers<T> {
    handlers: Arc<HandlerList<T>>,
    next_id: AtomicU64,
}

impl<T: Clone + Send + 'static> Subscribers<T> {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a handler. It stays registered until the returned subscription is dropped.
    pub fn subscribe(&self, handler: Handler<T>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.handlers).push((id, handler));

        let weak: Weak<HandlerList<T>> = Arc::downgrade(&self.handlers);
        Subscription {
            unsubscribe: Some(Box::new(move || {
                if let Some(handlers) = weak.upgrade() {
                    lock(&handlers).retain(|(existing, _)| *existing != id);
                }
            })),
        }
    }

    /// Invoke every registered handler with the value.
    pub async fn notify(&self, value: T) {
        let snapshot: Vec<Handler<T>> = lock(&self.handlers)
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();

        for handler in snapshot {
            handler(value.clone()).await;
        }
    }

    /// Number of live handlers.
    pub fn len(&self) -> usize {
        lock(&self.handlers).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone + Send + 'static> Default for Subscribers<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(handlers: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    handlers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle for a registered handler. Dropping it unsubscribes.
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Remove the handler. Safe to call more than once.
    pub fn unsubscribe(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}
