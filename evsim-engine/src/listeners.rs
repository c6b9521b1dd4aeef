//! Observer registry shared by both engines
//!
//! Listeners are snapshotted before every notification, so a listener may
//! subscribe or unsubscribe (itself or others) from inside its own callback.
//! Changes take effect from the next notification.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    next_id: u64,
    listeners: Vec<(u64, Listener<T>)>,
}

/// A set of callbacks invoked with each published value
pub struct ListenerRegistry<T> {
    inner: Arc<Mutex<Registry<T>>>,
    /// Highest sequence number delivered by `notify_if_newer`
    latest: Mutex<u64>,
}

impl<T: 'static> ListenerRegistry<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry {
                next_id: 0,
                listeners: Vec::new(),
            })),
            latest: Mutex::new(0),
        }
    }

    /// Register a listener. The returned handle removes exactly this listener.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = {
            let mut registry = lock(&self.inner);
            let id = registry.next_id;
            registry.next_id += 1;
            registry.listeners.push((id, Arc::new(listener)));
            id
        };

        let weak: Weak<Mutex<Registry<T>>> = Arc::downgrade(&self.inner);
        Subscription {
            remove: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    lock(&inner).listeners.retain(|(lid, _)| *lid != id);
                }
            })),
        }
    }

    /// Call every listener registered at the time of the call
    pub fn notify(&self, value: &T) {
        let listeners: Vec<Listener<T>> = lock(&self.inner)
            .listeners
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        for listener in listeners {
            listener(value);
        }
    }

    /// Notify unless a value with a higher `seq` was already delivered
    ///
    /// Publishers number values under their own state lock and deliver after
    /// releasing it; this drops a value that lost the race to a newer one.
    /// Sequenced deliveries run one at a time, so a listener must not publish
    /// to the same registry from inside its callback. Returns whether the
    /// value was delivered.
    pub fn notify_if_newer(&self, seq: u64, value: &T) -> bool {
        let mut latest = lock(&self.latest);
        if *latest >= seq {
            return false;
        }
        *latest = seq;
        self.notify(value);
        true
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: 'static> Default for ListenerRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by `subscribe`
///
/// Dropping the handle keeps the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[must_use = "keep the subscription to be able to unsubscribe later"]
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

/// Lock a mutex, recovering the data if a listener panicked while holding it
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
