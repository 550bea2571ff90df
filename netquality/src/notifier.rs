//! Push notifications of connection type changes.

use netquality_core::ConnectionType;
use std::{
    fmt,
    sync::{
        Arc, Mutex, PoisonError, Weak,
        atomic::{AtomicU64, Ordering},
    },
};
use tracing::trace;

type Callback = Arc<Mutex<dyn FnMut(ConnectionType) + Send>>;

#[derive(Default)]
struct Subscribers {
    current: ConnectionType,
    callbacks: Vec<(u64, Callback)>,
}

/// Broadcasts the connection type changes of the host to its
/// subscribers.
///
/// The platform layer calls [`notify_connection_type_changed`] and every
/// live [`Subscription`] callback is invoked, in subscription order, on the
/// calling thread.
///
/// ```
/// # use netquality::ConnectionTypeNotifier;
/// # use netquality_core::ConnectionType;
/// # use std::sync::{Arc, Mutex};
/// let notifier = ConnectionTypeNotifier::new();
/// let seen = Arc::new(Mutex::new(Vec::new()));
///
/// let subscription = notifier.subscribe({
///     let seen = Arc::clone(&seen);
///     move |connection_type| seen.lock().unwrap().push(connection_type)
/// });
///
/// notifier.notify_connection_type_changed(ConnectionType::Wifi);
/// drop(subscription);
/// notifier.notify_connection_type_changed(ConnectionType::Cellular4G);
///
/// assert_eq!(*seen.lock().unwrap(), vec![ConnectionType::Wifi]);
/// ```
///
/// [`notify_connection_type_changed`]: Self::notify_connection_type_changed
#[derive(Clone, Default)]
pub struct ConnectionTypeNotifier {
    subscribers: Arc<Mutex<Subscribers>>,
    next_id: Arc<AtomicU64>,
}

/// A live subscription to a [`ConnectionTypeNotifier`].
///
/// Dropping the subscription unsubscribes its callback.
#[must_use = "dropping the subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    subscribers: Weak<Mutex<Subscribers>>,
}

impl ConnectionTypeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` to be called on every connection type change.
    ///
    /// The callback runs with the notifier unlocked: it may subscribe,
    /// unsubscribe or query the notifier, but must not notify on it. A
    /// subscription dropped while a notification is being delivered may
    /// still receive that notification.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(ConnectionType) + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let callback: Callback = Arc::new(Mutex::new(callback));

        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .callbacks
            .push((id, callback));

        Subscription {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    /// the last notified connection type
    pub fn current_connection_type(&self) -> ConnectionType {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .current
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .callbacks
            .len()
    }

    /// Notify every subscriber that the host switched to `connection_type`.
    ///
    /// Subscribers are notified even if the connection type did not change:
    /// reconnecting to another network of the same type is a change.
    pub fn notify_connection_type_changed(&self, connection_type: ConnectionType) {
        let callbacks: Vec<Callback> = {
            let mut subscribers = self
                .subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            subscribers.current = connection_type;
            subscribers
                .callbacks
                .iter()
                .map(|(_, callback)| Arc::clone(callback))
                .collect()
        };
        trace!(%connection_type, subscribers = callbacks.len(), "Connection type notification");

        for callback in callbacks {
            let mut callback = callback.lock().unwrap_or_else(PoisonError::into_inner);
            (*callback)(connection_type);
        }
    }
}

impl Subscription {
    /// `true` as long as the notifier exists
    pub fn is_active(&self) -> bool {
        self.subscribers.strong_count() > 0
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(subscribers) = self.subscribers.upgrade() else {
            return;
        };
        subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .callbacks
            .retain(|(id, _)| *id != self.id);
    }
}

impl fmt::Debug for ConnectionTypeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionTypeNotifier")
            .field("current", &self.current_connection_type())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
