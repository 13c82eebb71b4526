//! Cross-surface notification channel.
//!
//! One typed event with a discriminated payload replaces per-name event
//! fan-out: listeners filter by variant instead of subscribing to several
//! synonymous event names. The badge fast path is a `watch` channel carrying
//! only the counters, so badge surfaces subscribe to the smallest-grain
//! signal available.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, watch};

use crate::types::{CartIdentity, SyncCounters};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A cart change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartEvent {
    /// Counters changed (count, value, or both).
    Updated {
        /// The counters after the change.
        counters: SyncCounters,
    },
    /// The active identity transitioned (sign-in or sign-out).
    ///
    /// Surfaces should discard any identity-scoped local state on receipt.
    IdentityChanged {
        /// The identity now active.
        identity: CartIdentity,
    },
}

/// Callback invoked on every successful counter change.
pub type UpdateListener = Arc<dyn Fn(SyncCounters) + Send + Sync + 'static>;

/// De-registration handle returned by listener registration.
///
/// Dropping the handle does NOT unsubscribe; call [`ListenerHandle::unsubscribe`].
#[derive(Debug)]
pub struct ListenerHandle {
    id: u64,
    listeners: Arc<Listeners>,
}

impl ListenerHandle {
    /// Remove the listener from the registry.
    pub fn unsubscribe(self) {
        self.listeners.remove(self.id);
    }
}

#[derive(Default)]
pub(crate) struct Listeners {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, UpdateListener)>>,
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners").finish_non_exhaustive()
    }
}

impl Listeners {
    fn add(&self, listener: UpdateListener) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((id, listener));
        }
        id
    }

    fn remove(&self, id: u64) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|(entry_id, _)| *entry_id != id);
        }
    }

    /// Invoke every listener outside the lock. A panicking listener is
    /// logged and skipped so one broken subscriber cannot break fan-out to
    /// the others.
    fn notify(&self, counters: SyncCounters) {
        let snapshot: Vec<UpdateListener> = match self.entries.lock() {
            Ok(entries) => entries.iter().map(|(_, l)| Arc::clone(l)).collect(),
            Err(_) => return,
        };
        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(counters))).is_err() {
                tracing::error!("cart update listener panicked; continuing fan-out");
            }
        }
    }
}

/// In-process publish/subscribe hub driven by the synchronization manager.
pub(crate) struct EventBus {
    events: broadcast::Sender<CartEvent>,
    badge: watch::Sender<SyncCounters>,
    listeners: Arc<Listeners>,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (badge, _) = watch::channel(SyncCounters::default());
        Self {
            events,
            badge,
            listeners: Arc::new(Listeners::default()),
        }
    }

    /// Counters as currently shown on the badge.
    pub(crate) fn current(&self) -> SyncCounters {
        *self.badge.borrow()
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<CartEvent> {
        self.events.subscribe()
    }

    pub(crate) fn badge(&self) -> watch::Receiver<SyncCounters> {
        self.badge.subscribe()
    }

    pub(crate) fn add_listener(&self, listener: UpdateListener) -> ListenerHandle {
        let id = self.listeners.add(listener);
        ListenerHandle {
            id,
            listeners: Arc::clone(&self.listeners),
        }
    }

    /// Fan out a counter change: badge first (fast path), then the typed
    /// event, then the callback listeners.
    pub(crate) fn emit_updated(&self, counters: SyncCounters) {
        self.badge.send_replace(counters);
        // No receivers is fine; surfaces subscribe lazily.
        let _ = self.events.send(CartEvent::Updated { counters });
        self.listeners.notify(counters);
    }

    pub(crate) fn emit_identity_changed(&self, identity: CartIdentity) {
        let _ = self.events.send(CartEvent::IdentityChanged { identity });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counters(count: u64) -> SyncCounters {
        SyncCounters {
            last_cart_count: count,
            last_cart_value: rust_decimal::Decimal::ZERO,
        }
    }

    #[test]
    fn test_listener_receives_updates_until_unsubscribed() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let handle = bus.add_listener(Arc::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        bus.emit_updated(counters(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        handle.unsubscribe();
        bus.emit_updated(counters(2));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_listener_does_not_break_fanout() {
        let bus = EventBus::new();
        let _broken = bus.add_listener(Arc::new(|_| panic!("broken subscriber")));

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let _ok = bus.add_listener(Arc::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        bus.emit_updated(counters(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_badge_tracks_latest_counters() {
        let bus = EventBus::new();
        let badge = bus.badge();
        bus.emit_updated(counters(3));
        assert_eq!(badge.borrow().last_cart_count, 3);
        assert_eq!(bus.current().last_cart_count, 3);
    }

    #[tokio::test]
    async fn test_typed_event_payloads() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.emit_updated(counters(2));
        bus.emit_identity_changed(CartIdentity::Guest);

        assert_eq!(
            rx.recv().await.expect("event"),
            CartEvent::Updated {
                counters: counters(2)
            }
        );
        assert_eq!(
            rx.recv().await.expect("event"),
            CartEvent::IdentityChanged {
                identity: CartIdentity::Guest
            }
        );
    }
}
