//! Stream relay: routes increments for a request id to the surfaces that asked
//! for them.
//!
//! The relay forwards and forgets. Nothing is buffered, so a surface that
//! subscribes late only sees increments published after it subscribed.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Caller-chosen token correlating a generation call with its increments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh id of the form `{prefix}-{uuid}`.
    pub fn generate(prefix: &str) -> Self {
        Self(format!("{prefix}-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One streamed fragment of generated text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Increment {
    pub request_id: RequestId,
    pub text: String,
}

/// The observer's owning context is gone; delivery cannot succeed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disconnected;

/// A surface's delivery channel.
pub trait Observer: Send + Sync {
    fn deliver(&self, increment: &Increment) -> Result<(), Disconnected>;
}

impl Observer for mpsc::UnboundedSender<Increment> {
    fn deliver(&self, increment: &Increment) -> Result<(), Disconnected> {
        self.send(increment.clone()).map_err(|_| Disconnected)
    }
}

/// Adapts a closure into an [`Observer`].
pub struct FnObserver<F>(pub F);

impl<F> Observer for FnObserver<F>
where
    F: Fn(&Increment) -> Result<(), Disconnected> + Send + Sync,
{
    fn deliver(&self, increment: &Increment) -> Result<(), Disconnected> {
        (self.0)(increment)
    }
}

/// Returned by [`Relay::subscribe`]; pass it back to [`Relay::unsubscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    id: u64,
    request_id: RequestId,
}

struct Subscription {
    /// Cleared when the entry leaves the registry, so a publish already
    /// holding a snapshot skips it.
    active: AtomicBool,
    observer: Box<dyn Observer>,
}

type Entry = (u64, Arc<Subscription>);

#[derive(Default)]
struct Registry {
    next_id: u64,
    observers: HashMap<RequestId, Vec<Entry>>,
}

impl Registry {
    fn remove(&mut self, request_id: &RequestId, id: u64) -> bool {
        let Some(list) = self.observers.get_mut(request_id) else {
            return false;
        };
        let mut removed = false;
        list.retain(|(sub, entry)| {
            if *sub != id {
                return true;
            }
            entry.active.store(false, Ordering::Release);
            removed = true;
            false
        });
        if list.is_empty() {
            self.observers.remove(request_id);
        }
        removed
    }
}

/// Process-wide subscription registry. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct Relay {
    inner: Arc<Mutex<Registry>>,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &self,
        request_id: RequestId,
        observer: impl Observer + 'static,
    ) -> SubscriptionHandle {
        let mut reg = self.inner.lock();
        let id = reg.next_id;
        reg.next_id += 1;
        reg.observers
            .entry(request_id.clone())
            .or_default()
            .push((
                id,
                Arc::new(Subscription {
                    active: AtomicBool::new(true),
                    observer: Box::new(observer),
                }),
            ));
        tracing::trace!(%request_id, subscription = id, "subscribed");
        SubscriptionHandle { id, request_id }
    }

    /// Subscribe with a fresh unbounded channel. Dropping the receiver is
    /// enough to stop deliveries; the relay notices on the next publish.
    pub fn subscribe_channel(
        &self,
        request_id: RequestId,
    ) -> (SubscriptionHandle, mpsc::UnboundedReceiver<Increment>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (self.subscribe(request_id, tx), rx)
    }

    /// Idempotent. Returns whether the handle was still registered.
    ///
    /// Once this returns, the observer receives no further increments, even
    /// from a publish that is already running. A delivery already inside
    /// `deliver` on another thread may still complete.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let removed = self.inner.lock().remove(&handle.request_id, handle.id);
        if removed {
            tracing::trace!(request_id = %handle.request_id, subscription = handle.id, "unsubscribed");
        }
        removed
    }

    /// Deliver to every observer currently registered for the increment's
    /// request id. Returns how many deliveries succeeded.
    ///
    /// Observers run outside the registry lock. An observer that reports
    /// [`Disconnected`] is removed.
    pub fn publish(&self, increment: &Increment) -> usize {
        let targets: Vec<Entry> = match self.inner.lock().observers.get(&increment.request_id) {
            Some(list) => list.clone(),
            None => return 0,
        };

        let mut delivered = 0;
        let mut gone = Vec::new();
        for (id, sub) in &targets {
            if !sub.active.load(Ordering::Acquire) {
                continue;
            }
            match sub.observer.deliver(increment) {
                Ok(()) => delivered += 1,
                Err(Disconnected) => gone.push(*id),
            }
        }

        if !gone.is_empty() {
            let mut reg = self.inner.lock();
            for id in gone {
                reg.remove(&increment.request_id, id);
                tracing::debug!(
                    request_id = %increment.request_id,
                    subscription = id,
                    "observer disconnected; dropping subscription"
                );
            }
        }

        delivered
    }

    pub fn observer_count(&self, request_id: &RequestId) -> usize {
        self.inner
            .lock()
            .observers
            .get(request_id)
            .map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inc(id: &RequestId, text: &str) -> Increment {
        Increment {
            request_id: id.clone(),
            text: text.to_string(),
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Increment>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(i) = rx.try_recv() {
            out.push(i.text);
        }
        out
    }

    #[test]
    fn two_observers_one_leaves_midway() {
        let relay = Relay::new();
        let id = RequestId::new("chat-1");
        let (h1, mut rx1) = relay.subscribe_channel(id.clone());
        let (_h2, mut rx2) = relay.subscribe_channel(id.clone());

        assert_eq!(relay.publish(&inc(&id, "A")), 2);
        relay.unsubscribe(&h1);
        assert_eq!(relay.publish(&inc(&id, "B")), 1);

        assert_eq!(drain(&mut rx1), vec!["A"]);
        assert_eq!(drain(&mut rx2), vec!["A", "B"]);
    }

    #[test]
    fn publish_without_subscribers_is_noop() {
        let relay = Relay::new();
        let id = RequestId::new("nobody");
        assert_eq!(relay.publish(&inc(&id, "lost")), 0);
        assert_eq!(relay.observer_count(&id), 0);
    }

    #[test]
    fn only_matching_request_id_is_delivered() {
        let relay = Relay::new();
        let a = RequestId::new("a");
        let b = RequestId::new("b");
        let (_ha, mut rxa) = relay.subscribe_channel(a.clone());
        let (_hb, mut rxb) = relay.subscribe_channel(b.clone());

        relay.publish(&inc(&a, "for a"));

        assert_eq!(drain(&mut rxa), vec!["for a"]);
        assert!(drain(&mut rxb).is_empty());
    }

    #[test]
    fn unsubscribe_twice_is_noop() {
        let relay = Relay::new();
        let id = RequestId::new("x");
        let (h, _rx) = relay.subscribe_channel(id.clone());
        let (_other, mut rx_other) = relay.subscribe_channel(id.clone());

        assert!(relay.unsubscribe(&h));
        assert!(!relay.unsubscribe(&h));

        relay.publish(&inc(&id, "still here"));
        assert_eq!(drain(&mut rx_other), vec!["still here"]);
    }

    #[test]
    fn dropped_receiver_is_unsubscribed_on_publish() {
        let relay = Relay::new();
        let id = RequestId::new("popup");
        let (h, rx) = relay.subscribe_channel(id.clone());
        let (_h2, mut rx2) = relay.subscribe_channel(id.clone());
        drop(rx);

        assert_eq!(relay.publish(&inc(&id, "1")), 1);
        assert_eq!(relay.observer_count(&id), 1);
        // Already gone; unsubscribing afterwards is harmless.
        assert!(!relay.unsubscribe(&h));
        assert_eq!(drain(&mut rx2), vec!["1"]);
    }

    #[test]
    fn last_observer_leaving_drops_entry() {
        let relay = Relay::new();
        let id = RequestId::new("gone");
        let (_h, rx) = relay.subscribe_channel(id.clone());
        drop(rx);
        relay.publish(&inc(&id, "x"));
        assert!(relay.inner.lock().observers.is_empty());
    }

    #[test]
    fn late_subscriber_sees_only_later_increments() {
        let relay = Relay::new();
        let id = RequestId::new("late");
        let (_h1, mut early) = relay.subscribe_channel(id.clone());
        relay.publish(&inc(&id, "first"));
        let (_h2, mut late) = relay.subscribe_channel(id.clone());
        relay.publish(&inc(&id, "second"));

        assert_eq!(drain(&mut early), vec!["first", "second"]);
        assert_eq!(drain(&mut late), vec!["second"]);
    }

    #[test]
    fn observer_may_unsubscribe_during_delivery() {
        let relay = Relay::new();
        let id = RequestId::new("reentrant");
        let slot: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));

        let relay_in = relay.clone();
        let slot_in = slot.clone();
        let handle = relay.subscribe(
            id.clone(),
            FnObserver(move |_: &Increment| -> Result<(), Disconnected> {
                if let Some(h) = slot_in.lock().take() {
                    relay_in.unsubscribe(&h);
                }
                Ok(())
            }),
        );
        *slot.lock() = Some(handle);

        assert_eq!(relay.publish(&inc(&id, "once")), 1);
        assert_eq!(relay.publish(&inc(&id, "twice")), 0);
    }

    #[test]
    fn observer_removed_earlier_in_same_publish_is_skipped() {
        let relay = Relay::new();
        let id = RequestId::new("sidebar");
        let slot: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));

        let relay_in = relay.clone();
        let slot_in = slot.clone();
        let _first = relay.subscribe(
            id.clone(),
            FnObserver(move |_: &Increment| -> Result<(), Disconnected> {
                if let Some(h) = slot_in.lock().take() {
                    relay_in.unsubscribe(&h);
                }
                Ok(())
            }),
        );
        let (second, mut rx) = relay.subscribe_channel(id.clone());
        *slot.lock() = Some(second);

        assert_eq!(relay.publish(&inc(&id, "A")), 1);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(relay.observer_count(&id), 1);
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = RequestId::generate("summary");
        let b = RequestId::generate("summary");
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("summary-"));
    }
}
