//! Per-target fan-out of worker notifications.
//!
//! Handlers are registered against a `(target id, event)` pair. Each target
//! with subscribers owns one delivery task fed by an unbounded queue, so
//! notifications for a target reach its handlers in arrival order and the
//! reader loop never waits on a handler. Handlers run on Tokio's blocking
//! pool, so a slow one holds up only its own target.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, error, trace};

use crate::message::Notification;

/// Callback invoked for each matching notification.
pub type NotificationHandler = Arc<dyn Fn(&Notification) + Send + Sync>;

/// Handle identifying one subscription, used to detach it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    handler: NotificationHandler,
}

#[derive(Default)]
struct TargetSubscribers {
    events: HashMap<String, Vec<Subscription>>,
    queue: Option<DeliveryQueue>,
}

struct DeliveryQueue {
    generation: u64,
    tx: mpsc::UnboundedSender<Notification>,
}

impl TargetSubscribers {
    fn handler_count(&self) -> usize {
        self.events.values().map(Vec::len).sum()
    }

    fn handlers_for(&self, event: &str) -> Vec<NotificationHandler> {
        self.events
            .get(event)
            .map(|subs| subs.iter().map(|sub| Arc::clone(&sub.handler)).collect())
            .unwrap_or_default()
    }
}

/// Registry of notification subscribers keyed by target id.
#[derive(Clone, Default)]
pub struct NotificationRouter {
    targets: Arc<DashMap<String, TargetSubscribers>>,
    next_id: Arc<AtomicU64>,
    next_generation: Arc<AtomicU64>,
}

impl fmt::Debug for NotificationRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationRouter")
            .field("targets", &self.targets.len())
            .finish()
    }
}

impl NotificationRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event` notifications from `target_id`.
    pub fn subscribe<F>(
        &self,
        target_id: impl Into<String>,
        event: impl Into<String>,
        handler: F,
    ) -> SubscriptionId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let target_id = target_id.into();
        let event = event.into();
        debug!(target_id = %target_id, event = %event, "subscribing");

        self.targets
            .entry(target_id)
            .or_default()
            .events
            .entry(event)
            .or_default()
            .push(Subscription {
                id,
                handler: Arc::new(handler),
            });
        id
    }

    /// Detach one subscription. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, target_id: &str, subscription: SubscriptionId) -> bool {
        let mut removed = false;
        let now_empty = match self.targets.get_mut(target_id) {
            Some(mut subscribers) => {
                subscribers.events.retain(|_, subs| {
                    let before = subs.len();
                    subs.retain(|sub| sub.id != subscription);
                    removed |= subs.len() != before;
                    !subs.is_empty()
                });
                subscribers.events.is_empty()
            }
            None => return false,
        };

        if now_empty {
            self.targets
                .remove_if(target_id, |_, subscribers| subscribers.events.is_empty());
        }
        removed
    }

    /// Detach every handler registered for `target_id`.
    ///
    /// Notifications already queued for the target are discarded.
    pub fn unsubscribe_all(&self, target_id: &str) {
        if self.targets.remove(target_id).is_some() {
            debug!(target_id, "unsubscribed all handlers");
        }
    }

    /// Number of handlers currently registered for `target_id`.
    pub fn subscriber_count(&self, target_id: &str) -> usize {
        self.targets
            .get(target_id)
            .map(|subscribers| subscribers.handler_count())
            .unwrap_or(0)
    }

    /// Queue a notification for delivery. Never blocks.
    ///
    /// Notifications for targets without a handler for the event are dropped.
    pub fn dispatch(&self, notification: Notification) {
        let Some(mut subscribers) = self.targets.get_mut(&notification.target_id) else {
            trace!(
                target_id = %notification.target_id,
                event = %notification.event,
                "no subscribers, dropping notification"
            );
            return;
        };

        if !subscribers.events.contains_key(&notification.event) {
            trace!(
                target_id = %notification.target_id,
                event = %notification.event,
                "no handler for event, dropping notification"
            );
            return;
        }

        let queue = match &subscribers.queue {
            Some(queue) if !queue.tx.is_closed() => queue.tx.clone(),
            _ => {
                let queue = self.spawn_delivery(notification.target_id.clone());
                let tx = queue.tx.clone();
                subscribers.queue = Some(queue);
                tx
            }
        };
        drop(subscribers);

        if queue.send(notification).is_err() {
            trace!("delivery task gone, dropping notification");
        }
    }

    /// Drop every subscription and stop all delivery tasks.
    pub fn clear(&self) {
        self.targets.clear();
    }

    fn spawn_delivery(&self, target_id: String) -> DeliveryQueue {
        let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();
        let targets = Arc::clone(&self.targets);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                // Handlers are read at delivery time: one removed after the
                // notification was queued does not see it.
                let handlers = match targets.get(&target_id) {
                    Some(subscribers)
                        if subscribers
                            .queue
                            .as_ref()
                            .is_some_and(|current| current.generation == generation) =>
                    {
                        subscribers.handlers_for(&notification.event)
                    }
                    _ => break,
                };
                if handlers.is_empty() {
                    continue;
                }

                // Handlers are synchronous and may block, so they run on the
                // blocking pool. Awaiting each batch keeps per-target order.
                let delivered = tokio::task::spawn_blocking(move || {
                    deliver(&handlers, &notification);
                })
                .await;
                if delivered.is_err() {
                    break;
                }
            }
            trace!(target_id = %target_id, "delivery task finished");
        });

        DeliveryQueue { generation, tx }
    }
}

fn deliver(handlers: &[NotificationHandler], notification: &Notification) {
    for handler in handlers {
        let outcome = catch_unwind(AssertUnwindSafe(|| handler(notification)));
        if outcome.is_err() {
            error!(
                target_id = %notification.target_id,
                event = %notification.event,
                "notification handler panicked"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    fn notification(target: &str, event: &str, data: serde_json::Value) -> Notification {
        Notification {
            target_id: target.to_string(),
            event: event.to_string(),
            data: Some(data),
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn delivers_to_matching_handler_in_order() {
        let router = NotificationRouter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        router.subscribe("abc", "score", move |n: &Notification| {
            sink.lock().unwrap().push(n.data.clone());
        });

        for i in 0..20 {
            router.dispatch(notification("abc", "score", json!(i)));
        }
        router.dispatch(notification("abc", "other", json!("ignored")));
        router.dispatch(notification("xyz", "score", json!("ignored")));
        settle().await;

        let expected: Vec<_> = (0..20).map(|i| Some(json!(i))).collect();
        assert_eq!(*seen.lock().unwrap(), expected);
    }

    #[tokio::test]
    async fn unknown_target_is_dropped_and_late_subscriber_misses_it() {
        let router = NotificationRouter::new();
        router.dispatch(notification("abc", "score", json!(1)));

        let seen = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&seen);
        router.subscribe("abc", "score", move |_| *sink.lock().unwrap() += 1);
        settle().await;

        assert_eq!(*seen.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let router = NotificationRouter::new();
        let seen = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&seen);
        let id = router.subscribe("abc", "score", move |_| *sink.lock().unwrap() += 1);

        router.dispatch(notification("abc", "score", json!(1)));
        settle().await;
        assert!(router.unsubscribe("abc", id));
        assert!(!router.unsubscribe("abc", id));
        router.dispatch(notification("abc", "score", json!(2)));
        settle().await;

        assert_eq!(*seen.lock().unwrap(), 1);
        assert_eq!(router.subscriber_count("abc"), 0);
    }

    #[tokio::test]
    async fn unsubscribe_all_detaches_every_event() {
        let router = NotificationRouter::new();
        router.subscribe("abc", "a", |_| {});
        router.subscribe("abc", "b", |_| {});
        router.subscribe("def", "a", |_| {});
        assert_eq!(router.subscriber_count("abc"), 2);

        router.unsubscribe_all("abc");
        assert_eq!(router.subscriber_count("abc"), 0);
        assert_eq!(router.subscriber_count("def"), 1);
    }

    #[tokio::test]
    async fn panicking_handler_does_not_stop_delivery() {
        let router = NotificationRouter::new();
        let seen = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&seen);
        router.subscribe("abc", "score", |_| panic!("handler failure"));
        router.subscribe("abc", "score", move |_| *sink.lock().unwrap() += 1);

        router.dispatch(notification("abc", "score", json!(1)));
        router.dispatch(notification("abc", "score", json!(2)));
        settle().await;

        assert_eq!(*seen.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn blocking_handler_holds_up_only_its_own_target() {
        let router = NotificationRouter::new();
        router.subscribe("slow", "score", |_| {
            std::thread::sleep(Duration::from_millis(1000));
        });
        let seen = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&seen);
        router.subscribe("fast", "score", move |_| *sink.lock().unwrap() += 1);

        router.dispatch(notification("slow", "score", json!(1)));
        router.dispatch(notification("fast", "score", json!(1)));
        settle().await;
        settle().await;

        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn resubscribing_after_unsubscribe_all_starts_fresh_queue() {
        let router = NotificationRouter::new();
        router.subscribe("abc", "score", |_| {});
        router.dispatch(notification("abc", "score", json!(1)));
        router.unsubscribe_all("abc");

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        router.subscribe("abc", "score", move |n: &Notification| {
            sink.lock().unwrap().push(n.data.clone());
        });
        router.dispatch(notification("abc", "score", json!(2)));
        settle().await;

        assert_eq!(*seen.lock().unwrap(), vec![Some(json!(2))]);
    }
}
