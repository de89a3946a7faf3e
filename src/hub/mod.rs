// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Notification hub: ordered fan-out of state snapshots to subscribers
//!
//! A hub keeps the latest snapshot for its topic and a list of subscriber
//! callbacks. Deliveries go through a queue that is drained by whichever
//! caller gets there first, so callbacks may publish, subscribe or
//! unsubscribe without interleaving two passes. The hub lock is never held
//! while a callback runs.
//!
//! A publish that finds another thread draining returns at once and its
//! snapshot is delivered on the draining thread. A subscribe from another
//! thread instead waits for that pass to finish, so its first snapshot has
//! been delivered by the time it returns.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, ThreadId};
use tracing::{debug, error, trace};

use crate::AzError;

/// Name of a notification stream
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Topic {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Topic {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Identifier of a registered callback, unique within one hub
pub type SubscriberId = u64;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Entry<T> {
    id: SubscriberId,
    /// Sequence number current at registration; earlier passes are never delivered
    since: u64,
    active: Arc<AtomicBool>,
    callback: Callback<T>,
}

enum Delivery<T> {
    Publish { seq: u64, snapshot: T },
    Welcome { id: SubscriberId, snapshot: T },
}

struct HubState<T> {
    latest: T,
    seq: u64,
    next_id: SubscriberId,
    subscribers: Vec<Entry<T>>,
    queue: VecDeque<Delivery<T>>,
    /// Thread running the drain loop, if any
    drainer: Option<ThreadId>,
}

struct Shared<T> {
    topic: Topic,
    state: Mutex<HubState<T>>,
    /// Signalled when a drain loop ends
    idle: Condvar,
}

type Target<T> = (SubscriberId, Arc<AtomicBool>, Callback<T>);

impl<T: Clone> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, HubState<T>> {
        // Callbacks never run under this lock, so a poisoned guard still holds consistent state
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock once no other thread is draining. Draining on the calling thread
    /// (a callback re-entering the hub) does not block.
    fn lock_unless_draining_elsewhere(&self, me: ThreadId) -> MutexGuard<'_, HubState<T>> {
        self.idle
            .wait_while(self.lock(), |state| state.drainer.is_some_and(|t| t != me))
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn drain(&self) {
        {
            let mut state = self.lock();
            if state.drainer.is_some() {
                return;
            }
            state.drainer = Some(thread::current().id());
        }
        self.run_queue();
    }

    /// Deliver until the queue is empty. The caller must have set `drainer`.
    fn run_queue(&self) {
        loop {
            let (snapshot, targets): (T, Vec<Target<T>>) = {
                let mut state = self.lock();
                match state.queue.pop_front() {
                    None => {
                        state.drainer = None;
                        self.idle.notify_all();
                        return;
                    }
                    Some(Delivery::Publish { seq, snapshot }) => {
                        let targets = state
                            .subscribers
                            .iter()
                            .filter(|e| e.since < seq)
                            .map(|e| (e.id, Arc::clone(&e.active), Arc::clone(&e.callback)))
                            .collect();
                        (snapshot, targets)
                    }
                    Some(Delivery::Welcome { id, snapshot }) => {
                        let targets = state
                            .subscribers
                            .iter()
                            .filter(|e| e.id == id)
                            .map(|e| (e.id, Arc::clone(&e.active), Arc::clone(&e.callback)))
                            .collect();
                        (snapshot, targets)
                    }
                }
            };

            for (id, active, callback) in targets {
                self.dispatch(id, &active, &callback, &snapshot);
            }
        }
    }

    fn dispatch(&self, id: SubscriberId, active: &AtomicBool, callback: &Callback<T>, snapshot: &T) {
        if !active.load(Ordering::Acquire) {
            trace!(topic = %self.topic, subscriber = id, "Skipping unsubscribed callback");
            return;
        }

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(snapshot))) {
            let err = AzError::Subscriber {
                topic: self.topic.to_string(),
                reason: panic_message(payload.as_ref()),
            };
            error!(subscriber = id, "{}", err);
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "callback panicked".to_string()
    }
}

trait Unregister: Send + Sync {
    fn unregister(&self, id: SubscriberId);
}

impl<T: Clone + Send> Unregister for Shared<T> {
    fn unregister(&self, id: SubscriberId) {
        self.lock().subscribers.retain(|e| e.id != id);
    }
}

/// Registry of subscriber callbacks for one topic
pub struct NotificationHub<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for NotificationHub<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> NotificationHub<T> {
    /// Create a hub whose current snapshot starts as `initial`
    pub fn new(topic: impl Into<Topic>, initial: T) -> Self {
        Self {
            shared: Arc::new(Shared {
                topic: topic.into(),
                state: Mutex::new(HubState {
                    latest: initial,
                    seq: 0,
                    next_id: 1,
                    subscribers: Vec::new(),
                    queue: VecDeque::new(),
                    drainer: None,
                }),
                idle: Condvar::new(),
            }),
        }
    }

    pub fn topic(&self) -> &Topic {
        &self.shared.topic
    }

    /// Register a callback.
    ///
    /// The callback receives the current snapshot first, then every snapshot
    /// published afterwards. Outside a callback the first delivery has
    /// happened on the calling thread when this returns; if another thread is
    /// mid-pass, this blocks until that pass ends. When called from inside a
    /// callback of this hub, the first delivery happens right after the pass
    /// in progress.
    ///
    /// A callback must not wait on a thread that is subscribing to the same
    /// hub.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let me = thread::current().id();
        let active = Arc::new(AtomicBool::new(true));
        let (id, nested) = {
            let mut state = self.shared.lock_unless_draining_elsewhere(me);
            let id = state.next_id;
            state.next_id += 1;
            let since = state.seq;
            state.subscribers.push(Entry {
                id,
                since,
                active: Arc::clone(&active),
                callback: Arc::new(callback),
            });
            let snapshot = state.latest.clone();
            state.queue.push_back(Delivery::Welcome { id, snapshot });

            // Claim the drain in the same critical section so no publisher
            // can take over the welcome
            let nested = state.drainer.is_some();
            if !nested {
                state.drainer = Some(me);
            }
            (id, nested)
        };
        debug!(topic = %self.shared.topic, subscriber = id, nested, "Subscribed");

        if !nested {
            self.shared.run_queue();
        }

        let hub: Weak<dyn Unregister> = Arc::downgrade(&self.shared) as Weak<dyn Unregister>;
        Subscription {
            id,
            topic: self.shared.topic.clone(),
            active,
            hub,
        }
    }

    /// Deliver `snapshot` to every registered callback, in registration order
    pub fn publish(&self, snapshot: T) {
        self.enqueue(snapshot);
        self.drain();
    }

    /// Make `snapshot` current and queue it without delivering.
    ///
    /// Callers that serialize their own mutations enqueue under their lock
    /// and call [`drain`](Self::drain) after releasing it, which keeps
    /// delivery order equal to mutation order.
    pub(crate) fn enqueue(&self, snapshot: T) {
        let mut state = self.shared.lock();
        state.seq += 1;
        let seq = state.seq;
        state.latest = snapshot.clone();
        state.queue.push_back(Delivery::Publish { seq, snapshot });
        trace!(topic = %self.shared.topic, seq, "Queued snapshot");
    }

    pub(crate) fn drain(&self) {
        self.shared.drain();
    }

    /// The most recently published snapshot
    pub fn latest(&self) -> T {
        self.shared.lock().latest.clone()
    }

    /// Number of publishes so far
    pub fn sequence(&self) -> u64 {
        self.shared.lock().seq
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.lock().subscribers.len()
    }
}

impl<T: Clone> fmt::Debug for NotificationHub<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("NotificationHub")
            .field("topic", &self.shared.topic)
            .field("seq", &state.seq)
            .field("subscribers", &state.subscribers.len())
            .finish()
    }
}

/// Handle for a registered callback.
///
/// Calling [`unsubscribe`](Self::unsubscribe) or dropping the handle removes
/// the callback. Both are idempotent; once either returns, the callback is
/// not invoked again.
#[must_use = "dropping a Subscription unsubscribes the callback"]
pub struct Subscription {
    id: SubscriberId,
    topic: Topic,
    active: Arc<AtomicBool>,
    hub: Weak<dyn Unregister>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stop delivery to this callback
    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            if let Some(hub) = self.hub.upgrade() {
                hub.unregister(self.id);
            }
            debug!(topic = %self.topic, subscriber = self.id, "Unsubscribed");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("active", &self.is_active())
            .finish()
    }
}
