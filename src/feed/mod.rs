// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Change feed: hub notifications as serialized events
//!
//! The feed subscribes to each attached store and rebroadcasts every
//! snapshot as a [`ChangeEvent`] on a tokio broadcast channel, which is what
//! WebSocket sessions listen to. It also remembers the newest event per
//! topic so a client that connects late starts from current state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::{error, trace};

use crate::hub::{Subscription, Topic};
use crate::store::{Record, RecordStore, Snapshot};

/// One serialized snapshot from one topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub topic: Topic,
    pub version: u64,
    pub data: serde_json::Value,
}

/// Connection report served on `/ws/status`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedStatus {
    pub active_connections: usize,
    pub topics: Vec<Topic>,
    pub timestamp: DateTime<Utc>,
}

/// Broadcast of change events from every attached store
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
    latest: Arc<Mutex<BTreeMap<Topic, ChangeEvent>>>,
    bridges: Mutex<Vec<Subscription>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            latest: Arc::new(Mutex::new(BTreeMap::new())),
            bridges: Mutex::new(Vec::new()),
        }
    }

    /// Forward every snapshot of `store` into the feed for as long as the feed lives
    pub fn attach<R, D>(&self, store: &RecordStore<R, D>)
    where
        R: Record + Serialize,
        D: Clone + Send + Sync + Serialize + 'static,
    {
        let topic = store.topic().clone();
        let tx = self.tx.clone();
        let latest = Arc::clone(&self.latest);

        let subscription = store.subscribe(move |snapshot: &Snapshot<R, D>| {
            let data = match serde_json::to_value(snapshot) {
                Ok(data) => data,
                Err(e) => {
                    error!(topic = %topic, "Failed to serialize snapshot: {}", e);
                    return;
                }
            };
            let event = ChangeEvent {
                topic: topic.clone(),
                version: snapshot.version,
                data,
            };
            lock(&latest).insert(topic.clone(), event.clone());
            // No receivers is normal when no client is connected
            let receivers = tx.send(event).unwrap_or(0);
            trace!(topic = %topic, version = snapshot.version, receivers, "Fed change event");
        });

        lock(&self.bridges).push(subscription);
    }

    /// Receive every event published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    /// Latest event of each requested topic; all topics when `topics` is empty
    pub fn current(&self, topics: &[Topic]) -> Vec<ChangeEvent> {
        let latest = lock(&self.latest);
        if topics.is_empty() {
            latest.values().cloned().collect()
        } else {
            topics.iter().filter_map(|t| latest.get(t).cloned()).collect()
        }
    }

    pub fn topics(&self) -> Vec<Topic> {
        lock(&self.latest).keys().cloned().collect()
    }

    /// Number of live receivers, one per connected WebSocket session
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn status(&self) -> FeedStatus {
        FeedStatus {
            active_connections: self.receiver_count(),
            topics: self.topics(),
            timestamp: Utc::now(),
        }
    }
}

impl std::fmt::Debug for ChangeFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeFeed")
            .field("topics", &self.topics())
            .field("receivers", &self.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::{CuratedItemService, NewCuratedItem};
    use crate::targets::{NewTarget, TargetService};

    #[test]
    fn test_attach_publishes_current_state() {
        let feed = ChangeFeed::new(16);
        let targets = TargetService::new();
        targets.add(NewTarget::new("https://example.com")).unwrap();
        feed.attach(targets.store());

        let current = feed.current(&[Topic::from("targets")]);
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].version, 1);
        assert_eq!(current[0].data["records"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_mutations_reach_receivers_in_order() {
        let feed = ChangeFeed::new(16);
        let items = CuratedItemService::new();
        feed.attach(items.store());
        let mut rx = feed.subscribe();

        let dune = items.add(NewCuratedItem::new("Dune", "Frank Herbert")).unwrap();
        items.remove(&dune.id).unwrap();

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!((first.version, second.version), (1, 2));
        assert_eq!(first.topic.as_str(), "curated-items");
        assert!(second.data["records"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_current_filters_topics() {
        let feed = ChangeFeed::new(16);
        let targets = TargetService::new();
        let items = CuratedItemService::new();
        feed.attach(targets.store());
        feed.attach(items.store());

        assert_eq!(feed.current(&[]).len(), 2);
        assert_eq!(feed.current(&[Topic::from("curated-items")]).len(), 1);
        assert!(feed.current(&[Topic::from("unknown")]).is_empty());
    }

    #[test]
    fn test_status_counts_receivers() {
        let feed = ChangeFeed::new(4);
        feed.attach(TargetService::new().store());
        assert_eq!(feed.status().active_connections, 0);

        let rx = feed.subscribe();
        let status = feed.status();
        assert_eq!(status.active_connections, 1);
        assert_eq!(status.topics, vec![Topic::from("targets")]);

        drop(rx);
        assert_eq!(feed.receiver_count(), 0);
    }

    #[test]
    fn test_dropping_feed_detaches_from_store() {
        let targets = TargetService::new();
        {
            let feed = ChangeFeed::new(4);
            feed.attach(targets.store());
            assert_eq!(targets.store().hub().subscriber_count(), 1);
        }
        assert_eq!(targets.store().hub().subscriber_count(), 0);
    }
}
