// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! WebSocket sessions on the change feed

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, warn};

use crate::context::AppContext;
use crate::feed::ChangeEvent;
use crate::hub::Topic;

#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    /// Comma separated topic names; empty means every topic
    topics: Option<String>,
}

fn parse_topics(raw: Option<&str>) -> Vec<Topic> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(Topic::from)
        .collect()
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(context): State<Arc<AppContext>>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    let topics = parse_topics(query.topics.as_deref());
    ws.on_upgrade(move |socket| session(socket, context, topics))
}

/// Tracks the newest version sent per topic so a snapshot never goes out twice
struct Session {
    topics: Vec<Topic>,
    sent: HashMap<Topic, u64>,
}

impl Session {
    fn wants(&self, event: &ChangeEvent) -> bool {
        let subscribed = self.topics.is_empty() || self.topics.contains(&event.topic);
        subscribed && self.sent.get(&event.topic).map_or(true, |v| event.version > *v)
    }

    /// Send `event` unless it is filtered or stale. Err means the client is gone.
    async fn forward(
        &mut self,
        sink: &mut SplitSink<WebSocket, Message>,
        event: ChangeEvent,
    ) -> Result<(), axum::Error> {
        if !self.wants(&event) {
            return Ok(());
        }
        let text = match serde_json::to_string(&event) {
            Ok(text) => text,
            Err(e) => {
                error!(topic = %event.topic, "Failed to encode change event: {}", e);
                return Ok(());
            }
        };
        sink.send(Message::Text(text)).await?;
        self.sent.insert(event.topic, event.version);
        Ok(())
    }

    async fn resync(
        &mut self,
        sink: &mut SplitSink<WebSocket, Message>,
        context: &AppContext,
    ) -> Result<(), axum::Error> {
        for event in context.feed.current(&self.topics) {
            self.forward(sink, event).await?;
        }
        Ok(())
    }
}

async fn session(socket: WebSocket, context: Arc<AppContext>, topics: Vec<Topic>) {
    // Subscribe before reading current state so nothing falls in between
    let mut rx = context.feed.subscribe();
    let (mut sink, mut stream) = socket.split();
    let mut session = Session {
        topics,
        sent: HashMap::new(),
    };
    debug!("WebSocket client connected ({:?})", session.topics);

    if session.resync(&mut sink, &context).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            event = rx.recv() => {
                let sent = match event {
                    Ok(event) => session.forward(&mut sink, event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("WebSocket client lagged by {} events, resending current state", skipped);
                        session.resync(&mut sink, &context).await
                    }
                    Err(RecvError::Closed) => break,
                };
                if sent.is_err() {
                    break;
                }
            }
        }
    }

    debug!("WebSocket client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(topic: &str, version: u64) -> ChangeEvent {
        ChangeEvent {
            topic: Topic::from(topic),
            version,
            data: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_parse_topics() {
        assert!(parse_topics(None).is_empty());
        assert!(parse_topics(Some(" , ")).is_empty());
        assert_eq!(
            parse_topics(Some("targets, curated-items")),
            vec![Topic::from("targets"), Topic::from("curated-items")]
        );
    }

    #[test]
    fn test_session_filters_and_dedupes() {
        let mut session = Session {
            topics: vec![Topic::from("targets")],
            sent: HashMap::new(),
        };
        assert!(session.wants(&event("targets", 0)));
        assert!(!session.wants(&event("curated-items", 0)));

        session.sent.insert(Topic::from("targets"), 3);
        assert!(!session.wants(&event("targets", 3)));
        assert!(session.wants(&event("targets", 4)));
    }

    #[test]
    fn test_empty_topic_list_wants_everything() {
        let session = Session {
            topics: Vec::new(),
            sent: HashMap::new(),
        };
        assert!(session.wants(&event("workflow-runs", 0)));
    }
}
