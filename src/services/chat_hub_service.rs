//! Realtime comment fan-out.
//!
//! Every live connection owns a bounded FIFO queue registered in the hub.
//! A `sendComment` invocation is persisted first and only then pushed to every
//! registered queue. Persist-and-broadcast runs under one async lock, so all
//! connections see comments in the order they were stored. A connection whose
//! queue is full has stopped reading and is dropped from the hub.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::services::comments_service::{self, CommentView};
use crate::services::identity_service::CallerIdentity;

pub type ConnectionId = Uuid;

/// Events buffered per connection before it counts as stalled.
pub const CONNECTION_QUEUE_CAPACITY: usize = 256;

/// Frames a client may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientInvocation {
    #[serde(rename_all = "camelCase")]
    SendComment {
        body: String,
        activity_id: String,
        /// Accepted on the wire and ignored; authorship comes from the connection.
        #[serde(default)]
        username: Option<String>,
    },
}

/// Frames the server pushes.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerEvent {
    ReceiveComment { comment: CommentView },
    Error { error: String, detail: String },
}

impl ServerEvent {
    pub fn from_error(err: &AppError) -> Self {
        ServerEvent::Error {
            error: err.kind().to_string(),
            detail: err.to_string(),
        }
    }
}

pub struct ChatHub {
    connections: Mutex<HashMap<ConnectionId, Sender<ServerEvent>>>,
    send_lock: tokio::sync::Mutex<()>,
    persist_timeout: Duration,
    queue_capacity: usize,
}

impl ChatHub {
    pub fn new(persist_timeout: Duration) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            send_lock: tokio::sync::Mutex::new(()),
            persist_timeout,
            queue_capacity: CONNECTION_QUEUE_CAPACITY,
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn connect(&self) -> (ConnectionId, Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let id = Uuid::new_v4();
        self.connections.lock().insert(id, tx);
        debug!(connection_id = %id, "hub connection registered");
        (id, rx)
    }

    pub fn disconnect(&self, id: ConnectionId) {
        if self.connections.lock().remove(&id).is_some() {
            debug!(connection_id = %id, "hub connection removed");
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Handles one invocation from the connection authenticated as `caller`.
    ///
    /// Nothing is broadcast unless the comment was stored; failures go back to
    /// the invoker only.
    pub async fn dispatch(
        &self,
        pool: &SqlitePool,
        caller: Option<&CallerIdentity>,
        invocation: ClientInvocation,
    ) -> Result<CommentView, AppError> {
        match invocation {
            ClientInvocation::SendComment {
                body,
                activity_id,
                username,
            } => {
                if let Some(claimed) = username.as_deref() {
                    if caller.map(CallerIdentity::as_str) != Some(claimed) {
                        debug!(claimed, "ignoring client supplied author");
                    }
                }
                self.send_comment(pool, caller, &activity_id, &body).await
            }
        }
    }

    pub async fn send_comment(
        &self,
        pool: &SqlitePool,
        caller: Option<&CallerIdentity>,
        activity_id: &str,
        body: &str,
    ) -> Result<CommentView, AppError> {
        let Some(author) = caller else {
            return Err(AppError::Unauthenticated);
        };

        let _ordering = self.send_lock.lock().await;
        // The deadline covers acquiring and the statements. Once the commit
        // starts the outcome is reported as it is.
        let staged = async {
            let mut tx = pool.begin().await?;
            let comment =
                comments_service::stage_comment(&mut tx, author, activity_id, body, Utc::now())
                    .await?;
            Ok::<_, AppError>((tx, comment))
        };
        let (tx, comment) = tokio::time::timeout(self.persist_timeout, staged)
            .await
            .map_err(|_| AppError::Timeout)??;
        tx.commit().await?;

        let delivered = self.broadcast(ServerEvent::ReceiveComment {
            comment: comment.clone(),
        });
        info!(
            comment_id = %comment.id,
            activity_id,
            author = %author,
            delivered,
            "comment broadcast"
        );
        Ok(comment)
    }

    // Sends on a snapshot so no lock is held while delivering.
    fn broadcast(&self, event: ServerEvent) -> usize {
        let targets: Vec<(ConnectionId, Sender<ServerEvent>)> = self
            .connections
            .lock()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut delivered = 0;
        let mut dropped = Vec::new();
        for (id, tx) in targets {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(connection_id = %id, "hub connection stalled, dropping it");
                    dropped.push(id);
                }
                Err(TrySendError::Closed(_)) => dropped.push(id),
            }
        }

        if !dropped.is_empty() {
            debug!(count = dropped.len(), "pruning hub connections");
            let mut connections = self.connections.lock();
            for id in dropped {
                connections.remove(&id);
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{self, fixtures};
    use std::sync::Arc;

    async fn seeded() -> SqlitePool {
        let pool = database::connect_in_memory().await.unwrap();
        fixtures::user(&pool, "bob").await;
        fixtures::user(&pool, "jane").await;
        fixtures::activity(&pool, "a", "2030-01-01T10:00:00Z").await;
        pool
    }

    fn hub() -> ChatHub {
        ChatHub::new(Duration::from_secs(5))
    }

    fn received(event: ServerEvent) -> CommentView {
        match event {
            ServerEvent::ReceiveComment { comment } => comment,
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn comment_reaches_every_connection_once() {
        let pool = seeded().await;
        let hub = hub();
        let (_, mut sender_rx) = hub.connect();
        let (_, mut other_rx) = hub.connect();

        let bob = CallerIdentity::new("bob");
        let stored = hub
            .send_comment(&pool, Some(&bob), "a", "hello")
            .await
            .unwrap();

        assert_eq!(received(sender_rx.recv().await.unwrap()), stored);
        assert_eq!(received(other_rx.recv().await.unwrap()), stored);
        assert!(other_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn author_comes_from_the_connection() {
        let pool = seeded().await;
        let hub = hub();
        let (_, mut rx) = hub.connect();

        let invocation: ClientInvocation = serde_json::from_str(
            r#"{"type":"sendComment","body":"hello","activityId":"a","username":"jane"}"#,
        )
        .unwrap();
        let stored = hub
            .dispatch(&pool, Some(&CallerIdentity::new("bob")), invocation)
            .await
            .unwrap();

        assert_eq!(stored.username, "bob");
        assert_eq!(received(rx.recv().await.unwrap()).username, "bob");
    }

    #[tokio::test]
    async fn failures_never_broadcast() {
        let pool = seeded().await;
        let hub = hub();
        let (_, mut rx) = hub.connect();
        let bob = CallerIdentity::new("bob");

        let err = hub.send_comment(&pool, None, "a", "hi").await.unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated));

        let err = hub
            .send_comment(&pool, Some(&bob), "missing", "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = hub.send_comment(&pool, Some(&bob), "a", "").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropped_receivers_are_pruned() {
        let pool = seeded().await;
        let hub = hub();
        let (_, rx) = hub.connect();
        let (gone, _) = hub.connect();
        drop(rx);
        hub.disconnect(gone);
        let (_, mut live) = hub.connect();
        assert_eq!(hub.connection_count(), 2);

        hub.send_comment(&pool, Some(&CallerIdentity::new("jane")), "a", "still here")
            .await
            .unwrap();

        assert_eq!(hub.connection_count(), 1);
        assert_eq!(received(live.recv().await.unwrap()).body, "still here");
    }

    #[tokio::test]
    async fn stalled_connection_is_dropped_once_its_queue_is_full() {
        let pool = seeded().await;
        let hub = hub().with_queue_capacity(2);
        let (_, _stalled_rx) = hub.connect();
        let (_, mut live) = hub.connect();
        let bob = CallerIdentity::new("bob");

        for body in ["one", "two"] {
            hub.send_comment(&pool, Some(&bob), "a", body).await.unwrap();
            assert_eq!(received(live.recv().await.unwrap()).body, body);
        }
        assert_eq!(hub.connection_count(), 2);

        hub.send_comment(&pool, Some(&bob), "a", "three").await.unwrap();
        assert_eq!(received(live.recv().await.unwrap()).body, "three");
        assert_eq!(hub.connection_count(), 1);

        hub.send_comment(&pool, Some(&bob), "a", "four").await.unwrap();
        assert_eq!(received(live.recv().await.unwrap()).body, "four");
        assert_eq!(hub.connection_count(), 1);
    }

    #[tokio::test]
    async fn timed_out_send_stores_and_broadcasts_nothing() {
        let pool = seeded().await;
        let hub = ChatHub::new(Duration::from_millis(50));
        let (_, mut rx) = hub.connect();

        let held = pool.acquire().await.unwrap();
        let err = hub
            .send_comment(&pool, Some(&CallerIdentity::new("bob")), "a", "late")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Timeout));
        drop(held);

        assert!(rx.try_recv().is_err());
        assert!(comments_service::list_comments(&pool, "a")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn concurrent_senders_arrive_in_persisted_order() {
        let pool = seeded().await;
        let hub = Arc::new(hub());
        let (_, mut a_rx) = hub.connect();
        let (_, mut b_rx) = hub.connect();

        let mut tasks = Vec::new();
        for i in 0..10 {
            let hub = hub.clone();
            let pool = pool.clone();
            let who = if i % 2 == 0 { "bob" } else { "jane" };
            tasks.push(tokio::spawn(async move {
                hub.send_comment(&pool, Some(&CallerIdentity::new(who)), "a", &format!("m{i}"))
                    .await
                    .unwrap()
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let persisted: Vec<String> = comments_service::list_comments(&pool, "a")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();

        for rx in [&mut a_rx, &mut b_rx] {
            let mut seen = Vec::new();
            while let Ok(event) = rx.try_recv() {
                seen.push(received(event).id);
            }
            assert_eq!(seen, persisted);
        }
    }
}
