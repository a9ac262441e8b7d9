//! One streaming subscriber.
//!
//! Pairs a transport with an outbound queue registered at the hub. A
//! spawned reader watches for the client going away; the writer pulls from
//! the queue and pushes each event under a deadline.
//!
//! ```text
//! Connected ──(write error / deadline)──► Draining ──(hub closes queue)──► Closed
//!     │                                                                     ▲
//!     └──────────────(reader requests removal, hub closes queue)────────────┘
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::message::PriceUpdateMessage;
use crate::StreamSettings;
use crate::infrastructure::broadcast::{
    HubError, HubHandle, OutboundQueue, RemovalReason, SubscriberId,
};
use crate::infrastructure::metrics;

/// Per-connection settings.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    /// Longest a single outbound write may take.
    pub write_deadline: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            write_deadline: Duration::from_secs(1),
        }
    }
}

impl From<StreamSettings> for ConnectionSettings {
    fn from(settings: StreamSettings) -> Self {
        Self {
            write_deadline: settings.write_deadline,
        }
    }
}

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Registered and writing events.
    Connected,
    /// Removal requested; discarding events until the hub closes the queue.
    Draining,
    /// Queue closed by the hub.
    Closed,
}

impl ConnectionPhase {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Draining => "draining",
            Self::Closed => "closed",
        }
    }
}

/// What happened over a connection's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSummary {
    /// Subscriber id assigned by the hub.
    pub id: SubscriberId,
    /// Events written to the transport.
    pub sent: u64,
    /// Why this connection asked to be removed, if it did.
    pub removal: Option<RemovalReason>,
}

/// A registered subscriber waiting to be served.
#[derive(Debug)]
pub struct SubscriberConnection {
    id: SubscriberId,
    hub: HubHandle,
    queue: Arc<OutboundQueue>,
    settings: ConnectionSettings,
    phase: ConnectionPhase,
}

impl SubscriberConnection {
    /// Register a new subscriber with the hub.
    ///
    /// # Errors
    ///
    /// Returns `HubError::Closed` if the hub has stopped.
    pub async fn open(hub: HubHandle, settings: ConnectionSettings) -> Result<Self, HubError> {
        let queue = hub.new_queue();
        let id = hub.register(Arc::clone(&queue)).await?;
        metrics::record_subscriber_opened();
        Ok(Self {
            id,
            hub,
            queue,
            settings,
            phase: ConnectionPhase::Connected,
        })
    }

    /// Subscriber id assigned by the hub.
    #[must_use]
    pub const fn id(&self) -> SubscriberId {
        self.id
    }

    /// Current lifecycle phase.
    #[must_use]
    pub const fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// Stream events to `writer` until the hub closes this subscriber.
    ///
    /// `reader` is only watched for disconnects; any application data on it
    /// is treated as a protocol violation.
    pub async fn serve<W, R, E>(mut self, mut writer: W, reader: R) -> ConnectionSummary
    where
        W: Sink<Message> + Unpin + Send,
        W::Error: fmt::Display,
        R: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let done = CancellationToken::new();
        let reader_task = tokio::spawn(watch_inbound(
            reader,
            self.hub.clone(),
            self.id,
            done.clone(),
        ));

        let (sent, write_removal) = self.write_loop(&mut writer).await;
        self.transition(ConnectionPhase::Closed);

        done.cancel();
        let read_removal = reader_task.await.ok().flatten();
        let _ = timeout(self.settings.write_deadline, writer.close()).await;

        ConnectionSummary {
            id: self.id,
            sent,
            removal: write_removal.or(read_removal),
        }
    }

    async fn write_loop<W>(&mut self, writer: &mut W) -> (u64, Option<RemovalReason>)
    where
        W: Sink<Message> + Unpin,
        W::Error: fmt::Display,
    {
        let mut sent = 0;
        while let Some(event) = self.queue.pop().await {
            let frame = match PriceUpdateMessage::from(event.as_ref()).to_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!(asset = %event.asset, error = %e, "Failed to encode price update");
                    continue;
                }
            };

            let reason = match timeout(self.settings.write_deadline, writer.send(frame)).await {
                Ok(Ok(())) => {
                    sent += 1;
                    metrics::record_message_sent();
                    continue;
                }
                Ok(Err(e)) => {
                    tracing::debug!(subscriber = %self.id, error = %e, "Stream write failed");
                    RemovalReason::WriteFailed
                }
                Err(_) => {
                    tracing::debug!(
                        subscriber = %self.id,
                        deadline = ?self.settings.write_deadline,
                        "Stream write missed deadline"
                    );
                    RemovalReason::WriteDeadline
                }
            };

            self.transition(ConnectionPhase::Draining);
            request_removal(&self.hub, self.id, reason).await;
            while self.queue.pop().await.is_some() {}
            return (sent, Some(reason));
        }
        (sent, None)
    }

    fn transition(&mut self, phase: ConnectionPhase) {
        tracing::debug!(
            subscriber = %self.id,
            from = self.phase.as_str(),
            to = phase.as_str(),
            "Connection phase changed"
        );
        self.phase = phase;
    }
}

async fn watch_inbound<R, E>(
    mut reader: R,
    hub: HubHandle,
    id: SubscriberId,
    done: CancellationToken,
) -> Option<RemovalReason>
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    let reason = loop {
        let frame = tokio::select! {
            () = done.cancelled() => return None,
            frame = reader.next() => frame,
        };

        match frame {
            None | Some(Ok(Message::Close(_))) => break RemovalReason::ClientClosed,
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            Some(Ok(Message::Text(_) | Message::Binary(_))) => {
                break RemovalReason::UnexpectedInbound;
            }
            Some(Err(e)) => {
                tracing::debug!(subscriber = %id, error = %e, "Stream read failed");
                break RemovalReason::ReadFailed;
            }
        }
    };

    request_removal(&hub, id, reason).await;
    Some(reason)
}

async fn request_removal(hub: &HubHandle, id: SubscriberId, reason: RemovalReason) {
    // A stopped hub has already closed every queue.
    if let Err(e) = hub.remove(id, reason).await {
        tracing::debug!(subscriber = %id, error = %e, "Removal request not delivered");
    }
}
