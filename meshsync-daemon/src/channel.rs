//! Per-folder notification channel: one fanout exchange per folder, one
//! queue per host bound to it.

use std::sync::Arc;
use std::time::Duration;

use meshsync_core::{ChangeSet, ChecksumId, Message};
use tokio::sync::mpsc;

use crate::bus::{BusChannel, BusConnection, PublishProperties};
use crate::error::DaemonError;

pub const CONTENT_TYPE: &str = "application/json";
/// Undelivered announcements older than this are dropped by the broker.
pub const MESSAGE_EXPIRATION: Duration = Duration::from_secs(60 * 60);

pub fn exchange_name(checksum: &ChecksumId) -> String {
    format!("exchange.{checksum}")
}

pub fn queue_name(hostname: &str, checksum: &ChecksumId) -> String {
    format!("queue.{hostname}.{checksum}")
}

/// What an inbound delivery turned out to be.
#[derive(Debug)]
pub enum Inbound {
    Peer(Message),
    Own,
    Malformed(serde_json::Error),
}

pub fn classify(data: &[u8], hostname: &str) -> Inbound {
    match Message::decode(data) {
        Ok(message) if message.hostname == hostname => Inbound::Own,
        Ok(message) => Inbound::Peer(message),
        Err(err) => Inbound::Malformed(err),
    }
}

pub struct NotificationChannel {
    channel: Arc<dyn BusChannel>,
    hostname: String,
    exchange: String,
    queue: String,
}

impl NotificationChannel {
    /// Open a dedicated bus channel and declare + bind this folder's topology.
    pub async fn open(
        connection: &dyn BusConnection,
        hostname: &str,
        checksum: &ChecksumId,
    ) -> Result<Self, DaemonError> {
        let channel = connection.open_channel().await?;
        let exchange = exchange_name(checksum);
        let queue = queue_name(hostname, checksum);

        channel.declare_fanout_exchange(&exchange).await?;
        channel.declare_queue(&queue).await?;
        channel.bind_queue(&queue, &exchange).await?;
        tracing::debug!(exchange = %exchange, queue = %queue, "notification channel ready");

        Ok(Self {
            channel,
            hostname: hostname.to_string(),
            exchange,
            queue,
        })
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub async fn publish(&self, changeset: &ChangeSet) -> Result<(), DaemonError> {
        let payload = Message::new(self.hostname.clone(), changeset.clone()).encode()?;
        let properties = PublishProperties {
            content_type: CONTENT_TYPE.to_string(),
            expiration: MESSAGE_EXPIRATION,
        };
        self.channel
            .publish(&self.exchange, &payload, &properties)
            .await?;
        Ok(())
    }

    /// Start consuming. Every delivery is acknowledged; only messages from
    /// other hosts reach the returned receiver. The receiver closes when the
    /// underlying consumer ends or an ack fails.
    pub async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<Message>, DaemonError> {
        let consumer_tag = format!("{}.consumer", self.queue);
        let mut deliveries = self.channel.consume(&self.queue, &consumer_tag).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = self.channel.clone();
        let hostname = self.hostname.clone();
        let queue = self.queue.clone();

        tokio::spawn(async move {
            while let Some(delivery) = deliveries.recv().await {
                if let Err(err) = channel.ack(delivery.delivery_tag).await {
                    tracing::warn!(queue = %queue, error = %err, "failed to acknowledge delivery");
                    break;
                }
                match classify(&delivery.data, &hostname) {
                    Inbound::Peer(message) => {
                        if tx.send(message).is_err() {
                            break;
                        }
                    }
                    Inbound::Own => {
                        tracing::debug!(queue = %queue, "ignoring own notification");
                    }
                    Inbound::Malformed(err) => {
                        tracing::warn!(queue = %queue, error = %err, "dropping malformed notification");
                    }
                }
            }
            tracing::debug!(queue = %queue, "notification consumer ended");
        });

        Ok(rx)
    }
}
