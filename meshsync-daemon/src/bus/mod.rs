//! Message bus seen through the operations the coordination layer needs:
//! declare-exchange, declare-queue, bind, publish, consume, ack.
//!
//! [`amqp`] talks to a real broker through `lapin`; [`memory`] is an
//! in-process broker with the same fanout semantics, used by tests.

pub mod amqp;
pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("{0}")]
    Broker(String),
}

/// One message taken off a queue. Must be acknowledged by tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub delivery_tag: u64,
    pub data: Vec<u8>,
}

/// Per-message publish properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishProperties {
    pub content_type: String,
    /// Broker-side expiration; undelivered messages older than this are dropped.
    pub expiration: Duration,
}

pub type DeliveryStream = mpsc::UnboundedReceiver<Delivery>;

#[async_trait]
pub trait BusConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn BusConnection>, BusError>;
}

#[async_trait]
pub trait BusConnection: Send + Sync {
    /// Each coordinator opens its own channel; the connection itself is shared.
    async fn open_channel(&self) -> Result<Arc<dyn BusChannel>, BusError>;

    /// Resolves once the connection has been lost or closed.
    async fn closed(&self);

    async fn close(&self);
}

#[async_trait]
pub trait BusChannel: Send + Sync {
    async fn declare_fanout_exchange(&self, exchange: &str) -> Result<(), BusError>;

    async fn declare_queue(&self, queue: &str) -> Result<(), BusError>;

    async fn bind_queue(&self, queue: &str, exchange: &str) -> Result<(), BusError>;

    async fn publish(
        &self,
        exchange: &str,
        payload: &[u8],
        properties: &PublishProperties,
    ) -> Result<(), BusError>;

    /// Start consuming; the stream ends when the channel or connection goes away.
    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream, BusError>;

    async fn ack(&self, delivery_tag: u64) -> Result<(), BusError>;
}
