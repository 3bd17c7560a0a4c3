//! `lapin`-backed bus.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions,
    QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Connection, ConnectionProperties, ExchangeKind};
use tokio::sync::{mpsc, watch};

use super::{
    BusChannel, BusConnection, BusConnector, BusError, DeliveryStream, Delivery,
    PublishProperties,
};

/// Connects to `amqp://…` URIs built from the config.
pub struct AmqpConnector {
    uri: String,
}

impl AmqpConnector {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}

#[async_trait]
impl BusConnector for AmqpConnector {
    async fn connect(&self) -> Result<Arc<dyn BusConnection>, BusError> {
        let connection = Connection::connect(&self.uri, ConnectionProperties::default()).await?;

        let (lost_tx, lost_rx) = watch::channel(false);
        connection.on_error(move |err| {
            tracing::warn!(error = %err, "bus connection error");
            let _ = lost_tx.send(true);
        });

        Ok(Arc::new(AmqpConnection {
            inner: connection,
            lost: lost_rx,
        }))
    }
}

pub struct AmqpConnection {
    inner: Connection,
    lost: watch::Receiver<bool>,
}

#[async_trait]
impl BusConnection for AmqpConnection {
    async fn open_channel(&self) -> Result<Arc<dyn BusChannel>, BusError> {
        let channel = self.inner.create_channel().await?;
        Ok(Arc::new(AmqpChannel { inner: channel }))
    }

    async fn closed(&self) {
        let mut lost = self.lost.clone();
        // Sender dropped without signalling also means the connection is gone.
        let _ = lost.wait_for(|lost| *lost).await;
    }

    async fn close(&self) {
        if self.inner.status().connected() {
            if let Err(err) = self.inner.close(200, "shutdown").await {
                tracing::debug!(error = %err, "bus close failed");
            }
        }
    }
}

pub struct AmqpChannel {
    inner: lapin::Channel,
}

#[async_trait]
impl BusChannel for AmqpChannel {
    async fn declare_fanout_exchange(&self, exchange: &str) -> Result<(), BusError> {
        self.inner
            .exchange_declare(
                exchange,
                ExchangeKind::Fanout,
                ExchangeDeclareOptions::default(),
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    async fn declare_queue(&self, queue: &str) -> Result<(), BusError> {
        self.inner
            .queue_declare(queue, QueueDeclareOptions::default(), FieldTable::default())
            .await?;
        Ok(())
    }

    async fn bind_queue(&self, queue: &str, exchange: &str) -> Result<(), BusError> {
        self.inner
            .queue_bind(
                queue,
                exchange,
                "",
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        payload: &[u8],
        properties: &PublishProperties,
    ) -> Result<(), BusError> {
        let amqp_properties = BasicProperties::default()
            .with_content_type(properties.content_type.clone().into())
            .with_expiration(properties.expiration.as_millis().to_string().into());

        self.inner
            .basic_publish(
                exchange,
                "",
                BasicPublishOptions::default(),
                payload,
                amqp_properties,
            )
            .await?
            .await?;
        Ok(())
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream, BusError> {
        let mut consumer = self
            .inner
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let queue = queue.to_string();
        tokio::spawn(async move {
            while let Some(delivery) = consumer.next().await {
                match delivery {
                    Ok(delivery) => {
                        let forwarded = tx.send(Delivery {
                            delivery_tag: delivery.delivery_tag,
                            data: delivery.data,
                        });
                        if forwarded.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::warn!(queue = %queue, error = %err, "consumer failed");
                        break;
                    }
                }
            }
        });
        Ok(rx)
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), BusError> {
        self.inner
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await?;
        Ok(())
    }
}
