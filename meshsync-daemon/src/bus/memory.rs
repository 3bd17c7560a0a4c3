//! In-process broker with fanout semantics.
//!
//! All connections made through one [`MemoryBus`] share its exchanges and
//! queues, so several simulated hosts can talk to each other inside one test.
//! [`MemoryBus::sever`] drops every live connection the way a broker restart
//! would: consumers end and `closed()` resolves. Closing one connection
//! cancels its consumers; their queues keep buffering until the next
//! `consume`.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use super::{
    BusChannel, BusConnection, BusConnector, BusError, Delivery, DeliveryStream,
    PublishProperties,
};

/// A message as the broker saw it, kept for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub exchange: String,
    pub payload: Vec<u8>,
    pub properties: PublishProperties,
}

struct Consumer {
    connection: usize,
    sender: mpsc::UnboundedSender<Delivery>,
}

/// One queue: at most one consumer, and a backlog while there is none.
#[derive(Default)]
struct QueueState {
    backlog: VecDeque<Delivery>,
    consumer: Option<Consumer>,
}

impl QueueState {
    fn deliver(&mut self, delivery: Delivery) {
        let delivery = match &self.consumer {
            Some(consumer) => match consumer.sender.send(delivery) {
                Ok(()) => return,
                Err(mpsc::error::SendError(delivery)) => delivery,
            },
            None => delivery,
        };
        self.consumer = None;
        self.backlog.push_back(delivery);
    }

    fn has_live_consumer(&self) -> bool {
        self.consumer
            .as_ref()
            .is_some_and(|consumer| !consumer.sender.is_closed())
    }
}

struct BrokerState {
    exchanges: HashMap<String, Vec<String>>,
    queues: HashMap<String, QueueState>,
    next_tag: u64,
    acked: Vec<u64>,
    published: Vec<Published>,
    connections: usize,
    generation: watch::Sender<u64>,
    refuse_connections: bool,
}

#[derive(Clone)]
pub struct MemoryBus {
    state: Arc<Mutex<BrokerState>>,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus {
    pub fn new() -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            state: Arc::new(Mutex::new(BrokerState {
                exchanges: HashMap::new(),
                queues: HashMap::new(),
                next_tag: 1,
                acked: Vec::new(),
                published: Vec::new(),
                connections: 0,
                generation,
                refuse_connections: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop every live connection and all queued messages.
    pub fn sever(&self) {
        let mut state = self.lock();
        state.queues.clear();
        state.generation.send_modify(|g| *g += 1);
    }

    /// Make subsequent `connect` calls fail (or succeed again).
    pub fn refuse_connections(&self, refuse: bool) {
        self.lock().refuse_connections = refuse;
    }

    pub fn published(&self) -> Vec<Published> {
        self.lock().published.clone()
    }

    pub fn acked(&self) -> Vec<u64> {
        self.lock().acked.clone()
    }

    /// Number of successful `connect` calls so far.
    pub fn connections(&self) -> usize {
        self.lock().connections
    }

    pub fn has_exchange(&self, exchange: &str) -> bool {
        self.lock().exchanges.contains_key(exchange)
    }

    pub fn bindings(&self, exchange: &str) -> Vec<String> {
        self.lock()
            .exchanges
            .get(exchange)
            .cloned()
            .unwrap_or_default()
    }

    /// Open a connection directly, bypassing [`BusConnector`].
    pub fn connection(&self) -> Arc<MemoryConnection> {
        let mut state = self.lock();
        state.connections += 1;
        let generation = state.generation.subscribe();
        let current = *generation.borrow();
        Arc::new(MemoryConnection {
            bus: self.clone(),
            id: state.connections,
            generation,
            opened_at: current,
        })
    }

    fn check_live(&self, opened_at: u64) -> Result<(), BusError> {
        if *self.lock().generation.borrow() != opened_at {
            return Err(BusError::Broker("connection severed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BusConnector for MemoryBus {
    async fn connect(&self) -> Result<Arc<dyn BusConnection>, BusError> {
        if self.lock().refuse_connections {
            return Err(BusError::Broker("connection refused".to_string()));
        }
        Ok(self.connection())
    }
}

pub struct MemoryConnection {
    bus: MemoryBus,
    id: usize,
    generation: watch::Receiver<u64>,
    opened_at: u64,
}

#[async_trait]
impl BusConnection for MemoryConnection {
    async fn open_channel(&self) -> Result<Arc<dyn BusChannel>, BusError> {
        self.bus.check_live(self.opened_at)?;
        Ok(Arc::new(MemoryChannel {
            bus: self.bus.clone(),
            connection: self.id,
            opened_at: self.opened_at,
        }))
    }

    async fn closed(&self) {
        let opened_at = self.opened_at;
        let mut generation = self.generation.clone();
        let _ = generation.wait_for(|g| *g != opened_at).await;
    }

    async fn close(&self) {
        let mut state = self.bus.lock();
        for queue in state.queues.values_mut() {
            if queue
                .consumer
                .as_ref()
                .is_some_and(|consumer| consumer.connection == self.id)
            {
                queue.consumer = None;
            }
        }
    }
}

pub struct MemoryChannel {
    bus: MemoryBus,
    connection: usize,
    opened_at: u64,
}

#[async_trait]
impl BusChannel for MemoryChannel {
    async fn declare_fanout_exchange(&self, exchange: &str) -> Result<(), BusError> {
        self.bus.check_live(self.opened_at)?;
        self.bus
            .lock()
            .exchanges
            .entry(exchange.to_string())
            .or_default();
        Ok(())
    }

    async fn declare_queue(&self, queue: &str) -> Result<(), BusError> {
        self.bus.check_live(self.opened_at)?;
        self.bus
            .lock()
            .queues
            .entry(queue.to_string())
            .or_default();
        Ok(())
    }

    async fn bind_queue(&self, queue: &str, exchange: &str) -> Result<(), BusError> {
        self.bus.check_live(self.opened_at)?;
        let mut state = self.bus.lock();
        if !state.queues.contains_key(queue) {
            return Err(BusError::Broker(format!("no queue '{queue}'")));
        }
        let bound = state
            .exchanges
            .get_mut(exchange)
            .ok_or_else(|| BusError::Broker(format!("no exchange '{exchange}'")))?;
        if !bound.iter().any(|q| q == queue) {
            bound.push(queue.to_string());
        }
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        payload: &[u8],
        properties: &PublishProperties,
    ) -> Result<(), BusError> {
        self.bus.check_live(self.opened_at)?;
        let mut state = self.bus.lock();
        let bound = state
            .exchanges
            .get(exchange)
            .cloned()
            .ok_or_else(|| BusError::Broker(format!("no exchange '{exchange}'")))?;

        for queue in bound {
            let tag = state.next_tag;
            state.next_tag += 1;
            if let Some(queue) = state.queues.get_mut(&queue) {
                queue.deliver(Delivery {
                    delivery_tag: tag,
                    data: payload.to_vec(),
                });
            }
        }
        state.published.push(Published {
            exchange: exchange.to_string(),
            payload: payload.to_vec(),
            properties: properties.clone(),
        });
        Ok(())
    }

    async fn consume(&self, queue: &str, _consumer_tag: &str) -> Result<DeliveryStream, BusError> {
        self.bus.check_live(self.opened_at)?;
        let mut state = self.bus.lock();
        let queue_state = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| BusError::Broker(format!("no queue '{queue}'")))?;
        if queue_state.has_live_consumer() {
            return Err(BusError::Broker(format!("queue '{queue}' already consumed")));
        }

        let (sender, deliveries) = mpsc::unbounded_channel();
        for delivery in queue_state.backlog.drain(..) {
            let _ = sender.send(delivery);
        }
        queue_state.consumer = Some(Consumer {
            connection: self.connection,
            sender,
        });
        Ok(deliveries)
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), BusError> {
        self.bus.check_live(self.opened_at)?;
        self.bus.lock().acked.push(delivery_tag);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn props() -> PublishProperties {
        PublishProperties {
            content_type: "application/json".to_string(),
            expiration: Duration::from_secs(3600),
        }
    }

    #[tokio::test]
    async fn fanout_reaches_every_bound_queue() {
        let bus = MemoryBus::new();
        let channel = bus.connection().open_channel().await.expect("channel");
        channel.declare_fanout_exchange("ex").await.expect("exchange");
        for q in ["qa", "qb"] {
            channel.declare_queue(q).await.expect("queue");
            channel.bind_queue(q, "ex").await.expect("bind");
        }

        let mut a = channel.consume("qa", "a").await.expect("consume a");
        let mut b = channel.consume("qb", "b").await.expect("consume b");
        channel.publish("ex", b"hello", &props()).await.expect("publish");

        assert_eq!(a.recv().await.expect("a").data, b"hello");
        assert_eq!(b.recv().await.expect("b").data, b"hello");
    }

    #[tokio::test]
    async fn sever_ends_consumers_and_resolves_closed() {
        let bus = MemoryBus::new();
        let connection = bus.connection();
        let channel = connection.open_channel().await.expect("channel");
        channel.declare_queue("q").await.expect("queue");
        let mut deliveries = channel.consume("q", "t").await.expect("consume");

        bus.sever();
        connection.closed().await;
        assert!(deliveries.recv().await.is_none());
        assert!(channel.ack(1).await.is_err());
    }

    #[tokio::test]
    async fn closing_a_connection_frees_its_queues_for_the_next_consumer() {
        let bus = MemoryBus::new();
        let first = bus.connection();
        let channel = first.open_channel().await.expect("channel");
        channel.declare_fanout_exchange("ex").await.expect("exchange");
        channel.declare_queue("q").await.expect("queue");
        channel.bind_queue("q", "ex").await.expect("bind");
        let mut deliveries = channel.consume("q", "t").await.expect("consume");
        assert!(channel.consume("q", "t").await.is_err());

        first.close().await;
        assert!(deliveries.recv().await.is_none());
        channel.publish("ex", b"buffered", &props()).await.expect("publish");

        let second = bus.connection().open_channel().await.expect("channel");
        second.declare_queue("q").await.expect("queue");
        let mut deliveries = second.consume("q", "t").await.expect("consume again");
        assert_eq!(deliveries.recv().await.expect("backlog").data, b"buffered");
    }
}
