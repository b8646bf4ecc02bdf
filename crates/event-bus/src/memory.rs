use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::bus::{Acknowledge, Delivery, DeliveryStream, MessageBus, QueueHandle};
use crate::{BusError, EventEnvelope, Result};

/// Per-queue counters, useful for asserting delivery behaviour in tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Messages waiting in the queue.
    pub pending: usize,
    /// Deliveries handed to consumers (redeliveries included).
    pub delivered: u64,
    /// Deliveries settled with ack.
    pub acked: u64,
    /// Deliveries settled with nack + requeue.
    pub requeued: u64,
    /// Deliveries settled with nack without requeue.
    pub dropped: u64,
}

#[derive(Debug, Clone)]
struct Message {
    data: Vec<u8>,
    routing_key: String,
    redelivered: bool,
}

#[derive(Default)]
struct MemoryQueue {
    messages: Mutex<VecDeque<Message>>,
    stats: Mutex<QueueStats>,
    notify: Notify,
    closed: AtomicBool,
}

impl MemoryQueue {
    fn push_back(&self, message: Message) {
        self.messages.lock().push_back(message);
        self.notify.notify_one();
    }

    fn requeue(&self, message: Message) {
        self.messages.lock().push_front(message);
        self.stats.lock().requeued += 1;
        self.notify.notify_one();
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
        self.notify.notify_one();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Binding {
    queue: String,
    exchange: String,
    pattern: String,
}

#[derive(Default)]
struct BrokerState {
    exchanges: HashSet<String>,
    queues: HashMap<String, Arc<MemoryQueue>>,
    bindings: Vec<Binding>,
    published: Vec<EventEnvelope>,
}

/// In-process broker with AMQP topic-exchange semantics.
///
/// Mirrors what the services rely on from a real broker: durable-looking
/// declarations that are idempotent, topic routing, manual ack, and requeue
/// on nack (the requeued message goes back to the head of its queue and is
/// flagged as redelivered).
#[derive(Clone, Default)]
pub struct InMemoryBus {
    state: Arc<Mutex<BrokerState>>,
}

impl InMemoryBus {
    /// Creates a new empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every envelope published so far, in publish order.
    pub fn published(&self) -> Vec<EventEnvelope> {
        self.state.lock().published.clone()
    }

    /// Returns the published envelopes of one event type.
    pub fn published_of_type(&self, event_type: &str) -> Vec<EventEnvelope> {
        self.state
            .lock()
            .published
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    /// Returns the counters of a queue, or None if it was never declared.
    pub fn queue_stats(&self, queue: &str) -> Option<QueueStats> {
        let queue = self.state.lock().queues.get(queue).cloned()?;
        let mut stats = *queue.stats.lock();
        stats.pending = queue.messages.lock().len();
        Some(stats)
    }

    /// Publishes raw bytes, bypassing envelope encoding.
    ///
    /// Returns the number of queues the message was routed to.
    pub fn publish_raw(&self, exchange: &str, routing_key: &str, data: Vec<u8>) -> Result<usize> {
        self.route(exchange, routing_key, data)
    }

    /// Closes every queue; active consumer streams end once drained.
    pub fn close(&self) {
        for queue in self.state.lock().queues.values() {
            queue.close();
        }
    }

    fn route(&self, exchange: &str, routing_key: &str, data: Vec<u8>) -> Result<usize> {
        let targets: Vec<Arc<MemoryQueue>> = {
            let state = self.state.lock();
            if !state.exchanges.contains(exchange) {
                return Err(BusError::Publish(format!(
                    "exchange '{exchange}' is not declared"
                )));
            }
            let mut seen = HashSet::new();
            state
                .bindings
                .iter()
                .filter(|b| b.exchange == exchange && topic_matches(&b.pattern, routing_key))
                .filter(|b| seen.insert(b.queue.clone()))
                .filter_map(|b| state.queues.get(&b.queue).cloned())
                .collect()
        };

        for queue in &targets {
            queue.push_back(Message {
                data: data.clone(),
                routing_key: routing_key.to_string(),
                redelivered: false,
            });
        }

        if targets.is_empty() {
            tracing::debug!(%exchange, %routing_key, "message matched no binding");
        }
        Ok(targets.len())
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn declare_exchange(&self, name: &str) -> Result<()> {
        self.state.lock().exchanges.insert(name.to_string());
        Ok(())
    }

    async fn declare_queue(&self, name: &str) -> Result<QueueHandle> {
        self.state
            .lock()
            .queues
            .entry(name.to_string())
            .or_default();
        Ok(QueueHandle::new(name))
    }

    async fn bind_queue(&self, queue: &QueueHandle, exchange: &str, pattern: &str) -> Result<()> {
        let mut state = self.state.lock();
        if !state.exchanges.contains(exchange) {
            return Err(BusError::Declare(format!(
                "exchange '{exchange}' is not declared"
            )));
        }
        if !state.queues.contains_key(queue.name()) {
            return Err(BusError::Declare(format!(
                "queue '{}' is not declared",
                queue.name()
            )));
        }
        let binding = Binding {
            queue: queue.name().to_string(),
            exchange: exchange.to_string(),
            pattern: pattern.to_string(),
        };
        if !state.bindings.contains(&binding) {
            state.bindings.push(binding);
        }
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        envelope: &EventEnvelope,
    ) -> Result<()> {
        let data = envelope.to_bytes()?;
        self.route(exchange, routing_key, data)?;
        self.state.lock().published.push(envelope.clone());
        Ok(())
    }

    async fn consume(&self, queue: &QueueHandle, _consumer_tag: &str) -> Result<DeliveryStream> {
        let queue = self
            .state
            .lock()
            .queues
            .get(queue.name())
            .cloned()
            .ok_or_else(|| BusError::Consume(format!("queue '{}' is not declared", queue.name())))?;

        let stream = futures_util::stream::unfold(queue, |queue| async move {
            loop {
                let next = queue.messages.lock().pop_front();
                if let Some(message) = next {
                    if message.redelivered {
                        // Let other tasks run between redeliveries of a failing message.
                        tokio::task::yield_now().await;
                    }
                    queue.stats.lock().delivered += 1;
                    let delivery = Delivery::new(
                        message.data.clone(),
                        message.routing_key.clone(),
                        message.redelivered,
                        Box::new(MemoryAcker {
                            queue: queue.clone(),
                            message: Mutex::new(Some(message)),
                        }),
                    );
                    return Some((Ok(delivery), queue));
                }
                if queue.closed.load(Ordering::Acquire) {
                    return None;
                }
                queue.notify.notified().await;
            }
        });

        Ok(Box::pin(stream))
    }

    async fn close(&self) -> Result<()> {
        InMemoryBus::close(self);
        Ok(())
    }
}

struct MemoryAcker {
    queue: Arc<MemoryQueue>,
    message: Mutex<Option<Message>>,
}

#[async_trait]
impl Acknowledge for MemoryAcker {
    async fn ack(&self) -> Result<()> {
        let settled = self.message.lock().take();
        if settled.is_none() {
            return Err(BusError::Acknowledge("delivery already settled".into()));
        }
        self.queue.stats.lock().acked += 1;
        Ok(())
    }

    async fn nack(&self, requeue: bool) -> Result<()> {
        let settled = self.message.lock().take();
        let Some(mut message) = settled else {
            return Err(BusError::Acknowledge("delivery already settled".into()));
        };
        if requeue {
            message.redelivered = true;
            self.queue.requeue(message);
        } else {
            self.queue.stats.lock().dropped += 1;
        }
        Ok(())
    }
}

/// AMQP topic matching: words are dot-separated, `*` matches exactly one
/// word and `#` matches zero or more.
pub(crate) fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    match_words(&pattern, &key)
}

fn match_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| match_words(rest, &key[skip..])),
        Some((&"*", rest)) => !key.is_empty() && match_words(rest, &key[1..]),
        Some((word, rest)) => key.first() == Some(word) && match_words(rest, &key[1..]),
    }
}
