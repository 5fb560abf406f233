// In-process broker implementation
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{BrokerClient, BrokerError};
use crate::messaging::{InboundMessage, OutboundMessage};

/// Members of one consumer group on one topic
#[derive(Debug)]
struct ConsumerGroup {
    group_id: String,
    members: Vec<mpsc::Sender<InboundMessage>>,
    // Round-robin cursor over `members`
    next: usize,
}

impl ConsumerGroup {
    /// Pick the member that receives the next message, pruning closed ones
    fn next_member(&mut self) -> Option<mpsc::Sender<InboundMessage>> {
        self.members.retain(|m| !m.is_closed());
        if self.members.is_empty() {
            return None;
        }
        let idx = self.next % self.members.len();
        self.next = self.next.wrapping_add(1);
        Some(self.members[idx].clone())
    }
}

/// Per-topic counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopicStats {
    pub total_sent: u64,
    pub total_delivered: u64,
    pub dropped: u64,
    pub active_groups: usize,
}

/// Topic broker living inside the process.
///
/// Every consumer group on a topic sees each message once; inside a group
/// messages are spread round-robin over its members. Messages sent to a topic
/// nobody subscribed to are discarded, as are messages for a member whose
/// queue is full. `send` never waits for a consumer.
pub struct InMemoryBroker {
    // Topic -> consumer groups
    topics: Arc<DashMap<String, Vec<ConsumerGroup>>>,
    // Topic -> next offset
    offsets: Arc<DashMap<String, u64>>,
    stats: Arc<DashMap<String, TopicStats>>,
    // Per-member channel capacity
    capacity: usize,
    closed: AtomicBool,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl InMemoryBroker {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Arc::new(DashMap::new()),
            offsets: Arc::new(DashMap::new()),
            stats: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Stop accepting sends and subscriptions; open receivers drain and end.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!(target: "broker", "In-memory broker closing");
            self.topics.clear();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn get_stats(&self, topic: &str) -> Option<TopicStats> {
        self.stats.get(topic).map(|s| s.clone())
    }

    fn update_stats<F>(&self, topic: &str, f: F)
    where
        F: FnOnce(&mut TopicStats),
    {
        let mut entry = self.stats.entry(topic.to_string()).or_default();
        f(entry.value_mut());
    }

    fn next_offset(&self, topic: &str) -> u64 {
        let mut entry = self.offsets.entry(topic.to_string()).or_insert(0);
        let offset = *entry;
        *entry += 1;
        offset
    }
}

#[async_trait]
impl BrokerClient for InMemoryBroker {
    async fn send(&self, topic: &str, message: OutboundMessage) -> Result<u64, BrokerError> {
        if self.is_closed() {
            return Err(BrokerError::Closed);
        }

        let offset = self.next_offset(topic);
        self.update_stats(topic, |stats| stats.total_sent += 1);

        // Resolve targets first; the shard lock must not be held across an await
        let targets: Vec<(String, mpsc::Sender<InboundMessage>)> = match self.topics.get_mut(topic)
        {
            Some(mut groups) => groups
                .iter_mut()
                .filter_map(|g| g.next_member().map(|m| (g.group_id.clone(), m)))
                .collect(),
            None => Vec::new(),
        };

        if targets.is_empty() {
            warn!(target: "broker", topic = %topic, offset, "No consumer groups for topic; message discarded");
            self.update_stats(topic, |stats| stats.dropped += 1);
            return Ok(offset);
        }

        let inbound = message.into_inbound(topic, offset);
        let mut delivered = 0;
        let mut dropped = 0;
        // Never wait on a consumer: a handler publishing onto its own topic
        // would otherwise block the loop that is running it
        for (group_id, member) in targets {
            match member.try_send(inbound.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    dropped += 1;
                    warn!(target: "broker", topic = %topic, group = %group_id, offset, "Consumer queue full; message dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    dropped += 1;
                    warn!(target: "broker", topic = %topic, group = %group_id, "Consumer went away before delivery");
                }
            }
        }

        self.update_stats(topic, |stats| {
            stats.total_delivered += delivered;
            stats.dropped += dropped;
        });
        debug!(target: "broker", topic = %topic, offset, delivered, "Message sent");
        Ok(offset)
    }

    async fn subscribe(
        &self,
        topic: &str,
        group_id: &str,
    ) -> Result<mpsc::Receiver<InboundMessage>, BrokerError> {
        if self.is_closed() {
            return Err(BrokerError::Closed);
        }

        let (tx, rx) = mpsc::channel(self.capacity);
        let mut new_group = false;
        {
            let mut groups = self.topics.entry(topic.to_string()).or_default();
            match groups.iter_mut().find(|g| g.group_id == group_id) {
                Some(group) => group.members.push(tx),
                None => {
                    new_group = true;
                    groups.push(ConsumerGroup {
                        group_id: group_id.to_string(),
                        members: vec![tx],
                        next: 0,
                    });
                }
            }
        }
        if new_group {
            self.update_stats(topic, |stats| stats.active_groups += 1);
        }

        info!(target: "broker", topic = %topic, group = %group_id, "Consumer subscribed");
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::OutboundMessageExt;

    fn msg(body: &str) -> OutboundMessage {
        OutboundMessage::new(body.as_bytes().to_vec()).with_event_type("unit")
    }

    #[tokio::test]
    async fn offsets_increase_per_topic() {
        let broker = InMemoryBroker::default();
        let _rx = broker.subscribe("a", "g").await.unwrap();

        assert_eq!(broker.send("a", msg("1")).await.unwrap(), 0);
        assert_eq!(broker.send("a", msg("2")).await.unwrap(), 1);
        assert_eq!(broker.send("b", msg("3")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn each_group_sees_every_message() {
        let broker = InMemoryBroker::default();
        let mut first = broker.subscribe("t", "g1").await.unwrap();
        let mut second = broker.subscribe("t", "g2").await.unwrap();

        broker.send("t", msg("hello")).await.unwrap();

        assert_eq!(first.recv().await.unwrap().body, b"hello");
        assert_eq!(second.recv().await.unwrap().body, b"hello");
        assert_eq!(broker.get_stats("t").unwrap().total_delivered, 2);
    }

    #[tokio::test]
    async fn members_of_a_group_share_messages() {
        let broker = InMemoryBroker::default();
        let mut a = broker.subscribe("t", "g").await.unwrap();
        let mut b = broker.subscribe("t", "g").await.unwrap();

        broker.send("t", msg("one")).await.unwrap();
        broker.send("t", msg("two")).await.unwrap();

        assert_eq!(a.recv().await.unwrap().body, b"one");
        assert_eq!(b.recv().await.unwrap().body, b"two");
        assert!(a.try_recv().is_err());
        assert!(b.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_without_consumers_is_discarded() {
        let broker = InMemoryBroker::default();
        broker.send("empty", msg("x")).await.unwrap();
        assert_eq!(broker.get_stats("empty").unwrap().dropped, 1);
    }

    #[tokio::test]
    async fn full_consumer_queue_drops_instead_of_waiting() {
        let broker = InMemoryBroker::new(1);
        let mut rx = broker.subscribe("t", "g").await.unwrap();

        broker.send("t", msg("first")).await.unwrap();
        tokio::time::timeout(std::time::Duration::from_millis(200), broker.send("t", msg("second")))
            .await
            .expect("send waited on a full queue")
            .unwrap();

        let stats = broker.get_stats("t").unwrap();
        assert_eq!(stats.total_delivered, 1);
        assert_eq!(stats.dropped, 1);
        assert_eq!(rx.recv().await.unwrap().body, b"first");
    }

    #[tokio::test]
    async fn closed_broker_rejects_and_ends_streams() {
        let broker = InMemoryBroker::default();
        let mut rx = broker.subscribe("t", "g").await.unwrap();

        broker.close();

        assert!(matches!(
            broker.send("t", msg("late")).await,
            Err(BrokerError::Closed)
        ));
        assert!(matches!(
            broker.subscribe("t", "g").await,
            Err(BrokerError::Closed)
        ));
        assert!(rx.recv().await.is_none());
    }
}
