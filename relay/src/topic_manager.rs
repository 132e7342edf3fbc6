//! Subscriber bookkeeping for the topic relay
//!
//! This module tracks which network addresses are subscribed to which topics:
//! - Subscription lifecycle (subscribe, unsubscribe, timeout)
//! - Per-topic capacity so a match topic never holds more than its players
//! - Activity tracking driven by any packet from a subscriber
//!
//! The relay never interprets payloads; it only needs to know who else is
//! listening on a topic when a publish arrives.

use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// One address subscribed to one topic
#[derive(Debug)]
pub struct Subscriber {
    /// Unique subscription identifier assigned by the relay
    pub id: u32,
    /// Network address deliveries are sent to
    pub addr: SocketAddr,
    pub topic: String,
    /// Last time we received any packet from this address
    pub last_seen: Instant,
}

impl Subscriber {
    pub fn new(id: u32, addr: SocketAddr, topic: String) -> Self {
        Self {
            id,
            addr,
            topic,
            last_seen: Instant::now(),
        }
    }

    /// Returns true if nothing has been heard from this subscriber within `timeout`.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Why a subscription was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeRefusal {
    TopicFull,
    TooManyTopics,
}

impl SubscribeRefusal {
    pub fn reason(self) -> &'static str {
        match self {
            SubscribeRefusal::TopicFull => "Topic full",
            SubscribeRefusal::TooManyTopics => "Relay full",
        }
    }
}

/// Manages every subscription the relay knows about
///
/// Enforces a per-topic subscriber cap and a global topic cap, and reports
/// which subscribers should receive a publish.
pub struct TopicManager {
    /// Subscriptions indexed by their unique ID
    subscribers: HashMap<u32, Subscriber>,
    next_subscriber_id: u32,
    max_per_topic: usize,
    max_topics: usize,
    idle_timeout: Duration,
}

impl TopicManager {
    pub fn new(max_per_topic: usize, max_topics: usize, idle_timeout: Duration) -> Self {
        Self {
            subscribers: HashMap::new(),
            next_subscriber_id: 1,
            max_per_topic,
            max_topics,
            idle_timeout,
        }
    }

    /// Subscribes `addr` to `topic`
    ///
    /// Re-subscribing an address that already holds the topic only refreshes
    /// its activity and returns the existing ID, so client retries are harmless.
    pub fn subscribe(&mut self, addr: SocketAddr, topic: &str) -> Result<u32, SubscribeRefusal> {
        if let Some(existing) = self
            .subscribers
            .values_mut()
            .find(|s| s.addr == addr && s.topic == topic)
        {
            existing.last_seen = Instant::now();
            return Ok(existing.id);
        }

        let in_topic = self.subscribers.values().filter(|s| s.topic == topic).count();
        if in_topic >= self.max_per_topic {
            return Err(SubscribeRefusal::TopicFull);
        }
        if in_topic == 0 && self.topic_count() >= self.max_topics {
            return Err(SubscribeRefusal::TooManyTopics);
        }

        let id = self.next_subscriber_id;
        self.next_subscriber_id += 1;
        info!("Subscriber {} joined {} from {}", id, topic, addr);
        self.subscribers
            .insert(id, Subscriber::new(id, addr, topic.to_string()));
        Ok(id)
    }

    /// Removes the subscription of `addr` to `topic`. Returns false if there was none.
    pub fn unsubscribe(&mut self, addr: SocketAddr, topic: &str) -> bool {
        match self.find(addr, topic) {
            Some(id) => {
                self.subscribers.remove(&id);
                info!("Subscriber {} left {}", id, topic);
                true
            }
            None => false,
        }
    }

    pub fn find(&self, addr: SocketAddr, topic: &str) -> Option<u32> {
        self.subscribers
            .values()
            .find(|s| s.addr == addr && s.topic == topic)
            .map(|s| s.id)
    }

    /// Marks every subscription held by `addr` as active. Returns how many there were.
    pub fn refresh(&mut self, addr: SocketAddr) -> usize {
        let now = Instant::now();
        let mut refreshed = 0;
        for subscriber in self.subscribers.values_mut().filter(|s| s.addr == addr) {
            subscriber.last_seen = now;
            refreshed += 1;
        }
        refreshed
    }

    /// Addresses subscribed to `topic`, except `exclude`.
    pub fn peers_of(&self, topic: &str, exclude: SocketAddr) -> Vec<SocketAddr> {
        self.subscribers
            .values()
            .filter(|s| s.topic == topic && s.addr != exclude)
            .map(|s| s.addr)
            .collect()
    }

    pub fn topic_size(&self, topic: &str) -> usize {
        self.subscribers.values().filter(|s| s.topic == topic).count()
    }

    /// Drops subscribers that have been silent longer than the idle timeout
    /// and returns them as `(id, topic)` pairs.
    pub fn check_timeouts(&mut self) -> Vec<(u32, String)> {
        let timeout = self.idle_timeout;
        let timed_out: Vec<u32> = self
            .subscribers
            .values()
            .filter(|s| s.is_timed_out(timeout))
            .map(|s| s.id)
            .collect();

        timed_out
            .into_iter()
            .filter_map(|id| self.subscribers.remove(&id))
            .map(|s| {
                info!("Subscriber {} on {} timed out", s.id, s.topic);
                (s.id, s.topic)
            })
            .collect()
    }

    pub fn topic_count(&self) -> usize {
        let mut topics: Vec<&str> = self.subscribers.values().map(|s| s.topic.as_str()).collect();
        topics.sort_unstable();
        topics.dedup();
        topics.len()
    }

    /// Returns the number of live subscriptions
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
