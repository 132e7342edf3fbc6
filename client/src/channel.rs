//! Topic-based pub/sub transport seam.
//!
//! A [`Channel`] carries opaque `(event, payload)` messages between the two
//! peers of a match. Implementations must not echo a publisher's own
//! messages back to it. `LocalBus` is an in-process implementation used by
//! tests and single-machine setups; `network::UdpChannel` talks to a relay.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use log::debug;
use thiserror::Error;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Connected,
    Message { event: String, payload: Vec<u8> },
    Disconnected { reason: String },
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel closed")]
    Closed,
    #[error("not subscribed to `{0}`")]
    NotSubscribed(String),
    #[error("invalid relay address `{0}`")]
    InvalidAddress(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encoding error: {0}")]
    Encode(#[from] bincode::Error),
}

pub trait Channel {
    /// Joins `topic`. The returned receiver yields `Connected` once the
    /// subscription is live, then inbound messages.
    fn subscribe(&mut self, topic: &str) -> Result<UnboundedReceiver<ChannelEvent>, ChannelError>;

    /// Sends to every other subscriber of `topic`. Best effort.
    fn publish(&self, topic: &str, event: &str, payload: Vec<u8>) -> Result<(), ChannelError>;

    fn unsubscribe(&mut self, topic: &str);
}

type EndpointId = u64;

#[derive(Default)]
struct BusInner {
    next_endpoint: EndpointId,
    topics: HashMap<String, Vec<(EndpointId, UnboundedSender<ChannelEvent>)>>,
}

/// In-process broadcast bus shared by any number of endpoints.
#[derive(Clone, Default)]
pub struct LocalBus {
    inner: Arc<Mutex<BusInner>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn endpoint(&self) -> LocalChannel {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let id = inner.next_endpoint;
        inner.next_endpoint += 1;

        LocalChannel {
            bus: self.clone(),
            id,
            topics: HashSet::new(),
        }
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.topics.get(topic).map_or(0, Vec::len)
    }
}

pub struct LocalChannel {
    bus: LocalBus,
    id: EndpointId,
    topics: HashSet<String>,
}

impl Channel for LocalChannel {
    fn subscribe(&mut self, topic: &str) -> Result<UnboundedReceiver<ChannelEvent>, ChannelError> {
        let (tx, rx) = unbounded_channel();
        tx.send(ChannelEvent::Connected)
            .map_err(|_| ChannelError::Closed)?;

        let mut inner = self.bus.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let subscribers = inner.topics.entry(topic.to_string()).or_default();
        subscribers.retain(|(id, _)| *id != self.id);
        subscribers.push((self.id, tx));
        self.topics.insert(topic.to_string());

        debug!("Endpoint {} subscribed to {}", self.id, topic);
        Ok(rx)
    }

    fn publish(&self, topic: &str, event: &str, payload: Vec<u8>) -> Result<(), ChannelError> {
        if !self.topics.contains(topic) {
            return Err(ChannelError::NotSubscribed(topic.to_string()));
        }

        let inner = self.bus.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(subscribers) = inner.topics.get(topic) {
            for (_, tx) in subscribers.iter().filter(|(id, _)| *id != self.id) {
                // A dropped receiver just means that peer stopped listening.
                let _ = tx.send(ChannelEvent::Message {
                    event: event.to_string(),
                    payload: payload.clone(),
                });
            }
        }
        Ok(())
    }

    fn unsubscribe(&mut self, topic: &str) {
        if !self.topics.remove(topic) {
            return;
        }

        let mut inner = self.bus.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(subscribers) = inner.topics.get_mut(topic) {
            subscribers.retain(|(id, _)| *id != self.id);
            if subscribers.is_empty() {
                inner.topics.remove(topic);
            }
        }
        debug!("Endpoint {} unsubscribed from {}", self.id, topic);
    }
}

impl Drop for LocalChannel {
    fn drop(&mut self) {
        let topics: Vec<String> = self.topics.iter().cloned().collect();
        for topic in topics {
            self.unsubscribe(&topic);
        }
    }
}
