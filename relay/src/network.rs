//! Relay network layer: UDP I/O tasks around a single routing loop

use crate::topic_manager::TopicManager;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Messages sent from network tasks to the routing loop
#[derive(Debug)]
pub enum RelayMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    SubscriberTimeout { id: u32, topic: String },
    Shutdown,
}

/// Messages sent from the routing loop to the sender task
#[derive(Debug)]
pub enum OutboundMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    /// Sends `packet` to every subscriber of `topic` except `exclude`.
    BroadcastTopic {
        packet: Packet,
        topic: String,
        exclude: SocketAddr,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelaySettings {
    pub max_per_topic: usize,
    pub max_topics: usize,
    pub idle_timeout: Duration,
    pub sweep_interval: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            max_per_topic: 2,
            max_topics: 64,
            idle_timeout: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(1),
        }
    }
}

/// Topic relay: forwards each publish to the other subscribers of its topic
pub struct Server {
    socket: Arc<UdpSocket>,
    topics: Arc<RwLock<TopicManager>>,
    settings: RelaySettings,

    relay_tx: mpsc::UnboundedSender<RelayMessage>,
    relay_rx: mpsc::UnboundedReceiver<RelayMessage>,
    outbound_tx: mpsc::UnboundedSender<OutboundMessage>,
    outbound_rx: Option<mpsc::UnboundedReceiver<OutboundMessage>>,
}

impl Server {
    pub async fn new(addr: &str, settings: RelaySettings) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Relay listening on {}", socket.local_addr()?);

        let (relay_tx, relay_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            topics: Arc::new(RwLock::new(TopicManager::new(
                settings.max_per_topic,
                settings.max_topics,
                settings.idle_timeout,
            ))),
            settings,
            relay_tx,
            relay_rx,
            outbound_tx,
            outbound_rx: Some(outbound_rx),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Handle that makes `run` return when sent `RelayMessage::Shutdown`.
    pub fn shutdown_sender(&self) -> mpsc::UnboundedSender<RelayMessage> {
        self.relay_tx.clone()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let relay_tx = self.relay_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 65_536];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) = relay_tx.send(RelayMessage::PacketReceived { packet, addr }) {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes the outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let Some(mut outbound_rx) = self.outbound_rx.take() else {
            return;
        };
        let socket = Arc::clone(&self.socket);
        let topics = Arc::clone(&self.topics);

        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                match message {
                    OutboundMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    OutboundMessage::BroadcastTopic {
                        packet,
                        topic,
                        exclude,
                    } => {
                        let peers = {
                            let topics_guard = topics.read().await;
                            topics_guard.peers_of(&topic, exclude)
                        };

                        for addr in peers {
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to relay to {} on {}: {}", addr, topic, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that evicts silent subscribers
    fn spawn_timeout_checker(&self) {
        let topics = Arc::clone(&self.topics);
        let relay_tx = self.relay_tx.clone();
        let sweep_interval = self.settings.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = interval(sweep_interval);

            loop {
                ticker.tick().await;

                let timed_out = {
                    let mut topics_guard = topics.write().await;
                    topics_guard.check_timeouts()
                };

                for (id, topic) in timed_out {
                    if let Err(e) = relay_tx.send(RelayMessage::SubscriberTimeout { id, topic }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self
            .outbound_tx
            .send(OutboundMessage::SendPacket { packet, addr })
        {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn reject(&self, reason: &str, addr: SocketAddr) {
        self.send_packet(
            Packet::Rejected {
                reason: reason.to_string(),
            },
            addr,
        );
    }

    /// Applies one inbound packet to the subscription table and queues replies
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Subscribe {
                client_version,
                topic,
            } => {
                if client_version != PROTOCOL_VERSION {
                    warn!(
                        "Rejecting {} with protocol version {} (expected {})",
                        addr, client_version, PROTOCOL_VERSION
                    );
                    self.reject("Unsupported client version", addr);
                    return;
                }

                let (result, peers) = {
                    let mut topics = self.topics.write().await;
                    let result = topics.subscribe(addr, &topic);
                    (result, topics.topic_size(&topic))
                };

                match result {
                    Ok(id) => {
                        debug!("Subscriber {} confirmed on {} ({} peers)", id, topic, peers);
                        self.send_packet(
                            Packet::Subscribed {
                                topic,
                                peers: peers as u32,
                            },
                            addr,
                        );
                    }
                    Err(refusal) => {
                        info!("Refusing {} on {}: {}", addr, topic, refusal.reason());
                        self.reject(refusal.reason(), addr);
                    }
                }
            }

            Packet::Publish {
                topic,
                event,
                payload,
            } => {
                let subscribed = {
                    let mut topics = self.topics.write().await;
                    topics.refresh(addr);
                    topics.find(addr, &topic).is_some()
                };

                if !subscribed {
                    debug!("Ignoring publish on {} from non-subscriber {}", topic, addr);
                    return;
                }

                let packet = Packet::Deliver {
                    topic: topic.clone(),
                    event,
                    payload,
                };
                if let Err(e) = self.outbound_tx.send(OutboundMessage::BroadcastTopic {
                    packet,
                    topic,
                    exclude: addr,
                }) {
                    error!("Failed to queue broadcast packet: {}", e);
                }
            }

            Packet::Unsubscribe { topic } => {
                let mut topics = self.topics.write().await;
                topics.unsubscribe(addr, &topic);
            }

            Packet::Heartbeat => {
                let mut topics = self.topics.write().await;
                if topics.refresh(addr) == 0 {
                    debug!("Heartbeat from unknown address {}", addr);
                }
            }

            _ => {
                warn!("Unexpected packet type from {}", addr);
            }
        }
    }

    /// Main relay loop
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        info!("Relay started successfully");

        while let Some(message) = self.relay_rx.recv().await {
            match message {
                RelayMessage::PacketReceived { packet, addr } => {
                    self.handle_packet(packet, addr).await;
                }
                RelayMessage::SubscriberTimeout { id, topic } => {
                    debug!("Subscriber {} dropped from {}", id, topic);
                }
                RelayMessage::Shutdown => {
                    info!("Relay shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}
