//! UDP transport to a topic relay

use crate::channel::{Channel, ChannelError, ChannelEvent};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, PROTOCOL_VERSION};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, sleep_until, Instant};

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

struct Route {
    tx: mpsc::UnboundedSender<ChannelEvent>,
    confirmed: bool,
}

type Routes = Arc<Mutex<HashMap<String, Route>>>;

/// [`Channel`] backed by a relay server.
///
/// Three background tasks share the socket: a receiver that routes relay
/// packets to topic subscribers, a sender draining the outbound queue, and a
/// heartbeat that keeps the relay registration alive and retries
/// unconfirmed subscriptions.
pub struct UdpChannel {
    outbound: mpsc::UnboundedSender<Packet>,
    routes: Routes,
    tasks: Vec<JoinHandle<()>>,
}

impl UdpChannel {
    /// Binds an ephemeral local socket and starts the network tasks.
    /// `fake_ping_ms` delays every outbound packet by half its value.
    pub async fn connect(relay: &str, fake_ping_ms: u64) -> Result<Self, ChannelError> {
        let relay_addr: SocketAddr = relay
            .parse()
            .map_err(|_| ChannelError::InvalidAddress(relay.to_string()))?;
        let socket = Arc::new(UdpSocket::bind("0.0.0.0:0").await?);
        info!(
            "Relay channel bound to {} for {}",
            socket.local_addr()?,
            relay_addr
        );

        let routes: Routes = Arc::new(Mutex::new(HashMap::new()));
        let (outbound, outbound_rx) = mpsc::unbounded_channel();

        let tasks = vec![
            spawn_receiver(Arc::clone(&socket), relay_addr, Arc::clone(&routes)),
            spawn_sender(socket, relay_addr, outbound_rx, fake_ping_ms),
            spawn_heartbeat(outbound.clone(), Arc::clone(&routes)),
        ];

        Ok(UdpChannel {
            outbound,
            routes,
            tasks,
        })
    }

    fn queue(&self, packet: Packet) -> Result<(), ChannelError> {
        self.outbound.send(packet).map_err(|_| ChannelError::Closed)
    }
}

impl Channel for UdpChannel {
    fn subscribe(&mut self, topic: &str) -> Result<mpsc::UnboundedReceiver<ChannelEvent>, ChannelError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                topic.to_string(),
                Route {
                    tx,
                    confirmed: false,
                },
            );

        self.queue(Packet::Subscribe {
            client_version: PROTOCOL_VERSION,
            topic: topic.to_string(),
        })?;
        Ok(rx)
    }

    fn publish(&self, topic: &str, event: &str, payload: Vec<u8>) -> Result<(), ChannelError> {
        let subscribed = self
            .routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(topic);
        if !subscribed {
            return Err(ChannelError::NotSubscribed(topic.to_string()));
        }

        self.queue(Packet::Publish {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
        })
    }

    fn unsubscribe(&mut self, topic: &str) {
        let removed = self
            .routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(topic)
            .is_some();

        if removed {
            if let Err(e) = self.queue(Packet::Unsubscribe {
                topic: topic.to_string(),
            }) {
                warn!("Failed to queue unsubscribe for {}: {}", topic, e);
            }
        }
    }
}

impl Drop for UdpChannel {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

fn spawn_receiver(socket: Arc<UdpSocket>, relay_addr: SocketAddr, routes: Routes) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buffer = [0u8; 65_536];

        loop {
            match socket.recv_from(&mut buffer).await {
                Ok((len, addr)) => {
                    if addr != relay_addr {
                        debug!("Ignoring datagram from {}", addr);
                        continue;
                    }
                    match deserialize::<Packet>(&buffer[0..len]) {
                        Ok(packet) => route_packet(&routes, packet),
                        Err(e) => warn!("Failed to deserialize packet from relay: {}", e),
                    }
                }
                Err(e) => {
                    error!("Error receiving packet: {}", e);
                    sleep(Duration::from_millis(10)).await;
                }
            }
        }
    })
}

fn spawn_sender(
    socket: Arc<UdpSocket>,
    relay_addr: SocketAddr,
    mut outbound_rx: mpsc::UnboundedReceiver<Packet>,
    fake_ping_ms: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let delay = Duration::from_millis(fake_ping_ms / 2);
        // Packets are stamped when queued so the simulated latency stays
        // constant no matter how many are in flight.
        let (due_tx, mut due_rx) = mpsc::unbounded_channel::<(Instant, Vec<u8>)>();
        let writer = tokio::spawn(async move {
            while let Some((due, data)) = due_rx.recv().await {
                sleep_until(due).await;
                if let Err(e) = socket.send_to(&data, relay_addr).await {
                    error!("Failed to send packet to relay: {}", e);
                }
            }
        });

        while let Some(packet) = outbound_rx.recv().await {
            let data = match serialize(&packet) {
                Ok(data) => data,
                Err(e) => {
                    error!("Failed to serialize packet: {}", e);
                    continue;
                }
            };
            if due_tx.send((Instant::now() + delay, data)).is_err() {
                break;
            }
        }

        drop(due_tx);
        let _ = writer.await;
    })
}

fn spawn_heartbeat(outbound: mpsc::UnboundedSender<Packet>, routes: Routes) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + HEARTBEAT_INTERVAL, HEARTBEAT_INTERVAL);

        loop {
            ticker.tick().await;

            let unconfirmed: Vec<String> = routes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .filter(|(_, route)| !route.confirmed)
                .map(|(topic, _)| topic.clone())
                .collect();

            let mut packets: Vec<Packet> = unconfirmed
                .into_iter()
                .map(|topic| Packet::Subscribe {
                    client_version: PROTOCOL_VERSION,
                    topic,
                })
                .collect();
            packets.push(Packet::Heartbeat);

            for packet in packets {
                if outbound.send(packet).is_err() {
                    return;
                }
            }
        }
    })
}

fn route_packet(routes: &Mutex<HashMap<String, Route>>, packet: Packet) {
    let mut routes = routes.lock().unwrap_or_else(PoisonError::into_inner);

    match packet {
        Packet::Subscribed { topic, peers } => {
            if let Some(route) = routes.get_mut(&topic) {
                debug!("Subscribed to {} ({} peers)", topic, peers);
                if !route.confirmed {
                    route.confirmed = true;
                    let _ = route.tx.send(ChannelEvent::Connected);
                }
            }
        }
        Packet::Deliver {
            topic,
            event,
            payload,
        } => match routes.get(&topic) {
            Some(route) => {
                let _ = route.tx.send(ChannelEvent::Message { event, payload });
            }
            None => debug!("Dropping `{}` for unsubscribed topic {}", event, topic),
        },
        Packet::Rejected { reason } => {
            warn!("Relay rejected us: {}", reason);
            for (_, route) in routes.drain() {
                let _ = route.tx.send(ChannelEvent::Disconnected {
                    reason: reason.clone(),
                });
            }
        }
        other => warn!("Unexpected packet from relay: {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fake_relay() -> (UdpSocket, String) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap().to_string();
        (socket, addr)
    }

    async fn recv_packet(socket: &UdpSocket) -> (Packet, SocketAddr) {
        let mut buffer = [0u8; 2048];
        let (len, addr) = socket.recv_from(&mut buffer).await.unwrap();
        (deserialize(&buffer[..len]).unwrap(), addr)
    }

    async fn send_packet(socket: &UdpSocket, packet: &Packet, addr: SocketAddr) {
        socket.send_to(&serialize(packet).unwrap(), addr).await.unwrap();
    }

    /// Reads until a non-heartbeat packet arrives.
    async fn recv_non_heartbeat(socket: &UdpSocket) -> (Packet, SocketAddr) {
        loop {
            let (packet, addr) = recv_packet(socket).await;
            if packet != Packet::Heartbeat {
                return (packet, addr);
            }
        }
    }

    #[tokio::test]
    async fn test_invalid_address() {
        match UdpChannel::connect("not-an-address", 0).await {
            Err(ChannelError::InvalidAddress(addr)) => assert_eq!(addr, "not-an-address"),
            Err(e) => panic!("Unexpected error: {}", e),
            Ok(_) => panic!("Expected an error"),
        }
    }

    #[tokio::test]
    async fn test_subscribe_confirm_and_deliver() {
        let (relay, relay_addr) = fake_relay().await;
        let mut channel = UdpChannel::connect(&relay_addr, 0).await.unwrap();
        let mut events = channel.subscribe("ROOM01").unwrap();

        let (packet, client_addr) = recv_non_heartbeat(&relay).await;
        match packet {
            Packet::Subscribe {
                client_version,
                topic,
            } => {
                assert_eq!(client_version, PROTOCOL_VERSION);
                assert_eq!(topic, "ROOM01");
            }
            _ => panic!("Wrong packet type"),
        }

        let confirm = Packet::Subscribed {
            topic: "ROOM01".to_string(),
            peers: 1,
        };
        send_packet(&relay, &confirm, client_addr).await;
        send_packet(&relay, &confirm, client_addr).await;
        assert_eq!(events.recv().await, Some(ChannelEvent::Connected));

        send_packet(
            &relay,
            &Packet::Deliver {
                topic: "ROOM01".to_string(),
                event: "hello".to_string(),
                payload: vec![1, 2, 3],
            },
            client_addr,
        )
        .await;
        assert_eq!(
            events.recv().await,
            Some(ChannelEvent::Message {
                event: "hello".to_string(),
                payload: vec![1, 2, 3],
            })
        );
    }

    #[tokio::test]
    async fn test_publish_goes_to_relay() {
        let (relay, relay_addr) = fake_relay().await;
        let mut channel = UdpChannel::connect(&relay_addr, 0).await.unwrap();
        let _events = channel.subscribe("ROOM01").unwrap();
        recv_non_heartbeat(&relay).await;

        channel.publish("ROOM01", "game-over", vec![9]).unwrap();
        let (packet, _) = recv_non_heartbeat(&relay).await;
        assert_eq!(
            packet,
            Packet::Publish {
                topic: "ROOM01".to_string(),
                event: "game-over".to_string(),
                payload: vec![9],
            }
        );

        assert!(matches!(
            channel.publish("OTHER", "game-over", vec![]),
            Err(ChannelError::NotSubscribed(_))
        ));
    }

    #[tokio::test]
    async fn test_rejection_disconnects_routes() {
        let (relay, relay_addr) = fake_relay().await;
        let mut channel = UdpChannel::connect(&relay_addr, 0).await.unwrap();
        let mut events = channel.subscribe("ROOM01").unwrap();
        let (_, client_addr) = recv_non_heartbeat(&relay).await;

        send_packet(
            &relay,
            &Packet::Rejected {
                reason: "Topic full".to_string(),
            },
            client_addr,
        )
        .await;

        assert_eq!(
            events.recv().await,
            Some(ChannelEvent::Disconnected {
                reason: "Topic full".to_string(),
            })
        );
        assert!(channel.publish("ROOM01", "hello", vec![]).is_err());
    }

    #[tokio::test]
    async fn test_unsubscribe_notifies_relay() {
        let (relay, relay_addr) = fake_relay().await;
        let mut channel = UdpChannel::connect(&relay_addr, 0).await.unwrap();
        let _events = channel.subscribe("ROOM01").unwrap();
        recv_non_heartbeat(&relay).await;

        channel.unsubscribe("ROOM01");
        let (packet, _) = recv_non_heartbeat(&relay).await;
        assert_eq!(
            packet,
            Packet::Unsubscribe {
                topic: "ROOM01".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_fake_ping_delay_does_not_accumulate() {
        let (relay, relay_addr) = fake_relay().await;
        let mut channel = UdpChannel::connect(&relay_addr, 400).await.unwrap();
        let started = Instant::now();
        let _events = channel.subscribe("ROOM01").unwrap();
        for i in 0..4 {
            channel.publish("ROOM01", "direction-change", vec![i]).unwrap();
        }

        let mut payloads = Vec::new();
        while payloads.len() < 4 {
            if let (Packet::Publish { payload, .. }, _) = recv_non_heartbeat(&relay).await {
                payloads.extend(payload);
            }
        }

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed.as_millis() < 600);
        assert_eq!(payloads, vec![0, 1, 2, 3]);
    }
}
