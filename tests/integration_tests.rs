//! Integration tests for peer-synced matches
//!
//! These tests validate two controllers talking to each other, both over the
//! in-process bus and over a real UDP relay.

use bincode::{deserialize, serialize};
use client::channel::{Channel, ChannelEvent, LocalBus};
use client::config::MatchConfig;
use client::controller::{MatchController, MatchEvent};
use client::game::Phase;
use client::network::UdpChannel;
use client::store::{MatchId, MatchStatus, MatchStore, MemoryMatchStore};
use relay::network::{RelayMessage, RelaySettings, Server};
use shared::{Direction, GameEvent, Packet, PlayerId, Role};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

async fn spawn_relay() -> (SocketAddr, mpsc::UnboundedSender<RelayMessage>) {
    let mut server = Server::new("127.0.0.1:0", RelaySettings::default())
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let shutdown = server.shutdown_sender();
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    (addr, shutdown)
}

/// PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// Event payloads travel inside relay packets untouched
    #[test]
    fn event_payload_survives_packet_encoding() {
        let event = GameEvent::DirectionChange {
            player_id: PlayerId::from("p1"),
            direction: Direction::Up,
        };
        let payload = serialize(&event).unwrap();
        let packet = Packet::Publish {
            topic: "ROOM01".to_string(),
            event: event.name().to_string(),
            payload,
        };

        let decoded: Packet = deserialize(&serialize(&packet).unwrap()).unwrap();
        match decoded {
            Packet::Publish {
                topic,
                event: name,
                payload,
            } => {
                assert_eq!(topic, "ROOM01");
                assert_eq!(name, "direction-change");
                let inner: GameEvent = deserialize(&payload).unwrap();
                assert_eq!(inner, event);
            }
            _ => panic!("Wrong packet type"),
        }
    }

    /// Two subscribers exchange messages through a real relay; a third is refused
    #[tokio::test]
    async fn relay_round_trip() {
        let (relay_addr, shutdown) = spawn_relay().await;
        let relay_addr = relay_addr.to_string();

        let mut a = UdpChannel::connect(&relay_addr, 0).await.unwrap();
        let mut b = UdpChannel::connect(&relay_addr, 0).await.unwrap();
        let mut a_events = a.subscribe("ROOM01").unwrap();
        let mut b_events = b.subscribe("ROOM01").unwrap();

        let wait = Duration::from_secs(2);
        assert_eq!(
            timeout(wait, a_events.recv()).await.unwrap(),
            Some(ChannelEvent::Connected)
        );
        assert_eq!(
            timeout(wait, b_events.recv()).await.unwrap(),
            Some(ChannelEvent::Connected)
        );

        a.publish("ROOM01", "hello", vec![1, 2, 3]).unwrap();
        assert_eq!(
            timeout(wait, b_events.recv()).await.unwrap(),
            Some(ChannelEvent::Message {
                event: "hello".to_string(),
                payload: vec![1, 2, 3],
            })
        );
        assert!(timeout(Duration::from_millis(200), a_events.recv())
            .await
            .is_err());

        let mut c = UdpChannel::connect(&relay_addr, 0).await.unwrap();
        let mut c_events = c.subscribe("ROOM01").unwrap();
        assert_eq!(
            timeout(wait, c_events.recv()).await.unwrap(),
            Some(ChannelEvent::Disconnected {
                reason: "Topic full".to_string(),
            })
        );

        shutdown.send(RelayMessage::Shutdown).unwrap();
    }
}

/// MATCH TESTS
mod match_tests {
    use super::*;

    fn config() -> MatchConfig {
        MatchConfig {
            seed: Some(42),
            ..MatchConfig::default()
        }
    }

    /// Guest turns up into the top wall on tick 16, two ticks before the host
    /// would reach the right wall. Both peers agree the host won and the host
    /// records it.
    #[tokio::test(start_paused = true)]
    async fn guest_hits_wall_host_wins() {
        let bus = LocalBus::new();
        let store = MemoryMatchStore::new();
        let record = store.create_match("ROOM01", PlayerId::from("host")).unwrap();

        let mut host = MatchController::new(config(), store);
        let mut guest = MatchController::new(config(), MemoryMatchStore::new());

        let guest_events = Arc::new(Mutex::new(Vec::new()));
        let sink = guest_events.clone();
        guest.on_state_change(move |event| sink.lock().unwrap().push(event.clone()));

        let (_host_tx, host_rx) = mpsc::unbounded_channel();
        let (guest_tx, guest_rx) = mpsc::unbounded_channel();

        let host_endpoint = bus.endpoint();
        let guest_endpoint = bus.endpoint();
        let match_id = record.id.clone();

        let (host_state, guest_state, _) = tokio::join!(
            async {
                host.start(
                    match_id,
                    "ROOM01",
                    PlayerId::from("host"),
                    Role::Host,
                    host_endpoint,
                )
                .await
                .unwrap();
                host.run(host_rx).await.unwrap()
            },
            async {
                guest
                    .start(
                        MatchId::generate(),
                        "ROOM01",
                        PlayerId::from("guest"),
                        Role::Guest,
                        guest_endpoint,
                    )
                    .await
                    .unwrap();
                guest.run(guest_rx).await.unwrap()
            },
            async {
                // Countdown ends at 3s; ticks land every 150ms after that.
                sleep(Duration::from_millis(3200)).await;
                guest_tx.send(Direction::Up).unwrap();
            }
        );

        assert_eq!(guest_state.phase, Phase::Ended);
        assert_eq!(guest_state.winner, Some(Role::Host));
        assert_eq!(guest_state.tick, 15);
        assert_eq!(guest_state.host.player_id, Some(PlayerId::from("host")));

        assert_eq!(host_state.phase, Phase::Ended);
        assert_eq!(host_state.winner, Some(Role::Host));
        assert_eq!(host_state.guest.player_id, Some(PlayerId::from("guest")));

        let record = host.store().get(&record.id).unwrap();
        assert_eq!(record.status, MatchStatus::Finished);
        assert_eq!(record.winner_id, Some(PlayerId::from("host")));

        let ended: Vec<MatchEvent> = guest_events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, MatchEvent::Ended { .. }))
            .cloned()
            .collect();
        assert_eq!(
            ended,
            vec![MatchEvent::Ended {
                winner: Some(Role::Host),
                winner_id: Some(PlayerId::from("host")),
            }]
        );
        assert_eq!(bus.subscriber_count("ROOM01"), 0);
    }

    /// Peers identify each other over a real relay before the first tick
    #[tokio::test]
    async fn peers_identify_over_relay() {
        let (relay_addr, shutdown) = spawn_relay().await;
        let relay_addr = relay_addr.to_string();

        let config = MatchConfig {
            countdown_step: Duration::from_millis(50),
            tick_period: Duration::from_secs(5),
            ..config()
        };
        let store = MemoryMatchStore::new();
        let record = store.create_match("ROOM02", PlayerId::from("host")).unwrap();
        let mut host = MatchController::new(config.clone(), store);
        let mut guest = MatchController::new(config, MemoryMatchStore::new());
        let host_stop = host.stop_handle();
        let guest_stop = guest.stop_handle();

        let host_channel = UdpChannel::connect(&relay_addr, 0).await.unwrap();
        let guest_channel = UdpChannel::connect(&relay_addr, 0).await.unwrap();
        let (_host_tx, host_rx) = mpsc::unbounded_channel();
        let (_guest_tx, guest_rx) = mpsc::unbounded_channel();

        let (host_state, guest_state, _) = tokio::join!(
            async {
                host.start(
                    record.id.clone(),
                    "ROOM02",
                    PlayerId::from("host"),
                    Role::Host,
                    host_channel,
                )
                .await
                .unwrap();
                host.run(host_rx).await.unwrap()
            },
            async {
                guest
                    .start(
                        MatchId::generate(),
                        "ROOM02",
                        PlayerId::from("guest"),
                        Role::Guest,
                        guest_channel,
                    )
                    .await
                    .unwrap();
                guest.run(guest_rx).await.unwrap()
            },
            async {
                sleep(Duration::from_millis(600)).await;
                host_stop.stop();
                guest_stop.stop();
            }
        );

        assert_eq!(host_state.phase, Phase::Running);
        assert_eq!(guest_state.phase, Phase::Running);
        assert_eq!(host_state.guest.player_id, Some(PlayerId::from("guest")));
        assert_eq!(guest_state.host.player_id, Some(PlayerId::from("host")));

        let record = host.store().get(&record.id).unwrap();
        assert_eq!(record.status, MatchStatus::Waiting);

        shutdown.send(RelayMessage::Shutdown).unwrap();
    }
}
