//! # Topic Relay
//!
//! A small UDP pub/sub relay that lets the two peers of a snake match reach
//! each other without either one accepting inbound connections. The relay is
//! deliberately dumb: it knows topics and addresses, never game rules. Every
//! payload it forwards is opaque bytes.
//!
//! ## Protocol
//!
//! Peers speak `shared::Packet` encoded with bincode:
//! - `Subscribe { client_version, topic }` joins a topic and is answered with
//!   `Subscribed { topic, peers }` or `Rejected { reason }`
//! - `Publish { topic, event, payload }` is forwarded to every *other*
//!   subscriber of the topic as `Deliver { topic, event, payload }`
//! - `Unsubscribe { topic }` leaves a topic
//! - `Heartbeat` keeps all of a peer's subscriptions alive
//!
//! A topic holds at most two subscribers. Subscribers that stay silent for
//! longer than the idle timeout (5 s by default) are dropped.
//!
//! ## Module Organization
//!
//! ### Topic Manager (`topic_manager`)
//! Subscription table with per-topic and global capacity limits and
//! timeout detection.
//!
//! ### Network (`network`)
//! The relay server itself. Internal async tasks handle:
//! - **Network Receiver**: listens for incoming packets
//! - **Network Sender**: drains the outgoing queue and fans out deliveries
//! - **Timeout Checker**: evicts silent subscribers
//! - **Routing Loop**: applies packets to the subscription table in order
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use relay::network::{RelaySettings, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new("127.0.0.1:8080", RelaySettings::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod network;
pub mod topic_manager;
