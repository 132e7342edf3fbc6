//! # Snake Duel Peer
//!
//! Everything one player's instance needs to run a two-player snake match
//! against a remote peer. There is no game server: both peers simulate the
//! match locally on a fixed tick and exchange only decisions over a
//! topic-based pub/sub channel.
//!
//! ## Architecture Overview
//!
//! ### Shared Ruleset, Local Judgement
//! Both peers run the same pure rules from the `shared` crate. Each peer is
//! authoritative only for its own snake: it alone decides whether that snake
//! died and announces the result. The host is additionally the only one who
//! places food and records the final result.
//!
//! ### Absolute-State Events
//! Every message carries absolute state (a direction, a food position, a
//! winner), so duplicated or reordered deliveries converge without sequence
//! numbers or acknowledgements.
//!
//! ### Single-Task Match Loop
//! The clock, channel deliveries and local input are multiplexed in one
//! `tokio::select!` loop, so the game state never needs a lock. Network I/O
//! lives in helper tasks that talk to the loop over `mpsc` channels.
//!
//! ## Module Organization
//!
//! - `input`: buffered direction changes, one applied per tick
//! - `clock`: countdown then fixed-period tick source
//! - `game`: per-peer game state with tick and remote-event entry points
//! - `sync`: event encoding, validation and publishing
//! - `channel`: the pub/sub seam and an in-process bus
//! - `network`: UDP channel talking to the `relay` server
//! - `store`: match records and an in-memory store
//! - `controller`: wires everything together for one match
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::channel::LocalBus;
//! use client::config::MatchConfig;
//! use client::controller::MatchController;
//! use client::store::{MatchStore, MemoryMatchStore};
//! use shared::{PlayerId, Role};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bus = LocalBus::new();
//!     let store = MemoryMatchStore::new();
//!     let record = store.create_match("ABC123", PlayerId::from("alice"))?;
//!
//!     let mut host = MatchController::new(MatchConfig::default(), store);
//!     host.on_state_change(|event| println!("{:?}", event));
//!     host.start(record.id, "ABC123", PlayerId::from("alice"), Role::Host, bus.endpoint())
//!         .await?;
//!
//!     let (_inputs, rx) = tokio::sync::mpsc::unbounded_channel();
//!     let final_state = host.run(rx).await?;
//!     println!("winner: {:?}", final_state.winner);
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod clock;
pub mod config;
pub mod controller;
pub mod game;
pub mod input;
pub mod network;
pub mod store;
pub mod sync;
