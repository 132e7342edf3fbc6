//! Translation between local decisions and channel messages.
//!
//! Outbound, every decision becomes a `(event name, bincode payload)` pair
//! published on the match topic. Inbound, payloads are decoded, checked
//! against what this peer is allowed to accept, and applied to the local
//! mirror. There is no sequencing or acknowledgement: every event carries
//! absolute state, so duplicates and reordering settle on last-write-wins.

use bincode::{deserialize, serialize};
use log::{debug, error};
use shared::{Coordinate, Direction, GameEvent, PlayerId, Role};
use thiserror::Error;

use crate::channel::Channel;
use crate::game::{GameState, RemoteChange};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("malformed `{event}` payload: {source}")]
    Decode {
        event: String,
        #[source]
        source: bincode::Error,
    },
    #[error("failed to encode `{event}`: {source}")]
    Encode {
        event: &'static str,
        #[source]
        source: bincode::Error,
    },
    #[error("unknown event `{0}`")]
    UnknownEvent(String),
    #[error("event named `{name}` carried a `{actual}` payload")]
    NameMismatch { name: String, actual: &'static str },
    #[error("rejected `{event}`: {reason}")]
    Rejected {
        event: &'static str,
        reason: &'static str,
    },
}

/// Per-match sync endpoint bound to one topic and one local identity.
#[derive(Debug, Clone)]
pub struct SyncProtocol {
    topic: String,
    local_id: PlayerId,
    role: Role,
    grid_size: i32,
}

impl SyncProtocol {
    pub fn new(topic: impl Into<String>, local_id: PlayerId, role: Role, grid_size: i32) -> Self {
        Self {
            topic: topic.into(),
            local_id,
            role,
            grid_size,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// True iff this peer hosts the match and so owns food and persistence.
    pub fn is_authoritative(&self) -> bool {
        self.role == Role::Host
    }

    pub fn encode(event: &GameEvent) -> Result<(&'static str, Vec<u8>), SyncError> {
        let name = event.name();
        let payload = serialize(event).map_err(|source| SyncError::Encode {
            event: name,
            source,
        })?;
        Ok((name, payload))
    }

    pub fn decode(name: &str, payload: &[u8]) -> Result<GameEvent, SyncError> {
        let known = [
            GameEvent::HELLO,
            GameEvent::DIRECTION_CHANGE,
            GameEvent::FOOD_PLACED,
            GameEvent::GAME_OVER,
        ];
        if !known.contains(&name) {
            return Err(SyncError::UnknownEvent(name.to_string()));
        }

        let event: GameEvent = deserialize(payload).map_err(|source| SyncError::Decode {
            event: name.to_string(),
            source,
        })?;

        if event.name() != name {
            return Err(SyncError::NameMismatch {
                name: name.to_string(),
                actual: event.name(),
            });
        }
        Ok(event)
    }

    /// Publishes `event` on the match topic. Delivery is fire-and-forget;
    /// failures are logged and reported but never retried.
    pub fn publish<C: Channel + ?Sized>(&self, channel: &C, event: &GameEvent) -> bool {
        let (name, payload) = match Self::encode(event) {
            Ok(encoded) => encoded,
            Err(e) => {
                error!("{}", e);
                return false;
            }
        };

        match channel.publish(&self.topic, name, payload) {
            Ok(()) => {
                debug!("Published `{}` on {}", name, self.topic);
                true
            }
            Err(e) => {
                error!("Failed to publish `{}` on {}: {}", name, self.topic, e);
                false
            }
        }
    }

    pub fn announce<C: Channel + ?Sized>(&self, channel: &C) -> bool {
        self.publish(
            channel,
            &GameEvent::Hello {
                player_id: self.local_id.clone(),
                role: self.role,
            },
        )
    }

    pub fn publish_direction<C: Channel + ?Sized>(&self, channel: &C, direction: Direction) -> bool {
        self.publish(
            channel,
            &GameEvent::DirectionChange {
                player_id: self.local_id.clone(),
                direction,
            },
        )
    }

    /// Only the host places food; a guest calling this is a logic error and
    /// nothing is sent.
    pub fn publish_food<C: Channel + ?Sized>(&self, channel: &C, coordinate: Coordinate) -> bool {
        if !self.is_authoritative() {
            error!("Guest attempted to publish food at {}", coordinate);
            return false;
        }
        self.publish(channel, &GameEvent::FoodPlaced { coordinate })
    }

    pub fn publish_game_over<C: Channel + ?Sized>(&self, channel: &C, winner: Option<Role>) -> bool {
        self.publish(channel, &GameEvent::GameOver { winner })
    }

    /// Checks an inbound event against what this peer may accept from the other side.
    pub fn validate(&self, state: &GameState, event: &GameEvent) -> Result<(), SyncError> {
        let reject = |reason| {
            Err(SyncError::Rejected {
                event: event.name(),
                reason,
            })
        };

        match event {
            GameEvent::Hello { player_id, role } => {
                if *role == self.role {
                    return reject("peer claims our role");
                }
                if *player_id == self.local_id {
                    return reject("peer claims our player id");
                }
            }
            GameEvent::DirectionChange { player_id, .. } => {
                if *player_id == self.local_id {
                    return reject("echo of our own direction");
                }
                if let Some(known) = &state.slot(self.role.opponent()).player_id {
                    if known != player_id {
                        return reject("direction from an unknown player");
                    }
                }
            }
            GameEvent::FoodPlaced { coordinate } => {
                if self.is_authoritative() {
                    return reject("host is the only food authority");
                }
                if !(0..self.grid_size).contains(&coordinate.x)
                    || !(0..self.grid_size).contains(&coordinate.y)
                {
                    return reject("food outside the grid");
                }
            }
            GameEvent::GameOver { .. } => {}
        }
        Ok(())
    }

    /// Decodes, validates and applies one inbound message.
    pub fn receive(
        &self,
        state: &mut GameState,
        name: &str,
        payload: &[u8],
    ) -> Result<RemoteChange, SyncError> {
        let event = Self::decode(name, payload)?;
        self.validate(state, &event)?;
        Ok(state.apply_remote_event(self.role, &event))
    }
}
