use serde::{Deserialize, Serialize};
use std::fmt;

pub mod food;
pub mod rules;

pub const GRID_SIZE: i32 = 20;
pub const TICK_MS: u64 = 150;
pub const COUNTDOWN_STEPS: u32 = 3;
pub const COUNTDOWN_STEP_MS: u64 = 1000;
pub const PROTOCOL_VERSION: u32 = 1;

pub const HOST_START: Coordinate = Coordinate { x: 2, y: 5 };
pub const GUEST_START: Coordinate = Coordinate { x: 17, y: 14 };
pub const INITIAL_FOOD: Coordinate = Coordinate { x: 10, y: 10 };

/// Packets exchanged between a peer and the relay.
///
/// The relay never looks inside `payload`; it only routes by `topic`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    Subscribe {
        client_version: u32,
        topic: String,
    },
    Publish {
        topic: String,
        event: String,
        payload: Vec<u8>,
    },
    Unsubscribe {
        topic: String,
    },
    Heartbeat,

    Subscribed {
        topic: String,
        peers: u32,
    },
    Deliver {
        topic: String,
        event: String,
        payload: Vec<u8>,
    },
    Rejected {
        reason: String,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Coordinate {
    pub x: i32,
    pub y: i32,
}

impl Coordinate {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    /// Unit offset in grid space. `y` grows downwards.
    pub fn offset(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    /// Maps a key name typed by the player onto a direction.
    pub fn from_key(key: &str) -> Option<Direction> {
        match key.trim().to_ascii_lowercase().as_str() {
            "w" | "k" | "up" => Some(Direction::Up),
            "s" | "j" | "down" => Some(Direction::Down),
            "a" | "h" | "left" => Some(Direction::Left),
            "d" | "l" | "right" => Some(Direction::Right),
            _ => None,
        }
    }
}

/// Which side of the match an instance plays. Fixed for the lifetime of a match.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Host,
    Guest,
}

impl Role {
    pub fn opponent(self) -> Role {
        match self {
            Role::Host => Role::Guest,
            Role::Guest => Role::Host,
        }
    }

    pub fn start_position(self) -> Coordinate {
        match self {
            Role::Host => HOST_START,
            Role::Guest => GUEST_START,
        }
    }

    pub fn start_direction(self) -> Direction {
        match self {
            Role::Host => Direction::Right,
            Role::Guest => Direction::Left,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Host => write!(f, "host"),
            Role::Guest => write!(f, "guest"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
pub struct PlayerId(pub String);

impl PlayerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PlayerId {
    fn from(value: &str) -> Self {
        PlayerId(value.to_string())
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Facts one peer tells the other about the match.
///
/// Every variant carries absolute state, so applying the same event twice
/// leaves the receiver unchanged.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum GameEvent {
    Hello {
        player_id: PlayerId,
        role: Role,
    },
    DirectionChange {
        player_id: PlayerId,
        direction: Direction,
    },
    FoodPlaced {
        coordinate: Coordinate,
    },
    GameOver {
        winner: Option<Role>,
    },
}

impl GameEvent {
    pub const HELLO: &'static str = "hello";
    pub const DIRECTION_CHANGE: &'static str = "direction-change";
    pub const FOOD_PLACED: &'static str = "food-placed";
    pub const GAME_OVER: &'static str = "game-over";

    /// Event name used on the channel.
    pub fn name(&self) -> &'static str {
        match self {
            GameEvent::Hello { .. } => Self::HELLO,
            GameEvent::DirectionChange { .. } => Self::DIRECTION_CHANGE,
            GameEvent::FoodPlaced { .. } => Self::FOOD_PLACED,
            GameEvent::GameOver { .. } => Self::GAME_OVER,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_opposites() {
        for direction in Direction::ALL {
            assert_ne!(direction, direction.opposite());
            assert_eq!(direction, direction.opposite().opposite());
        }
    }

    #[test]
    fn test_direction_offsets_cancel() {
        for direction in Direction::ALL {
            let (dx, dy) = direction.offset();
            let (ox, oy) = direction.opposite().offset();
            assert_eq!(dx + ox, 0);
            assert_eq!(dy + oy, 0);
            assert_eq!(dx.abs() + dy.abs(), 1);
        }
    }

    #[test]
    fn test_direction_from_key() {
        assert_eq!(Direction::from_key("w"), Some(Direction::Up));
        assert_eq!(Direction::from_key("  Left "), Some(Direction::Left));
        assert_eq!(Direction::from_key("J"), Some(Direction::Down));
        assert_eq!(Direction::from_key("d"), Some(Direction::Right));
        assert_eq!(Direction::from_key("x"), None);
        assert_eq!(Direction::from_key(""), None);
    }

    #[test]
    fn test_role_start_layout() {
        assert_eq!(Role::Host.start_position(), Coordinate::new(2, 5));
        assert_eq!(Role::Host.start_direction(), Direction::Right);
        assert_eq!(Role::Guest.start_position(), Coordinate::new(17, 14));
        assert_eq!(Role::Guest.start_direction(), Direction::Left);
        assert_eq!(Role::Host.opponent(), Role::Guest);
        assert_eq!(Role::Guest.opponent(), Role::Host);
    }

    #[test]
    fn test_game_event_names() {
        let events = vec![
            GameEvent::Hello {
                player_id: PlayerId::from("a"),
                role: Role::Host,
            },
            GameEvent::DirectionChange {
                player_id: PlayerId::from("a"),
                direction: Direction::Up,
            },
            GameEvent::FoodPlaced {
                coordinate: Coordinate::new(1, 1),
            },
            GameEvent::GameOver { winner: None },
        ];

        let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
        assert_eq!(
            names,
            vec!["hello", "direction-change", "food-placed", "game-over"]
        );
    }

    #[test]
    fn test_packet_serialization_publish() {
        let packet = Packet::Publish {
            topic: "ABC123".to_string(),
            event: "food-placed".to_string(),
            payload: vec![1, 2, 3],
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Publish {
                topic,
                event,
                payload,
            } => {
                assert_eq!(topic, "ABC123");
                assert_eq!(event, "food-placed");
                assert_eq!(payload, vec![1, 2, 3]);
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_truncated_event_fails_to_decode() {
        let event = GameEvent::DirectionChange {
            player_id: PlayerId::from("player-1"),
            direction: Direction::Left,
        };
        let bytes = bincode::serialize(&event).unwrap();

        let result: Result<GameEvent, _> = bincode::deserialize(&bytes[..bytes.len() / 2]);
        assert!(result.is_err());
    }
}
