use log::debug;
use shared::rules::{
    ate_food, first_collision, grow_or_slide, is_head_to_head, is_reversal, Collision, Ruleset,
};
use shared::{Coordinate, Direction, GameEvent, PlayerId, Role, INITIAL_FOOD};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    Running,
    Ended,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSlot {
    /// Unknown for the remote slot until the peer identifies itself.
    pub player_id: Option<PlayerId>,
    pub role: Role,
    pub snake: Vec<Coordinate>,
    pub direction: Direction,
    pub score: u32,
}

impl PlayerSlot {
    pub fn new(role: Role, player_id: Option<PlayerId>) -> Self {
        Self {
            player_id,
            role,
            snake: vec![role.start_position()],
            direction: role.start_direction(),
            score: 0,
        }
    }

    pub fn head(&self) -> Coordinate {
        self.snake[0]
    }

    pub fn len(&self) -> usize {
        self.snake.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snake.is_empty()
    }
}

/// What a single tick did, handed back to the controller so it can publish
/// and persist without the state knowing about the network.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub tick: u32,
    pub accepted_direction: Option<Direction>,
    pub death: Option<Collision>,
    pub winner: Option<Role>,
    pub captured: Vec<Role>,
}

/// Effect of a remote event on the local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteChange {
    Unchanged,
    Identified,
    Direction,
    Food,
    Ended(Option<Role>),
}

/// The canonical state of one match as seen by one peer.
///
/// Slot 1 always belongs to the host and slot 2 to the guest, on both peers.
#[derive(Debug, Clone, PartialEq)]
pub struct GameState {
    pub tick: u32,
    pub host: PlayerSlot,
    pub guest: PlayerSlot,
    pub food: Coordinate,
    pub phase: Phase,
    /// Meaningful once `phase` is `Ended`; `None` then means a draw.
    pub winner: Option<Role>,
    pub grid_size: i32,
    pub ruleset: Ruleset,
}

impl GameState {
    pub fn new(local_role: Role, local_id: PlayerId, grid_size: i32, ruleset: Ruleset) -> Self {
        let (host_id, guest_id) = match local_role {
            Role::Host => (Some(local_id), None),
            Role::Guest => (None, Some(local_id)),
        };

        Self {
            tick: 0,
            host: PlayerSlot::new(Role::Host, host_id),
            guest: PlayerSlot::new(Role::Guest, guest_id),
            food: INITIAL_FOOD,
            phase: Phase::Starting,
            winner: None,
            grid_size,
            ruleset,
        }
    }

    pub fn slot(&self, role: Role) -> &PlayerSlot {
        match role {
            Role::Host => &self.host,
            Role::Guest => &self.guest,
        }
    }

    pub fn slot_mut(&mut self, role: Role) -> &mut PlayerSlot {
        match role {
            Role::Host => &mut self.host,
            Role::Guest => &mut self.guest,
        }
    }

    pub fn winner_id(&self) -> Option<&PlayerId> {
        self.winner
            .and_then(|role| self.slot(role).player_id.as_ref())
    }

    pub fn is_ended(&self) -> bool {
        self.phase == Phase::Ended
    }

    pub fn occupied_cells(&self) -> impl Iterator<Item = &Coordinate> {
        self.host.snake.iter().chain(self.guest.snake.iter())
    }

    /// Leaves the countdown. Returns false if the match is not starting.
    pub fn begin_running(&mut self) -> bool {
        if self.phase != Phase::Starting {
            return false;
        }
        self.phase = Phase::Running;
        true
    }

    /// Ends the match once. Later calls are ignored and return false.
    pub fn end(&mut self, winner: Option<Role>) -> bool {
        if self.phase == Phase::Ended {
            return false;
        }
        self.phase = Phase::Ended;
        self.winner = winner;
        true
    }

    pub fn place_food(&mut self, food: Coordinate) {
        self.food = food;
    }

    /// Advances the simulation one step from the point of view of `local`.
    ///
    /// Only the local snake is judged for death; the opponent judges its own
    /// snake and announces the result. Both snakes move and may eat.
    pub fn apply_tick(&mut self, local: Role, queued: Option<Direction>) -> TickReport {
        let mut report = TickReport {
            tick: self.tick,
            ..TickReport::default()
        };

        if self.phase != Phase::Running {
            return report;
        }

        if let Some(proposed) = queued {
            let slot = self.slot_mut(local);
            if is_reversal(slot.direction, proposed) {
                debug!("Dropping stale reversal {:?} at tick {}", proposed, self.tick);
            } else {
                slot.direction = proposed;
                report.accepted_direction = Some(proposed);
            }
        }

        let opponent = local.opponent();
        let local_head = self.next_head(local);
        let opponent_head = self.next_head(opponent);

        let collision = first_collision(
            self.ruleset,
            local_head,
            &self.slot(local).snake,
            &self.slot(opponent).snake,
            self.grid_size,
        );

        let death = if is_head_to_head(local_head, opponent_head) {
            Some(Collision::HeadToHead)
        } else {
            collision
        };

        if let Some(cause) = death {
            let winner = match cause {
                Collision::HeadToHead => None,
                _ => Some(opponent),
            };
            self.end(winner);
            report.death = Some(cause);
            report.winner = winner;
            return report;
        }

        for (role, head) in [(local, local_head), (opponent, opponent_head)] {
            let grew = ate_food(head, self.food);
            let slot = self.slot_mut(role);
            slot.snake = grow_or_slide(&slot.snake, head, grew);
            if grew {
                slot.score += 1;
                report.captured.push(role);
            }
        }

        self.tick += 1;
        report.tick = self.tick;
        report
    }

    /// Applies a validated event from the peer. Nothing changes after the
    /// match has ended, and re-applying the same event is a no-op.
    pub fn apply_remote_event(&mut self, local: Role, event: &GameEvent) -> RemoteChange {
        if self.phase == Phase::Ended {
            return RemoteChange::Unchanged;
        }

        match event {
            GameEvent::Hello { player_id, role } => {
                let slot = self.slot_mut(*role);
                if slot.player_id.as_ref() == Some(player_id) {
                    RemoteChange::Unchanged
                } else {
                    slot.player_id = Some(player_id.clone());
                    RemoteChange::Identified
                }
            }
            GameEvent::DirectionChange {
                player_id,
                direction,
            } => {
                let slot = self.slot_mut(local.opponent());
                if slot.player_id.is_none() {
                    slot.player_id = Some(player_id.clone());
                }
                if slot.direction == *direction {
                    RemoteChange::Unchanged
                } else {
                    slot.direction = *direction;
                    RemoteChange::Direction
                }
            }
            GameEvent::FoodPlaced { coordinate } => {
                if self.food == *coordinate {
                    RemoteChange::Unchanged
                } else {
                    self.food = *coordinate;
                    RemoteChange::Food
                }
            }
            GameEvent::GameOver { winner } => {
                self.end(*winner);
                RemoteChange::Ended(*winner)
            }
        }
    }

    fn next_head(&self, role: Role) -> Coordinate {
        let slot = self.slot(role);
        self.ruleset
            .next_head(slot.head(), slot.direction, self.grid_size)
    }
}
