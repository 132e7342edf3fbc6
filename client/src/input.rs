//! Buffered direction input, drained one entry per simulation tick

use log::debug;
use shared::rules::is_reversal;
use shared::Direction;
use std::collections::VecDeque;

pub const DEFAULT_CAPACITY: usize = 8;

/// Pending direction changes for the local player.
///
/// Keys can arrive at any time, but the simulation applies at most one turn
/// per tick. Enqueue performs a soft reversal check against the last accepted
/// entry; the tick re-checks against the snake's actual heading when it
/// drains the entry.
#[derive(Debug, Clone)]
pub struct InputQueue {
    pending: VecDeque<Direction>,
    last_accepted: Direction,
    capacity: usize,
}

impl InputQueue {
    pub fn new(initial: Direction) -> Self {
        Self::with_capacity(initial, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(initial: Direction, capacity: usize) -> Self {
        Self {
            pending: VecDeque::with_capacity(capacity),
            last_accepted: initial,
            capacity,
        }
    }

    /// Buffers `proposed` unless it reverses the last accepted direction or
    /// the queue is full. Rejections are routine and only logged at debug level.
    pub fn enqueue(&mut self, proposed: Direction) -> bool {
        if is_reversal(self.last_accepted, proposed) {
            debug!(
                "Ignoring reversal {:?} after {:?}",
                proposed, self.last_accepted
            );
            return false;
        }

        if self.pending.len() >= self.capacity {
            debug!("Input queue full, dropping {:?}", proposed);
            return false;
        }

        self.pending.push_back(proposed);
        self.last_accepted = proposed;
        true
    }

    pub fn drain_one(&mut self) -> Option<Direction> {
        self.pending.pop_front()
    }

    /// Clears pending input and re-seeds the soft check.
    pub fn reset(&mut self, direction: Direction) {
        self.pending.clear();
        self.last_accepted = direction;
    }

    pub fn last_accepted(&self) -> Direction {
        self.last_accepted
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
