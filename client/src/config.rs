use shared::rules::Ruleset;
use shared::{COUNTDOWN_STEPS, COUNTDOWN_STEP_MS, GRID_SIZE, TICK_MS};
use std::time::Duration;

use crate::input::DEFAULT_CAPACITY;

/// Tunables for a single match. Both peers must agree on `grid_size` and `ruleset`.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchConfig {
    pub tick_period: Duration,
    pub countdown_steps: u32,
    pub countdown_step: Duration,
    pub grid_size: i32,
    pub ruleset: Ruleset,
    pub input_capacity: usize,
    /// Seed for food placement; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_millis(TICK_MS),
            countdown_steps: COUNTDOWN_STEPS,
            countdown_step: Duration::from_millis(COUNTDOWN_STEP_MS),
            grid_size: GRID_SIZE,
            ruleset: Ruleset::Walled,
            input_capacity: DEFAULT_CAPACITY,
            seed: None,
        }
    }
}
