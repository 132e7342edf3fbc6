//! Countdown and fixed-rate tick source for the match loop

use std::future::pending;
use std::time::Duration;
use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};

use crate::config::MatchConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    /// Seconds (steps) left before the match starts.
    Countdown(u32),
    Started,
    Tick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClockState {
    Idle,
    Countdown { remaining: u32 },
    Ticking,
    Halted,
}

/// Drives the countdown and then a fixed-period tick.
///
/// `next` is cancel safe, so it can sit in a `tokio::select!` next to
/// network events. An idle or halted clock never resolves.
pub struct SimulationClock {
    tick_period: Duration,
    countdown_step: Duration,
    countdown_steps: u32,
    state: ClockState,
    timer: Option<Interval>,
    ticks: u64,
}

impl SimulationClock {
    pub fn new(tick_period: Duration, countdown_step: Duration, countdown_steps: u32) -> Self {
        Self {
            tick_period,
            countdown_step,
            countdown_steps,
            state: ClockState::Idle,
            timer: None,
            ticks: 0,
        }
    }

    pub fn from_config(config: &MatchConfig) -> Self {
        Self::new(
            config.tick_period,
            config.countdown_step,
            config.countdown_steps,
        )
    }

    /// Starts the countdown. Must be called from within a tokio runtime.
    pub fn arm(&mut self) {
        if self.state != ClockState::Idle {
            return;
        }

        let mut timer = interval(self.countdown_step);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.timer = Some(timer);
        self.state = ClockState::Countdown {
            remaining: self.countdown_steps,
        };
    }

    pub async fn next(&mut self) -> ClockEvent {
        let timer = match (self.state, self.timer.as_mut()) {
            (ClockState::Countdown { .. } | ClockState::Ticking, Some(timer)) => timer,
            _ => return pending().await,
        };
        timer.tick().await;

        match self.state {
            ClockState::Countdown { remaining: 0 } => {
                let mut ticker = interval_at(Instant::now() + self.tick_period, self.tick_period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                self.timer = Some(ticker);
                self.state = ClockState::Ticking;
                ClockEvent::Started
            }
            ClockState::Countdown { remaining } => {
                self.state = ClockState::Countdown {
                    remaining: remaining - 1,
                };
                ClockEvent::Countdown(remaining)
            }
            _ => {
                self.ticks += 1;
                ClockEvent::Tick
            }
        }
    }

    /// Stops the clock for good. Idempotent.
    pub fn halt(&mut self) {
        self.state = ClockState::Halted;
        self.timer = None;
    }

    pub fn is_halted(&self) -> bool {
        self.state == ClockState::Halted
    }

    pub fn is_ticking(&self) -> bool {
        self.state == ClockState::Ticking
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}
