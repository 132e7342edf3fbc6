//! Match orchestration: countdown, tick loop, remote events and the end of a game.

use std::future::pending;
use std::sync::Arc;

use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::food::place_food;
use shared::{Direction, PlayerId, Role};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::Notify;

use crate::channel::{Channel, ChannelError, ChannelEvent};
use crate::clock::{ClockEvent, SimulationClock};
use crate::config::MatchConfig;
use crate::game::{GameState, Phase, RemoteChange};
use crate::input::InputQueue;
use crate::store::{MatchId, MatchStore, MatchUpdate};
use crate::sync::SyncProtocol;

/// Notifications delivered to listeners registered with `on_state_change`.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchEvent {
    Countdown(u32),
    /// Snapshot after a committed tick or a remote change.
    State(GameState),
    Ended {
        winner: Option<Role>,
        winner_id: Option<PlayerId>,
    },
    /// The host could not record the result. The match stays ended.
    PersistFailed(String),
}

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("match already started")]
    AlreadyStarted,
    #[error("match not started")]
    NotStarted,
    #[error("controller was stopped")]
    Stopped,
    #[error("channel closed before the subscription was confirmed")]
    ClosedBeforeConnect,
    #[error("disconnected while subscribing: {0}")]
    Disconnected(String),
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Asks a running `MatchController::run` loop to stop. A request made
/// before the loop is polled is remembered.
#[derive(Clone)]
pub struct StopHandle {
    signal: Arc<Notify>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.signal.notify_one();
    }
}

type Listener = Box<dyn FnMut(&MatchEvent) + Send>;

struct Session<C> {
    match_id: MatchId,
    channel: C,
    events: Option<mpsc::UnboundedReceiver<ChannelEvent>>,
    sync: SyncProtocol,
    state: GameState,
    inputs: InputQueue,
    clock: SimulationClock,
    concluded: bool,
}

pub struct MatchController<C: Channel, S: MatchStore> {
    config: MatchConfig,
    store: S,
    listeners: Vec<Listener>,
    session: Option<Session<C>>,
    rng: StdRng,
    stop_signal: Arc<Notify>,
    stopped: bool,
}

impl<C: Channel, S: MatchStore> MatchController<C, S> {
    pub fn new(config: MatchConfig, store: S) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            config,
            store,
            listeners: Vec::new(),
            session: None,
            rng,
            stop_signal: Arc::new(Notify::new()),
            stopped: false,
        }
    }

    pub fn on_state_change<F>(&mut self, listener: F)
    where
        F: FnMut(&MatchEvent) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            signal: self.stop_signal.clone(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn state(&self) -> Option<&GameState> {
        self.session.as_ref().map(|session| &session.state)
    }

    /// True iff this peer hosts the match. Gates food placement and persistence.
    pub fn is_authoritative(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.sync.is_authoritative())
    }

    /// Subscribes to the match topic and waits for the subscription to be
    /// confirmed before arming the countdown. Messages that arrive before
    /// confirmation are applied right after the state is created.
    pub async fn start(
        &mut self,
        match_id: MatchId,
        code: &str,
        local_id: PlayerId,
        role: Role,
        mut channel: C,
    ) -> Result<(), MatchError> {
        if self.stopped {
            return Err(MatchError::Stopped);
        }
        if self.session.is_some() {
            return Err(MatchError::AlreadyStarted);
        }

        let mut events = channel.subscribe(code)?;
        let mut early = Vec::new();
        loop {
            match events.recv().await {
                Some(ChannelEvent::Connected) => break,
                Some(ChannelEvent::Message { event, payload }) => early.push((event, payload)),
                Some(ChannelEvent::Disconnected { reason }) => {
                    channel.unsubscribe(code);
                    return Err(MatchError::Disconnected(reason));
                }
                None => return Err(MatchError::ClosedBeforeConnect),
            }
        }
        info!("Joined match {} on topic {} as {}", match_id, code, role);

        let state = GameState::new(
            role,
            local_id.clone(),
            self.config.grid_size,
            self.config.ruleset,
        );
        let sync = SyncProtocol::new(code, local_id, role, self.config.grid_size);
        let inputs = InputQueue::with_capacity(role.start_direction(), self.config.input_capacity);
        let mut clock = SimulationClock::from_config(&self.config);
        clock.arm();
        sync.announce(&channel);

        self.session = Some(Session {
            match_id,
            channel,
            events: Some(events),
            sync,
            state,
            inputs,
            clock,
            concluded: false,
        });

        for (event, payload) in early {
            self.handle_message(&event, &payload);
        }
        Ok(())
    }

    /// Queues a local direction. Ignored unless the match is running.
    pub fn enqueue_input(&mut self, direction: Direction) -> bool {
        match self.session.as_mut() {
            Some(session) if session.state.phase == Phase::Running => {
                session.inputs.enqueue(direction)
            }
            _ => false,
        }
    }

    pub fn handle_clock(&mut self, event: ClockEvent) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        match event {
            ClockEvent::Countdown(remaining) => {
                let opponent = session.sync.role().opponent();
                if session.state.slot(opponent).player_id.is_none() {
                    session.sync.announce(&session.channel);
                }
                debug!("Starting in {}", remaining);
                emit(&mut self.listeners, MatchEvent::Countdown(remaining));
            }
            ClockEvent::Started => {
                if session.state.begin_running() {
                    let direction = session.state.slot(session.sync.role()).direction;
                    session.inputs.reset(direction);
                    info!("Match {} running", session.match_id);
                    emit(&mut self.listeners, MatchEvent::State(session.state.clone()));
                }
            }
            ClockEvent::Tick => self.tick(),
        }
    }

    pub fn handle_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected => debug!("Subscription confirmed"),
            ChannelEvent::Message { event, payload } => self.handle_message(&event, &payload),
            ChannelEvent::Disconnected { reason } => {
                warn!("Channel disconnected: {}, match will stall", reason);
            }
        }
    }

    fn handle_message(&mut self, name: &str, payload: &[u8]) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        match session.sync.receive(&mut session.state, name, payload) {
            Ok(RemoteChange::Unchanged) => {}
            Ok(RemoteChange::Identified) => {
                let opponent = session.sync.role().opponent();
                if let Some(id) = &session.state.slot(opponent).player_id {
                    info!("Opponent {} identified as {}", opponent, id);
                }
                session.sync.announce(&session.channel);
                emit(&mut self.listeners, MatchEvent::State(session.state.clone()));
            }
            Ok(RemoteChange::Ended(winner)) => {
                debug!("Peer announced the end, winner {:?}", winner);
                self.conclude();
            }
            Ok(_) => emit(&mut self.listeners, MatchEvent::State(session.state.clone())),
            Err(e) => warn!("Dropping message: {}", e),
        }
    }

    fn tick(&mut self) {
        let authoritative = self.is_authoritative();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let role = session.sync.role();

        let queued = session.inputs.drain_one();
        let report = session.state.apply_tick(role, queued);

        if let Some(direction) = report.accepted_direction {
            session.sync.publish_direction(&session.channel, direction);
        }

        if let Some(cause) = report.death {
            info!("{} snake died at tick {}: {:?}", role, report.tick, cause);
            session.sync.publish_game_over(&session.channel, report.winner);
            self.conclude();
            return;
        }

        if authoritative && !report.captured.is_empty() {
            let grid_size = session.state.grid_size;
            match place_food(&mut self.rng, session.state.occupied_cells(), grid_size) {
                Some(food) => {
                    session.state.place_food(food);
                    session.sync.publish_food(&session.channel, food);
                }
                None => warn!("Board full, food stays at {}", session.state.food),
            }
        }

        emit(&mut self.listeners, MatchEvent::State(session.state.clone()));
    }

    /// Runs once per match, whichever side detected the end.
    fn conclude(&mut self) {
        let authoritative = self.is_authoritative();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.clock.halt();
        if session.concluded {
            return;
        }
        session.concluded = true;

        let winner = session.state.winner;
        let winner_id = session.state.winner_id().cloned();
        match &winner {
            Some(role) => info!("Match {} over, {} wins", session.match_id, role),
            None => info!("Match {} over, draw", session.match_id),
        }

        emit(&mut self.listeners, MatchEvent::State(session.state.clone()));
        emit(
            &mut self.listeners,
            MatchEvent::Ended {
                winner,
                winner_id: winner_id.clone(),
            },
        );

        if !authoritative {
            return;
        }
        if winner.is_some() && winner_id.is_none() {
            warn!("Winner never identified itself, recording no winner");
        }
        match self
            .store
            .update_match(&session.match_id, MatchUpdate::finished(winner_id))
        {
            Ok(record) => info!("Recorded match {} as {:?}", record.id, record.status),
            Err(e) => {
                error!("Failed to record match {}: {}", session.match_id, e);
                emit(&mut self.listeners, MatchEvent::PersistFailed(e.to_string()));
            }
        }
    }

    /// Halts the clock and leaves the topic. Safe to call in any phase, any
    /// number of times.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        if let Some(session) = self.session.as_mut() {
            session.clock.halt();
            session.events = None;
            session.channel.unsubscribe(session.sync.topic());
            info!("Left match {}", session.match_id);
        }
    }

    /// Drives the match until it ends, the stop handle fires or the
    /// controller is stopped. Returns the final state.
    pub async fn run(
        &mut self,
        mut inputs: mpsc::UnboundedReceiver<Direction>,
    ) -> Result<GameState, MatchError> {
        let stop_signal = self.stop_signal.clone();
        let mut inputs_open = true;

        loop {
            let Some(session) = self.session.as_mut() else {
                return Err(MatchError::NotStarted);
            };
            if session.state.is_ended() || self.stopped {
                break;
            }

            tokio::select! {
                event = session.clock.next() => {
                    self.handle_clock(event);
                }
                event = next_event(&mut session.events) => match event {
                    Some(event) => self.handle_channel_event(event),
                    None => {
                        warn!("Channel closed, match will stall");
                        session.events = None;
                    }
                },
                input = inputs.recv(), if inputs_open => match input {
                    Some(direction) => {
                        self.enqueue_input(direction);
                    }
                    None => inputs_open = false,
                },
                _ = stop_signal.notified() => {
                    debug!("Stop requested");
                    break;
                }
            }
        }

        self.stop();
        self.state().cloned().ok_or(MatchError::NotStarted)
    }
}

fn emit(listeners: &mut [Listener], event: MatchEvent) {
    for listener in listeners.iter_mut() {
        listener(&event);
    }
}

async fn next_event(
    events: &mut Option<mpsc::UnboundedReceiver<ChannelEvent>>,
) -> Option<ChannelEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => pending().await,
    }
}
