use clap::{Parser, ValueEnum};
use client::config::MatchConfig;
use client::controller::{MatchController, MatchEvent};
use client::network::UdpChannel;
use client::store::{MatchId, MatchStore, MemoryMatchStore};
use log::{info, warn};
use shared::rules::Ruleset;
use shared::{Direction, PlayerId, Role};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(ValueEnum, Clone, Copy, Debug)]
enum RoleArg {
    Host,
    Guest,
}

impl From<RoleArg> for Role {
    fn from(value: RoleArg) -> Self {
        match value {
            RoleArg::Host => Role::Host,
            RoleArg::Guest => Role::Guest,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Relay address to connect to
    #[arg(short = 'r', long, default_value = "127.0.0.1:8080")]
    relay: String,

    /// Match code shared by both players
    #[arg(short = 'c', long)]
    code: String,

    /// Which side of the match to play
    #[arg(long, value_enum)]
    role: RoleArg,

    /// Milliseconds per simulation tick
    #[arg(long, default_value = "150")]
    tick_ms: u64,

    /// Wrap around the board edges instead of dying on walls
    #[arg(long)]
    wraparound: bool,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,

    /// Seed for food placement
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let role = Role::from(args.role);
    let player_id = PlayerId(Uuid::new_v4().to_string());

    info!("Starting {} as {} in match {}", player_id, role, args.code);
    info!("Connecting to relay: {}", args.relay);
    if args.fake_ping > 0 {
        info!("Simulating {}ms latency", args.fake_ping);
    }
    info!("Controls: type w/a/s/d (or up/down/left/right) and press Enter");

    let config = MatchConfig {
        tick_period: Duration::from_millis(args.tick_ms),
        ruleset: if args.wraparound {
            Ruleset::Toroidal
        } else {
            Ruleset::Walled
        },
        seed: args.seed,
        ..MatchConfig::default()
    };

    let store = MemoryMatchStore::new();
    let match_id = match role {
        Role::Host => store.create_match(&args.code, player_id.clone())?.id,
        Role::Guest => MatchId::generate(),
    };

    let channel = UdpChannel::connect(&args.relay, args.fake_ping).await?;
    let mut controller = MatchController::new(config, store);
    controller.on_state_change(|event| match event {
        MatchEvent::Countdown(n) => info!("Starting in {}...", n),
        MatchEvent::State(state) => info!(
            "Tick {}: host {} (len {}, score {}), guest {} (len {}, score {}), food {}",
            state.tick,
            state.host.head(),
            state.host.len(),
            state.host.score,
            state.guest.head(),
            state.guest.len(),
            state.guest.score,
            state.food
        ),
        MatchEvent::Ended { winner, winner_id } => match (winner, winner_id) {
            (Some(role), Some(id)) => info!("Game over: {} ({}) wins", role, id),
            (Some(role), None) => info!("Game over: {} wins", role),
            (None, _) => info!("Game over: draw"),
        },
        MatchEvent::PersistFailed(reason) => warn!("Could not record result: {}", reason),
    });

    info!("Waiting for relay to confirm subscription...");
    controller
        .start(match_id.clone(), &args.code, player_id, role, channel)
        .await?;

    let (input_tx, input_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match Direction::from_key(line.trim()) {
                Some(direction) => {
                    if input_tx.send(direction).is_err() {
                        break;
                    }
                }
                None => warn!("Unknown direction {:?}", line.trim()),
            }
        }
    });

    let stop = controller.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, leaving match");
            stop.stop();
        }
    });

    let final_state = controller.run(input_rx).await?;
    info!(
        "Final tick {}, phase {:?}, winner {:?}",
        final_state.tick, final_state.phase, final_state.winner
    );

    if role == Role::Host {
        if let Some(record) = controller.store().get(&match_id) {
            info!("Match record: {:?}", record);
        }
    }

    Ok(())
}
