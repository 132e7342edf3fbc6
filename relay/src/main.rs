use clap::Parser;
use log::info;
use relay::network::{RelaySettings, Server};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Maximum number of concurrent match topics
    #[arg(short, long, default_value = "64")]
    max_topics: usize,

    /// Seconds of silence before a subscriber is dropped
    #[arg(long, default_value = "5")]
    idle_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let address = format!("{}:{}", args.host, args.port);
    let settings = RelaySettings {
        max_topics: args.max_topics,
        idle_timeout: std::time::Duration::from_secs(args.idle_timeout),
        ..RelaySettings::default()
    };

    info!("Starting relay on {}", address);
    info!("Topics: {} max, idle timeout {}s", settings.max_topics, args.idle_timeout);

    let mut server = Server::new(&address, settings).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
