use std::error::Error;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};
use volleynet::lan::{LanTransport, UdpBeacon};
use volleynet::protocol::constants::TICK_RATE;
use volleynet::{Coordinator, NodeConfig, SessionEvent, StatusChange};

/// Headless duel node: discovers an opponent on the LAN, runs the session
/// protocol and drives a demo paddle at the fixed tick rate.
///
/// Usage: volley [name] [bind-ip]
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stdout);

    let filter_layer = filter::LevelFilter::from_level(Level::INFO);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter_layer)
        .init();

    let mut args = std::env::args().skip(1);
    let name = args.next();
    let bind_ip: IpAddr = args
        .next()
        .unwrap_or_else(|| "127.0.0.1".to_string())
        .parse()?;

    let transport = Arc::new(LanTransport::bind(SocketAddr::new(bind_ip, 0)).await?);
    let mut config = NodeConfig::new().bind_addr(transport.local_addr());
    if let Some(name) = name {
        config = config.name(name);
    }

    tracing::info!("volley node starting");
    tracing::info!("   Name: {}", config.name);
    tracing::info!("   Receiving on: {}", transport.local_addr());

    let beacon = Arc::new(UdpBeacon::bind_with(config.announce_interval).await?);
    let (coordinator, mut events) = Coordinator::new(config, transport, beacon);
    coordinator.start().await?;

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::OpponentFound { name } => {
                    tracing::info!("opponent found: {}", name);
                }
                SessionEvent::GameInit { name } => {
                    tracing::info!("addressed by: {}", name);
                }
                SessionEvent::RoleDecided { role } => {
                    tracing::info!("playing as {}", role);
                }
                SessionEvent::Synchronized => {
                    tracing::info!("synchronized, waiting for the first tick");
                }
                SessionEvent::ScoreUpdate { slot, points } => {
                    tracing::info!("score: {} has {}", slot, points);
                }
                SessionEvent::GameStatusUpdate(StatusChange::GameOver { local_win, .. }) => {
                    if local_win {
                        tracing::info!("You won!!!");
                    } else {
                        tracing::info!("You lost");
                    }
                }
                SessionEvent::GameStatusUpdate(status) => {
                    tracing::info!("status: {:?}", status);
                }
                // paddle and ball updates are too chatty to log at 60 Hz
                SessionEvent::GameDataUpdate(_) => {}
            }
        }
    });

    // Fixed-rate driver with a slowly drifting demo paddle. A real frontend
    // would feed input coordinates here instead.
    let mut ticker = tokio::time::interval(Duration::from_secs(1) / TICK_RATE);
    let mut frame: u64 = 0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                frame += 1;
                let y = 300.0 + 180.0 * ((frame as f32) / 120.0).sin();
                coordinator.tick(Some([20.0, y.round()])).await;
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    tracing::info!("shutting down...");
    coordinator.leave().await;
    Ok(())
}
