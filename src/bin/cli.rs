use clap::{Parser, Subcommand};
use std::error::Error;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use inchain_network::session::Session;
use inchain_network::wire::{
    GetAddrMessage, Message, PingMessage, PongMessage, MAIN_NET, TEST_NET,
};

/// Talk to a running inchain node over its wire protocol.
#[derive(Parser)]
#[command(name = "inchain-cli")]
struct Cli {
    /// Node endpoint, host:port
    #[arg(long)]
    node: String,

    /// Use testnet magic and defaults
    #[arg(long)]
    testnet: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a ping and wait for the matching pong
    Ping,
    /// Request the peer's known addresses
    GetAddr,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let level: Level = cli.log_level.parse()?;
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let params = if cli.testnet { &TEST_NET } else { &MAIN_NET };

    info!("connecting to {}", cli.node);
    let addr = cli
        .node
        .to_socket_addrs()?
        .next()
        .ok_or("could not resolve address")?;
    let stream = TcpStream::connect_timeout(&addr, Duration::from_secs(30))?;

    let mut session = Session::new(params, stream)?;
    let peer = session.handshake()?;
    info!("handshake complete with {}", peer.user_agent);

    match cli.command {
        Commands::Ping => ping(&mut session)?,
        Commands::GetAddr => get_addresses(&mut session)?,
    }

    Ok(())
}

fn ping(session: &mut Session) -> Result<(), Box<dyn Error>> {
    let ping = PingMessage::new(session.protocol_version());
    let nonce = ping.nonce;

    info!("sending ping");
    session.send(&Message::Ping(ping))?;

    loop {
        if let Message::Pong(pong) = session.recv()? {
            if pong.nonce == nonce {
                info!("received matching pong");
                return Ok(());
            }
        }
    }
}

fn get_addresses(session: &mut Session) -> Result<(), Box<dyn Error>> {
    info!("requesting peer addresses");
    session.send(&Message::GetAddr(GetAddrMessage::new(
        session.protocol_version(),
    )))?;

    loop {
        match session.recv()? {
            Message::Addr(addr) => {
                info!("received {} peer addresses", addr.addresses.len());
                for address in &addr.addresses {
                    println!("{address}");
                }
                return Ok(());
            }
            // Keep the connection alive while waiting.
            Message::Ping(ping) => {
                session.send(&Message::Pong(PongMessage::answering(&ping)))?;
            }
            other => {
                info!("ignoring {} while waiting for addr", other.command().as_str());
            }
        }
    }
}
