use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use meshcall::RoomId;
use meshcall::server::{ServerConfig, serve};
use std::net::IpAddr;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "meshcall", version, about = "Mesh video call signaling")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the coordination server.
    Serve {
        /// Overrides PORT.
        #[arg(short, long)]
        port: Option<u16>,

        /// Overrides BIND_ADDR.
        #[arg(long)]
        bind: Option<IpAddr>,

        /// Extra allowed CORS origin, repeatable.
        #[arg(long = "origin")]
        origins: Vec<String>,

        /// Allow any origin.
        #[arg(long, conflicts_with = "origins")]
        any_origin: bool,
    },

    /// Room identifier helpers.
    Room {
        #[command(subcommand)]
        command: RoomCommands,
    },
}

#[derive(Subcommand)]
enum RoomCommands {
    /// Print a fresh random room id and its link path.
    New,

    /// Extract the room id from a link or bare id.
    Parse { link: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            bind,
            origins,
            any_origin,
        } => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
                )
                .init();

            let mut config = ServerConfig::from_env().context("Invalid server environment")?;
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            for origin in &origins {
                config.add_origin(origin);
            }
            if any_origin {
                config.allowed_origins.clear();
            }

            println!(
                "{} {}",
                "Starting meshcall server on".green().bold(),
                config.socket_addr()
            );

            let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
            runtime.block_on(serve(config))?;
        }

        Commands::Room { command } => match command {
            RoomCommands::New => {
                let room = RoomId::generate();
                println!("{}", room.as_str().cyan().bold());
                println!("   {}{}", meshcall::model::utils::ROOM_LINK_SEGMENT, room);
            }
            RoomCommands::Parse { link } => {
                let room = RoomId::from_link(&link)
                    .with_context(|| format!("No room id in {link:?}"))?;
                println!("{}", room.as_str());
            }
        },
    }

    Ok(())
}
