use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use dialoguer::Input;
use parley::client::{
    ClientConfig, NullMedia, RtcBackendFactory, Session, SessionEvent, WsTransport,
};
use parley::server::{self, ServerConfig};
use parley::{ParticipantId, RoomId};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Live-session signaling relay and probe client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the signaling relay.
    Serve {
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Shared token clients must present.
        #[arg(long)]
        token: Option<String>,

        /// JSON file mapping room ids to enrolled participant ids.
        #[arg(long)]
        enrolled: Option<PathBuf>,
    },

    /// Join a room with a media-less session and print what happens.
    Join {
        #[arg(long, default_value = "ws://127.0.0.1:3000")]
        url: String,

        #[arg(long)]
        room: Option<String>,

        #[arg(long)]
        participant: Option<String>,

        #[arg(long)]
        token: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Commands::Serve {
            bind,
            token,
            enrolled,
        } => {
            let mut config = ServerConfig::from_env();
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            if token.is_some() {
                config.auth_token = token;
            }
            if enrolled.is_some() {
                config.enrolled = enrolled;
            }

            println!(
                "{} {}",
                "Starting parley relay on".green().bold(),
                config.bind_addr.to_string().cyan()
            );
            server::serve(config).await?;
        }

        Commands::Join {
            url,
            room,
            participant,
            token,
        } => {
            let room = match room {
                Some(room) => room,
                None => prompt("Room")?,
            };
            let participant = match participant {
                Some(participant) => participant,
                None => prompt("Participant id")?,
            };
            run_probe(url, RoomId::from(room), ParticipantId::from(participant), token).await?;
        }
    }

    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    Input::<String>::new()
        .with_prompt(label)
        .interact_text()
        .with_context(|| format!("Failed to read {}", label.to_lowercase()))
}

async fn run_probe(
    url: String,
    room: RoomId,
    participant: ParticipantId,
    token: Option<String>,
) -> Result<()> {
    let config = ClientConfig {
        url,
        ..ClientConfig::default()
    };
    let transport = Arc::new(WsTransport::new(config.url.clone()).with_keepalive(config.keepalive));
    let backends = Arc::new(RtcBackendFactory::new(&config));

    let (session, mut events) = Session::start(config, transport, backends, Box::new(NullMedia));

    session
        .join_room(room.clone(), participant.clone(), token)
        .await
        .with_context(|| format!("Failed to join room {}", room))?;

    println!(
        "{} {} {}",
        "Joined".green().bold(),
        room.to_string().cyan(),
        format!("as {} (Ctrl-C to leave)", participant).dimmed()
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("{}", "Leaving...".yellow());
                break;
            }
            event = events.recv() => match event {
                Some(event) => {
                    let rejoin = matches!(event, SessionEvent::RejoinRequired { .. });
                    print_event(&event);
                    if rejoin {
                        break;
                    }
                }
                None => break,
            },
        }
    }

    session.close().await;
    Ok(())
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::ParticipantJoined { participant, media } => println!(
            "{} {} (video: {}, audio: {})",
            "+".green().bold(),
            participant.to_string().cyan(),
            media.video_enabled,
            media.audio_enabled
        ),
        SessionEvent::ParticipantLeft { participant } => {
            println!("{} {}", "-".red().bold(), participant.to_string().cyan())
        }
        SessionEvent::RemoteStreamAdded {
            participant,
            tracks,
        } => println!(
            "{} {} sent {} track(s)",
            "~".blue(),
            participant.to_string().cyan(),
            tracks.len()
        ),
        SessionEvent::ConnectionStateChanged { participant, state } => println!(
            "{} {} is {}",
            "~".blue(),
            participant.to_string().cyan(),
            format!("{:?}", state).bold()
        ),
        SessionEvent::RemoteMediaStateChanged { participant, media } => println!(
            "{} {} media: video {}, audio {}, screen {}, recording {}",
            "~".blue(),
            participant.to_string().cyan(),
            media.video_enabled,
            media.audio_enabled,
            media.screen_sharing,
            media.recording
        ),
        SessionEvent::PeerFailed { participant } => println!(
            "{} connection to {} failed",
            "!".red().bold(),
            participant.to_string().cyan()
        ),
        SessionEvent::MediaError(e) => println!("{} {}", "!".red().bold(), e),
        SessionEvent::TargetNotFound { participant } => println!(
            "{} {} is gone",
            "?".yellow(),
            participant.to_string().cyan()
        ),
        SessionEvent::ServerError { code, message } => {
            println!("{} relay error {:?}: {}", "!".red().bold(), code, message)
        }
        SessionEvent::RejoinRequired { reason } => {
            println!("{} {}", "Disconnected:".red().bold(), reason)
        }
    }
}
