mod commands;
mod ws;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use client::{
    ActivityTracker, ClientEvent, ConnectionState, FileSessionStore, MemorySessionStore, PresenceTimings,
    ReconnectPolicy, RoomClient, SessionStore, ViewEvent,
};
use frames::{ClientMessage, RoomKind, Status};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Instant;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::commands::Command;
use crate::ws::WsConnector;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("health check failed with HTTP {0}")]
    Unhealthy(u16),
    #[error("{0}")]
    Client(#[from] client::ClientError),
    #[error("invalid room kind: {0}")]
    InvalidKind(String),
}

#[derive(Parser, Debug)]
#[command(name = "scrumkit-cli", about = "Terminal participant for scrumkit rooms")]
struct Cli {
    #[arg(long, env = "SCRUMKIT_SERVER_URL", default_value = "http://127.0.0.1:7001")]
    server_url: String,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Check that the server is up.
    Ping,
    /// Join a room and take part from the terminal.
    Join(JoinArgs),
}

#[derive(Args, Debug)]
struct JoinArgs {
    /// `scrum` or `retro`.
    #[arg(long, env = "SCRUMKIT_ROOM_KIND", default_value = "scrum")]
    kind: String,

    #[arg(long, env = "SCRUMKIT_ROOM")]
    room: String,

    #[arg(long, env = "SCRUMKIT_NAME")]
    name: String,

    #[arg(long)]
    avatar: Option<u8>,

    /// Vote once seated.
    #[arg(long)]
    vote: Option<String>,

    /// Keep the session here so a restart resumes the same seat.
    #[arg(long, env = "SCRUMKIT_SESSION_FILE")]
    session_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        CliCommand::Ping => run_ping(&cli.server_url).await,
        CliCommand::Join(args) => {
            let connector = WsConnector::new(&cli.server_url)?;
            match args.session_file.clone() {
                Some(path) => run_join(connector, FileSessionStore::new(path), args).await,
                None => run_join(connector, MemorySessionStore::new(), args).await,
            }
        }
    }
}

async fn run_ping(server_url: &str) -> Result<(), CliError> {
    let url = format!("{}/healthz", server_url.trim_end_matches('/'));
    let response = reqwest::Client::new().get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(CliError::Unhealthy(status.as_u16()));
    }
    println!("ok");
    Ok(())
}

async fn run_join<S: SessionStore>(connector: WsConnector, store: S, args: JoinArgs) -> Result<(), CliError> {
    let kind = args.kind.parse::<RoomKind>().map_err(CliError::InvalidKind)?;
    let mut client = RoomClient::new(connector, store, ReconnectPolicy::default());
    client.view_mut().subscribe(|event| match event {
        ViewEvent::PeerJoined(p) => println!("+ {} joined", p.name),
        ViewEvent::PeerLeft(p) => println!("- {} left", p.name),
        ViewEvent::Revealed(true) => println!("* votes revealed"),
        _ => {}
    });

    client.join(kind, &args.room, &args.name, args.avatar).await?;
    println!("joined {kind}/{} as {}", args.room, args.name);
    print_room(&client);

    let mut tracker = ActivityTracker::new(PresenceTimings::default(), Instant::now());
    if let Some(vote) = args.vote.as_deref() {
        cast_vote(&mut client, &mut tracker, vote).await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        let live = client.state() != ConnectionState::Disconnected;
        if !session_open(client.state(), stdin_open) {
            break;
        }

        tokio::select! {
            event = client.next_event(), if live => {
                let Some(event) = event else { break };
                render(&client, &event);
                if client.coordinator().params().is_none() {
                    break;
                }
                if let Some(me) = client.view().me() {
                    tracker.observe(me.status, me.voted);
                }
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    tracker.on_activity(Instant::now());
                    if !run_command(&mut client, &mut tracker, &line).await {
                        break;
                    }
                }
                Ok(None) | Err(_) => stdin_open = false,
            },
            () = sleep_until(tracker.next_deadline()) => tracker.poll(Instant::now()),
            _ = tokio::signal::ctrl_c() => {
                client.leave().await;
                break;
            }
        }

        // Held until connected so the server sees the latest local status.
        if client.state() == ConnectionState::Connected {
            for status in tracker.take_outbox() {
                if let Err(e) = client.set_status(status).await {
                    warn!(error = %e, %status, "status not sent");
                }
            }
        }
    }
    Ok(())
}

/// Apply one stdin line. Returns false when the session should end.
async fn run_command<S: SessionStore>(
    client: &mut RoomClient<WsConnector, S>,
    tracker: &mut ActivityTracker,
    line: &str,
) -> bool {
    let command = match commands::parse(line) {
        Ok(command) => command,
        Err(commands::ParseError::Empty) => return true,
        Err(e) => {
            eprintln!("{e}");
            return true;
        }
    };

    let message = match command {
        Command::Vote(value) => {
            cast_vote(client, tracker, &value).await;
            return true;
        }
        Command::Status(status) => ClientMessage::Status { status },
        Command::Reveal => ClientMessage::Reveal,
        Command::Reset => ClientMessage::Reset,
        Command::Emoji { target, reaction } => {
            let Some(target_id) = client.view().find_by_name(&target).map(|p| p.id.clone()) else {
                eprintln!("nobody called {target} here");
                return true;
            };
            ClientMessage::ThrowEmoji { target_id, emoji: reaction }
        }
        Command::Add { column, content } => ClientMessage::AddItem { column_id: column, content },
        Command::Edit { column, item, content } => ClientMessage::EditItem { column_id: column, item_id: item, content },
        Command::Delete { column, item } => ClientMessage::DeleteItem { column_id: column, item_id: item },
        Command::Hover => {
            tracker.on_hover_start(Instant::now());
            return true;
        }
        Command::Unhover => {
            tracker.on_hover_end(Instant::now());
            return true;
        }
        Command::Who => {
            print_room(client);
            return true;
        }
        Command::Retry => {
            if !client.retry_connection() {
                eprintln!("nothing to retry");
            }
            return true;
        }
        Command::Leave => {
            client.leave().await;
            println!("left");
            return false;
        }
        Command::Help => {
            println!("{}", commands::HELP);
            return true;
        }
    };

    if let Err(e) = client.send(message).await {
        eprintln!("{e}");
    }
    true
}

/// Send a vote and tell the presence tracker whether one is now cast.
async fn cast_vote<S: SessionStore>(client: &mut RoomClient<WsConnector, S>, tracker: &mut ActivityTracker, value: &str) {
    let was = client.view().me().map(|p| p.vote.clone()).unwrap_or_default();
    let voted = !value.is_empty() && was != value;
    match client.vote(value).await {
        Ok(()) => tracker.on_vote_change(Instant::now(), voted),
        Err(e) => eprintln!("{e}"),
    }
}

fn render<S: SessionStore>(client: &RoomClient<WsConnector, S>, event: &ClientEvent) {
    match event {
        ClientEvent::Updated => print_room(client),
        ClientEvent::Emoji { from_id, to_id, emoji } => {
            let view = client.view();
            let from = view.participant(from_id).map_or("someone", |p| p.name.as_str());
            let to = view.participant(to_id).map_or("someone", |p| p.name.as_str());
            println!("{from} threw {} at {to}", emoji.as_emoji());
        }
        ClientEvent::ServerError { code, message } => eprintln!("server: {message} ({code})"),
        ClientEvent::Reconnecting { attempt, delay } => {
            println!("connection lost; attempt {attempt} in {}s", delay.as_secs());
        }
        ClientEvent::Reconnected { resumed: true } => println!("reconnected to the same seat"),
        ClientEvent::Reconnected { resumed: false } => println!("reconnected as a new participant"),
        ClientEvent::Disconnected { error: Some(error) } => {
            println!("disconnected: {error}");
            if client.coordinator().params().is_some() {
                println!("type `retry` to try again or `leave` to exit");
            }
        }
        ClientEvent::Disconnected { error: None } => println!("disconnected"),
    }
}

fn print_room<S: SessionStore>(client: &RoomClient<WsConnector, S>) {
    let view = client.view();
    let revealed = if view.revealed() { " (revealed)" } else { "" };
    println!("-- {}{revealed}", view.room_id());
    for p in view.participants() {
        let marker = if Some(p.id.as_str()) == view.local_id() { "*" } else { " " };
        let vote = match (p.voted, p.vote.as_str()) {
            (false, _) => "-".to_owned(),
            (true, "") => "?".to_owned(),
            (true, vote) => vote.to_owned(),
        };
        let status = if p.status == Status::Disconnected { "away" } else { p.status.as_str() };
        println!("{marker} {:<16} {:<12} {vote}", p.name, status);
    }
    for column in view.columns() {
        println!("[{}] {}", column.id, column.title);
        for item in &column.items {
            println!("    {}  {} ({})", item.id, item.content, item.author_name);
        }
    }
}

/// Whether `join` has anything left to wait for. A lost connection keeps the
/// session open while stdin can still deliver `retry`.
fn session_open(state: ConnectionState, stdin_open: bool) -> bool {
    state != ConnectionState::Disconnected || stdin_open
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
