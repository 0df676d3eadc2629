//! `mmsession`: line-oriented operator console for a matchmaking session.
//!
//! ```sh
//! mmsession --base-url http://localhost:8080
//! RUST_LOG=matchmaking_session=debug mmsession --ephemeral
//! ```
//!
//! Type `help` at the prompt for the command list.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use matchmaking_session::config::DEFAULT_MATCH_TOPIC;
use matchmaking_session::view::format_match;
use matchmaking_session::{
    CredentialStore, FileStore, HttpApi, MemoryStore, SessionConfig, SessionController,
    SessionError, SessionEvent, WebSocketConnector,
};

const HELP: &str = "\
Commands:
  login <username> <password>             log in and validate
  register <username> <password> <email>  create an account
  logout                                  disconnect and forget the credential
  connect | disconnect                    open/close the live match feed
  join [player-id] [elo]                  enqueue (random id, elo 1200 by default)
  leave [player-id]                       dequeue (defaults to the last joined id)
  refresh                                 reload the queue table
  auto on [ms] | auto off                 toggle queue auto-refresh
  player <player-id>                      look up one player
  results [n]                             recent match results (default 10)
  history [player-id] [n]                 stored matches (last joined id, default 20)
  leaderboard [n]                         players ranked by elo (default 50)
  enabled                                 is the server pairing players?
  status                                  show session, queue, matches and log
  quit";

#[derive(Debug, Parser)]
#[command(name = "mmsession", version, about = "Matchmaking session console")]
struct Cli {
    /// Base URL of the matchmaking REST API.
    #[arg(long, env = "MM_BASE_URL", default_value = "http://localhost:8080")]
    base_url: String,

    /// STOMP WebSocket endpoint. Derived from the base URL when omitted.
    #[arg(long, env = "MM_WS_URL")]
    ws_url: Option<String>,

    /// Topic carrying match results.
    #[arg(long, default_value = DEFAULT_MATCH_TOPIC)]
    topic: String,

    /// Credential file. Defaults to the platform config directory.
    #[arg(long, env = "MM_STATE_FILE")]
    state_file: Option<PathBuf>,

    /// Auto-refresh interval in milliseconds.
    #[arg(long, default_value_t = 3000)]
    refresh_ms: u64,

    /// Keep the credential in memory only.
    #[arg(long)]
    ephemeral: bool,
}

enum Flow {
    Continue,
    Quit,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = SessionConfig::new(&cli.base_url)
        .with_match_topic(&cli.topic)
        .with_refresh_interval(Duration::from_millis(cli.refresh_ms));
    if let Some(ws_url) = &cli.ws_url {
        config = config.with_ws_url(ws_url);
    }

    let store = if cli.ephemeral {
        CredentialStore::load(MemoryStore::new())
    } else {
        let path = cli
            .state_file
            .clone()
            .or_else(FileStore::default_path)
            .context("no config directory on this platform; pass --state-file")?;
        CredentialStore::load(FileStore::new(path))
    };

    let api = Arc::new(HttpApi::new(&config.base_url, config.request_timeout)?);
    let connector = Arc::new(WebSocketConnector::new(
        &config.ws_url,
        config.handshake_timeout,
    ));
    tracing::info!(base_url = %api.base_url(), ws_url = %config.ws_url, "starting session");

    let (mut session, mut events) = SessionController::new(config, api, connector, store);

    let state = session.start().await;
    println!("Session: {state}");
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match run_command(&mut session, line.trim()).await {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Quit) => break,
                    Err(e) => {
                        println!("error: {e}");
                        if let Some(e) = e.downcast_ref::<SessionError>() {
                            println!("  {}", e.category().description());
                        }
                    }
                }
            }
            event = events.recv() => {
                let Some(event) = event else {
                    tracing::info!("Event channel closed, exiting");
                    break;
                };
                render_event(&event);
            }
        }
    }

    session.shutdown().await;
    Ok(())
}

async fn run_command(session: &mut SessionController, line: &str) -> anyhow::Result<Flow> {
    let mut args = line.split_whitespace();
    let Some(command) = args.next() else {
        return Ok(Flow::Continue);
    };

    match command {
        "help" | "?" => println!("{HELP}"),
        "quit" | "exit" => return Ok(Flow::Quit),

        "login" => {
            let (Some(username), Some(password)) = (args.next(), args.next()) else {
                anyhow::bail!("usage: login <username> <password>");
            };
            let state = session.login(username, password).await?;
            println!("Session: {state}");
        }
        "register" => {
            let (Some(username), Some(password), Some(email)) =
                (args.next(), args.next(), args.next())
            else {
                anyhow::bail!("usage: register <username> <password> <email>");
            };
            println!("{}", session.register(username, password, email).await?);
        }
        "logout" => session.logout().await,

        "connect" => session.connect().await?,
        "disconnect" => session.disconnect().await,

        "join" => {
            let player_id = args.next();
            let rating = args.next().and_then(|r| r.parse::<u32>().ok());
            let resp = session.join_queue(player_id, rating).await?;
            println!("{}", resp.summary("Joined queue", "Failed"));
        }
        "leave" => {
            let resp = session.leave_queue(args.next()).await?;
            println!("{}", resp.summary("Left queue", "Not found"));
        }
        "refresh" => {
            session.refresh_queue().await?;
            print!("{}", session.view().render_queue());
        }
        "auto" => match args.next() {
            Some("on") => {
                let interval = args
                    .next()
                    .and_then(|ms| ms.parse::<u64>().ok())
                    .map(Duration::from_millis);
                let interval = session.start_auto_refresh(interval)?;
                println!("Auto-refresh every {} ms", interval.as_millis());
            }
            Some("off") => {
                if !session.stop_auto_refresh() {
                    println!("Auto-refresh was not running");
                }
            }
            _ => anyhow::bail!("usage: auto on [ms] | auto off"),
        },

        "player" => {
            let Some(player_id) = args.next() else {
                anyhow::bail!("usage: player <player-id>");
            };
            let lookup = session.player(player_id).await?;
            match lookup.player {
                Some(p) if lookup.success => println!(
                    "{} {} elo={} online={} last_active={}",
                    p.player_id,
                    p.display_name.as_deref().unwrap_or(""),
                    p.rating.map(|r| r.to_string()).unwrap_or_default(),
                    p.online,
                    p.last_active.as_deref().unwrap_or("")
                ),
                _ => println!(
                    "{}",
                    lookup.message.as_deref().unwrap_or("Player not found")
                ),
            }
        }
        "results" => {
            let limit = args.next().and_then(|n| n.parse::<u32>().ok());
            let results = session.recent_results(limit).await?;
            if results.results.is_empty() {
                println!("No results yet");
            }
            for m in &results.results {
                println!("{}", format_match(m));
            }
        }
        "history" => {
            let (player_id, limit) = match (args.next(), args.next()) {
                (Some(n), None) if n.parse::<u32>().is_ok() => (None, n.parse().ok()),
                (player_id, limit) => (player_id, limit.and_then(|n| n.parse::<u32>().ok())),
            };
            let history = session.history(player_id, limit).await?;
            if history.results.is_empty() {
                println!("No matches recorded");
            }
            for m in &history.results {
                println!("{}", format_match(m));
            }
        }
        "leaderboard" => {
            let limit = args.next().and_then(|n| n.parse::<u32>().ok());
            let board = session.leaderboard(limit).await?;
            if board.leaders.is_empty() {
                println!("Leaderboard is empty");
            }
            for row in &board.leaders {
                println!(
                    "{:>3}. {} {} elo={} W/L={}/{}",
                    row.rank.map(|r| r.to_string()).unwrap_or_default(),
                    row.player_id.as_deref().unwrap_or("?"),
                    row.display_name.as_deref().unwrap_or(""),
                    row.rating.map(|r| r.to_string()).unwrap_or_default(),
                    row.wins.unwrap_or_default(),
                    row.losses.unwrap_or_default()
                );
            }
        }
        "enabled" => {
            let status = session.matchmaking_enabled().await?;
            println!(
                "Matchmaking {} (ws connections: {}, ws active: {})",
                if status.enabled { "enabled" } else { "paused" },
                status
                    .ws_connections
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "?".into()),
                status
                    .ws_active
                    .map(|b| b.to_string())
                    .unwrap_or_else(|| "?".into())
            );
        }
        "status" => {
            let view = session.view();
            let auto = match session.auto_refresh_interval() {
                Some(interval) => format!("every {} ms", interval.as_millis()),
                None => "off".to_string(),
            };
            println!(
                "Session: {} ({}), auto-refresh: {auto}",
                session.state(),
                session.display_name().unwrap_or_else(|| "-".into()),
            );
            print!("{}", view.render_queue());
            print!("{}", view.render_matches());
            for line in view.log_lines().iter().take(10) {
                println!("  {line}");
            }
        }

        other => anyhow::bail!("unknown command {other:?}; type `help`"),
    }
    Ok(Flow::Continue)
}

fn render_event(event: &SessionEvent) {
    match event {
        SessionEvent::StateChanged(state) => println!("* Session: {state}"),
        SessionEvent::RedirectToLogin { reason } => {
            println!("* {reason}");
            println!("* login <username> <password>");
        }
        SessionEvent::AuthenticationRequired => println!("* Auto-refresh stopped: log in again"),
        SessionEvent::Match(m) => println!("* {}", format_match(m)),
        SessionEvent::QueueRefreshed(_) => {}
        SessionEvent::LinkClosed { reason } => match reason {
            Some(reason) => println!("* Connection lost: {reason}"),
            None => println!("* Connection closed by server"),
        },
    }
}
